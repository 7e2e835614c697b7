//! Plays grains on the default audio device and runs the interactive live control loop.

use std::{io, sync::Arc};

use grainhop::{
    outputs::WavOutput, spawn_stdin_reader, AudioHostId, DefaultOutputDevice, EngineConfig,
    EngineState, Error, GrainMixer, LiveController, OutputDevice,
};

// -------------------------------------------------------------------------------------------------

// Common demo code
#[path = "./common/arguments.rs"]
mod arguments;

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = arguments::parse();

    match &args.output_path {
        Some(path) => {
            let channel_count = args.channel_count.unwrap_or(4);
            let duration = std::time::Duration::from_secs(args.duration.unwrap_or(20));
            let output = WavOutput::open_with_specs(path, 48000, channel_count, duration)?;
            run(&args, output)
        }
        None => {
            let host = match &args.host {
                Some(name) => name.parse::<AudioHostId>().map_err(|_| {
                    Error::ParameterError(format!("Unknown or unavailable audio host '{name}'"))
                })?,
                None => AudioHostId::Default,
            };
            run(&args, DefaultOutputDevice::open_with_host(host)?)
        }
    }
}

fn run<D: OutputDevice>(args: &arguments::Arguments, mut output: D) -> Result<(), Error> {
    let channel_count = output.channel_count();
    let sample_rate = output.sample_rate();
    if channel_count == 6 {
        println!("Your device appears to be a 5.1 surround system.");
        println!("Channel 4 is typically the LFE (subwoofer): consider avoiding it for objects.");
    }

    // Set up the engine for the device's channel layout
    let state = EngineState::new_shared();
    state.configure_channels(channel_count)?;
    arguments::configure_state(args, &state)?;

    let source = arguments::load_source(args, sample_rate)?;
    let mut config = EngineConfig::default();
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let mixer = GrainMixer::new(Arc::clone(&state), source, sample_rate, config)?;

    // Start playing
    output.play(mixer)?;
    output.resume();

    // Run the live control loop until stdin closes or 'q' got pressed
    let mut controller =
        LiveController::new(Arc::clone(&state), spawn_stdin_reader()?, io::stdout(), sample_rate);
    if !args.skip_channel_test {
        match controller.run_channel_test() {
            Ok(()) => println!("Channel test complete!"),
            Err(err) => log::warn!("startup channel test failed: {}", err),
        }
    }
    controller.run()?;

    output.close();
    Ok(())
}
