//! Renders grains offline into a multichannel wav file.

use std::{path::PathBuf, sync::Arc, time::Duration};

use grainhop::{
    outputs::WavOutput, EngineConfig, EngineState, Error, GrainMixer, OutputDevice,
};

// -------------------------------------------------------------------------------------------------

// Common demo code
#[path = "./common/arguments.rs"]
mod arguments;

// -------------------------------------------------------------------------------------------------

const DEFAULT_OUTPUT_PATH: &str = "grains.wav";
const DEFAULT_SEQUENCE: &str = "1 2 3*2 x 3 2";

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = arguments::parse();

    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));

    // Load the source first: the file gets rendered at the source's sample rate
    let source = arguments::load_source(&args, 48000)?;
    let mut output = WavOutput::open_with_specs(
        &output_path,
        source.sample_rate(),
        args.channel_count.unwrap_or(4),
        Duration::from_secs(args.duration.unwrap_or(20)),
    )?;

    let state = EngineState::new_shared();
    state.configure_channels(output.channel_count())?;
    arguments::configure_state(&args, &state)?;
    if args.sequence.is_none() {
        state.load_sequence(DEFAULT_SEQUENCE)?;
    }

    let mut config = EngineConfig::default();
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let mixer = GrainMixer::new(Arc::clone(&state), source, output.sample_rate(), config)?;

    output.play(mixer)?;
    output.resume();
    output.wait()?;

    println!(
        "Rendered {} frames into '{}'",
        output.frame_position(),
        output_path.display()
    );
    Ok(())
}
