use std::{path::PathBuf, sync::Arc};

use arg::{parse_args, Args};

use grainhop::{EngineState, Error, SourceBuffer};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const DEMO_SOURCE_SECONDS: usize = 30;

// -------------------------------------------------------------------------------------------------

/// Default program arguments for grainhop demo applications.
#[derive(Args, Debug, Default)]
#[allow(unused)]
pub struct Arguments {
    #[arg(short = "i", long = "input")]
    /// Source wav file to granulate. By default a synthesized demo tone is used.
    pub input_path: Option<PathBuf>,
    #[arg(short = "o", long = "output")]
    /// Write audio output into the given wav file, instead of using the default audio device.
    pub output_path: Option<PathBuf>,
    #[arg(short = "s", long = "sequence")]
    /// Hopping sequence, e.g. \"1 2 3*2 x\". By default grains play on all channels.
    pub sequence: Option<String>,
    #[arg(short = "c", long = "channels")]
    /// Comma separated 1-based output channels of the three spatial objects, e.g. \"1,2,3\".
    pub object_channels: Option<String>,
    #[arg(short = "n", long = "channel-count")]
    /// Number of output channels when writing into a wav file (default: 4).
    pub channel_count: Option<usize>,
    #[arg(short = "d", long = "duration")]
    /// Duration in seconds when writing into a wav file (default: 20).
    pub duration: Option<u64>,
    #[arg(long = "host")]
    /// Audio host of the realtime output: \"default\", \"wasapi\", \"alsa\" or \"core_audio\".
    /// Only hosts of the current platform are available.
    pub host: Option<String>,
    #[arg(long = "seed")]
    /// Random seed for deterministic grain placement.
    pub seed: Option<u64>,
    #[arg(long = "skip-channel-test")]
    /// Don't play the channel identification test on startup.
    pub skip_channel_test: bool,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    pub log_level: Option<log::Level>,
}

/// Parse common demo arguments and apply the log-level arg to the logger
#[allow(unused)]
pub fn parse() -> Arguments {
    // Parse args
    let args = parse_args::<Arguments>();

    create_logger(args.log_level);
    args
}

// -------------------------------------------------------------------------------------------------

/// Create default logger from arguments. Invoked from `parse`.
#[allow(unused)]
pub fn create_logger(log_level: Option<log::Level>) {
    // Init logger
    simple_logger::SimpleLogger::new()
        // use default or arg level by default
        .with_level(log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");
}

// -------------------------------------------------------------------------------------------------

/// Load the source file from the arguments or synthesize a demo source at the given rate.
#[allow(unused)]
pub fn load_source(args: &Arguments, sample_rate: u32) -> Result<Arc<SourceBuffer>, Error> {
    match &args.input_path {
        Some(path) => Ok(Arc::new(SourceBuffer::from_wav_file(path)?)),
        None => Ok(Arc::new(demo_source(sample_rate)?)),
    }
}

/// A slowly gliding stereo chord with a little noise, so grains are easy to follow by ear.
fn demo_source(sample_rate: u32) -> Result<SourceBuffer, Error> {
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let frame_count = DEMO_SOURCE_SECONDS * sample_rate as usize;
    let partials = [1.0, 1.25, 1.5, 2.0];
    let channels = (0..2)
        .map(|channel| {
            (0..frame_count)
                .map(|frame| {
                    let time = frame as f64 / sample_rate as f64;
                    let base = 110.0 * (1.0 + time / DEMO_SOURCE_SECONDS as f64) + channel as f64;
                    let tone = partials
                        .iter()
                        .map(|p| (std::f64::consts::TAU * base * p * time).sin())
                        .sum::<f64>()
                        / partials.len() as f64;
                    (tone * 0.4) as f32 + rng.random_range(-0.02..0.02)
                })
                .collect()
        })
        .collect();
    SourceBuffer::new(channels, sample_rate)
}

// -------------------------------------------------------------------------------------------------

/// Apply sequence and object channel arguments to the engine state.
#[allow(unused)]
pub fn configure_state(args: &Arguments, state: &EngineState) -> Result<(), Error> {
    if let Some(channels) = &args.object_channels {
        let parsed = channels
            .split(',')
            .map(|c| c.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .ok()
            .filter(|c| c.len() == 3 && c.iter().all(|c| *c >= 1));
        match parsed {
            Some(c) => state
                .router()
                .reassign_all([c[0] - 1, c[1] - 1, c[2] - 1], false)?,
            None => {
                return Err(Error::ParameterError(format!(
                    "Invalid object channels '{channels}': expected three channels like '1,2,3'"
                )))
            }
        }
    }
    if let Some(sequence) = &args.sequence {
        state.load_sequence(sequence)?;
    }
    Ok(())
}
