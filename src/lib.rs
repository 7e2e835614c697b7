#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod control;
mod envelope;
mod error;
mod grain;
mod mixer;
#[cfg(any(feature = "cpal-output", feature = "wav-output"))]
mod output;
mod sequence;
mod source;
mod state;

// public, flat re-exports
pub use error::Error;

#[cfg(feature = "cpal-output")]
pub use output::{AudioHostId, DefaultOutputDevice};
#[cfg(any(feature = "cpal-output", feature = "wav-output"))]
pub use output::OutputDevice;

pub use control::{
    spawn_stdin_reader, ControlCommand, ControlState, LiveController, DEFAULT_POLL_INTERVAL,
};
pub use envelope::{EnvelopeTable, DEFAULT_ENVELOPE_SIZE};
pub use grain::{
    Grain, GrainPool, SpawnContext, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_POOL_CAPACITY,
    MIN_GRAIN_LENGTH,
};
pub use mixer::{AudioRenderer, ChannelTestSettings, EngineConfig, GrainMixer, GuardedRenderer};
pub use routing::ChannelRouter;
pub use sequence::{Sequence, Target, BROADCAST_STEP, MAX_SEQUENCE_STEPS, SILENT_STEP};
pub use source::{SourceBuffer, MAX_SOURCE_CHANNELS};
pub use state::{EngineState, ParameterSnapshot};

// public mods
pub mod parameter;
pub mod routing;
pub mod utils;

pub mod outputs {
    //! Available audio output devices.

    #[cfg(feature = "cpal-output")]
    pub use super::output::cpal::CpalOutput;
    #[cfg(feature = "wav-output")]
    pub use super::output::wav::WavOutput;
}
