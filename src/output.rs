#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

/// The enabled realtime audio output type.
#[cfg(feature = "cpal-output")]
pub type DefaultOutputDevice = cpal::CpalOutput;

/// Available audio hosts for cpal output (platform specific).
///
/// Parses from snake case names such as `"default"` or `"alsa"`.
#[cfg(feature = "cpal-output")]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AudioHostId {
    #[default]
    Default, // system default
    #[cfg(target_os = "windows")]
    Wasapi,
    #[cfg(target_os = "linux")]
    Alsa,
    #[cfg(target_os = "macos")]
    CoreAudio,
}

use crate::{mixer::AudioRenderer, Error};

// -------------------------------------------------------------------------------------------------

/// Audio output device, which drives an [`AudioRenderer`].
///
/// Devices get opened first, so the engine can be set up for the device's channel layout and
/// sample rate, and then start rendering with [`OutputDevice::play`].
pub trait OutputDevice {
    /// Actual device's output channel count.
    fn channel_count(&self) -> usize;
    /// Actual device's output sample rate.
    fn sample_rate(&self) -> u32;
    /// Number of frames rendered so far.
    fn frame_position(&self) -> u64;

    /// True while the device is rendering.
    fn is_running(&self) -> bool;

    /// Start rendering the given renderer. Replaces a previously playing renderer.
    fn play<R: AudioRenderer>(&mut self, renderer: R) -> Result<(), Error>;
    /// Pause rendering without dropping the renderer.
    fn pause(&mut self);
    /// Resume from paused rendering.
    fn resume(&mut self);

    /// Stop rendering and release the audio device.
    fn close(&mut self);
}

// -------------------------------------------------------------------------------------------------

#[cfg(all(test, feature = "cpal-output"))]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn host_names() {
        assert_eq!(AudioHostId::from_str("default"), Ok(AudioHostId::Default));
        assert_eq!(AudioHostId::from_str("Default"), Ok(AudioHostId::Default));
        assert!(AudioHostId::from_str("jack_audio").is_err());
        for host in AudioHostId::iter() {
            assert_eq!(AudioHostId::from_str(&host.to_string()), Ok(host));
        }
        #[cfg(target_os = "linux")]
        assert_eq!(AudioHostId::from_str("alsa"), Ok(AudioHostId::Alsa));
        #[cfg(target_os = "macos")]
        assert_eq!(AudioHostId::from_str("core_audio"), Ok(AudioHostId::CoreAudio));
        #[cfg(target_os = "windows")]
        assert_eq!(AudioHostId::from_str("wasapi"), Ok(AudioHostId::Wasapi));
    }
}
