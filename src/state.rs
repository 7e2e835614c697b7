//! State shared between the control thread and the realtime render thread.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwap;
use atomic_float::AtomicF32;
use crossbeam_queue::ArrayQueue;

use crate::{
    mixer::ChannelTestSettings,
    parameter::EngineParameterId,
    routing::ChannelRouter,
    sequence::Sequence,
    Error,
};

// -------------------------------------------------------------------------------------------------

const CHANNEL_TEST_QUEUE_SIZE: usize = 4;

// -------------------------------------------------------------------------------------------------

/// A copy of all engine parameters, read once per render call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub grain_length: usize,
    pub jitter: usize,
    pub density: f32,
    pub travel_min: f32,
    pub travel_max: f32,
    pub dry_level: f32,
}

impl ParameterSnapshot {
    /// Frames between two grain spawn attempts. Never zero.
    #[inline]
    pub fn trigger_interval(&self) -> usize {
        ((self.grain_length as f32 * self.density).round() as usize).max(1)
    }
}

// -------------------------------------------------------------------------------------------------

/// Live-tunable engine parameters. Each field is an independent atomic.
#[derive(Debug)]
struct EngineParameters {
    grain_length: AtomicUsize,
    jitter: AtomicUsize,
    density: AtomicF32,
    travel_spread: AtomicF32,
    dry_level: AtomicF32,
}

impl Default for EngineParameters {
    fn default() -> Self {
        let int_default = |id: EngineParameterId| {
            id.integer_parameter()
                .map_or(0, |p| p.default_value() as usize)
        };
        let float_default =
            |id: EngineParameterId| id.float_parameter().map_or(0.0, |p| p.default_value());
        Self {
            grain_length: AtomicUsize::new(int_default(EngineParameterId::GrainLength)),
            jitter: AtomicUsize::new(int_default(EngineParameterId::Jitter)),
            density: AtomicF32::new(float_default(EngineParameterId::Density)),
            travel_spread: AtomicF32::new(float_default(EngineParameterId::TravelSpread)),
            dry_level: AtomicF32::new(float_default(EngineParameterId::DryLevel)),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Engine state shared between the control side and the render thread via an `Arc`.
///
/// The control side writes parameters, channel assignments and sequences. The render thread
/// reads them once per render call and publishes its playback status back. All access is
/// lock free: scalars are atomics, sequences are swapped as a whole and channel test requests
/// are passed through a bounded queue.
#[derive(Debug)]
pub struct EngineState {
    parameters: EngineParameters,
    router: ChannelRouter,
    sequence: ArcSwap<Sequence>,
    hopping_enabled: AtomicBool,
    routing_paused: AtomicBool,
    channel_test_running: AtomicBool,
    channel_test_cancelled: AtomicBool,
    channel_test_requests: ArrayQueue<ChannelTestSettings>,
    playback_position: AtomicUsize,
    playback_length: AtomicUsize,
    active_grain_count: AtomicUsize,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    /// Create a new state with default parameters, an empty sequence and no output channels.
    pub fn new() -> Self {
        Self {
            parameters: EngineParameters::default(),
            router: ChannelRouter::new(),
            sequence: ArcSwap::from_pointee(Sequence::empty()),
            hopping_enabled: AtomicBool::new(false),
            routing_paused: AtomicBool::new(false),
            channel_test_running: AtomicBool::new(false),
            channel_test_cancelled: AtomicBool::new(false),
            channel_test_requests: ArrayQueue::new(CHANNEL_TEST_QUEUE_SIZE),
            playback_position: AtomicUsize::new(0),
            playback_length: AtomicUsize::new(0),
            active_grain_count: AtomicUsize::new(0),
        }
    }

    /// Create a new shared state instance.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // Setup

    /// Set the number of available output channels. Fails with [`Error::NoOutputChannels`]
    /// when `count` is zero.
    pub fn configure_channels(&self, count: usize) -> Result<(), Error> {
        self.router.configure_channels(count)?;
        log::info!("configured {} output channels", count);
        Ok(())
    }

    /// Number of configured output channels.
    pub fn output_channel_count(&self) -> usize {
        self.router.output_channel_count()
    }

    /// Logical object to output channel assignment.
    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }

    // Sequence

    /// Parse and activate a new hopping sequence and enable hopping.
    ///
    /// On parse errors, the previous sequence stays active.
    pub fn load_sequence(&self, text: &str) -> Result<(), Error> {
        let sequence = Sequence::parse(text)?;
        log::info!(
            "loaded sequence '{}' with {} steps",
            sequence.text(),
            sequence.len()
        );
        self.sequence.store(Arc::new(sequence));
        self.hopping_enabled.store(true, Ordering::Release);
        Ok(())
    }

    /// The currently active sequence.
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.load_full()
    }

    /// Lock free access to the active sequence for the render thread.
    #[inline]
    pub(crate) fn sequence_guard(&self) -> arc_swap::Guard<Arc<Sequence>> {
        self.sequence.load()
    }

    pub fn hopping_enabled(&self) -> bool {
        self.hopping_enabled.load(Ordering::Acquire)
    }

    /// Enable or disable grain hopping. Without hopping, all grains play on all channels.
    pub fn set_hopping_enabled(&self, enabled: bool) {
        self.hopping_enabled.store(enabled, Ordering::Release);
    }

    // Parameters

    /// Set a parameter by its name, e.g. `"grain_length"`.
    ///
    /// Fails with [`Error::ParameterError`] when the name is unknown, the value is out of
    /// bounds or when an integer parameter receives a fractional value. The previous value
    /// is kept in that case.
    pub fn set_engine_parameter(&self, name: &str, value: f64) -> Result<(), Error> {
        let id = EngineParameterId::from_str(name)
            .map_err(|_| Error::ParameterError(format!("Unknown parameter '{name}'")))?;
        let as_frames = |value: f64| {
            if value.fract() != 0.0 || value < 0.0 {
                Err(Error::ParameterError(format!(
                    "{name} expects a positive whole number, got {value}"
                )))
            } else {
                Ok(value as usize)
            }
        };
        match id {
            EngineParameterId::GrainLength => self.set_grain_length(as_frames(value)?),
            EngineParameterId::Jitter => self.set_jitter(as_frames(value)?),
            EngineParameterId::Density => self.set_density(value as f32),
            EngineParameterId::TravelSpread => self.set_travel_spread(value as f32),
            EngineParameterId::DryLevel => self.set_dry_level(value as f32),
        }
    }

    pub fn grain_length(&self) -> usize {
        self.parameters.grain_length.load(Ordering::Acquire)
    }

    /// Set the nominal grain length in frames.
    pub fn set_grain_length(&self, frames: usize) -> Result<(), Error> {
        let frames = Self::validate_frames(EngineParameterId::GrainLength, frames)?;
        self.parameters.grain_length.store(frames, Ordering::Release);
        Ok(())
    }

    pub fn jitter(&self) -> usize {
        self.parameters.jitter.load(Ordering::Acquire)
    }

    /// Set the maximum random grain start offset in frames.
    pub fn set_jitter(&self, frames: usize) -> Result<(), Error> {
        let frames = Self::validate_frames(EngineParameterId::Jitter, frames)?;
        self.parameters.jitter.store(frames, Ordering::Release);
        Ok(())
    }

    pub fn density(&self) -> f32 {
        self.parameters.density.load(Ordering::Acquire)
    }

    /// Set the trigger interval as multiple of the grain length.
    pub fn set_density(&self, density: f32) -> Result<(), Error> {
        let density = Self::validate_float(EngineParameterId::Density, density)?;
        self.parameters.density.store(density, Ordering::Release);
        Ok(())
    }

    /// Travel factor spread in percent.
    pub fn travel_spread(&self) -> f32 {
        self.parameters.travel_spread.load(Ordering::Acquire)
    }

    /// Set the travel factor spread in percent: grain lengths get scaled by a random factor
    /// in `1 - spread/100 ..= 1 + spread/100`.
    pub fn set_travel_spread(&self, percent: f32) -> Result<(), Error> {
        let percent = Self::validate_float(EngineParameterId::TravelSpread, percent)?;
        self.parameters
            .travel_spread
            .store(percent, Ordering::Release);
        Ok(())
    }

    pub fn dry_level(&self) -> f32 {
        self.parameters.dry_level.load(Ordering::Acquire)
    }

    /// Set the level of the un-granulated source layer.
    pub fn set_dry_level(&self, level: f32) -> Result<(), Error> {
        let level = Self::validate_float(EngineParameterId::DryLevel, level)?;
        self.parameters.dry_level.store(level, Ordering::Release);
        Ok(())
    }

    /// Read all parameters. Each field is read atomically on its own.
    #[inline]
    pub fn parameters(&self) -> ParameterSnapshot {
        let spread = self.travel_spread() / 100.0;
        ParameterSnapshot {
            grain_length: self.grain_length(),
            jitter: self.jitter(),
            density: self.density(),
            travel_min: 1.0 - spread,
            travel_max: 1.0 + spread,
            dry_level: self.dry_level(),
        }
    }

    fn validate_frames(id: EngineParameterId, frames: usize) -> Result<usize, Error> {
        match id.integer_parameter() {
            Some(parameter) => {
                let value = i32::try_from(frames).unwrap_or(i32::MAX);
                parameter.validate(value).map(|value| value as usize)
            }
            None => Err(Error::ParameterError(format!("{id} is not an integer parameter"))),
        }
    }

    fn validate_float(id: EngineParameterId, value: f32) -> Result<f32, Error> {
        match id.float_parameter() {
            Some(parameter) => parameter.validate(value),
            None => Err(Error::ParameterError(format!("{id} is not a float parameter"))),
        }
    }

    // Channel test

    /// Request a channel identification test from the render thread.
    ///
    /// The running flag is set once the request got queued and cleared by the render thread
    /// once every channel has been played, or by [`Self::cancel_channel_test`].
    pub fn start_channel_test(&self, settings: ChannelTestSettings) -> Result<(), Error> {
        if self.channel_test_requests.push(settings).is_err() {
            return Err(Error::SendError(
                "channel test request queue is full".to_string(),
            ));
        }
        self.channel_test_running.store(true, Ordering::Release);
        log::debug!("channel test requested");
        Ok(())
    }

    /// Drop all pending channel test requests and stop a test that is currently playing.
    /// The render thread stops the test at the start of its next block.
    pub fn cancel_channel_test(&self) {
        while self.channel_test_requests.pop().is_some() {}
        self.channel_test_cancelled.store(true, Ordering::Release);
        self.channel_test_running.store(false, Ordering::Release);
        log::debug!("channel test cancelled");
    }

    /// True while a channel identification test is pending or playing.
    pub fn channel_test_running(&self) -> bool {
        self.channel_test_running.load(Ordering::Acquire)
    }

    pub(crate) fn pop_channel_test_request(&self) -> Option<ChannelTestSettings> {
        self.channel_test_requests.pop()
    }

    /// Consume a pending cancellation. Returns true when the current test should stop.
    pub(crate) fn take_channel_test_cancel(&self) -> bool {
        self.channel_test_cancelled.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn finish_channel_test(&self) {
        self.channel_test_running.store(false, Ordering::Release);
    }

    /// While paused, no grains are spawned or advanced and the playback cursor stands still.
    pub fn routing_paused(&self) -> bool {
        self.routing_paused.load(Ordering::Acquire)
    }

    pub fn set_routing_paused(&self, paused: bool) {
        self.routing_paused.store(paused, Ordering::Release);
    }

    // Status

    /// Current playback cursor position in source frames.
    pub fn playback_position(&self) -> usize {
        self.playback_position.load(Ordering::Relaxed)
    }

    /// Total number of source frames of the running engine.
    pub fn playback_length(&self) -> usize {
        self.playback_length.load(Ordering::Relaxed)
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.active_grain_count.load(Ordering::Relaxed)
    }

    pub(crate) fn publish_playback_length(&self, frames: usize) {
        self.playback_length.store(frames, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn publish_status(&self, playback_position: usize, active_grain_count: usize) {
        self.playback_position
            .store(playback_position, Ordering::Relaxed);
        self.active_grain_count
            .store(active_grain_count, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn defaults() {
        let state = EngineState::new();
        let parameters = state.parameters();
        assert_eq!(parameters.grain_length, 2048);
        assert_eq!(parameters.jitter, 1000);
        assert_abs_diff_eq!(parameters.density, 0.5);
        assert_abs_diff_eq!(parameters.travel_min, 0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(parameters.travel_max, 1.1, epsilon = 1e-6);
        assert_eq!(parameters.dry_level, 0.0);
        assert_eq!(parameters.trigger_interval(), 1024);
        assert!(!state.hopping_enabled());
        assert!(state.sequence().is_empty());
    }

    #[test]
    fn setters_reject_out_of_bounds_values() {
        let state = EngineState::new();
        assert!(state.set_grain_length(255).is_err());
        assert!(state.set_grain_length(8193).is_err());
        assert!(state.set_jitter(2001).is_err());
        assert!(state.set_density(0.09).is_err());
        assert!(state.set_density(2.01).is_err());
        assert!(state.set_travel_spread(-1.0).is_err());
        assert!(state.set_travel_spread(51.0).is_err());
        assert!(state.set_dry_level(1.5).is_err());
        assert_eq!(state.parameters(), EngineState::new().parameters());

        state.set_grain_length(256).unwrap();
        state.set_jitter(0).unwrap();
        state.set_density(2.0).unwrap();
        state.set_travel_spread(50.0).unwrap();
        state.set_dry_level(1.0).unwrap();
        let parameters = state.parameters();
        assert_eq!(parameters.grain_length, 256);
        assert_eq!(parameters.jitter, 0);
        assert_eq!(parameters.trigger_interval(), 512);
        assert_abs_diff_eq!(parameters.travel_min, 0.5);
        assert_abs_diff_eq!(parameters.travel_max, 1.5);
        assert_eq!(parameters.dry_level, 1.0);
    }

    #[test]
    fn parameters_by_name() {
        let state = EngineState::new();
        state.set_engine_parameter("grain_length", 4096.0).unwrap();
        state.set_engine_parameter("density", 0.25).unwrap();
        assert_eq!(state.grain_length(), 4096);
        assert_eq!(state.parameters().trigger_interval(), 1024);
        assert!(matches!(
            state.set_engine_parameter("speed", 1.0),
            Err(Error::ParameterError(_))
        ));
        assert!(state.set_engine_parameter("jitter", 10.5).is_err());
        assert!(state.set_engine_parameter("jitter", -10.0).is_err());
        assert_eq!(state.jitter(), 1000);
    }

    #[test]
    fn sequence_swapping() {
        let state = EngineState::new();
        state.load_sequence("1 2 3*2").unwrap();
        assert!(state.hopping_enabled());
        let first = state.sequence();
        assert_eq!(first.len(), 4);

        assert!(state.load_sequence("1 y").is_err());
        assert_eq!(state.sequence().text(), "1 2 3*2");

        state.load_sequence("2").unwrap();
        // previously loaded sequences are never modified
        assert_eq!(first.len(), 4);
        assert_eq!(state.sequence_guard().len(), 1);
    }

    #[test]
    fn channel_configuration() {
        let state = EngineState::new();
        assert!(matches!(
            state.configure_channels(0),
            Err(Error::NoOutputChannels)
        ));
        state.configure_channels(8).unwrap();
        assert_eq!(state.output_channel_count(), 8);
    }

    #[test]
    fn channel_test_requests() {
        let state = EngineState::new();
        state
            .start_channel_test(ChannelTestSettings::default())
            .unwrap();
        assert!(state.channel_test_running());
        assert!(state.pop_channel_test_request().is_some());
        assert!(state.pop_channel_test_request().is_none());
        state.finish_channel_test();
        assert!(!state.channel_test_running());
    }

    #[test]
    fn cancelled_channel_tests_free_the_queue() {
        let state = EngineState::new();
        // without a render thread, every request stays queued until it gets cancelled
        for _ in 0..CHANNEL_TEST_QUEUE_SIZE + 2 {
            state
                .start_channel_test(ChannelTestSettings::default())
                .unwrap();
            assert!(state.channel_test_running());
            state.cancel_channel_test();
            assert!(!state.channel_test_running());
        }
        assert!(state.pop_channel_test_request().is_none());
        assert!(state.take_channel_test_cancel());
        assert!(!state.take_channel_test_cancel());

        for _ in 0..CHANNEL_TEST_QUEUE_SIZE {
            state
                .start_channel_test(ChannelTestSettings::default())
                .unwrap();
        }
        assert!(matches!(
            state.start_channel_test(ChannelTestSettings::default()),
            Err(Error::SendError(_))
        ));
    }
}
