//! Realtime grain mixer: spawns, routes and mixes grains into host output buffers.

use std::sync::Arc;

use crate::{
    envelope::{EnvelopeTable, DEFAULT_ENVELOPE_SIZE},
    grain::{Grain, GrainPool, SpawnContext, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_POOL_CAPACITY},
    routing::{resolve_channel, AssignmentSnapshot},
    sequence::Target,
    source::SourceBuffer,
    state::EngineState,
    utils::buffer::OutputBuffer,
    Error,
};

mod channel_test;
mod guarded;

pub use channel_test::ChannelTestSettings;
pub use guarded::{AudioRenderer, GuardedRenderer};

use channel_test::ChannelTestGenerator;

// -------------------------------------------------------------------------------------------------

/// Construction time configuration of a [`GrainMixer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Number of preallocated grain slots.
    pub pool_capacity: usize,
    /// Maximum number of simultaneously playing grains.
    pub concurrency_limit: usize,
    /// Number of samples in the grain envelope table.
    pub envelope_size: usize,
    /// Target RMS level of the grain mix, relative to the source level.
    pub target_rms: f32,
    /// Size of the preallocated mix buffer. Larger host buffers get rendered in chunks.
    pub max_block_frames: usize,
    /// Seed for the grain random number generator. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            envelope_size: DEFAULT_ENVELOPE_SIZE,
            target_rms: 0.2,
            max_block_frames: 4096,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_envelope_size(mut self, size: usize) -> Self {
        self.envelope_size = size;
        self
    }

    pub fn with_target_rms(mut self, rms: f32) -> Self {
        self.target_rms = rms;
        self
    }

    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.pool_capacity == 0 || self.concurrency_limit == 0 {
            return Err(Error::ParameterError(
                "Grain pool capacity and concurrency limit must be greater than 0".to_string(),
            ));
        }
        if self.envelope_size < 2 {
            return Err(Error::ParameterError(
                "Envelope size must be at least 2".to_string(),
            ));
        }
        if !(self.target_rms.is_finite() && self.target_rms > 0.0) {
            return Err(Error::ParameterError(
                "Target RMS must be greater than 0".to_string(),
            ));
        }
        if self.max_block_frames == 0 {
            return Err(Error::ParameterError(
                "Max block size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Renders grains from a source buffer into host output buffers.
///
/// The mixer owns all render-only state: the grain pool, trigger counter, playback cursor,
/// the channel test generator and a preallocated planar mix buffer. It is moved into the
/// audio callback and reads the shared [`EngineState`] once per rendered block. Rendering
/// never allocates, blocks or fails: anything that can't be played degrades to silence.
pub struct GrainMixer {
    state: Arc<EngineState>,
    source: Arc<SourceBuffer>,
    envelope: EnvelopeTable,
    pool: GrainPool,
    target_rms: f32,
    mix: Vec<Vec<f32>>,
    max_block_frames: usize,
    trigger_counter: usize,
    playback_position: usize,
    channel_test: ChannelTestGenerator,
}

impl GrainMixer {
    /// Create a new mixer for the state's configured output channels.
    ///
    /// Fails with [`Error::NoOutputChannels`] when no output channels are configured.
    pub fn new(
        state: Arc<EngineState>,
        source: Arc<SourceBuffer>,
        output_sample_rate: u32,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let channel_count = state.output_channel_count();
        if channel_count == 0 {
            return Err(Error::NoOutputChannels);
        }
        if source.sample_rate() != output_sample_rate {
            log::warn!(
                "source sample rate ({} Hz) differs from the output rate ({} Hz)",
                source.sample_rate(),
                output_sample_rate
            );
        }
        let envelope = EnvelopeTable::new(config.envelope_size);
        let pool = match config.seed {
            Some(seed) => {
                GrainPool::with_seed(config.pool_capacity, config.concurrency_limit, seed)
            }
            None => GrainPool::new(config.pool_capacity, config.concurrency_limit),
        };
        let mix = vec![vec![0.0; config.max_block_frames]; channel_count];
        state.publish_playback_length(source.frame_count());
        state.publish_status(0, 0);
        log::info!(
            "grain mixer: {} output channels, {} source channels, {} source frames",
            channel_count,
            source.channel_count(),
            source.frame_count()
        );
        Ok(Self {
            state,
            source,
            envelope,
            pool,
            target_rms: config.target_rms,
            mix,
            max_block_frames: config.max_block_frames,
            trigger_counter: 0,
            playback_position: 0,
            channel_test: ChannelTestGenerator::new(output_sample_rate),
        })
    }

    /// Shared engine state.
    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// Number of rendered output channels.
    pub fn channel_count(&self) -> usize {
        self.mix.len()
    }

    /// Current playback cursor in source frames.
    pub fn playback_position(&self) -> usize {
        self.playback_position
    }

    /// True once the playback cursor reached the end of the source and all grains finished.
    pub fn is_exhausted(&self) -> bool {
        self.playback_position >= self.source.frame_count() && self.pool.active_count() == 0
    }

    /// Grain pool, for inspection.
    pub fn pool(&self) -> &GrainPool {
        &self.pool
    }

    /// Render the next output buffer.
    pub fn render<B: OutputBuffer>(&mut self, output: &mut B) {
        #[cfg(feature = "assert-allocs")]
        assert_no_alloc::assert_no_alloc(|| self.render_blocks(output));
        #[cfg(not(feature = "assert-allocs"))]
        self.render_blocks(output);
    }

    fn render_blocks<B: OutputBuffer>(&mut self, output: &mut B) {
        let frame_count = output.frame_count();
        if output.channel_count() > self.mix.len() {
            output.clear();
        }
        let mut frame_offset = 0;
        while frame_offset < frame_count {
            let block_frames = (frame_count - frame_offset).min(self.max_block_frames);
            self.render_block(block_frames);
            output.write_planar(frame_offset, &self.mix, block_frames);
            frame_offset += block_frames;
        }
        self.state
            .publish_status(self.playback_position, self.pool.active_count());
    }

    fn render_block(&mut self, frame_count: usize) {
        for channel in self.mix.iter_mut() {
            channel[..frame_count].fill(0.0);
        }

        if self.state.take_channel_test_cancel() {
            self.channel_test.stop();
        }
        while let Some(settings) = self.state.pop_channel_test_request() {
            self.channel_test.start(settings);
        }

        let assignment = self.state.router().snapshot();
        if !self.state.routing_paused() {
            self.render_grains(frame_count, &assignment);
        }

        if self.channel_test.is_active()
            && self
                .channel_test
                .process(&mut self.mix, frame_count, assignment.channel_offset)
        {
            self.state.finish_channel_test();
        }
    }

    fn render_grains(&mut self, frame_count: usize, assignment: &AssignmentSnapshot) {
        let parameters = self.state.parameters();
        let trigger_interval = parameters.trigger_interval();
        let total_frames = self.source.frame_count();

        // spawn
        self.trigger_counter += frame_count;
        if self.trigger_counter >= trigger_interval {
            self.trigger_counter = 0;
            if self.playback_position < total_frames {
                let sequence = self.state.sequence_guard();
                let context = SpawnContext {
                    current_frame: self.playback_position,
                    total_frames,
                    grain_length: parameters.grain_length,
                    jitter: parameters.jitter,
                    travel_min: parameters.travel_min,
                    travel_max: parameters.travel_max,
                    sequence: self.state.hopping_enabled().then_some(&**sequence),
                };
                self.pool.try_spawn(&context);
            }
        }

        // mix
        for grain in self.pool.active_grains() {
            mix_grain(
                grain,
                &mut self.mix,
                frame_count,
                &self.source,
                &self.envelope,
                self.target_rms,
                trigger_interval,
                assignment,
            );
        }
        if parameters.dry_level > 0.0 {
            mix_dry(
                &mut self.mix,
                frame_count,
                &self.source,
                self.playback_position,
                parameters.dry_level,
            );
        }

        // advance
        self.pool.advance(frame_count);
        self.playback_position = (self.playback_position + frame_count).min(total_frames);
    }
}

impl AudioRenderer for GrainMixer {
    fn render<B: OutputBuffer>(&mut self, output: &mut B) {
        GrainMixer::render(self, output);
    }
}

// -------------------------------------------------------------------------------------------------

/// Accumulate the next `frame_count` frames of a single grain into the mix.
#[allow(clippy::too_many_arguments)]
#[inline]
fn mix_grain(
    grain: &Grain,
    mix: &mut [Vec<f32>],
    frame_count: usize,
    source: &SourceBuffer,
    envelope: &EnvelopeTable,
    target_rms: f32,
    trigger_interval: usize,
    assignment: &AssignmentSnapshot,
) {
    let frames = frame_count.min(grain.remaining());
    let overlap = (grain.source_length as f32 / trigger_interval as f32).max(1.0);
    let gain = grain.gain * target_rms / (envelope.rms() * overlap.sqrt());

    let mix_channel = |output: &mut [f32], source_channel: usize| {
        let samples = source.channel(source_channel % source.channel_count());
        let start = grain.source_start + grain.playhead;
        for (frame, mixed) in output[..frames].iter_mut().enumerate() {
            let Some(sample) = samples.get(start + frame) else {
                break;
            };
            let window = envelope.at(grain.playhead + frame, grain.source_length);
            *mixed += sample * window * gain;
        }
    };

    match grain.target {
        Target::Silent => {}
        Target::Broadcast => {
            for (channel, output) in mix.iter_mut().enumerate() {
                mix_channel(output.as_mut_slice(), channel);
            }
        }
        target @ Target::Object(_) => {
            if let Some(resolved) = resolve_channel(target, assignment, mix.len()) {
                mix_channel(mix[resolved.output_channel].as_mut_slice(), resolved.channel);
            }
        }
    }
}

/// Accumulate the un-granulated source at the playback cursor into the mix.
#[inline]
fn mix_dry(
    mix: &mut [Vec<f32>],
    frame_count: usize,
    source: &SourceBuffer,
    playback_position: usize,
    level: f32,
) {
    let frames = frame_count.min(source.frame_count().saturating_sub(playback_position));
    for (channel, output) in mix.iter_mut().enumerate() {
        let samples = source.channel(channel % source.channel_count());
        for (mixed, sample) in output[..frames]
            .iter_mut()
            .zip(&samples[playback_position..playback_position + frames])
        {
            *mixed += sample * level;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::utils::buffer::{InterleavedBuffer, PlanarBuffer};

    const SAMPLE_RATE: u32 = 48000;

    fn noise_source(frames: usize, channels: usize) -> Arc<SourceBuffer> {
        let mut rng = SmallRng::seed_from_u64(1234);
        let channels = (0..channels)
            .map(|_| (0..frames).map(|_| rng.random_range(-0.5..0.5)).collect())
            .collect();
        Arc::new(SourceBuffer::new(channels, SAMPLE_RATE).unwrap())
    }

    fn dc_source(frames: usize, channels: usize) -> Arc<SourceBuffer> {
        Arc::new(SourceBuffer::new(vec![vec![0.5; frames]; channels], SAMPLE_RATE).unwrap())
    }

    fn mixer(source: Arc<SourceBuffer>, output_channels: usize) -> GrainMixer {
        let state = EngineState::new_shared();
        state.configure_channels(output_channels).unwrap();
        GrainMixer::new(
            state,
            source,
            SAMPLE_RATE,
            EngineConfig::default().with_seed(99),
        )
        .unwrap()
    }

    /// Render `frames` frames in blocks of `block_size` and return the planar output.
    fn render(mixer: &mut GrainMixer, frames: usize, block_size: usize) -> Vec<Vec<f32>> {
        let channel_count = mixer.channel_count();
        let mut output = vec![Vec::with_capacity(frames); channel_count];
        let mut samples = vec![0.0_f32; block_size * channel_count];
        for _ in 0..frames / block_size {
            mixer.render(&mut InterleavedBuffer::new(&mut samples, channel_count));
            for frame in samples.chunks_exact(channel_count) {
                for (channel, sample) in output.iter_mut().zip(frame) {
                    channel.push(*sample);
                }
            }
        }
        output
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn setup_errors() {
        let state = EngineState::new_shared();
        assert!(matches!(
            GrainMixer::new(
                state.clone(),
                dc_source(100, 1),
                SAMPLE_RATE,
                EngineConfig::default()
            ),
            Err(Error::NoOutputChannels)
        ));
        state.configure_channels(2).unwrap();
        assert!(GrainMixer::new(
            state,
            dc_source(100, 1),
            SAMPLE_RATE,
            EngineConfig::default().with_max_block_frames(0)
        )
        .is_err());
    }

    #[test]
    fn gain_normalization_keeps_rms_constant() {
        let measure = |density: f32| {
            let mut mixer = mixer(noise_source(120_000, 1), 1);
            let state = mixer.state().clone();
            state.set_grain_length(2048).unwrap();
            state.set_jitter(2000).unwrap();
            state.set_travel_spread(0.0).unwrap();
            state.set_density(density).unwrap();
            let output = render(&mut mixer, 96_000, 256);
            rms(&output[0][16_384..])
        };
        // overlap factor 2 and 4
        let sparse = measure(0.5);
        let dense = measure(0.25);
        assert!(sparse > 0.01, "rms was {sparse}");
        let ratio = dense / sparse;
        assert!((0.8..1.25).contains(&ratio), "rms ratio was {ratio}");
    }

    #[test]
    fn broadcast_without_sequence() {
        let mut mixer = mixer(dc_source(48_000, 1), 3);
        let output = render(&mut mixer, 4096, 512);
        for channel in &output {
            assert!(channel.iter().any(|s| *s > 0.0));
            assert_eq!(channel, &output[0]);
        }
    }

    #[test]
    fn routes_sequence_targets() {
        let mut mixer = mixer(dc_source(48_000, 1), 4);
        mixer.state().load_sequence("2").unwrap();
        let output = render(&mut mixer, 4096, 512);
        assert!(output[1].iter().any(|s| *s > 0.0));
        for channel in [0, 2, 3] {
            assert!(output[channel].iter().all(|s| *s == 0.0));
        }

        // channel offset shifts routed grains
        let mut mixer = self::mixer(dc_source(48_000, 1), 4);
        mixer.state().load_sequence("2").unwrap();
        mixer.state().router().set_channel_offset(2).unwrap();
        let output = render(&mut mixer, 4096, 512);
        assert!(output[3].iter().any(|s| *s > 0.0));
        assert!(output[1].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn silent_and_unassignable_targets() {
        for sequence in ["x", "9", "x*3 0"] {
            let mut mixer = mixer(dc_source(48_000, 1), 2);
            mixer.state().load_sequence(sequence).unwrap();
            let output = render(&mut mixer, 8192, 512);
            assert!(
                output.iter().flatten().all(|s| *s == 0.0),
                "expected silence for '{sequence}'"
            );
            // grains still play
            assert!(mixer.pool().active_count() > 0);
        }
    }

    #[test]
    fn source_channel_wraparound() {
        let source = Arc::new(
            SourceBuffer::new(vec![vec![0.25; 48_000], vec![-0.5; 48_000]], SAMPLE_RATE)
                .unwrap(),
        );
        let mut mixer = mixer(source, 4);
        let output = render(&mut mixer, 2048, 512);
        assert!(output[0].iter().all(|s| *s >= 0.0));
        assert!(output[1].iter().all(|s| *s <= 0.0));
        assert_eq!(output[2], output[0]);
        assert_eq!(output[3], output[1]);
    }

    #[test]
    fn stops_spawning_at_source_end() {
        let mut mixer = mixer(dc_source(6000, 1), 1);
        let output = render(&mut mixer, 24_576, 512);
        assert_eq!(mixer.playback_position(), 6000);
        assert_eq!(mixer.pool().active_count(), 0);
        assert!(mixer.is_exhausted());
        assert!(output[0][..6000].iter().any(|s| *s != 0.0));
        assert!(output[0][16_384..].iter().all(|s| *s == 0.0));
        assert_eq!(mixer.state().playback_position(), 6000);
    }

    #[test]
    fn dry_layer() {
        let mut mixer = mixer(dc_source(2048, 1), 2);
        mixer.state().set_dry_level(1.0).unwrap();
        mixer.state().load_sequence("x").unwrap();
        let output = render(&mut mixer, 4096, 256);
        assert!(output[0][..2048].iter().all(|s| *s == 0.5));
        assert!(output[1][..2048].iter().all(|s| *s == 0.5));
        assert!(output[0][2048..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn trigger_schedule() {
        let mut mixer = mixer(dc_source(48_000, 1), 1);
        let state = mixer.state().clone();
        state.set_grain_length(256).unwrap();
        state.set_density(1.0).unwrap();
        state.set_jitter(0).unwrap();
        state.set_travel_spread(0.0).unwrap();
        // the sequence position counts spawned grains
        state.load_sequence("1*1000").unwrap();
        let spawned = |mixer: &GrainMixer| mixer.pool().sequence_position();

        render(&mut mixer, 128, 128);
        assert_eq!(spawned(&mixer), 0);
        render(&mut mixer, 128, 128);
        assert_eq!(spawned(&mixer), 1);

        // paused routing neither spawns nor advances the trigger counter
        state.set_routing_paused(true);
        render(&mut mixer, 5 * 128, 128);
        assert_eq!(spawned(&mixer), 1);
        assert_eq!(mixer.playback_position(), 256);
        state.set_routing_paused(false);

        // counter got reset on the last spawn
        render(&mut mixer, 128, 128);
        assert_eq!(spawned(&mixer), 1);
        render(&mut mixer, 128, 128);
        assert_eq!(spawned(&mixer), 2);

        // callbacks longer than the interval still spawn a single grain each
        for expected in 3..7 {
            render(&mut mixer, 512, 512);
            assert_eq!(spawned(&mixer), expected);
        }
    }

    #[test]
    fn parameter_changes_apply_on_next_render() {
        let mut mixer = mixer(dc_source(48_000, 1), 1);
        let state = mixer.state().clone();
        state.set_grain_length(1024).unwrap();
        state.set_density(0.25).unwrap();
        state.set_jitter(0).unwrap();
        state.set_travel_spread(0.0).unwrap();
        state.load_sequence("1*1000").unwrap();

        render(&mut mixer, 1024, 256);
        assert_eq!(mixer.pool().sequence_position(), 4);
        assert!(mixer.pool().active_count() > 0);
        assert!(mixer
            .pool()
            .active_grains()
            .all(|grain| grain.source_length == 1024));

        // new grain length
        state.set_grain_length(512).unwrap();
        render(&mut mixer, 256, 256);
        assert_eq!(mixer.pool().sequence_position(), 5);
        assert!(mixer
            .pool()
            .active_grains()
            .any(|grain| grain.source_length == 512 && grain.playhead == 256));

        // new cadence: interval of 512 * 0.5 frames
        state.set_density(0.5).unwrap();
        render(&mut mixer, 128, 128);
        assert_eq!(mixer.pool().sequence_position(), 5);
        render(&mut mixer, 128, 128);
        assert_eq!(mixer.pool().sequence_position(), 6);
        render(&mut mixer, 1024, 128);
        assert_eq!(mixer.pool().sequence_position(), 10);
    }

    #[test]
    fn channel_test_overrides_and_finishes() {
        let mut mixer = mixer(dc_source(48_000, 1), 3);
        let state = mixer.state().clone();
        let settings = ChannelTestSettings::default()
            .with_tone_frames(400)
            .with_silence_frames(112);
        state.set_routing_paused(true);
        state.start_channel_test(settings).unwrap();
        assert!(state.channel_test_running());

        let output = render(&mut mixer, 3 * 512, 512);
        assert!(state.channel_test_running());
        for (channel, samples) in output.iter().enumerate() {
            let tone = &samples[channel * 512..channel * 512 + 400];
            assert!(tone.iter().any(|s| *s != 0.0));
            assert!(tone.iter().all(|s| s.abs() <= settings.gain));
            let others = samples
                .iter()
                .enumerate()
                .filter(|(frame, _)| frame / 512 != channel)
                .all(|(_, s)| *s == 0.0);
            assert!(others, "channel {channel} played outside its slot");
        }
        render(&mut mixer, 512, 512);
        assert!(!state.channel_test_running());

        // paused routing doesn't move the cursor or spawn grains
        assert_eq!(mixer.playback_position(), 0);
        assert_eq!(mixer.pool().active_count(), 0);
        state.set_routing_paused(false);
        render(&mut mixer, 1024, 512);
        assert_eq!(mixer.playback_position(), 1024);
    }

    #[test]
    fn int16_planar_output_clamps() {
        let mut mixer = mixer(dc_source(48_000, 1), 2);
        mixer.state().set_dry_level(1.0).unwrap();
        mixer.state().load_sequence("x").unwrap();
        let mut left = vec![0_i16; 5000];
        let mut right = vec![0_i16; 5000];
        {
            let mut channels = [left.as_mut_slice(), right.as_mut_slice()];
            // larger than the mix buffer: rendered in chunks
            mixer.render(&mut PlanarBuffer::new(&mut channels));
        }
        assert!(left.iter().all(|s| *s == 16384));
        assert!(right.iter().all(|s| *s == 16384));
        assert_eq!(mixer.playback_position(), 5000);
    }
}
