//! Grain pool and spawn scheduling.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::sequence::{Sequence, Target};

// -------------------------------------------------------------------------------------------------

/// Default number of preallocated grain slots.
pub const DEFAULT_POOL_CAPACITY: usize = 128;
/// Default maximum number of simultaneously playing grains.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;
/// Grains are never shorter than this, unless truncated at the end of the source.
pub const MIN_GRAIN_LENGTH: usize = 64;

// -------------------------------------------------------------------------------------------------

/// A short, enveloped slice of source audio, played once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grain {
    /// First source frame of the grain.
    pub source_start: usize,
    /// Number of source frames the grain plays.
    pub source_length: usize,
    /// Frames played so far. Never exceeds `source_length`.
    pub playhead: usize,
    /// Grain amplitude.
    pub gain: f32,
    /// Spatial destination.
    pub target: Target,
    active: bool,
}

impl Default for Grain {
    fn default() -> Self {
        Self::new()
    }
}

impl Grain {
    /// Create a new inactive grain.
    pub const fn new() -> Self {
        Self {
            source_start: 0,
            source_length: 0,
            playhead: 0,
            gain: 1.0,
            target: Target::Broadcast,
            active: false,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Frames left to play.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.source_length - self.playhead
    }
}

// -------------------------------------------------------------------------------------------------

/// Source position and parameter snapshot used to spawn a new grain.
#[derive(Debug, Clone, Copy)]
pub struct SpawnContext<'a> {
    /// Current playback cursor in the source.
    pub current_frame: usize,
    /// Total number of source frames.
    pub total_frames: usize,
    /// Nominal grain length in frames.
    pub grain_length: usize,
    /// Maximum start offset in frames, applied in both directions.
    pub jitter: usize,
    /// Lower bound of the random length scale factor.
    pub travel_min: f32,
    /// Upper bound of the random length scale factor.
    pub travel_max: f32,
    /// Hopping sequence to take grain targets from. `None` when hopping is disabled.
    pub sequence: Option<&'a Sequence>,
}

// -------------------------------------------------------------------------------------------------

/// Fixed capacity grain arena, owned and used by the render thread only.
///
/// The number of active grains is capped by a concurrency limit, which usually is a lot
/// smaller than the pool capacity. Spawn requests beyond the limit are dropped, not queued.
#[derive(Debug)]
pub struct GrainPool {
    grains: Box<[Grain]>,
    active_count: usize,
    concurrency_limit: usize,
    sequence_position: usize,
    rng: SmallRng,
}

impl GrainPool {
    /// Create a new pool with the given capacity and concurrency limit.
    pub fn new(capacity: usize, concurrency_limit: usize) -> Self {
        Self::with_rng(capacity, concurrency_limit, SmallRng::from_os_rng())
    }

    /// Create a new pool with a deterministic random number generator.
    pub fn with_seed(capacity: usize, concurrency_limit: usize, seed: u64) -> Self {
        Self::with_rng(capacity, concurrency_limit, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, concurrency_limit: usize, rng: SmallRng) -> Self {
        debug_assert!(capacity > 0, "Need at least one grain slot");
        let grains = vec![Grain::new(); capacity].into_boxed_slice();
        let concurrency_limit = concurrency_limit.min(capacity);
        Self {
            grains,
            active_count: 0,
            concurrency_limit,
            sequence_position: 0,
            rng,
        }
    }

    /// Number of grain slots.
    pub fn capacity(&self) -> usize {
        self.grains.len()
    }

    /// Maximum number of simultaneously active grains.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Number of currently playing grains.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Position of the next grain target in the hopping sequence.
    pub fn sequence_position(&self) -> usize {
        self.sequence_position
    }

    /// All grain slots, including inactive ones.
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    /// Iterate over all playing grains.
    #[inline]
    pub fn active_grains(&self) -> impl Iterator<Item = &Grain> {
        self.grains.iter().filter(|grain| grain.active)
    }

    /// Try to start a new grain. Returns false when the concurrency limit is reached, when
    /// no slot is free or when there's no source material to play.
    pub fn try_spawn(&mut self, context: &SpawnContext) -> bool {
        if self.active_count >= self.concurrency_limit || context.total_frames == 0 {
            return false;
        }
        let Some(index) = self.grains.iter().position(|grain| !grain.active) else {
            return false;
        };

        let jitter = context.jitter as i64;
        let offset = self.rng.random_range(-jitter..=jitter);
        let (travel_min, travel_max) = if context.travel_min <= context.travel_max {
            (context.travel_min, context.travel_max)
        } else {
            (context.travel_max, context.travel_min)
        };
        let travel = self.rng.random_range(travel_min..=travel_max);

        let last_frame = context.total_frames as i64 - 1;
        let source_start = (context.current_frame as i64 + offset).clamp(0, last_frame) as usize;
        let source_length = ((context.grain_length as f32 * travel).round() as usize)
            .max(MIN_GRAIN_LENGTH)
            .min(context.total_frames - source_start);

        let target = match context.sequence {
            Some(sequence) if !sequence.is_empty() => {
                // sequence may have been replaced by a shorter one
                if self.sequence_position >= sequence.len() {
                    self.sequence_position = 0;
                }
                let target = sequence.target(self.sequence_position);
                self.sequence_position = (self.sequence_position + 1) % sequence.len();
                target
            }
            _ => Target::Broadcast,
        };

        self.grains[index] = Grain {
            source_start,
            source_length,
            playhead: 0,
            gain: 1.0,
            target,
            active: true,
        };
        self.active_count += 1;
        true
    }

    /// Advance all active grains by the given number of frames and release finished ones.
    pub fn advance(&mut self, frames: usize) {
        for grain in self.grains.iter_mut().filter(|grain| grain.active) {
            grain.playhead = (grain.playhead + frames).min(grain.source_length);
            if grain.playhead >= grain.source_length {
                grain.active = false;
                self.active_count -= 1;
            }
        }
    }

    /// Stop all grains immediately.
    pub fn reset(&mut self) {
        for grain in self.grains.iter_mut() {
            grain.active = false;
        }
        self.active_count = 0;
    }
}

// -------------------------------------------------------------------------------------------------
