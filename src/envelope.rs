//! Precomputed grain envelope window.

use assume::assume;

// -------------------------------------------------------------------------------------------------

/// Default number of samples in the grain envelope lookup table.
pub const DEFAULT_ENVELOPE_SIZE: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Precomputed, immutable raised-cosine (Hann) window, shared by all grains.
///
/// The window is symmetric with `w[0] == w[N-1] == 0` and its peak at the center. Its RMS is
/// calculated once and used to normalize the loudness of overlapping grains.
#[derive(Debug, Clone)]
pub struct EnvelopeTable {
    samples: Box<[f32]>,
    rms: f32,
}

impl EnvelopeTable {
    /// Build a new Hann window table with the given size. Sizes below 2 are raised to 2.
    pub fn new(size: usize) -> Self {
        debug_assert!(size >= 2, "Envelope needs at least two samples");
        let size = size.max(2);

        let last = (size - 1) as f64;
        let samples = (0..size)
            .map(|i| (0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / last).cos()) as f32)
            .collect::<Box<[f32]>>();

        let sum_of_squares = samples
            .iter()
            .map(|w| *w as f64 * *w as f64)
            .sum::<f64>();
        let rms = (sum_of_squares / size as f64).sqrt() as f32;

        Self { samples, rms }
    }

    /// Number of samples in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: a table holds at least two samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw window samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Root mean square of the window samples.
    #[inline]
    pub fn rms(&self) -> f32 {
        self.rms
    }

    /// Map a frame position within a grain of the given length to a table index, scaling
    /// `position` proportionally into `0..len()`.
    #[inline]
    pub fn index_for(&self, position: usize, grain_length: usize) -> usize {
        let last = self.samples.len() - 1;
        if grain_length == 0 {
            return last;
        }
        ((position as u64 * last as u64) / grain_length as u64).min(last as u64) as usize
    }

    /// Window value for a frame position within a grain of the given length.
    #[inline]
    pub fn at(&self, position: usize, grain_length: usize) -> f32 {
        let index = self.index_for(position, grain_length);
        assume!(unsafe: index < self.samples.len(), "index_for clamps to the table size");
        self.samples[index]
    }
}

impl Default for EnvelopeTable {
    fn default() -> Self {
        Self::new(DEFAULT_ENVELOPE_SIZE)
    }
}

// -------------------------------------------------------------------------------------------------
