pub mod buffer;

// -------------------------------------------------------------------------------------------------

/// Convert a frame count at the given sample rate into milliseconds.
pub fn frames_to_ms(frames: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    (frames as f64 * 1000.0 / sample_rate as f64) as f32
}

// -------------------------------------------------------------------------------------------------
