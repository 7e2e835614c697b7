//! Host output buffer layouts and sample format conversion.

// -------------------------------------------------------------------------------------------------

/// A host output sample format, converted from the engine's float mix.
///
/// Conversions clamp into the format's representable range.
pub trait OutputSample: Copy + Default + Send + 'static {
    fn from_f32(value: f32) -> Self;
}

impl OutputSample for f32 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        value.clamp(-1.0, 1.0)
    }
}

impl OutputSample for i16 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        (value.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
    }
}

impl OutputSample for i32 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        // f32 can't represent i32::MAX, so scale in f64
        (value.clamp(-1.0, 1.0) as f64 * i32::MAX as f64).round() as i32
    }
}

// -------------------------------------------------------------------------------------------------

/// A host provided output buffer, which receives a rendered planar float mix.
pub trait OutputBuffer {
    type Sample: OutputSample;

    /// Number of channels in the buffer.
    fn channel_count(&self) -> usize;

    /// Number of frames in the buffer.
    fn frame_count(&self) -> usize;

    /// Fill the whole buffer with silence.
    fn clear(&mut self);

    /// Convert and copy `frame_count` frames of the given planar mix into the buffer, starting
    /// at `frame_offset`. Mix channels beyond the buffer's channel count are ignored.
    fn write_planar(&mut self, frame_offset: usize, planar: &[Vec<f32>], frame_count: usize);
}

// -------------------------------------------------------------------------------------------------

/// Interleaved output buffer: `[f0c0, f0c1, ..., f1c0, f1c1, ...]`.
pub struct InterleavedBuffer<'a, T: OutputSample> {
    samples: &'a mut [T],
    channel_count: usize,
}

impl<'a, T: OutputSample> InterleavedBuffer<'a, T> {
    pub fn new(samples: &'a mut [T], channel_count: usize) -> Self {
        debug_assert!(channel_count > 0, "Need at least one channel");
        debug_assert!(
            samples.len() % channel_count == 0,
            "Buffer size must be a multiple of the channel count"
        );
        Self {
            samples,
            channel_count,
        }
    }
}

impl<T: OutputSample> OutputBuffer for InterleavedBuffer<'_, T> {
    type Sample = T;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    fn clear(&mut self) {
        self.samples.fill(T::default());
    }

    fn write_planar(&mut self, frame_offset: usize, planar: &[Vec<f32>], frame_count: usize) {
        let start = frame_offset * self.channel_count;
        let end = start + frame_count * self.channel_count;
        planar_to_interleaved(planar, frame_count, &mut self.samples[start..end]);
    }
}

// -------------------------------------------------------------------------------------------------

/// Non-interleaved output buffer with one slice per channel.
pub struct PlanarBuffer<'a, 'b, T: OutputSample> {
    channels: &'a mut [&'b mut [T]],
}

impl<'a, 'b, T: OutputSample> PlanarBuffer<'a, 'b, T> {
    pub fn new(channels: &'a mut [&'b mut [T]]) -> Self {
        debug_assert!(
            channels.windows(2).all(|c| c[0].len() == c[1].len()),
            "All channels must have the same length"
        );
        Self { channels }
    }
}

impl<T: OutputSample> OutputBuffer for PlanarBuffer<'_, '_, T> {
    type Sample = T;

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, |channel| channel.len())
    }

    fn clear(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.fill(T::default());
        }
    }

    fn write_planar(&mut self, frame_offset: usize, planar: &[Vec<f32>], frame_count: usize) {
        for (output, mix) in self.channels.iter_mut().zip(planar) {
            let output = &mut output[frame_offset..frame_offset + frame_count];
            for (o, m) in output.iter_mut().zip(&mix[..frame_count]) {
                *o = T::from_f32(*m);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Convert the first `frame_count` frames of the given planar buffer into an interleaved one.
/// The interleaved buffer's length defines the channel layout.
pub fn planar_to_interleaved<T: OutputSample>(
    planar: &[Vec<f32>],
    frame_count: usize,
    interleaved: &mut [T],
) {
    if frame_count == 0 {
        return;
    }
    let channel_count = interleaved.len() / frame_count;
    match channel_count {
        1 => {
            for (i, p) in interleaved.iter_mut().zip(planar[0].iter()) {
                *i = T::from_f32(*p);
            }
        }
        2 if planar.len() >= 2 => {
            for (frame, (l, r)) in interleaved
                .chunks_exact_mut(2)
                .zip(planar[0].iter().zip(planar[1].iter()))
            {
                frame[0] = T::from_f32(*l);
                frame[1] = T::from_f32(*r);
            }
        }
        _ => {
            for (channel_index, channel_values) in
                planar.iter().take(channel_count).enumerate()
            {
                for (frame_index, value) in channel_values[..frame_count].iter().enumerate() {
                    interleaved[frame_index * channel_count + channel_index] =
                        T::from_f32(*value);
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion() {
        assert_eq!(f32::from_f32(0.5), 0.5);
        assert_eq!(f32::from_f32(1.5), 1.0);
        assert_eq!(i16::from_f32(1.0), i16::MAX);
        assert_eq!(i16::from_f32(-4.0), -i16::MAX);
        assert_eq!(i16::from_f32(0.5), 16384);
        assert_eq!(i32::from_f32(2.0), i32::MAX);
        assert_eq!(i32::from_f32(-1.0), -i32::MAX);
        assert_eq!(i32::from_f32(0.0), 0);
    }

    #[test]
    fn planar_to_interleaved_layouts() {
        // mono
        let planar_mono = vec![vec![0.1, 0.2, 0.3, 0.4]];
        let mut interleaved_mono = vec![0.0_f32; 4];
        planar_to_interleaved(&planar_mono, 4, &mut interleaved_mono);
        assert_eq!(interleaved_mono, vec![0.1, 0.2, 0.3, 0.4]);

        // stereo
        let planar_stereo = vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2, 0.1]];
        let mut interleaved_stereo = vec![0.0_f32; 8];
        planar_to_interleaved(&planar_stereo, 4, &mut interleaved_stereo);
        assert_eq!(
            interleaved_stereo,
            vec![0.1, 0.4, 0.2, 0.3, 0.3, 0.2, 0.4, 0.1]
        );

        // general, with unused trailing mix frames
        let planar_general = vec![
            vec![0.1, 0.2, 0.3, 0.4],
            vec![0.4, 0.3, 0.2, 0.1],
            vec![0.2, 0.1, 0.4, 0.3],
        ];
        let mut interleaved_general = vec![0.0_f32; 6];
        planar_to_interleaved(&planar_general, 2, &mut interleaved_general);
        assert_eq!(interleaved_general, vec![0.1, 0.4, 0.2, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn output_buffers() {
        let mix = vec![vec![1.0, -1.0, 0.0], vec![0.5, 0.25, 2.0]];

        let mut samples = vec![0_i16; 8];
        let mut interleaved = InterleavedBuffer::new(&mut samples, 2);
        assert_eq!(interleaved.frame_count(), 4);
        interleaved.write_planar(1, &mix, 3);
        assert_eq!(
            samples,
            vec![0, 0, 32767, 16384, -32767, 8192, 0, 32767]
        );

        let mut left = vec![7.0_f32; 3];
        let mut right = vec![7.0_f32; 3];
        let mut channels = [left.as_mut_slice(), right.as_mut_slice()];
        let mut planar = PlanarBuffer::new(&mut channels);
        assert_eq!(planar.channel_count(), 2);
        planar.clear();
        planar.write_planar(0, &mix, 2);
        assert_eq!(left, vec![1.0, -1.0, 0.0]);
        assert_eq!(right, vec![0.5, 0.25, 0.0]);
    }
}
