use std::f64::consts::TAU;

// -------------------------------------------------------------------------------------------------

/// Timing and tone settings of the channel identification test.
///
/// Every output channel plays a sine burst of `tone_frames` followed by `silence_frames` of
/// silence, one channel after another. Channel `n` plays at `base_frequency + n * frequency_step`
/// so channels are distinguishable by ear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTestSettings {
    pub tone_frames: usize,
    pub silence_frames: usize,
    pub base_frequency: f32,
    pub frequency_step: f32,
    pub gain: f32,
}

impl Default for ChannelTestSettings {
    fn default() -> Self {
        Self {
            tone_frames: 24000,
            silence_frames: 4800,
            base_frequency: 180.0,
            frequency_step: 20.0,
            gain: 0.015,
        }
    }
}

impl ChannelTestSettings {
    pub fn with_tone_frames(mut self, frames: usize) -> Self {
        self.tone_frames = frames;
        self
    }

    pub fn with_silence_frames(mut self, frames: usize) -> Self {
        self.silence_frames = frames;
        self
    }

    pub fn with_frequencies(mut self, base_frequency: f32, frequency_step: f32) -> Self {
        self.base_frequency = base_frequency;
        self.frequency_step = frequency_step;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Total number of frames the test runs for the given number of output channels.
    pub fn duration_frames(&self, channel_count: usize) -> usize {
        (self.tone_frames + self.silence_frames) * channel_count
    }
}

// -------------------------------------------------------------------------------------------------

/// Renders the channel identification test into the mix buffer, overriding its content.
#[derive(Debug, Clone)]
pub(crate) struct ChannelTestGenerator {
    settings: ChannelTestSettings,
    sample_rate: u32,
    active: bool,
    cursor: usize,
    phase: f64,
}

impl ChannelTestGenerator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            settings: ChannelTestSettings::default(),
            sample_rate,
            active: false,
            cursor: 0,
            phase: 0.0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// (Re)start the test from the first channel.
    pub fn start(&mut self, settings: ChannelTestSettings) {
        self.settings = settings;
        self.active = true;
        self.cursor = 0;
        self.phase = 0.0;
    }

    /// Abort a running test. The mix is left untouched from now on.
    pub fn stop(&mut self) {
        self.active = false;
        self.cursor = 0;
    }

    /// Override the first `frame_count` frames of the mix with the test signal.
    /// Returns true when the test finished within this call.
    pub fn process(
        &mut self,
        mix: &mut [Vec<f32>],
        frame_count: usize,
        channel_offset: usize,
    ) -> bool {
        debug_assert!(self.active, "Should only process active tests");
        let channel_count = mix.len();
        let block = self.settings.tone_frames + self.settings.silence_frames;
        for frame in 0..frame_count {
            let position = self.cursor + frame;
            let test_channel = if block > 0 {
                position / block
            } else {
                channel_count
            };
            if test_channel >= channel_count {
                self.active = false;
                self.cursor = 0;
                return true;
            }
            let within = position % block;
            if within == 0 {
                self.phase = 0.0;
            }
            for channel in mix.iter_mut() {
                channel[frame] = 0.0;
            }
            let output_channel = test_channel + channel_offset;
            if within < self.settings.tone_frames && output_channel < channel_count {
                let frequency = self.settings.base_frequency as f64
                    + test_channel as f64 * self.settings.frequency_step as f64;
                mix[output_channel][frame] = self.settings.gain * self.phase.sin() as f32;
                self.phase += TAU * frequency / self.sample_rate.max(1) as f64;
                if self.phase > TAU {
                    self.phase -= TAU;
                }
            }
        }
        self.cursor += frame_count;
        false
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChannelTestSettings {
        ChannelTestSettings::default()
            .with_tone_frames(100)
            .with_silence_frames(20)
            .with_gain(0.5)
    }

    #[test]
    fn plays_one_channel_after_another() {
        let mut generator = ChannelTestGenerator::new(48000);
        generator.start(settings());
        let mut mix = vec![vec![1.0; 360]; 3];
        assert!(!generator.process(&mut mix, 360, 0));
        assert!(generator.is_active());
        for (channel, samples) in mix.iter().enumerate() {
            for (frame, sample) in samples.iter().enumerate() {
                let (test_channel, within) = (frame / 120, frame % 120);
                if channel == test_channel && (1..100).contains(&within) {
                    assert!(*sample != 0.0, "expected tone at {channel}:{frame}");
                    assert!(sample.abs() <= 0.5);
                } else {
                    assert_eq!(*sample, 0.0, "expected silence at {channel}:{frame}");
                }
            }
        }
        // finishes on the next call
        let mut mix = vec![vec![1.0; 16]; 3];
        assert!(generator.process(&mut mix, 16, 0));
        assert!(!generator.is_active());
        // frames after the test are left untouched
        assert_eq!(mix[0][0], 1.0);
    }

    #[test]
    fn channel_offset_shifts_the_tone() {
        let mut generator = ChannelTestGenerator::new(48000);
        generator.start(settings());
        let mut mix = vec![vec![0.0; 120]; 4];
        generator.process(&mut mix, 120, 2);
        assert!(mix[0].iter().all(|s| *s == 0.0));
        assert!(mix[2].iter().any(|s| *s != 0.0));
        // test channels shifted past the last output channel stay silent
        let mut mix = vec![vec![0.0; 240]; 4];
        generator.process(&mut mix, 240, 2);
        assert!(mix[3][120..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn duration() {
        assert_eq!(settings().duration_frames(3), 360);
        assert_eq!(ChannelTestSettings::default().duration_frames(2), 57600);
    }
}
