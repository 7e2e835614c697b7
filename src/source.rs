//! Decoded multichannel source material for the grain engine.

use std::{io, path::Path};

use hound::{SampleFormat, WavReader};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Maximum number of channels a source buffer may contain.
pub const MAX_SOURCE_CHANNELS: usize = 16;

// -------------------------------------------------------------------------------------------------

/// Immutable, decoded multichannel audio, stored as one float array per channel.
///
/// All channels have the same length. The buffer is shared read-only with the render thread.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    channels: Box<[Box<[f32]>]>,
    frame_count: usize,
    sample_rate: u32,
}

impl SourceBuffer {
    /// Create a new source buffer from per-channel sample arrays.
    ///
    /// Fails with [`Error::InvalidSourceError`] when there are no or more than
    /// [`MAX_SOURCE_CHANNELS`] channels, when channel lengths differ, when the buffer is empty
    /// or when the sample rate is zero.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, Error> {
        if channels.is_empty() || channels.len() > MAX_SOURCE_CHANNELS {
            return Err(Error::InvalidSourceError(format!(
                "expected 1 to {} channels, got {}",
                MAX_SOURCE_CHANNELS,
                channels.len()
            )));
        }
        let frame_count = channels[0].len();
        if channels.iter().any(|channel| channel.len() != frame_count) {
            return Err(Error::InvalidSourceError(
                "all channels must have the same length".to_string(),
            ));
        }
        if frame_count == 0 {
            return Err(Error::InvalidSourceError("source is empty".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidSourceError("invalid sample rate".to_string()));
        }
        let channels = channels
            .into_iter()
            .map(Vec::into_boxed_slice)
            .collect::<Box<[_]>>();
        Ok(Self {
            channels,
            frame_count,
            sample_rate,
        })
    }

    /// Create a new source buffer from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        if channel_count == 0 || samples.len() % channel_count != 0 {
            return Err(Error::InvalidSourceError(format!(
                "{} samples can't be split into {} channels",
                samples.len(),
                channel_count
            )));
        }
        let frame_count = samples.len() / channel_count;
        let mut channels = (0..channel_count)
            .map(|_| Vec::with_capacity(frame_count))
            .collect::<Vec<_>>();
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(channels, sample_rate)
    }

    /// Decode a WAV file. Integer formats are normalized to `-1.0..1.0`.
    pub fn from_wav_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = WavReader::open(path.as_ref())?;
        log::info!(
            "loading source '{}': {} channels, {} Hz, {} bit {:?}",
            path.as_ref().display(),
            reader.spec().channels,
            reader.spec().sample_rate,
            reader.spec().bits_per_sample,
            reader.spec().sample_format
        );
        Self::from_wav_reader(reader)
    }

    /// Decode WAV data from an already opened reader.
    pub fn from_wav_reader<R: io::Read>(mut reader: WavReader<R>) -> Result<Self, Error> {
        let spec = reader.spec();
        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
                let scale = 1.0 / (1_i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
            (format, bits) => {
                return Err(Error::AudioDecodingError(
                    format!("unsupported sample format: {bits} bit {format:?}").into(),
                ))
            }
        };
        Self::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames in each channel.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Sample rate of the decoded material.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Access the samples of a single channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Sample at the given frame, reading source channel `channel % channel_count()`.
    /// Frames past the end read as silence.
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        let channel = &self.channels[channel % self.channels.len()];
        channel.get(frame).copied().unwrap_or(0.0)
    }
}

// -------------------------------------------------------------------------------------------------
