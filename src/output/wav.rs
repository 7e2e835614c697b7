use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    mixer::{AudioRenderer, GuardedRenderer},
    output::OutputDevice,
    utils::buffer::InterleavedBuffer,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_CHANNEL_COUNT: usize = 2;
const DEFAULT_DURATION: Duration = Duration::from_secs(10);

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Audio output device, which renders audio into a wav file instead of playing it back.
///
/// Rendering runs on a separate thread and as fast as possible, until the given duration got
/// written or the device got closed. Wav file contents are always saved as 32bit floats.
///
/// NOTE: Unlike the realtime output devices, the wav writer device is initially paused, so it
/// must be resumed manually after the renderer got set up.
pub struct WavOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    duration_frames: u64,
    frame_position: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), Error>>>,
}

impl WavOutput {
    /// Open a wav output device to write at the given file using default specs.
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, Error> {
        Self::open_with_specs(
            file_path,
            DEFAULT_SAMPLE_RATE,
            DEFAULT_CHANNEL_COUNT,
            DEFAULT_DURATION,
        )
    }

    /// Create a new wav output device with the given parameters.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: Renderer's and wav file's target sample rate.
    /// * `channel_count`: Renderer's and wav file's channel layout.
    /// * `duration`: Length of the written content.
    pub fn open_with_specs<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
        duration: Duration,
    ) -> Result<Self, Error> {
        if channel_count == 0 {
            return Err(Error::NoOutputChannels);
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(file_path.as_ref(), spec)
            .map_err(|e| Error::OutputDeviceError(Box::new(e)))?;
        log::info!(
            "writing {} channels at {} Hz into '{}'",
            channel_count,
            sample_rate,
            file_path.as_ref().display()
        );
        Ok(Self {
            writer: Some(writer),
            channel_count,
            sample_rate,
            duration_frames: (duration.as_secs_f64() * sample_rate as f64).round() as u64,
            frame_position: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    /// Wait until the renderer thread finished writing and finalized the file.
    pub fn wait(&mut self) -> Result<(), Error> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|payload| {
                Error::OutputDeviceError(
                    format!(
                        "wav writer thread panicked: {}",
                        panic_message::panic_message(&payload)
                    )
                    .into(),
                )
            })?,
            None => Ok(()),
        }
    }
}

impl OutputDevice for WavOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_position(&self) -> u64 {
        self.frame_position.load(Ordering::Relaxed)
    }

    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
            && self.running.load(Ordering::Relaxed)
    }

    fn play<R: AudioRenderer>(&mut self, renderer: R) -> Result<(), Error> {
        let Some(writer) = self.writer.take() else {
            return Err(Error::OutputDeviceError(
                "wav output can only play a single renderer".into(),
            ));
        };
        let mut stream = WavStream {
            writer,
            renderer: GuardedRenderer::new(renderer, "grain renderer"),
            buffer: vec![0.0; BUFFER_SIZE_FRAMES * self.channel_count],
            channel_count: self.channel_count,
            duration_frames: self.duration_frames,
            frame_position: Arc::clone(&self.frame_position),
            running: Arc::clone(&self.running),
            closed: Arc::clone(&self.closed),
        };
        self.thread = Some(
            thread::Builder::new()
                .name("wav_output".to_string())
                .spawn(move || stream.run())?,
        );
        Ok(())
    }

    fn pause(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.running.store(true, Ordering::Relaxed);
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Err(err) = self.wait() {
            log::error!("failed to finish wav output: {}", err);
        }
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

struct WavStream<R: AudioRenderer> {
    writer: WavWriter<BufWriter<File>>,
    renderer: GuardedRenderer<R>,
    buffer: Vec<f32>,
    channel_count: usize,
    duration_frames: u64,
    frame_position: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl<R: AudioRenderer> WavStream<R> {
    fn run(mut self) -> Result<(), Error> {
        let mut position = 0;
        while position < self.duration_frames && !self.closed.load(Ordering::Relaxed) {
            if !self.running.load(Ordering::Relaxed) {
                // sleep for a short time to avoid busy waiting
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let frames = (self.duration_frames - position).min(BUFFER_SIZE_FRAMES as u64) as usize;
            let samples = &mut self.buffer[..frames * self.channel_count];
            self.renderer
                .render(&mut InterleavedBuffer::new(samples, self.channel_count));
            for sample in samples.iter() {
                self.writer.write_sample(*sample)?;
            }
            position += frames as u64;
            self.frame_position.store(position, Ordering::Relaxed);
        }
        self.writer.finalize()?;
        log::info!("wav output finished after {} frames", position);
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mixer::{EngineConfig, GrainMixer},
        source::SourceBuffer,
        state::EngineState,
    };

    #[test]
    fn renders_into_file() {
        let path = std::env::temp_dir().join(format!("grainhop-wav-{}.wav", std::process::id()));
        let mut output =
            WavOutput::open_with_specs(&path, 48000, 4, Duration::from_millis(500)).unwrap();

        let state = EngineState::new_shared();
        state.configure_channels(output.channel_count()).unwrap();
        state.load_sequence("1 2 3 4").unwrap();
        let source = Arc::new(
            SourceBuffer::new(
                vec![(0..48000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect()],
                48000,
            )
            .unwrap(),
        );
        let mixer = GrainMixer::new(
            Arc::clone(&state),
            source,
            output.sample_rate(),
            EngineConfig::default().with_seed(1),
        )
        .unwrap();

        output.play(mixer).unwrap();
        output.resume();
        output.wait().unwrap();
        assert_eq!(output.frame_position(), 24000);
        assert!(!output.is_running());

        let written = SourceBuffer::from_wav_file(&path).unwrap();
        assert_eq!(written.channel_count(), 4);
        assert_eq!(written.frame_count(), 24000);
        assert_eq!(written.sample_rate(), 48000);
        for channel in 0..4 {
            assert!(
                written.channel(channel).iter().any(|s| *s != 0.0),
                "expected grains on channel {}",
                channel + 1
            );
        }
        assert!(state.playback_position() > 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_second_renderer() {
        let path = std::env::temp_dir().join(format!("grainhop-wav2-{}.wav", std::process::id()));
        let mut output =
            WavOutput::open_with_specs(&path, 48000, 1, Duration::from_millis(10)).unwrap();
        let state = EngineState::new_shared();
        state.configure_channels(1).unwrap();
        let source = Arc::new(SourceBuffer::new(vec![vec![0.0; 100]], 48000).unwrap());
        let mixer = || {
            GrainMixer::new(
                Arc::clone(&state),
                Arc::clone(&source),
                48000,
                EngineConfig::default(),
            )
            .unwrap()
        };
        output.play(mixer()).unwrap();
        assert!(output.play(mixer()).is_err());
        output.close();
        let _ = std::fs::remove_file(&path);
    }
}
