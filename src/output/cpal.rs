use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    StreamConfig,
};

use crate::{
    error::Error,
    mixer::{AudioRenderer, GuardedRenderer},
    output::{AudioHostId, OutputDevice},
    utils::buffer::{InterleavedBuffer, OutputSample},
};

// -------------------------------------------------------------------------------------------------

const SUPPORTED_SAMPLE_FORMATS: [cpal::SampleFormat; 3] = [
    cpal::SampleFormat::F32,
    cpal::SampleFormat::I32,
    cpal::SampleFormat::I16,
];
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = if cfg!(debug_assertions) {
    cpal::BufferSize::Default
} else {
    cpal::BufferSize::Fixed(1024)
};

// -------------------------------------------------------------------------------------------------

/// Realtime audio output via cpal, using all channels the device provides.
pub struct CpalOutput {
    device: cpal::Device,
    supported: cpal::SupportedStreamConfig,
    stream: Option<cpal::Stream>,
    running: Arc<AtomicBool>,
    frame_position: Arc<AtomicU64>,
}

impl CpalOutput {
    pub fn open() -> Result<Self, Error> {
        Self::open_with_host(AudioHostId::Default)
    }

    pub fn open_with_host(hostid: AudioHostId) -> Result<Self, Error> {
        let host = match hostid {
            AudioHostId::Default => cpal::default_host(),
            #[cfg(target_os = "windows")]
            AudioHostId::Wasapi => cpal::host_from_id(cpal::HostId::Wasapi)
                .map_err(|err| Error::OutputDeviceError(Box::new(err)))?,
            #[cfg(target_os = "linux")]
            AudioHostId::Alsa => cpal::host_from_id(cpal::HostId::Alsa)
                .map_err(|err| Error::OutputDeviceError(Box::new(err)))?,
            #[cfg(target_os = "macos")]
            AudioHostId::CoreAudio => cpal::host_from_id(cpal::HostId::CoreAudio)
                .map_err(|err| Error::OutputDeviceError(Box::new(err)))?,
        };

        // Open the default output device.
        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;

        if let Ok(name) = device.name() {
            log::info!("using audio device: {}", name);
        }

        let supported = Self::preferred_output_config(&device)?;
        if supported.channels() == 0 {
            return Err(Error::NoOutputChannels);
        }
        log::info!(
            "device output: {} channels, {} Hz, {}",
            supported.channels(),
            supported.sample_rate().0,
            supported.sample_format()
        );

        Ok(Self {
            device,
            supported,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            frame_position: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Pick the config with the most channels at the device's default sample rate.
    fn preferred_output_config(
        device: &cpal::Device,
    ) -> Result<cpal::SupportedStreamConfig, Error> {
        let default = device.default_output_config()?;
        let sample_rate = default.sample_rate();
        let mut preferred: Option<cpal::SupportedStreamConfigRange> = None;
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            if !rates.contains(&sample_rate)
                || !SUPPORTED_SAMPLE_FORMATS.contains(&s.sample_format())
            {
                continue;
            }
            let better = match &preferred {
                None => true,
                Some(p) => {
                    s.channels() > p.channels()
                        || (s.channels() == p.channels()
                            && s.sample_format() == cpal::SampleFormat::F32
                            && p.sample_format() != cpal::SampleFormat::F32)
                }
            };
            if better {
                preferred = Some(s);
            }
        }
        match preferred {
            Some(config) if config.channels() >= default.channels() => {
                Ok(config.with_sample_rate(sample_rate))
            }
            _ => Ok(default),
        }
    }

    fn build_stream<T, R>(&self, config: &StreamConfig, renderer: R) -> Result<cpal::Stream, Error>
    where
        T: OutputSample + cpal::SizedSample,
        R: AudioRenderer,
    {
        let channel_count = config.channels as usize;
        let mut renderer = GuardedRenderer::new(renderer, "grain renderer");
        let running = Arc::clone(&self.running);
        let frame_position = Arc::clone(&self.frame_position);
        let stream = self.device.build_output_stream(
            config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    output.fill(T::default());
                    return;
                }
                renderer.render(&mut InterleavedBuffer::new(output, channel_count));
                frame_position.fetch_add((output.len() / channel_count) as u64, Ordering::Relaxed);
            },
            |err| {
                log::error!("audio output error: {}", err);
            },
            None,
        )?;
        Ok(stream)
    }
}

impl OutputDevice for CpalOutput {
    fn channel_count(&self) -> usize {
        self.supported.channels() as usize
    }

    fn sample_rate(&self) -> u32 {
        self.supported.sample_rate().0
    }

    fn frame_position(&self) -> u64 {
        self.frame_position.load(Ordering::Relaxed)
    }

    fn is_running(&self) -> bool {
        self.stream.is_some() && self.running.load(Ordering::Relaxed)
    }

    fn play<R: AudioRenderer>(&mut self, renderer: R) -> Result<(), Error> {
        // drop a previously running stream first
        self.stream = None;
        let config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..self.supported.config()
        };
        log::info!("opening output stream: {:?}", config);
        let stream = match self.supported.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32, R>(&config, renderer)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32, R>(&config, renderer)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16, R>(&config, renderer)?,
            format => {
                return Err(Error::OutputDeviceError(
                    format!("Unsupported output sample format: {format}").into(),
                ))
            }
        };
        self.running.store(true, Ordering::Relaxed);
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(stream) = &self.stream {
            log::debug!("pausing audio output stream");
            self.running.store(false, Ordering::Relaxed);
            if let Err(err) = stream.pause() {
                log::error!("failed to stop stream: {}", err);
            }
        }
    }

    fn resume(&mut self) {
        if let Some(stream) = &self.stream {
            log::debug!("resuming audio output stream");
            self.running.store(true, Ordering::Relaxed);
            if let Err(err) = stream.play() {
                log::error!("failed to start stream: {}", err);
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            log::debug!("closing audio output stream");
            self.running.store(false, Ordering::Relaxed);
            let _ = stream.pause();
        }
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PauseStreamError> for Error {
    fn from(err: cpal::PauseStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}
