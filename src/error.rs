use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainhop.
///
/// Errors are only ever raised at setup time or from the control side. The realtime render
/// path never returns errors: anomalies there degrade to silence instead.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    NoOutputChannels,
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    InvalidSourceError(String),
    SequenceParseError(String),
    ParameterError(String),
    ChannelTestTimeout,
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOutputChannels => write!(f, "Output device has no usable channels"),
            Self::OutputDeviceError(err) | Self::AudioDecodingError(err) => err.fmt(f),
            Self::InvalidSourceError(str) => write!(f, "Invalid source buffer: {str}"),
            Self::SequenceParseError(str) => write!(f, "Invalid sequence: {str}"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::ChannelTestTimeout => write!(f, "Channel test did not finish in time"),
            Self::SendError(str) => write!(f, "Failed to send channel message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Error {
        Error::AudioDecodingError(Box::new(err))
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError(err.to_string())
    }
}
