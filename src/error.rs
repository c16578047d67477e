use thiserror::Error;

/// PWM bus I/O failure. Retried locally with exponential backoff before
/// being surfaced (see `pwm::bus::PwmBus::write_retrying`).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("pwm bus io error on channel {channel}: {source}")]
    Io {
        channel: u8,
        #[source]
        source: std::io::Error,
    },
    #[error("pwm bus io error: {0}")]
    Transport(#[from] serialport::Error),
}

/// Vision transport failures. Local to the face tracker; counted and
/// degrade to the missing-detection branch rather than stopping the thread.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("vision protocol error: {0}")]
    Protocol(String),
    #[error("vision transport error: {0}")]
    Transport(#[from] serialport::Error),
}

#[derive(Debug, Error)]
pub enum AudioDeviceError {
    #[error("no input device available")]
    NoDevice,
    #[error("unsupported sample rate: {0}")]
    UnsupportedRate(u32),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio device io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Control-flow signal returned by `SpeechEndpoint::record`. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointReason {
    SpeechEnded,
    NoSpeech,
    MaxUtterance,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ExternalServiceFailure {
    #[error("stt service failure: {0}")]
    Stt(String),
    #[error("llm service failure: {0}")]
    Llm(String),
    #[error("tts service failure: {0}")]
    Tts(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("missing required env var: {0}")]
    Missing(String),
    #[error("calibration file error: {0}")]
    Calibration(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
}

#[derive(Debug, Error)]
pub enum ShutdownRequested {
    #[error("shutdown requested by signal {0}")]
    Signal(i32),
}

/// Crate-wide error composing every subsystem's local error kind, for
/// boundaries (e.g. servo registry setup) that can fail in more than one way.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Audio(#[from] AudioDeviceError),
    #[error(transparent)]
    External(#[from] ExternalServiceFailure),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
