use thiserror::Error;

use crate::processing::channel::ChannelKind;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("sample rate must be greater than zero (channel {channel})")]
    InvalidSampleRate { channel: ChannelKind },
    #[error("invalid channel {channel}: {reason}")]
    InvalidChannel { channel: ChannelKind, reason: String },
    #[error("station {station}: channel mismatch: {reason}")]
    ChannelMismatch { station: String, reason: String },
    #[error("calibration failed for channel {channel} (instrument {instrument}): {reason}")]
    Calibration {
        channel: ChannelKind,
        instrument: String,
        reason: String,
    },
    #[error("station {station}: channel time spans do not overlap")]
    NoOverlap { station: String },
    #[error(
        "station {station}: channel {channel} at {rate_hz} Hz is not an integer multiple of {target_hz} Hz"
    )]
    UnsupportedRate {
        station: String,
        channel: ChannelKind,
        rate_hz: f64,
        target_hz: f64,
    },
    #[error(
        "station {station}: channel {channel} is offset by {offset_samples:.3} samples from the common grid"
    )]
    ClockOffset {
        station: String,
        channel: ChannelKind,
        offset_samples: f64,
    },
    #[error("station {station}: orientation error: {reason}")]
    Orientation { station: String, reason: String },
    #[error("station {station}, day {day}: header field `{field}` mismatch: expected {expected}, got {actual}")]
    HeaderMismatch {
        station: String,
        day: String,
        field: String,
        expected: String,
        actual: String,
    },
    #[error("station {station}: malformed estimate at {frequency_hz} Hz: {reason}")]
    MalformedEstimate {
        station: String,
        frequency_hz: f64,
        reason: String,
    },
    #[error("station {station}: frequency {frequency_hz} Hz appears in more than one file")]
    FrequencyCollision { station: String, frequency_hz: f64 },
    #[error("station {station}: invalid transfer function: {reason}")]
    InvalidTransferFunction { station: String, reason: String },
    #[error("cannot combine transfer functions of stations {expected} and {actual}")]
    StationMismatch { expected: String, actual: String },
    #[error("station {station}: estimator invocation failed: {reason}")]
    EstimatorInvocation { station: String, reason: String },
    #[error("parse error at line {line}: {reason}")]
    Format { line: usize, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    /// Contract violations by the caller. These abort the unit of work instead
    /// of being reported per item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProcessingError::HeaderMismatch { .. }
                | ProcessingError::UnsupportedRate { .. }
                | ProcessingError::ClockOffset { .. }
        )
    }
}

impl From<serde_json::Error> for ProcessingError {
    fn from(value: serde_json::Error) -> Self {
        ProcessingError::Config(value.to_string())
    }
}
