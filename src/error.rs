//! Error types for the capture pipeline

use thiserror::Error;

use crate::dsp::MAX_LOG2_DECIMATION;

/// Errors surfaced by the capture lifecycle and channel configuration
#[derive(Debug, Error)]
pub enum CaptureError {
    /// start_work() was called while the capture loop is active
    #[error("capture is already running")]
    AlreadyRunning,

    /// The driver refused to activate the stream; no loop was launched
    #[error("device failed to start: {0}")]
    DeviceStart(String),

    /// Requested decimation exceeds the cascade depth the engine supports
    #[error("unsupported decimation 2^{requested} (max 2^{max})")]
    UnsupportedDecimation { requested: u32, max: u32 },

    /// Channel index outside the session's channel count
    #[error("channel {channel} out of range (session has {count} channel(s))")]
    InvalidChannel { channel: usize, count: usize },

    /// Rejected configuration at session open
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CaptureError {
    pub(crate) fn unsupported_decimation(requested: u32) -> Self {
        Self::UnsupportedDecimation {
            requested,
            max: MAX_LOG2_DECIMATION,
        }
    }
}

/// Errors reported by the driver's blocking read
///
/// Transient errors (timeout, momentary overrun) are logged and the read
/// cycle retried. Fatal errors (device unplugged, stream dead) terminate
/// the capture loop for all channels at once.
#[derive(Debug, Error)]
pub enum DeviceReadError {
    #[error("transient read error: {0}")]
    Transient(String),

    #[error("fatal read error: {0}")]
    Fatal(String),
}

impl DeviceReadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
