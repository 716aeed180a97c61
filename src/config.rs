//! Capture session configuration

use crate::error::CaptureError;

/// Capture session configuration
///
/// Channel count and block size are fixed for the lifetime of one session;
/// the raw staging buffer is sized from them when streaming starts.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Number of Rx channels: 1 (SISO) or 2 (MIMO interleaved)
    pub num_channels: usize,

    /// Complex samples per channel per read cycle
    pub block_samples: usize,

    /// Default depth of per-channel consumer queues created by `bounded_queue`
    pub queue_depth: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            num_channels: 1,
            block_samples: 8192,  // one sync read per cycle
            queue_depth: 64,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            num_channels: std::env::var("CAPTURE_CHANNELS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.num_channels),

            block_samples: std::env::var("CAPTURE_BLOCK_SAMPLES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.block_samples),

            queue_depth: std::env::var("CAPTURE_QUEUE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.queue_depth),
        }
    }

    /// Validate the configuration at session open
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.num_channels != 1 && self.num_channels != 2 {
            return Err(CaptureError::InvalidConfig(format!(
                "num_channels must be 1 or 2, got {}",
                self.num_channels
            )));
        }
        if self.block_samples == 0 {
            return Err(CaptureError::InvalidConfig(
                "block_samples must be non-zero".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(CaptureError::InvalidConfig(
                "queue_depth must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_channel_count() {
        let cfg = CaptureConfig {
            num_channels: 3,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_block() {
        let cfg = CaptureConfig {
            block_samples: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
