//! Errors for configuration and control operations.
//!
//! Nothing on the render path returns these. They come back from the
//! configuration entry points (`HarmonizerConfig::validate`, `Harmonizer::new`,
//! `Harmonizer::prepare`, `Harmonizer::apply`) and from the command sender
//! before a command is queued.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("block size must be at least 1, got {0}")]
    InvalidBlockSize(usize),

    #[error("voice count {requested} is outside 1..={max}")]
    InvalidVoiceCount { requested: usize, max: usize },

    #[error("pitch detection range {min_hz} Hz - {max_hz} Hz is invalid")]
    InvalidHzRange { min_hz: f32, max_hz: f32 },

    #[error("concert pitch must be positive and finite, got {0} Hz")]
    InvalidConcertPitch(f32),

    /// A scalar parameter outside its legal range.
    #[error("{name} = {value} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// The change would need buffers larger than the ones sized at prepare.
    #[error("{what} needs {required} samples but only {prepared} were prepared")]
    ExceedsPreparedCapacity {
        what: &'static str,
        required: usize,
        prepared: usize,
    },

    #[error("command queue is full")]
    QueueFull,
}

impl ConfigError {
    pub(crate) fn out_of_range(name: &'static str, value: f32, min: f32, max: f32) -> Self {
        ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }
}

/// Checks `min <= value <= max` (and finiteness) for a named parameter.
pub(crate) fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(name, value, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_rejects_nan_and_bounds() {
        assert!(check_range("gain", 0.5, 0.0, 1.0).is_ok());
        assert!(check_range("gain", 1.0, 0.0, 1.0).is_ok());
        assert!(check_range("gain", 1.01, 0.0, 1.0).is_err());
        assert!(check_range("gain", f32::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn messages_name_the_parameter() {
        let err = ConfigError::out_of_range("stereo width", 120.0, 0.0, 100.0);
        assert_eq!(err.to_string(), "stereo width = 120 is outside 0..=100");
    }
}
