//! # Error Module
//!
//! The single error type of the core crate. Numeric code never produces errors
//! (it degrades to sentinels instead); everything here is either a resource
//! acquisition failure at the capture boundary or a configuration problem.

/// Crate-level error type for the tuner core.
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    /// The host has no input device (or none matching the requested name).
    #[error("no input device available{}", .0.as_ref().map(|n| format!(" named `{n}`")).unwrap_or_default())]
    NoInputDevice(Option<String>),

    /// The device exposes no configuration we can capture from.
    #[error("no suitable input format found: {0}")]
    UnsupportedFormat(String),

    /// Enumerating devices failed.
    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    /// Querying the device's default configuration failed.
    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// Querying the device's supported configurations failed.
    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    /// The backend refused to build the input stream.
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The backend refused to start the input stream.
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// Stopping a stream failed during teardown.
    #[error("failed to stop input stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    /// A configuration value is out of range.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidConfig {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Configuration file could not be parsed or written as JSON.
    #[error("configuration JSON error: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    /// File I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for tuner operations.
pub type Result<T> = std::result::Result<T, TunerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            TunerError::NoInputDevice(None).to_string(),
            "no input device available"
        );
        assert_eq!(
            TunerError::NoInputDevice(Some("USB Mic".into())).to_string(),
            "no input device available named `USB Mic`"
        );
        let err = TunerError::InvalidConfig {
            name: "ema_alpha",
            value: "1.5".into(),
            reason: "must be in (0, 1]",
        };
        assert_eq!(
            err.to_string(),
            "invalid parameter `ema_alpha`: got 1.5, must be in (0, 1]"
        );
    }
}
