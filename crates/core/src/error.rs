use crate::audio::SourceKind;

/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// The platform refused access to a capture device.
    #[error("permission to capture {0} audio was denied")]
    PermissionDenied(SourceKind),
    /// A display capture was granted but carried no audio tracks.
    #[error("capture stream has no audio track; share a tab or screen with audio")]
    NoAudioTrack,
    /// The selected file could not be opened or decoded.
    #[error("unable to decode audio file: {0}")]
    Decode(String),
    /// A newer connect request replaced this one before it resolved.
    #[error("connect request was superseded by a newer one")]
    Superseded,
    /// Live sources cannot be paused.
    #[error("{0} input cannot be paused")]
    PauseUnsupported(SourceKind),
    /// The operation needs an active source connection.
    #[error("no audio source is connected")]
    NotConnected,
    /// The analysis context has not been created or was closed.
    #[error("analysis context is not available")]
    AnalyzerUnavailable,
    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Failure reported by the host audio stack.
    #[error("audio device error: {0}")]
    Device(String),
    /// Free-form error message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around configuration parse errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around transform errors.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns true for failures that leave the previous source untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::NoAudioTrack | Self::Decode(_) | Self::Superseded
        )
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
