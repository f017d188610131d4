use thiserror::Error;

/// Failure reported by the platform capture layer (device, session or output).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("No cameras available")]
    NoCamerasAvailable,
    #[error("Capture session is missing or not running")]
    CaptureSessionIsMissing,
    #[error("Camera inputs are invalid")]
    InputsAreInvalid,
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Capture session is already running")]
    CaptureSessionAlreadyRunning,
    #[error("Unknown capture error")]
    Unknown,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl CameraError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        CameraError::InvalidOperation(message.into())
    }

    /// Stable kind name, used for logs and the CLI's JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::NoCamerasAvailable => "NoCamerasAvailable",
            CameraError::CaptureSessionIsMissing => "CaptureSessionIsMissing",
            CameraError::InputsAreInvalid => "InputsAreInvalid",
            CameraError::InvalidOperation(_) => "InvalidOperation",
            CameraError::CaptureSessionAlreadyRunning => "CaptureSessionAlreadyRunning",
            CameraError::Unknown => "Unknown",
            CameraError::Config(_) => "Config",
            CameraError::Backend(_) => "Backend",
        }
    }
}
