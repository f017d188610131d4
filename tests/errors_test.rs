#[cfg(test)]
mod error_tests {
    use snapcam::errors::{BackendError, CameraError};
    use std::error::Error;

    #[test]
    fn test_error_display() {
        assert_eq!(CameraError::NoCamerasAvailable.to_string(), "No cameras available");
        assert_eq!(
            CameraError::invalid_operation("a capture is already in progress").to_string(),
            "Invalid operation: a capture is already in progress"
        );
        assert!(CameraError::CaptureSessionIsMissing
            .to_string()
            .contains("Capture session is missing"));
    }

    #[test]
    fn test_backend_error_converts() {
        let error: CameraError = BackendError::new("lock refused").into();
        assert_eq!(error.kind(), "Backend");
        assert_eq!(error.to_string(), "Backend error: lock refused");
    }

    #[test]
    fn test_kinds_are_stable() {
        let kinds: Vec<&str> = [
            CameraError::NoCamerasAvailable,
            CameraError::CaptureSessionIsMissing,
            CameraError::InputsAreInvalid,
            CameraError::invalid_operation("x"),
            CameraError::CaptureSessionAlreadyRunning,
            CameraError::Unknown,
            CameraError::Config("x".to_string()),
        ]
        .iter()
        .map(|e| e.kind())
        .collect();
        assert_eq!(
            kinds,
            vec![
                "NoCamerasAvailable",
                "CaptureSessionIsMissing",
                "InputsAreInvalid",
                "InvalidOperation",
                "CaptureSessionAlreadyRunning",
                "Unknown",
                "Config",
            ]
        );
    }

    #[test]
    fn test_camera_error_implements_error_trait() {
        let error = CameraError::Unknown;
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_error_clone_and_eq() {
        let error = CameraError::invalid_operation("switch refused");
        assert_eq!(error.clone(), error);
        assert_ne!(error, CameraError::Unknown);
    }
}
