//! Error types for vitalwatch-eye

use thiserror::Error;
use vitalwatch_core::Error as CoreError;

/// Failures raised by the capture layer
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open source {0}")]
    Open(String),

    #[error("Failed to read frame: {0}")]
    Read(String),

    #[error("Capture support not compiled in: {0}")]
    Unsupported(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl From<CaptureError> for CoreError {
    fn from(err: CaptureError) -> Self {
        CoreError::Capture(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CaptureError {
    fn from(err: opencv::Error) -> Self {
        CaptureError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::Open("rtsp://ward/3".to_string());
        assert!(err.to_string().contains("Failed to open"));
        assert!(err.to_string().contains("rtsp://ward/3"));
    }

    #[test]
    fn test_capture_error_to_core_error() {
        let core_err: CoreError = CaptureError::Read("EOF".to_string()).into();
        match core_err {
            CoreError::Capture(msg) => assert!(msg.contains("EOF")),
            _ => panic!("Expected Capture error"),
        }
    }
}
