//! Capture handles for webcams, network streams and video files

use crate::error::CaptureError;
use vitalwatch_core::{Result, SourceId};

/// Decoded RGB frame
pub type Frame = image::RgbImage;

/// An open capture handle.
///
/// Owned by one producer thread at a time.
pub trait FrameSource: Send {
    /// Decode the next frame. `Ok(None)` means the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Whether the underlying handle still reports itself open
    fn is_healthy(&self) -> bool;

    /// Native frame rate, if the source reports one
    fn fps(&self) -> Option<f64> {
        None
    }

    /// Close the handle. Called exactly once.
    fn release(&mut self);
}

/// Opens capture handles for a [`SourceId`]
pub trait CaptureBackend: Send + Sync {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>>;
}

/// Backend used when the crate is built without a capture library
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>> {
        Err(CaptureError::Unsupported(format!(
            "cannot open {}; rebuild with the `opencv` feature",
            source
        ))
        .into())
    }
}

/// Best backend compiled into this build
pub fn default_backend() -> Box<dyn CaptureBackend> {
    #[cfg(feature = "opencv")]
    {
        Box::new(opencv_backend::OpenCvBackend)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Box::new(UnavailableBackend)
    }
}

#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvBackend;

#[cfg(feature = "opencv")]
mod opencv_backend {
    use super::{CaptureBackend, Frame, FrameSource};
    use crate::error::CaptureError;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS},
    };
    use tracing::{info, warn};
    use vitalwatch_core::{Result, SourceId};

    /// OpenCV `VideoCapture` backend
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OpenCvBackend;

    impl CaptureBackend for OpenCvBackend {
        fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>> {
            let capture = match source {
                SourceId::Device(index) => VideoCapture::new(*index as i32, CAP_ANY),
                SourceId::Url(url) => VideoCapture::from_file(url, CAP_ANY),
                SourceId::File(path) => VideoCapture::from_file(&path.to_string_lossy(), CAP_ANY),
            }
            .map_err(CaptureError::from)?;

            if !capture.is_opened().map_err(CaptureError::from)? {
                return Err(CaptureError::Open(source.to_string()).into());
            }

            info!(source = %source, "Capture source opened");
            Ok(Box::new(OpenCvSource {
                capture,
                bgr: Mat::default(),
                rgb: Mat::default(),
            }))
        }
    }

    struct OpenCvSource {
        capture: VideoCapture,
        bgr: Mat,
        rgb: Mat,
    }

    impl FrameSource for OpenCvSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            let grabbed = self.capture.read(&mut self.bgr).map_err(CaptureError::from)?;
            if !grabbed || self.bgr.empty() {
                return Ok(None);
            }

            imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)
                .map_err(CaptureError::from)?;

            let width = self.rgb.cols().max(0) as u32;
            let height = self.rgb.rows().max(0) as u32;
            let data = if self.rgb.is_continuous() {
                self.rgb.data_bytes().map_err(CaptureError::from)?.to_vec()
            } else {
                let continuous = self.rgb.try_clone().map_err(CaptureError::from)?;
                continuous.data_bytes().map_err(CaptureError::from)?.to_vec()
            };

            Frame::from_raw(width, height, data).map(Some).ok_or_else(|| {
                let reason = format!("unexpected buffer size for {}x{}", width, height);
                CaptureError::Read(reason).into()
            })
        }

        fn is_healthy(&self) -> bool {
            self.capture.is_opened().unwrap_or(false)
        }

        fn fps(&self) -> Option<f64> {
            self.capture
                .get(CAP_PROP_FPS)
                .ok()
                .filter(|fps| fps.is_finite() && *fps > 0.0)
        }

        fn release(&mut self) {
            if let Err(e) = self.capture.release() {
                warn!("Failed to release capture: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_backend_rejects_open() {
        let backend = UnavailableBackend;
        let err = backend.open(&SourceId::Device(0)).err().expect("open should fail");
        assert!(err.to_string().contains("opencv"));
    }
}
