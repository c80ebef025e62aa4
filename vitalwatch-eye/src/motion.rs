//! Frame-difference motion metric

use crate::camera::Frame;
use image::imageops::{self, FilterType};
use image::GrayImage;

const WORKING_WIDTH: u32 = 64;

/// Scalar 0..1 summary of inter-frame movement.
///
/// Frames are downscaled to a small grayscale thumbnail; the metric is the
/// mean absolute luminance difference to the previous thumbnail, scaled by
/// `gain` and clamped.
pub struct MotionEstimator {
    previous: Option<GrayImage>,
    gain: f64,
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl MotionEstimator {
    pub fn new(gain: f64) -> Self {
        Self {
            previous: None,
            gain: if gain.is_finite() && gain > 0.0 { gain } else { 1.0 },
        }
    }

    /// Motion between `frame` and the previous call's frame.
    ///
    /// The first frame, or a frame whose size differs from the previous one,
    /// yields 0.
    pub fn update(&mut self, frame: &Frame) -> f64 {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            self.previous = None;
            return 0.0;
        }

        let thumb_width = width.min(WORKING_WIDTH);
        let thumb_height = ((height as u64 * thumb_width as u64) / width as u64).max(1) as u32;
        let gray = imageops::grayscale(frame);
        let thumb = if thumb_width == width {
            gray
        } else {
            imageops::resize(&gray, thumb_width, thumb_height, FilterType::Triangle)
        };

        let metric = match &self.previous {
            Some(prev) if prev.dimensions() == thumb.dimensions() => {
                let total: u64 = prev
                    .as_raw()
                    .iter()
                    .zip(thumb.as_raw().iter())
                    .map(|(a, b)| (*a as i16 - *b as i16).unsigned_abs() as u64)
                    .sum();
                let mean = total as f64 / (thumb.as_raw().len() as f64 * 255.0);
                (mean * self.gain).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };

        self.previous = Some(thumb);
        metric
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
