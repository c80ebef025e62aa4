//! Scripted capture backend shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vitalwatch_core::{Error, Result, SourceId};
use vitalwatch_eye::{CaptureBackend, Frame, FrameSource};

/// Emits `frames` solid frames, one every `interval`, then ends
#[derive(Clone)]
pub struct ScriptedBackend {
    pub frames: usize,
    pub interval: Duration,
    pub fps: Option<f64>,
    pub fail_open: bool,
    pub releases: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(frames: usize, interval: Duration) -> Self {
        Self {
            frames,
            interval,
            fps: Some(10.0),
            fail_open: false,
            releases: Arc::new(AtomicUsize::new(0)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(0, Duration::ZERO)
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(Error::Capture(format!("no such device: {}", source)));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            remaining: self.frames,
            emitted: 0,
            interval: self.interval,
            fps: self.fps,
            released: false,
            releases: self.releases.clone(),
        }))
    }
}

struct ScriptedSource {
    remaining: usize,
    emitted: u8,
    interval: Duration,
    fps: Option<f64>,
    released: bool,
    releases: Arc<AtomicUsize>,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        self.remaining -= 1;
        self.emitted = self.emitted.wrapping_add(1);
        Ok(Some(Frame::from_pixel(32, 24, image::Rgb([self.emitted; 3]))))
    }

    fn is_healthy(&self) -> bool {
        !self.released
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn release(&mut self) {
        self.released = true;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn fast_options() -> vitalwatch_eye::StreamOptions {
    vitalwatch_eye::StreamOptions {
        buffer_seconds: 1.0,
        max_buffer_frames: 5,
        warmup: Duration::from_millis(20),
        stop_timeout: Duration::from_secs(2),
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
