//! Video stream with a rolling frame buffer filled by a producer thread

use crate::buffer::{FrameBuffer, FrameEntry};
use crate::camera::{CaptureBackend, Frame, FrameSource};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vitalwatch_core::{now_seconds, SourceId, VitalWatchConfig};

const DEFAULT_FPS: f64 = 30.0;

type SharedCapture = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

/// Buffer sizing and lifecycle timing for a [`VideoStream`]
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub buffer_seconds: f64,
    pub max_buffer_frames: usize,
    /// Pause after spawning the producer so the buffer can begin filling
    pub warmup: Duration,
    /// Upper bound on waiting for the producer in [`VideoStream::stop`]
    pub stop_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::from_config(&VitalWatchConfig::default())
    }
}

impl StreamOptions {
    pub fn from_config(config: &VitalWatchConfig) -> Self {
        Self {
            buffer_seconds: config.buffer_seconds,
            max_buffer_frames: config.max_buffer_frames,
            warmup: Duration::from_millis(config.warmup_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }

    fn capacity(&self, fps: f64) -> usize {
        let sizing = VitalWatchConfig {
            buffer_seconds: self.buffer_seconds,
            max_buffer_frames: self.max_buffer_frames,
            ..VitalWatchConfig::default()
        };
        sizing.buffer_capacity(fps)
    }
}

struct Producer {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Unified stream over webcams, network streams and files.
///
/// One producer thread decodes frames into a bounded ring; readers copy
/// frames out at their own cadence. When readers fall behind, the oldest
/// frames are overwritten.
pub struct VideoStream {
    source: SourceId,
    options: StreamOptions,
    buffer: Arc<FrameBuffer>,
    capture: SharedCapture,
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    frame_size: Arc<Mutex<Option<(u32, u32)>>>,
    fps: f64,
    producer: Option<Producer>,
}

impl VideoStream {
    pub fn new(source: SourceId, options: StreamOptions) -> Self {
        let buffer = Arc::new(FrameBuffer::new(options.max_buffer_frames));
        Self {
            source,
            options,
            buffer,
            capture: Arc::new(Mutex::new(None)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            frame_size: Arc::new(Mutex::new(None)),
            fps: DEFAULT_FPS,
            producer: None,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Open the source and start filling the buffer.
    ///
    /// Returns `false` without spawning anything if the source cannot be opened.
    pub fn start(&mut self, backend: &dyn CaptureBackend) -> bool {
        if self.running.load(Ordering::Acquire) {
            return true;
        }
        // Reap a producer that ended on its own before restarting
        if self.producer.is_some() {
            self.stop();
        }

        let source = match backend.open(&self.source) {
            Ok(source) => source,
            Err(e) => {
                error!(source = %self.source, "Could not open video source: {}", e);
                return false;
            }
        };

        let fps = source.fps().unwrap_or(DEFAULT_FPS).max(1.0);
        let buffer = Arc::new(FrameBuffer::new(self.options.capacity(fps)));
        let (done_tx, done_rx) = channel::bounded(1);

        let stop_requested = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let frame_size = Arc::new(Mutex::new(None));

        let capture: SharedCapture = Arc::new(Mutex::new(None));
        let worker = ProducerLoop {
            source: self.source.clone(),
            buffer: buffer.clone(),
            capture: capture.clone(),
            stop_requested: stop_requested.clone(),
            frame_size: frame_size.clone(),
        };
        let exit_guard = ProducerExit {
            running: running.clone(),
            capture: capture.clone(),
            done: done_tx,
        };

        *capture.lock() = Some(source);
        let spawned = std::thread::Builder::new()
            .name(format!("vitalwatch-capture-{}", self.source))
            .spawn(move || {
                let _exit = exit_guard;
                worker.run();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(source = %self.source, "Failed to spawn capture thread: {}", e);
                // The closure (and its exit guard) was dropped, which released the handle
                if let Some(mut source) = capture.lock().take() {
                    source.release();
                }
                return false;
            }
        };

        self.fps = fps;
        self.buffer = buffer;
        self.capture = capture;
        self.stop_requested = stop_requested;
        self.running = running;
        self.frame_size = frame_size;
        self.producer = Some(Producer { handle, done: done_rx });

        info!(
            source = %self.source,
            fps = self.fps,
            capacity = self.buffer.capacity(),
            "Video stream started"
        );

        if !self.options.warmup.is_zero() {
            std::thread::sleep(self.options.warmup);
        }
        true
    }

    /// Latest frame: `(found, frame, timestamp)`
    pub fn read(&self) -> (bool, Option<Frame>, f64) {
        match self.buffer.latest() {
            Some(entry) => (true, Some(entry.frame), entry.timestamp),
            None => (false, None, 0.0),
        }
    }

    /// Latest entry, if any
    pub fn latest(&self) -> Option<FrameEntry> {
        self.buffer.latest()
    }

    /// Timestamp of the latest entry without copying pixels
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.buffer.latest_timestamp()
    }

    /// Copy of the buffered history, oldest-first
    pub fn get_buffer(&self) -> Vec<(f64, Frame)> {
        self.buffer
            .snapshot()
            .into_iter()
            .map(|e| (e.timestamp, e.frame))
            .collect()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Size of the first decoded frame
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        *self.frame_size.lock()
    }

    /// Producer running and capture handle healthy
    pub fn is_opened(&self) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        // A busy lock means the producer is mid-read
        match self.capture.try_lock() {
            Some(guard) => guard.as_ref().map_or(false, |s| s.is_healthy()),
            None => true,
        }
    }

    /// Stop the producer, release the capture handle and clear the buffer.
    ///
    /// Waits at most `stop_timeout` for the producer thread.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);

        if let Some(producer) = self.producer.take() {
            match producer.done.recv_timeout(self.options.stop_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if producer.handle.join().is_err() {
                        warn!(source = %self.source, "Capture thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        source = %self.source,
                        timeout_ms = self.options.stop_timeout.as_millis() as u64,
                        "Capture thread did not exit in time; detaching"
                    );
                }
            }
        }

        match self.capture.try_lock_for(Duration::from_millis(100)) {
            Some(mut guard) => {
                if let Some(mut source) = guard.take() {
                    source.release();
                    debug!(source = %self.source, "Capture released");
                }
            }
            None => warn!(source = %self.source, "Capture busy; producer will release it on exit"),
        }

        self.running.store(false, Ordering::Release);
        // A detached producer keeps writing to the old buffer only
        self.buffer.clear();
        self.buffer = Arc::new(FrameBuffer::new(self.buffer.capacity()));
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        if self.producer.is_some() {
            self.stop();
        }
    }
}

struct ProducerLoop {
    source: SourceId,
    buffer: Arc<FrameBuffer>,
    capture: SharedCapture,
    stop_requested: Arc<AtomicBool>,
    frame_size: Arc<Mutex<Option<(u32, u32)>>>,
}

impl ProducerLoop {
    fn run(self) {
        let mut frames: u64 = 0;
        while !self.stop_requested.load(Ordering::Acquire) {
            let next = {
                let mut guard = self.capture.lock();
                match guard.as_mut() {
                    Some(source) => source.read_frame(),
                    None => break,
                }
            };

            match next {
                Ok(Some(_)) if self.stop_requested.load(Ordering::Acquire) => break,
                Ok(Some(frame)) => {
                    if frames == 0 {
                        *self.frame_size.lock() = Some(frame.dimensions());
                    }
                    self.buffer.push(now_seconds(), frame);
                    frames += 1;
                }
                Ok(None) => {
                    info!(source = %self.source, frames, "Video source ended");
                    break;
                }
                Err(e) => {
                    error!(source = %self.source, frames, "Frame read failed: {}", e);
                    break;
                }
            }
        }
        debug!(source = %self.source, frames, "Capture loop exited");
    }
}

/// Runs on every producer exit path, including panics
struct ProducerExit {
    running: Arc<AtomicBool>,
    capture: SharedCapture,
    done: Sender<()>,
}

impl Drop for ProducerExit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(mut source) = self.capture.lock().take() {
            source.release();
        }
        let _ = self.done.try_send(());
    }
}
