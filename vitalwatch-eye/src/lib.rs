//! vitalwatch-eye: capture and event pipeline for patient monitoring
//!
//! Pulls frames from a camera, network stream or file into a rolling
//! buffer, turns perception output into semantic events (fall, bed exit,
//! immobility, abnormal movement), scores them and hands the accepted ones
//! to alert and persistence collaborators.

pub mod alerts;
pub mod buffer;
pub mod camera;
pub mod cooldown;
pub mod error;
pub mod events;
pub mod motion;
pub mod perception;
pub mod pipeline;
pub mod severity;
pub mod store;
pub mod stream;

pub use alerts::{AlertHandler, AlertManager, AlertPayload, AlertSink};
pub use buffer::{FrameBuffer, FrameEntry, RingBuffer};
pub use camera::{default_backend, CaptureBackend, Frame, FrameSource, UnavailableBackend};
pub use cooldown::CooldownGate;
pub use error::CaptureError;
pub use events::{EngineState, EngineThresholds, EventEngine};
pub use motion::MotionEstimator;
pub use perception::{read_observations, DetectionProvider, NullPerception, PoseProvider};
pub use pipeline::{
    MonitorPipeline, MonitorPipelineBuilder, MonitorStatus, SharedState, StopSignal, TickReport,
};
pub use severity::SeverityScorer;
pub use store::{EventStore, JsonlEventStore, MemoryEventStore};
pub use stream::{StreamOptions, VideoStream};

#[cfg(feature = "opencv")]
pub use camera::OpenCvBackend;
