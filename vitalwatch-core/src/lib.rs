pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use config::{ConfigError, MotionSource, VitalWatchConfig};
pub use types::{
    now_seconds, BoundingBox, DetectedEvent, Detection, EventRecord, EventType, Keypoint,
    Observation, PoseResult, Posture, SeverityLevel, SeverityResult, SourceId,
};
