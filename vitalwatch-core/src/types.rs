use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Identifier of a monitored video source.
///
/// Passed unexamined to the capture layer; only the CLI parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Local capture device index (0, 1, 2, ...)
    Device(u32),
    /// Network stream such as `rtsp://...`
    Url(String),
    /// Recorded video file
    File(PathBuf),
}

impl FromStr for SourceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse::<u32>() {
                return Ok(SourceId::Device(index));
            }
        }
        if s.contains("://") {
            Ok(SourceId::Url(s.to_string()))
        } else {
            Ok(SourceId::File(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "{}", index),
            SourceId::Url(url) => write!(f, "{}", url),
            SourceId::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center_x(&self) -> f64 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.y1 + self.y2) / 2.0
    }
}

pub const PERSON_CLASS: &str = "person";
pub const BED_CLASS: &str = "bed";

/// A single object detection supplied by the detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_name == PERSON_CLASS
    }

    pub fn is_bed(&self) -> bool {
        self.class_name == BED_CLASS
    }
}

/// Image-space keypoint, `z` present only for 3D pose models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

/// Coarse body orientation derived from keypoint geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Standing,
    Sitting,
    Lying,
    #[default]
    Unknown,
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Posture::Standing => write!(f, "standing"),
            Posture::Sitting => write!(f, "sitting"),
            Posture::Lying => write!(f, "lying"),
            Posture::Unknown => write!(f, "unknown"),
        }
    }
}

/// Pose keypoints and derived metrics for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseResult {
    pub keypoints: HashMap<String, Keypoint>,
    pub visibility: HashMap<String, f64>,
    pub posture: Posture,
    /// Torso angle from vertical, in degrees
    pub torso_angle: f64,
    /// 0 = still, 1 = maximal movement
    pub movement_intensity: f64,
    /// 0 = top of frame, 1 = bottom
    pub nose_y_normalized: f64,
    pub hip_center_y: f64,
}

impl Default for PoseResult {
    fn default() -> Self {
        Self {
            keypoints: HashMap::new(),
            visibility: HashMap::new(),
            posture: Posture::Unknown,
            torso_angle: 0.0,
            movement_intensity: 0.0,
            nose_y_normalized: 0.5,
            hip_center_y: 0.5,
        }
    }
}

impl PoseResult {
    pub fn has_keypoints(&self) -> bool {
        !self.keypoints.is_empty()
    }
}

/// Semantic event kinds produced by the event engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Fall,
    BedExit,
    Immobility,
    AbnormalMovement,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Fall,
        EventType::BedExit,
        EventType::Immobility,
        EventType::AbnormalMovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Fall => "fall",
            EventType::BedExit => "bed_exit",
            EventType::Immobility => "immobility",
            EventType::AbnormalMovement => "abnormal_movement",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event produced by one rule firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub event_type: EventType,
    pub confidence: f64,
    pub timestamp: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DetectedEvent {
    pub fn new(event_type: EventType, confidence: f64, timestamp: f64) -> Self {
        Self {
            event_type,
            confidence,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Numeric metadata value, if present.
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }
}

/// Three-tier ordinal severity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum SeverityLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Normal => "Normal",
            SeverityLevel::Warning => "Warning",
            SeverityLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityResult {
    pub severity_score: f64,
    pub severity_level: SeverityLevel,
    pub event_type: EventType,
    pub confidence: f64,
}

/// Perception input for one processing tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub pose: PoseResult,
    #[serde(default)]
    pub motion_metric: f64,
    pub timestamp: f64,
    /// Frame height in pixels, used to normalise detection boxes.
    #[serde(default)]
    pub frame_height: f64,
}

impl Observation {
    pub fn new(timestamp: f64) -> Self {
        Self {
            detections: Vec::new(),
            pose: PoseResult::default(),
            motion_metric: 0.0,
            timestamp,
            frame_height: 0.0,
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>, frame_height: f64) -> Self {
        self.detections = detections;
        self.frame_height = frame_height;
        self
    }

    pub fn with_pose(mut self, pose: PoseResult) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_motion(mut self, motion_metric: f64) -> Self {
        self.motion_metric = motion_metric;
        self
    }
}

/// Finalised event row handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: uuid::Uuid,
    pub source_id: String,
    pub event_type: EventType,
    pub confidence: f64,
    pub severity_score: f64,
    pub severity_level: SeverityLevel,
    pub timestamp: f64,
    pub inference_time_ms: f64,
    pub model_version: String,
}

impl EventRecord {
    pub fn new(
        source_id: &SourceId,
        event: &DetectedEvent,
        severity: &SeverityResult,
        inference_time_ms: f64,
        model_version: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            source_id: source_id.to_string(),
            event_type: event.event_type,
            confidence: event.confidence,
            severity_score: severity.severity_score,
            severity_level: severity.severity_level,
            timestamp: event.timestamp,
            inference_time_ms,
            model_version: model_version.to_string(),
        }
    }
}
