// Configuration for the monitoring pipeline

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Where the immobility rule gets its motion metric from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionSource {
    /// Reuse the pose model's movement intensity
    #[default]
    Pose,
    /// Inter-frame pixel difference
    FrameDiff,
}

/// Monitoring configuration. Every key is optional in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalWatchConfig {
    /// Seconds without motion before an immobility event
    pub immobility_seconds: f64,
    pub movement_intensity_threshold: f64,
    /// Degrees from vertical
    pub fall_torso_angle_threshold: f64,
    pub fall_nose_low_threshold: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    /// Minimum spacing between two accepted alerts of the same type
    pub event_cooldown_seconds: f64,
    pub buffer_seconds: f64,
    pub max_buffer_frames: usize,
    pub model_version: String,
    pub motion_source: MotionSource,
    /// Processing loop idle wait when no new frame is available
    pub poll_interval_ms: u64,
    /// Time given to the producer to start filling the buffer
    pub warmup_ms: u64,
    /// Upper bound on waiting for the producer thread at shutdown
    pub stop_timeout_ms: u64,
}

impl Default for VitalWatchConfig {
    fn default() -> Self {
        Self {
            immobility_seconds: 30.0,
            movement_intensity_threshold: 0.7,
            fall_torso_angle_threshold: 55.0,
            fall_nose_low_threshold: 0.8,
            warning_threshold: 0.4,
            critical_threshold: 0.7,
            event_cooldown_seconds: 30.0,
            buffer_seconds: 7.0,
            max_buffer_frames: 210,
            model_version: "v1.0".to_string(),
            motion_source: MotionSource::Pose,
            poll_interval_ms: 50,
            warmup_ms: 200,
            stop_timeout_ms: 2000,
        }
    }
}

impl VitalWatchConfig {
    /// Load configuration from a YAML, TOML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string())),
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string())),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Self::from_str(&content),
        }
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<VitalWatchConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<VitalWatchConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<VitalWatchConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::Parse("Unknown format".to_string()))
    }

    /// Apply `VITALWATCH_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parse(lookup("VITALWATCH_IMMOBILITY_SECONDS")) {
            self.immobility_seconds = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_MOVEMENT_INTENSITY_THRESHOLD")) {
            self.movement_intensity_threshold = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_FALL_TORSO_ANGLE_THRESHOLD")) {
            self.fall_torso_angle_threshold = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_FALL_NOSE_LOW_THRESHOLD")) {
            self.fall_nose_low_threshold = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_WARNING_THRESHOLD")) {
            self.warning_threshold = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_CRITICAL_THRESHOLD")) {
            self.critical_threshold = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_EVENT_COOLDOWN_SECONDS")) {
            self.event_cooldown_seconds = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_BUFFER_SECONDS")) {
            self.buffer_seconds = v;
        }
        if let Some(v) = parse(lookup("VITALWATCH_MAX_BUFFER_FRAMES")) {
            self.max_buffer_frames = v;
        }
        if let Some(v) = lookup("VITALWATCH_MODEL_VERSION") {
            self.model_version = v;
        }
    }

    /// Ring buffer capacity for a source running at `fps`
    pub fn buffer_capacity(&self, fps: f64) -> usize {
        let fps = if fps.is_finite() && fps >= 1.0 { fps } else { 1.0 };
        let by_duration = (self.buffer_seconds * fps).ceil();
        let by_duration = if by_duration.is_finite() && by_duration >= 1.0 {
            by_duration as usize
        } else {
            1
        };
        by_duration.min(self.max_buffer_frames).max(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_interval = [
            ("movement_intensity_threshold", self.movement_intensity_threshold),
            ("fall_nose_low_threshold", self.fall_nose_low_threshold),
            ("warning_threshold", self.warning_threshold),
            ("critical_threshold", self.critical_threshold),
        ];
        for (name, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{} must be within 0..=1, got {}",
                    name, value
                )));
            }
        }

        if self.warning_threshold > self.critical_threshold {
            return Err(ConfigError::Validation(
                "warning_threshold cannot be greater than critical_threshold".to_string(),
            ));
        }

        if !(0.0..=180.0).contains(&self.fall_torso_angle_threshold) {
            return Err(ConfigError::Validation(
                "fall_torso_angle_threshold must be within 0..=180 degrees".to_string(),
            ));
        }

        // Zero cooldown disables deduplication
        if !(self.event_cooldown_seconds.is_finite() && self.event_cooldown_seconds >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "event_cooldown_seconds must be >= 0, got {}",
                self.event_cooldown_seconds
            )));
        }

        let positive = [
            ("immobility_seconds", self.immobility_seconds),
            ("buffer_seconds", self.buffer_seconds),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }

        if self.max_buffer_frames == 0 {
            return Err(ConfigError::Validation(
                "max_buffer_frames must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = VitalWatchConfig::default();
        assert_eq!(config.immobility_seconds, 30.0);
        assert_eq!(config.movement_intensity_threshold, 0.7);
        assert_eq!(config.fall_torso_angle_threshold, 55.0);
        assert_eq!(config.fall_nose_low_threshold, 0.8);
        assert_eq!(config.warning_threshold, 0.4);
        assert_eq!(config.critical_threshold, 0.7);
        assert_eq!(config.event_cooldown_seconds, 30.0);
        assert_eq!(config.max_buffer_frames, 210);
        assert_eq!(config.motion_source, MotionSource::Pose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "immobility_seconds: 45.0\nwarning_threshold: 0.5\n";
        let config = VitalWatchConfig::from_str(yaml).unwrap();
        assert_eq!(config.immobility_seconds, 45.0);
        assert_eq!(config.warning_threshold, 0.5);
        assert_eq!(config.critical_threshold, 0.7);
    }

    #[test]
    fn test_toml_and_json() {
        let toml = "event_cooldown_seconds = 10.0\nmotion_source = \"frame_diff\"\n";
        let toml_cfg = VitalWatchConfig::from_str(toml).unwrap();
        assert_eq!(toml_cfg.event_cooldown_seconds, 10.0);
        assert_eq!(toml_cfg.motion_source, MotionSource::FrameDiff);

        let json_cfg = VitalWatchConfig::from_str(r#"{"max_buffer_frames": 90}"#).unwrap();
        assert_eq!(json_cfg.max_buffer_frames, 90);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "critical_threshold: 0.8").unwrap();
        drop(file);

        let config = VitalWatchConfig::from_file(&path).unwrap();
        assert_eq!(config.critical_threshold, 0.8);
    }

    #[test]
    fn test_from_file_missing() {
        let err = VitalWatchConfig::from_file("definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VITALWATCH_IMMOBILITY_SECONDS", "12"),
            ("VITALWATCH_MAX_BUFFER_FRAMES", "64"),
            ("VITALWATCH_CRITICAL_THRESHOLD", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = VitalWatchConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.immobility_seconds, 12.0);
        assert_eq!(config.max_buffer_frames, 64);
        assert_eq!(config.critical_threshold, 0.7);
    }

    #[test]
    fn test_validation_thresholds() {
        let mut config = VitalWatchConfig::default();
        config.warning_threshold = 0.8;
        assert!(config.validate().is_err());

        let mut config = VitalWatchConfig::default();
        config.movement_intensity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = VitalWatchConfig::default();
        config.fall_torso_angle_threshold = 181.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_durations() {
        let mut config = VitalWatchConfig::default();
        config.event_cooldown_seconds = 0.0;
        assert!(config.validate().is_ok());

        let mut config = VitalWatchConfig::default();
        config.event_cooldown_seconds = -1.0;
        assert!(config.validate().is_err());

        let mut config = VitalWatchConfig::default();
        config.immobility_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = VitalWatchConfig::default();
        config.max_buffer_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_capacity() {
        let config = VitalWatchConfig::default();
        // 7s @ 30fps = 210
        assert_eq!(config.buffer_capacity(30.0), 210);
        // 7s @ 10fps = 70
        assert_eq!(config.buffer_capacity(10.0), 70);
        // 7s @ 60fps would be 420, capped
        assert_eq!(config.buffer_capacity(60.0), 210);
        assert_eq!(config.buffer_capacity(f64::NAN), 7);
    }
}
