//! Severity scoring for detected events

use vitalwatch_core::{DetectedEvent, SeverityLevel, SeverityResult, VitalWatchConfig};

const CONFIDENCE_WEIGHT: f64 = 0.6;
const MOVEMENT_WEIGHT: f64 = 0.2;
const DURATION_WEIGHT: f64 = 0.2;
/// Duration at which the duration factor saturates
const DURATION_SATURATION_SECONDS: f64 = 60.0;

/// Converts an event into a graded score and level.
///
/// `score = confidence*0.6 + movement*0.2 + min(duration/60, 1)*0.2`, clamped
/// to 0..1. Level thresholds are inclusive at the lower bound of each tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityScorer {
    warning_threshold: f64,
    critical_threshold: f64,
}

impl Default for SeverityScorer {
    fn default() -> Self {
        Self::new(0.4, 0.7)
    }
}

impl SeverityScorer {
    pub fn new(warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            warning_threshold,
            critical_threshold,
        }
    }

    pub fn from_config(config: &VitalWatchConfig) -> Self {
        Self::new(config.warning_threshold, config.critical_threshold)
    }

    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    pub fn critical_threshold(&self) -> f64 {
        self.critical_threshold
    }

    /// `duration_seconds` is how long the condition has held (e.g. time without motion)
    pub fn score(
        &self,
        event: &DetectedEvent,
        movement_intensity: f64,
        duration_seconds: f64,
    ) -> SeverityResult {
        let duration_factor = (duration_seconds / DURATION_SATURATION_SECONDS).clamp(0.0, 1.0);
        let raw = event.confidence * CONFIDENCE_WEIGHT
            + movement_intensity * MOVEMENT_WEIGHT
            + duration_factor * DURATION_WEIGHT;
        // NaN inputs degrade to the lowest score
        let severity_score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

        SeverityResult {
            severity_score,
            severity_level: self.classify(severity_score),
            event_type: event.event_type,
            confidence: event.confidence,
        }
    }

    pub fn classify(&self, score: f64) -> SeverityLevel {
        if score >= self.critical_threshold {
            SeverityLevel::Critical
        } else if score >= self.warning_threshold {
            SeverityLevel::Warning
        } else {
            SeverityLevel::Normal
        }
    }
}
