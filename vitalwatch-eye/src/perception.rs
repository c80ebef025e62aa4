//! Perception collaborators: object detection and pose estimation

use crate::camera::Frame;
use std::io::BufRead;
use vitalwatch_core::{Detection, Error, Observation, PoseResult, Result};

/// Object detector. Only `person` and `bed` classes are interpreted downstream.
pub trait DetectionProvider: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Pose estimator producing one [`PoseResult`] per frame
pub trait PoseProvider: Send {
    fn estimate(&mut self, frame: &Frame) -> Result<PoseResult>;
}

/// Stand-in used when no models are loaded: nothing detected, default pose
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPerception;

impl DetectionProvider for NullPerception {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

impl PoseProvider for NullPerception {
    fn estimate(&mut self, _frame: &Frame) -> Result<PoseResult> {
        Ok(PoseResult::default())
    }
}

/// Read recorded observations, one JSON object per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn read_observations<R: BufRead>(reader: R) -> Result<Vec<Observation>> {
    let mut observations = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let observation: Observation = serde_json::from_str(trimmed)
            .map_err(|e| Error::Perception(format!("line {}: {}", index + 1, e)))?;
        observations.push(observation);
    }
    Ok(observations)
}
