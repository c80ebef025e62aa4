//! Rule-based event detection from detections, pose and motion

use tracing::{debug, trace};
use vitalwatch_core::{DetectedEvent, EventType, Observation, Posture, VitalWatchConfig};

/// Person box centre above this fraction of the frame height counts as out of bed
const BED_EXIT_CENTER_Y: f64 = 0.4;
/// Hip proxy: previous hip-y must be below this line...
const HIP_PREVIOUS_LOW: f64 = 0.55;
/// ...and the current hip-y above this one
const HIP_CURRENT_HIGH: f64 = 0.5;
const HIP_PROXY_CONFIDENCE: f64 = 0.65;
/// Motion at or below this level counts as still
const STILLNESS_LEVEL: f64 = 0.1;
const IMMOBILITY_CONFIDENCE: f64 = 0.8;

/// Rule thresholds, fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineThresholds {
    pub immobility_seconds: f64,
    pub movement_intensity_threshold: f64,
    pub fall_torso_angle_threshold: f64,
    pub fall_nose_low_threshold: f64,
}

impl Default for EngineThresholds {
    fn default() -> Self {
        Self::from_config(&VitalWatchConfig::default())
    }
}

impl EngineThresholds {
    pub fn from_config(config: &VitalWatchConfig) -> Self {
        Self {
            immobility_seconds: config.immobility_seconds,
            movement_intensity_threshold: config.movement_intensity_threshold,
            fall_torso_angle_threshold: config.fall_torso_angle_threshold,
            fall_nose_low_threshold: config.fall_nose_low_threshold,
        }
    }
}

/// Temporal state carried between frames of one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub last_motion_time: Option<f64>,
    pub last_hip_center_y: Option<f64>,
    pub last_timestamp: Option<f64>,
}

/// Stateful rule evaluator for one monitored source.
///
/// Rules run in a fixed order (fall, bed exit, immobility, abnormal
/// movement); any number may fire on the same observation.
#[derive(Debug, Clone)]
pub struct EventEngine {
    thresholds: EngineThresholds,
    state: EngineState,
}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new(EngineThresholds::default())
    }
}

impl EventEngine {
    pub fn new(thresholds: EngineThresholds) -> Self {
        Self {
            thresholds,
            state: EngineState::default(),
        }
    }

    pub fn thresholds(&self) -> &EngineThresholds {
        &self.thresholds
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Evaluate every rule against one observation.
    ///
    /// Observations older than the last accepted one are ignored and leave
    /// the state untouched.
    /// Whether an observation at `timestamp` would be evaluated
    pub fn accepts(&self, timestamp: f64) -> bool {
        timestamp.is_finite() && self.state.last_timestamp.map_or(true, |last| timestamp >= last)
    }

    pub fn process(&mut self, observation: &Observation) -> Vec<DetectedEvent> {
        let ts = observation.timestamp;
        if !self.accepts(ts) {
            debug!(
                timestamp = ts,
                last = ?self.state.last_timestamp,
                "Dropping invalid or out-of-order observation"
            );
            return Vec::new();
        }
        self.state.last_timestamp = Some(ts);

        let mut events = Vec::new();
        self.detect_fall(observation, &mut events);
        self.detect_bed_exit(observation, &mut events);
        self.detect_immobility(observation, &mut events);
        self.detect_abnormal_movement(observation, &mut events);

        if !events.is_empty() {
            trace!(timestamp = ts, count = events.len(), "Rules fired");
        }
        events
    }

    fn detect_fall(&self, obs: &Observation, events: &mut Vec<DetectedEvent>) {
        let pose = &obs.pose;
        if !pose.has_keypoints() || pose.posture != Posture::Lying {
            return;
        }
        if pose.torso_angle >= self.thresholds.fall_torso_angle_threshold
            || pose.nose_y_normalized >= self.thresholds.fall_nose_low_threshold
        {
            let confidence =
                ((pose.torso_angle / 90.0) * 0.5 + pose.nose_y_normalized * 0.5).clamp(0.0, 1.0);
            events.push(
                DetectedEvent::new(EventType::Fall, confidence, obs.timestamp)
                    .with_metadata("posture", pose.posture.to_string())
                    .with_metadata("torso_angle", pose.torso_angle),
            );
        }
    }

    fn detect_bed_exit(&mut self, obs: &Observation, events: &mut Vec<DetectedEvent>) {
        let has_person = obs.detections.iter().any(|d| d.is_person());
        let has_bed = obs.detections.iter().any(|d| d.is_bed());

        if has_person && has_bed {
            // Without a frame height the boxes cannot be normalised
            if obs.frame_height > 0.0 {
                for person in obs.detections.iter().filter(|d| d.is_person()) {
                    let cy = person.bbox.center_y() / obs.frame_height;
                    if cy < BED_EXIT_CENTER_Y {
                        let confidence = (0.6 + 0.2 * (1.0 - cy)).clamp(0.0, 1.0);
                        events.push(
                            DetectedEvent::new(EventType::BedExit, confidence, obs.timestamp)
                                .with_metadata("person_cy", cy),
                        );
                    }
                }
            }
        } else if has_person {
            if let Some(previous) = self.state.last_hip_center_y {
                let hip_y = obs.pose.hip_center_y;
                if hip_y < HIP_CURRENT_HIGH && previous > HIP_PREVIOUS_LOW {
                    events.push(
                        DetectedEvent::new(EventType::BedExit, HIP_PROXY_CONFIDENCE, obs.timestamp)
                            .with_metadata("hip_y", hip_y),
                    );
                }
            }
        }

        if obs.pose.has_keypoints() {
            self.state.last_hip_center_y = Some(obs.pose.hip_center_y);
        }
    }

    fn detect_immobility(&mut self, obs: &Observation, events: &mut Vec<DetectedEvent>) {
        let ts = obs.timestamp;
        if obs.motion_metric > STILLNESS_LEVEL || obs.pose.movement_intensity > STILLNESS_LEVEL {
            self.state.last_motion_time = Some(ts);
            return;
        }

        if let Some(last_motion) = self.state.last_motion_time {
            let still_for = ts - last_motion;
            if still_for >= self.thresholds.immobility_seconds {
                events.push(
                    DetectedEvent::new(EventType::Immobility, IMMOBILITY_CONFIDENCE, ts)
                        .with_metadata("seconds_without_motion", still_for),
                );
                // One-shot until motion resumes
                self.state.last_motion_time = None;
            }
        }
    }

    fn detect_abnormal_movement(&self, obs: &Observation, events: &mut Vec<DetectedEvent>) {
        let intensity = obs.pose.movement_intensity;
        if intensity >= self.thresholds.movement_intensity_threshold {
            let confidence = intensity.clamp(0.0, 1.0);
            events.push(
                DetectedEvent::new(EventType::AbnormalMovement, confidence, obs.timestamp)
                    .with_metadata("movement_intensity", intensity),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalwatch_core::{BoundingBox, Detection, Keypoint, PoseResult};

    fn pose_with_keypoints() -> PoseResult {
        let mut pose = PoseResult::default();
        pose.keypoints.insert("nose".to_string(), Keypoint::new(0.5, 0.5));
        pose
    }

    fn person(y1: f64, y2: f64) -> Detection {
        Detection::new("person", 0.9, BoundingBox::new(100.0, y1, 200.0, y2))
    }

    fn bed() -> Detection {
        Detection::new("bed", 0.8, BoundingBox::new(50.0, 300.0, 600.0, 480.0))
    }

    fn of_type(events: &[DetectedEvent], ty: EventType) -> Vec<&DetectedEvent> {
        events.iter().filter(|e| e.event_type == ty).collect()
    }

    #[test]
    fn test_fall_confidence() {
        let mut engine = EventEngine::default();
        let mut pose = pose_with_keypoints();
        pose.posture = Posture::Lying;
        pose.torso_angle = 70.0;
        pose.nose_y_normalized = 0.9;

        let events = engine.process(&Observation::new(1.0).with_pose(pose).with_motion(0.5));
        let falls = of_type(&events, EventType::Fall);
        assert_eq!(falls.len(), 1);
        let expected = 70.0 / 90.0 * 0.5 + 0.9 * 0.5;
        assert!((falls[0].confidence - expected).abs() < 1e-9);
        assert!((falls[0].confidence - 0.839).abs() < 1e-3);
        assert_eq!(falls[0].metadata["posture"], "lying");
    }

    #[test]
    fn test_fall_requires_keypoints_and_lying() {
        let mut engine = EventEngine::default();

        let mut no_keypoints = PoseResult::default();
        no_keypoints.posture = Posture::Lying;
        no_keypoints.torso_angle = 90.0;
        let events = engine.process(&Observation::new(1.0).with_pose(no_keypoints));
        assert!(of_type(&events, EventType::Fall).is_empty());

        let mut sitting = pose_with_keypoints();
        sitting.posture = Posture::Sitting;
        sitting.torso_angle = 90.0;
        let events = engine.process(&Observation::new(2.0).with_pose(sitting));
        assert!(of_type(&events, EventType::Fall).is_empty());
    }

    #[test]
    fn test_fall_nose_low_alone_triggers() {
        let mut engine = EventEngine::default();
        let mut pose = pose_with_keypoints();
        pose.posture = Posture::Lying;
        pose.torso_angle = 10.0;
        pose.nose_y_normalized = 0.8;
        let events = engine.process(&Observation::new(1.0).with_pose(pose));
        assert_eq!(of_type(&events, EventType::Fall).len(), 1);
    }

    #[test]
    fn test_fall_confidence_clamped() {
        let mut engine = EventEngine::default();
        let mut pose = pose_with_keypoints();
        pose.posture = Posture::Lying;
        pose.torso_angle = 180.0;
        pose.nose_y_normalized = 1.0;
        let events = engine.process(&Observation::new(1.0).with_pose(pose));
        assert_eq!(of_type(&events, EventType::Fall)[0].confidence, 1.0);
    }

    #[test]
    fn test_bed_exit_bed_aware_per_person() {
        let mut engine = EventEngine::default();
        // Frame height 480: first person centred at 0.25, second at 0.75
        let detections = vec![person(60.0, 180.0), person(300.0, 420.0), bed()];
        let events = engine.process(&Observation::new(1.0).with_detections(detections, 480.0));
        let exits = of_type(&events, EventType::BedExit);
        assert_eq!(exits.len(), 1);
        assert!((exits[0].confidence - (0.6 + 0.2 * 0.75)).abs() < 1e-9);
    }

    #[test]
    fn test_bed_exit_multiple_people_each_fire() {
        let mut engine = EventEngine::default();
        let detections = vec![person(0.0, 100.0), person(20.0, 140.0), bed()];
        let events = engine.process(&Observation::new(1.0).with_detections(detections, 480.0));
        assert_eq!(of_type(&events, EventType::BedExit).len(), 2);
    }

    #[test]
    fn test_bed_exit_confidence_clamped_above_frame() {
        let mut engine = EventEngine::default();
        // Centre at -720 / 480 = -1.5, well above the top edge
        let detections = vec![person(-960.0, -480.0), bed()];
        let events = engine.process(&Observation::new(1.0).with_detections(detections, 480.0));
        let exits = of_type(&events, EventType::BedExit);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].confidence, 1.0);
    }

    #[test]
    fn test_bed_exit_without_frame_height_is_skipped() {
        let mut engine = EventEngine::default();
        let detections = vec![person(0.0, 10.0), bed()];
        let events = engine.process(&Observation::new(1.0).with_detections(detections, 0.0));
        assert!(of_type(&events, EventType::BedExit).is_empty());
    }

    #[test]
    fn test_bed_exit_hip_proxy() {
        let mut engine = EventEngine::default();

        let mut lying = pose_with_keypoints();
        lying.hip_center_y = 0.6;
        let obs = Observation::new(1.0).with_detections(vec![person(200.0, 400.0)], 480.0);
        let events = engine.process(&obs.with_pose(lying));
        assert!(of_type(&events, EventType::BedExit).is_empty());

        let mut up = pose_with_keypoints();
        up.hip_center_y = 0.45;
        let obs = Observation::new(2.0).with_detections(vec![person(200.0, 400.0)], 480.0);
        let events = engine.process(&obs.with_pose(up));
        let exits = of_type(&events, EventType::BedExit);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].confidence, 0.65);
        assert_eq!(engine.state().last_hip_center_y, Some(0.45));
    }

    #[test]
    fn test_hip_proxy_needs_person_and_previous_value() {
        let mut engine = EventEngine::default();
        let mut up = pose_with_keypoints();
        up.hip_center_y = 0.45;
        // No stored previous value yet
        let obs = Observation::new(1.0).with_detections(vec![person(0.0, 50.0)], 480.0);
        let events = engine.process(&obs.with_pose(up.clone()));
        assert!(of_type(&events, EventType::BedExit).is_empty());

        let mut engine = EventEngine::default();
        let mut low = pose_with_keypoints();
        low.hip_center_y = 0.7;
        engine.process(&Observation::new(1.0).with_pose(low));
        // No person detections: rule does not apply
        let events = engine.process(&Observation::new(2.0).with_pose(up));
        assert!(of_type(&events, EventType::BedExit).is_empty());
    }

    #[test]
    fn test_hip_value_kept_when_keypoints_missing() {
        let mut engine = EventEngine::default();
        let mut low = pose_with_keypoints();
        low.hip_center_y = 0.6;
        engine.process(&Observation::new(1.0).with_pose(low));

        // Frame without pose keypoints leaves the stored value alone
        let mut empty = PoseResult::default();
        empty.hip_center_y = 0.1;
        engine.process(&Observation::new(2.0).with_pose(empty));
        assert_eq!(engine.state().last_hip_center_y, Some(0.6));
    }

    #[test]
    fn test_immobility_fires_once_per_still_interval() {
        let mut engine = EventEngine::new(EngineThresholds {
            immobility_seconds: 30.0,
            ..EngineThresholds::default()
        });

        // Motion observed at t=0
        assert!(engine.process(&Observation::new(0.0).with_motion(0.5)).is_empty());

        let mut immobility = 0;
        for t in 1..=90 {
            let events = engine.process(&Observation::new(t as f64));
            immobility += of_type(&events, EventType::Immobility).len();
            if t == 30 {
                let fired = of_type(&events, EventType::Immobility);
                assert_eq!(fired.len(), 1);
                assert_eq!(fired[0].metadata_f64("seconds_without_motion"), Some(30.0));
            }
        }
        assert_eq!(immobility, 1);

        // Motion resumes then stops again: fires once more
        engine.process(&Observation::new(100.0).with_motion(0.3));
        let mut again = 0;
        for t in 101..=140 {
            let events = engine.process(&Observation::new(t as f64));
            again += of_type(&events, EventType::Immobility).len();
        }
        assert_eq!(again, 1);
    }

    #[test]
    fn test_immobility_needs_prior_motion() {
        let mut engine = EventEngine::default();
        for t in 0..100 {
            let events = engine.process(&Observation::new(t as f64));
            assert!(of_type(&events, EventType::Immobility).is_empty());
        }
    }

    #[test]
    fn test_pose_movement_counts_as_motion() {
        let mut engine = EventEngine::default();
        let mut moving = PoseResult::default();
        moving.movement_intensity = 0.2;
        engine.process(&Observation::new(5.0).with_pose(moving));
        assert_eq!(engine.state().last_motion_time, Some(5.0));
    }

    #[test]
    fn test_abnormal_movement() {
        let mut engine = EventEngine::default();
        let mut pose = PoseResult::default();
        pose.movement_intensity = 0.7;
        let events = engine.process(&Observation::new(1.0).with_pose(pose.clone()));
        let abnormal = of_type(&events, EventType::AbnormalMovement);
        assert_eq!(abnormal.len(), 1);
        assert_eq!(abnormal[0].confidence, 0.7);

        pose.movement_intensity = 0.69;
        let events = engine.process(&Observation::new(2.0).with_pose(pose));
        assert!(of_type(&events, EventType::AbnormalMovement).is_empty());
    }

    #[test]
    fn test_rule_order_in_output() {
        let mut engine = EventEngine::default();
        let mut pose = pose_with_keypoints();
        pose.posture = Posture::Lying;
        pose.torso_angle = 80.0;
        pose.movement_intensity = 0.9;
        let detections = vec![person(0.0, 100.0), bed()];
        let obs = Observation::new(1.0).with_detections(detections, 480.0);
        let events = engine.process(&obs.with_pose(pose));
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Fall, EventType::BedExit, EventType::AbnormalMovement]);
    }

    #[test]
    fn test_out_of_order_observation_is_ignored() {
        let mut engine = EventEngine::default();
        engine.process(&Observation::new(10.0).with_motion(0.5));
        let before = engine.state().clone();

        let mut pose = PoseResult::default();
        pose.movement_intensity = 0.95;
        assert!(engine.process(&Observation::new(9.0).with_pose(pose.clone())).is_empty());
        assert_eq!(engine.state(), &before);

        // Equal timestamps are accepted
        assert!(!engine.process(&Observation::new(10.0).with_pose(pose)).is_empty());
    }

    #[test]
    fn test_ignores_unrelated_classes() {
        let mut engine = EventEngine::default();
        let detections = vec![
            Detection::new("chair", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new("tv", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ];
        let events = engine.process(&Observation::new(1.0).with_detections(detections, 480.0));
        assert!(events.is_empty());
    }
}
