//! Per-source monitoring loop: perception → events → cooldown → severity → sinks

use crate::alerts::AlertSink;
use crate::buffer::FrameEntry;
use crate::camera::Frame;
use crate::cooldown::CooldownGate;
use crate::events::{EngineThresholds, EventEngine};
use crate::motion::MotionEstimator;
use crate::perception::{DetectionProvider, NullPerception, PoseProvider};
use crate::severity::SeverityScorer;
use crate::store::EventStore;
use crate::stream::VideoStream;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vitalwatch_core::{
    DetectedEvent, EventRecord, MotionSource, Observation, PoseResult, Result, SeverityLevel,
    SeverityResult, SourceId, VitalWatchConfig,
};

/// Cooperative cancellation flag shared between the caller and the loop.
///
/// Checked once per tick; a tick in progress always completes.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Snapshot of what the loop last saw
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStatus {
    /// Level of the most severe alert raised on the last tick, `Normal` if none
    pub level: SeverityLevel,
    pub score: f64,
    pub last_frame_timestamp: Option<f64>,
    pub frames_processed: u64,
    /// Observations dropped for an invalid or out-of-order timestamp
    pub frames_rejected: u64,
    pub events_detected: u64,
    pub events_suppressed: u64,
    pub alerts_raised: u64,
}

/// State published by the processing loop for the delivery layer.
///
/// Created by the caller and handed to both sides.
#[derive(Debug, Default)]
pub struct SharedState {
    status: RwLock<MonitorStatus>,
    latest_frame: RwLock<Option<FrameEntry>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> MonitorStatus {
        self.status.read().clone()
    }

    /// Copy of the last processed frame
    pub fn latest_frame(&self) -> Option<FrameEntry> {
        self.latest_frame.read().clone()
    }

    fn publish_frame(&self, timestamp: f64, frame: &Frame) {
        *self.latest_frame.write() = Some(FrameEntry {
            timestamp,
            frame: frame.clone(),
        });
    }

    fn update(&self, f: impl FnOnce(&mut MonitorStatus)) {
        f(&mut self.status.write());
    }
}

/// Outcome of one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Every event the rules produced
    pub detected: Vec<DetectedEvent>,
    /// Events that passed the cooldown, with their severity
    pub accepted: Vec<(DetectedEvent, SeverityResult)>,
    pub suppressed: usize,
    /// The observation was dropped before the rules ran
    pub rejected: bool,
}

impl TickReport {
    /// Accepted events whose level is above `Normal`
    pub fn alerts(&self) -> impl Iterator<Item = &(DetectedEvent, SeverityResult)> + '_ {
        self.accepted
            .iter()
            .filter(|(_, s)| s.severity_level != SeverityLevel::Normal)
    }
}

/// Builder for [`MonitorPipeline`]
pub struct MonitorPipelineBuilder {
    source_id: SourceId,
    config: VitalWatchConfig,
    detector: Box<dyn DetectionProvider>,
    pose: Box<dyn PoseProvider>,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    event_stores: Vec<Arc<dyn EventStore>>,
    shared: Option<Arc<SharedState>>,
}

impl MonitorPipelineBuilder {
    pub fn detector(mut self, detector: Box<dyn DetectionProvider>) -> Self {
        self.detector = detector;
        self
    }

    pub fn pose_estimator(mut self, pose: Box<dyn PoseProvider>) -> Self {
        self.pose = pose;
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_stores.push(store);
        self
    }

    pub fn shared_state(mut self, shared: Arc<SharedState>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn build(self) -> Result<MonitorPipeline> {
        self.config.validate()?;

        let motion = match self.config.motion_source {
            MotionSource::FrameDiff => Some(MotionEstimator::default()),
            MotionSource::Pose => None,
        };

        Ok(MonitorPipeline {
            engine: EventEngine::new(EngineThresholds::from_config(&self.config)),
            scorer: SeverityScorer::from_config(&self.config),
            gate: CooldownGate::new(self.config.event_cooldown_seconds),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
            source_id: self.source_id,
            model_version: self.config.model_version,
            detector: self.detector,
            pose: self.pose,
            motion,
            alert_sinks: self.alert_sinks,
            event_stores: self.event_stores,
            shared: self.shared.unwrap_or_default(),
            last_frame_timestamp: None,
        })
    }
}

/// Processing loop for one monitored source.
///
/// Owns the event engine and cooldown state; nothing else mutates them.
pub struct MonitorPipeline {
    source_id: SourceId,
    model_version: String,
    engine: EventEngine,
    scorer: SeverityScorer,
    gate: CooldownGate,
    detector: Box<dyn DetectionProvider>,
    pose: Box<dyn PoseProvider>,
    motion: Option<MotionEstimator>,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    event_stores: Vec<Arc<dyn EventStore>>,
    shared: Arc<SharedState>,
    poll_interval: Duration,
    last_frame_timestamp: Option<f64>,
}

impl MonitorPipeline {
    pub fn builder(source_id: SourceId, config: VitalWatchConfig) -> MonitorPipelineBuilder {
        MonitorPipelineBuilder {
            source_id,
            config,
            detector: Box::new(NullPerception),
            pose: Box::new(NullPerception),
            alert_sinks: Vec::new(),
            event_stores: Vec::new(),
            shared: None,
        }
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    pub fn engine(&self) -> &EventEngine {
        &self.engine
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.gate
    }

    /// Run perception on a frame and process the result
    pub fn process_frame(&mut self, frame: &Frame, timestamp: f64) -> TickReport {
        let started = Instant::now();

        let detections = self.detector.detect(frame).unwrap_or_else(|e| {
            warn!(source = %self.source_id, "Detection failed: {}", e);
            Vec::new()
        });
        let pose = self.pose.estimate(frame).unwrap_or_else(|e| {
            warn!(source = %self.source_id, "Pose estimation failed: {}", e);
            PoseResult::default()
        });
        let motion_metric = match self.motion.as_mut() {
            Some(estimator) => estimator.update(frame),
            None => pose.movement_intensity,
        };

        let observation = Observation {
            detections,
            pose,
            motion_metric,
            timestamp,
            frame_height: frame.height() as f64,
        };

        let report = self.handle(&observation, started);
        self.shared.publish_frame(timestamp, frame);
        report
    }

    /// Process an observation whose perception has already run
    pub fn process_observation(&mut self, observation: &Observation) -> TickReport {
        self.handle(observation, Instant::now())
    }

    fn handle(&mut self, observation: &Observation, started: Instant) -> TickReport {
        if !self.engine.accepts(observation.timestamp) {
            debug!(
                source = %self.source_id,
                timestamp = observation.timestamp,
                "Observation rejected"
            );
            self.shared.update(|status| status.frames_rejected += 1);
            return TickReport {
                rejected: true,
                ..TickReport::default()
            };
        }

        let mut report = TickReport {
            detected: self.engine.process(observation),
            ..TickReport::default()
        };

        let mut tick_level = SeverityLevel::Normal;
        let mut tick_score = 0.0;
        let mut alerts_raised = 0u64;

        for event in &report.detected {
            if !self.gate.admit(event) {
                report.suppressed += 1;
                continue;
            }

            let duration = event.metadata_f64("seconds_without_motion").unwrap_or(0.0);
            let severity = self
                .scorer
                .score(event, observation.pose.movement_intensity, duration);

            if severity.severity_level != SeverityLevel::Normal {
                if severity.severity_level >= tick_level {
                    tick_level = severity.severity_level;
                    tick_score = severity.severity_score;
                }
                alerts_raised += 1;
                self.deliver(&severity, event.timestamp);
            } else {
                debug!(
                    event_type = %event.event_type,
                    score = severity.severity_score,
                    "Event below alert level"
                );
            }

            let inference_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            let record = EventRecord::new(
                &self.source_id,
                event,
                &severity,
                inference_time_ms,
                &self.model_version,
            );
            self.persist(&record);

            report.accepted.push((event.clone(), severity));
        }

        let detected = report.detected.len() as u64;
        let suppressed = report.suppressed as u64;
        self.shared.update(|status| {
            status.level = tick_level;
            status.score = tick_score;
            status.last_frame_timestamp = Some(observation.timestamp);
            status.frames_processed += 1;
            status.events_detected += detected;
            status.events_suppressed += suppressed;
            status.alerts_raised += alerts_raised;
        });

        report
    }

    fn deliver(&self, severity: &SeverityResult, timestamp: f64) {
        for sink in &self.alert_sinks {
            if let Err(e) = sink.emit(severity, timestamp) {
                warn!(
                    source = %self.source_id,
                    event_type = %severity.event_type,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }
    }

    fn persist(&self, record: &EventRecord) {
        for store in &self.event_stores {
            if let Err(e) = store.record(record) {
                warn!(
                    source = %self.source_id,
                    event_type = %record.event_type,
                    error = %e,
                    "Failed to persist event"
                );
            }
        }
    }

    /// Process frames from `stream` until it closes or `stop` is raised.
    ///
    /// The stream is stopped on every exit path.
    pub fn run(&mut self, stream: &mut VideoStream, stop: &StopSignal) -> MonitorStatus {
        let guard = StreamGuard(stream);
        info!(source = %self.source_id, "Monitoring started");

        loop {
            if stop.is_stopped() {
                info!(source = %self.source_id, "Stop requested");
                break;
            }
            let opened = guard.0.is_opened();

            let fresh = guard
                .0
                .latest_timestamp()
                .filter(|ts| Some(*ts) != self.last_frame_timestamp);
            let processed = match fresh.and_then(|_| guard.0.latest()) {
                Some(entry) => {
                    self.last_frame_timestamp = Some(entry.timestamp);
                    self.process_frame(&entry.frame, entry.timestamp);
                    true
                }
                None => false,
            };

            // The final frame of an ended source is still processed
            if !opened {
                info!(source = %self.source_id, "Video stream closed");
                break;
            }
            if !processed {
                std::thread::sleep(self.poll_interval);
            }
        }

        drop(guard);
        let status = self.shared.status();
        info!(
            source = %self.source_id,
            frames = status.frames_processed,
            alerts = status.alerts_raised,
            "Pipeline stopped"
        );
        status
    }
}

struct StreamGuard<'a>(&'a mut VideoStream);

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}
