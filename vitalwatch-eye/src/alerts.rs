//! Alert delivery: logging, recent-alert history and handler fan-out

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};
use vitalwatch_core::{Result, SeverityResult};

/// Receives accepted, scored alerts. Delivery is fire-and-forget: callers
/// log a returned error and carry on.
pub trait AlertSink: Send + Sync {
    fn emit(&self, severity: &SeverityResult, timestamp: f64) -> Result<()>;
}

/// Serialised alert as handed to downstream channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub event: String,
    pub severity: String,
    /// Rounded to three decimals
    pub score: f64,
    pub time: f64,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl AlertPayload {
    pub fn new(severity: &SeverityResult, timestamp: f64) -> Self {
        Self {
            event: severity.event_type.to_string(),
            severity: severity.severity_level.to_string(),
            score: (severity.severity_score * 1000.0).round() / 1000.0,
            time: timestamp,
            details: None,
        }
    }
}

/// A downstream channel (WebSocket broadcast, pager, sound, ...)
pub trait AlertHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, payload: &AlertPayload) -> Result<()>;
}

const DEFAULT_HISTORY: usize = 100;

/// Central alerting: logs each alert, keeps the most recent ones and
/// forwards them to every registered handler.
pub struct AlertManager {
    console: bool,
    history: RwLock<VecDeque<AlertPayload>>,
    max_stored: usize,
    handlers: Vec<Box<dyn AlertHandler>>,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AlertManager {
    pub fn new(console: bool) -> Self {
        Self {
            console,
            history: RwLock::new(VecDeque::with_capacity(DEFAULT_HISTORY)),
            max_stored: DEFAULT_HISTORY,
            handlers: Vec::new(),
        }
    }

    pub fn with_history(mut self, max_stored: usize) -> Self {
        self.max_stored = max_stored.max(1);
        self
    }

    /// Add an alert handler
    pub fn add_handler(&mut self, handler: Box<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    /// Most recent alerts, newest last
    pub fn recent(&self, limit: usize) -> Vec<AlertPayload> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }
}

impl AlertSink for AlertManager {
    fn emit(&self, severity: &SeverityResult, timestamp: f64) -> Result<()> {
        let payload = AlertPayload::new(severity, timestamp);

        {
            let mut history = self.history.write();
            history.push_back(payload.clone());
            while history.len() > self.max_stored {
                history.pop_front();
            }
        }

        warn!(
            event = %payload.event,
            severity = %payload.severity,
            score = payload.score,
            time = payload.time,
            "Alert raised"
        );
        if self.console {
            info!(
                "[{}] {} (score={}) at {}",
                payload.severity, payload.event, payload.score, payload.time
            );
        }

        for handler in &self.handlers {
            if let Err(e) = handler.handle(&payload) {
                warn!(
                    handler = %handler.name(),
                    error = %e,
                    "Handler failed to process alert"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use vitalwatch_core::{Error, EventType, SeverityLevel};

    fn result(level: SeverityLevel, score: f64) -> SeverityResult {
        SeverityResult {
            severity_score: score,
            severity_level: level,
            event_type: EventType::Fall,
            confidence: 0.9,
        }
    }

    struct Recording {
        seen: Arc<Mutex<Vec<AlertPayload>>>,
    }

    impl AlertHandler for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn handle(&self, payload: &AlertPayload) -> Result<()> {
            self.seen.lock().push(payload.clone());
            Ok(())
        }
    }

    struct Failing;

    impl AlertHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn handle(&self, _payload: &AlertPayload) -> Result<()> {
            Err(Error::Delivery("socket closed".to_string()))
        }
    }

    #[test]
    fn test_payload_rounding() {
        let payload = AlertPayload::new(&result(SeverityLevel::Critical, 0.83888), 12.0);
        assert_eq!(payload.score, 0.839);
        assert_eq!(payload.event, "fall");
        assert_eq!(payload.severity, "Critical");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "fall");
    }

    #[test]
    fn test_history_bounded_newest_last() {
        let manager = AlertManager::new(false).with_history(3);
        for i in 0..5 {
            manager.emit(&result(SeverityLevel::Warning, 0.5), i as f64).unwrap();
        }
        assert_eq!(manager.len(), 3);
        let times: Vec<f64> = manager.recent(10).iter().map(|p| p.time).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0]);
        let times: Vec<f64> = manager.recent(2).iter().map(|p| p.time).collect();
        assert_eq!(times, vec![3.0, 4.0]);
    }

    #[test]
    fn test_handler_failure_does_not_stop_fanout() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut manager = AlertManager::new(false);
        manager.add_handler(Box::new(Failing));
        manager.add_handler(Box::new(Recording { seen: seen.clone() }));

        assert!(manager.emit(&result(SeverityLevel::Critical, 0.9), 1.0).is_ok());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(manager.recent(1)[0].severity, "Critical");
    }
}
