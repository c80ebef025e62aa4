//! Per-event-type alert rate limiting

use std::collections::HashMap;
use tracing::debug;
use vitalwatch_core::{DetectedEvent, EventType};

/// Suppresses repeats of an event type inside the cooldown window.
///
/// Keyed by event type only: two people falling within one window collapse
/// into a single alert. State is process-local and lost on restart.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown_seconds: f64,
    last_fired: HashMap<EventType, f64>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(30.0)
    }
}

impl CooldownGate {
    pub fn new(cooldown_seconds: f64) -> Self {
        Self {
            cooldown_seconds,
            last_fired: HashMap::with_capacity(EventType::ALL.len()),
        }
    }

    pub fn cooldown_seconds(&self) -> f64 {
        self.cooldown_seconds
    }

    /// Accept the event (recording its time) or suppress it
    pub fn admit(&mut self, event: &DetectedEvent) -> bool {
        if let Some(&last) = self.last_fired.get(&event.event_type) {
            let elapsed = event.timestamp - last;
            if elapsed.is_nan() || elapsed < self.cooldown_seconds {
                debug!(
                    event_type = %event.event_type,
                    elapsed,
                    cooldown = self.cooldown_seconds,
                    "Event suppressed by cooldown"
                );
                return false;
            }
        }
        self.last_fired.insert(event.event_type, event.timestamp);
        true
    }

    pub fn last_fired(&self, event_type: EventType) -> Option<f64> {
        self.last_fired.get(&event_type).copied()
    }

    /// Forget every recorded firing
    pub fn reset(&mut self) {
        self.last_fired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(event_type: EventType, timestamp: f64) -> DetectedEvent {
        DetectedEvent::new(event_type, 0.9, timestamp)
    }

    #[test]
    fn test_cooldown_window() {
        let mut gate = CooldownGate::new(30.0);
        assert!(gate.admit(&at(EventType::Fall, 0.0)));
        assert!(!gate.admit(&at(EventType::Fall, 10.0)));
        assert_eq!(gate.last_fired(EventType::Fall), Some(0.0));
        assert!(gate.admit(&at(EventType::Fall, 31.0)));
        assert_eq!(gate.last_fired(EventType::Fall), Some(31.0));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let mut gate = CooldownGate::new(30.0);
        assert!(gate.admit(&at(EventType::BedExit, 100.0)));
        assert!(gate.admit(&at(EventType::BedExit, 130.0)));
    }

    #[test]
    fn test_types_are_independent() {
        let mut gate = CooldownGate::new(30.0);
        assert!(gate.admit(&at(EventType::Fall, 0.0)));
        assert!(gate.admit(&at(EventType::AbnormalMovement, 1.0)));
        assert!(gate.admit(&at(EventType::Immobility, 2.0)));
        assert!(!gate.admit(&at(EventType::Fall, 3.0)));
    }

    #[test]
    fn test_first_event_accepted_at_time_zero() {
        let mut gate = CooldownGate::default();
        assert!(gate.admit(&at(EventType::Immobility, 0.0)));
    }

    #[test]
    fn test_earlier_timestamp_is_suppressed() {
        let mut gate = CooldownGate::new(30.0);
        assert!(gate.admit(&at(EventType::Fall, 100.0)));
        assert!(!gate.admit(&at(EventType::Fall, 20.0)));
        assert_eq!(gate.last_fired(EventType::Fall), Some(100.0));
    }

    #[test]
    fn test_reset() {
        let mut gate = CooldownGate::new(30.0);
        gate.admit(&at(EventType::Fall, 0.0));
        gate.reset();
        assert!(gate.admit(&at(EventType::Fall, 1.0)));
    }
}
