//! Per-unit-of-work capture buffer for domain events.
//!
//! Domain logic records events without holding a reference to their eventual
//! storage destination. The transaction manager creates one collector per
//! unit of work and threads it explicitly through the call, so concurrent
//! units of work are isolated by construction rather than by ambient
//! thread-local state.

use crate::event::DomainEvent;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Error raised by the capture buffer's reentrancy guard.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Event collector is already being drained")]
    DrainInProgress,
}

#[derive(Default)]
struct CollectorState {
    events: Vec<Box<dyn DomainEvent>>,
    draining: bool,
}

/// Scope-lived buffer of the events raised during one unit of work.
///
/// Constructing the collector opens the scope; [`drain`](Self::drain) closes
/// it, returning the events in emission order. Once a drain has started the
/// scope is spent: further `record` calls are silent no-ops (this prevents
/// feedback loops where persisting one event raises another into the same
/// flush) and a second `drain` is rejected.
#[derive(Default)]
pub struct DomainEventCollector {
    state: Mutex<CollectorState>,
}

impl DomainEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the active scope; no-op while draining.
    pub fn record(&self, event: Box<dyn DomainEvent>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.draining {
            debug!(
                type_name = event.type_name(),
                "Dropping event recorded during drain"
            );
            return;
        }
        state.events.push(event);
    }

    /// Closes the scope, returning the recorded events in emission order.
    ///
    /// Fails with [`CollectorError::DrainInProgress`] if the scope has
    /// already been drained.
    pub fn drain(&self) -> Result<Vec<Box<dyn DomainEvent>>, CollectorError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.draining {
            return Err(CollectorError::DrainInProgress);
        }
        state.draining = true;
        Ok(std::mem::take(&mut state.events))
    }

    /// Number of events currently buffered.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .draining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SampleEvent;
    use std::sync::Arc;

    #[test]
    fn drain_returns_events_in_emission_order() {
        let collector = DomainEventCollector::new();
        collector.record(Box::new(SampleEvent::named("first")));
        collector.record(Box::new(SampleEvent::named("second")));
        collector.record(Box::new(SampleEvent::named("third")));

        let events = collector.drain().unwrap();
        let names: Vec<_> = events
            .iter()
            .map(|e| format!("{:?}", e))
            .collect();

        assert_eq!(events.len(), 3);
        assert!(names[0].contains("first"));
        assert!(names[1].contains("second"));
        assert!(names[2].contains("third"));
    }

    #[test]
    fn record_after_drain_is_a_silent_noop() {
        let collector = DomainEventCollector::new();
        collector.record(Box::new(SampleEvent::named("kept")));

        let events = collector.drain().unwrap();
        assert_eq!(events.len(), 1);

        collector.record(Box::new(SampleEvent::named("dropped")));
        assert!(collector.is_empty());
    }

    #[test]
    fn second_drain_is_rejected() {
        let collector = DomainEventCollector::new();
        collector.drain().unwrap();

        assert!(matches!(
            collector.drain(),
            Err(CollectorError::DrainInProgress)
        ));
    }

    #[tokio::test]
    async fn concurrent_units_of_work_observe_only_their_own_events() {
        let first = Arc::new(DomainEventCollector::new());
        let second = Arc::new(DomainEventCollector::new());

        let a = {
            let collector = first.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    collector.record(Box::new(SampleEvent::named(&format!("a-{i}"))));
                    tokio::task::yield_now().await;
                }
            })
        };
        let b = {
            let collector = second.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    collector.record(Box::new(SampleEvent::named(&format!("b-{i}"))));
                    tokio::task::yield_now().await;
                }
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        let from_first = first.drain().unwrap();
        let from_second = second.drain().unwrap();

        assert_eq!(from_first.len(), 10);
        assert_eq!(from_second.len(), 10);
        assert!(from_first.iter().all(|e| format!("{:?}", e).contains("a-")));
        assert!(from_second.iter().all(|e| format!("{:?}", e).contains("b-")));
    }
}
