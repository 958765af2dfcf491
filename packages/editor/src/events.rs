//! Editor events
//!
//! Subscribers are plain callbacks invoked synchronously, in subscription
//! order, after the state they describe is in place.

use crate::history::HistoryEntry;
use crate::path::NodePath;
use crate::validation::ValidationWarning;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    ChangeRecorded(HistoryEntry),
    Undo(HistoryEntry),
    Redo(HistoryEntry),
    SelectionChanged(Option<NodePath>),
    Saved { file: String },
    PersistenceFailed { file: String, message: String },
    ValidationWarning(ValidationWarning),
}

impl EditorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EditorEvent::ChangeRecorded(_) => "change:recorded",
            EditorEvent::Undo(_) => "undo",
            EditorEvent::Redo(_) => "redo",
            EditorEvent::SelectionChanged(_) => "selection:changed",
            EditorEvent::Saved { .. } => "persistence:saved",
            EditorEvent::PersistenceFailed { .. } => "persistence:failed",
            EditorEvent::ValidationWarning(_) => "validation:warning",
        }
    }
}

pub type Subscriber = Box<dyn FnMut(&EditorEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EditorEvent) + Send + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn emit(&mut self, event: EditorEvent) {
        tracing::trace!(event = event.name(), "Emitting event");
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = seen.clone();
        bus.subscribe(move |e| a.lock().unwrap().push(format!("a:{}", e.name())));
        let b = seen.clone();
        let id = bus.subscribe(move |e| b.lock().unwrap().push(format!("b:{}", e.name())));

        bus.emit(EditorEvent::SelectionChanged(None));
        assert!(bus.unsubscribe(id));
        bus.emit(EditorEvent::Saved {
            file: "styles.css".to_string(),
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:selection:changed", "b:selection:changed", "a:persistence:saved"]
        );
        assert!(!bus.unsubscribe(id));
    }
}
