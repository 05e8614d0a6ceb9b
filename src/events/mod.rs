// ============================================================================
// Event primitives
// ============================================================================
//
// Subscriber registries shared by models and lists, the notifications a
// model emits, and the bubble-target contract a list implements to observe
// the models it contains.
//
// ============================================================================

use crate::model::Model;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle returned by every `on*`/`after` registration, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered registry of handlers of one shape.
///
/// Handlers are invoked from a snapshot so a handler may subscribe or
/// detach without affecting the delivery in progress.
pub(crate) struct Subscribers<H: ?Sized> {
    entries: Vec<(SubscriptionId, Arc<H>)>,
}

impl<H: ?Sized> Default for Subscribers<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: ?Sized> Subscribers<H> {
    pub(crate) fn subscribe(&mut self, handler: Arc<H>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.entries.push((id, handler));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

// ============================================================================
// MODEL EVENTS
// ============================================================================

/// Notification emitted by a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A non-id attribute changed value.
    Change {
        attribute: String,
        prev: Value,
        new: Value,
    },
    /// The persistent id changed. `Value::Null` stands for "undefined".
    IdChange { prev: Value, new: Value },
    /// The model was destroyed; containing lists drop it.
    Destroy,
    /// Application-defined notification.
    Custom { name: String, payload: Value },
}

impl ModelEvent {
    /// Short event name, e.g. `"change"` or `"idChange"`.
    pub fn name(&self) -> &str {
        match self {
            ModelEvent::Change { .. } => "change",
            ModelEvent::IdChange { .. } => "idChange",
            ModelEvent::Destroy => "destroy",
            ModelEvent::Custom { name, .. } => name,
        }
    }
}

/// Receiver of events bubbled up from a model.
///
/// A model holds only weak references to its targets; it never keeps a
/// containing list alive.
pub trait BubbleTarget: Send + Sync {
    fn receive(&self, source: &Arc<Model>, event: &ModelEvent);
}

/// One entry in a model's target list.
///
/// Registering the same target twice bumps `count` instead of adding a
/// second entry, so the target still sees each event once and must be
/// removed twice.
pub(crate) struct TargetRegistration {
    target: Weak<dyn BubbleTarget>,
    count: usize,
}

pub(crate) fn same_target(a: &Weak<dyn BubbleTarget>, b: &Weak<dyn BubbleTarget>) -> bool {
    std::ptr::eq(a.as_ptr() as *const (), b.as_ptr() as *const ())
}

impl TargetRegistration {
    pub(crate) fn new(target: Weak<dyn BubbleTarget>) -> Self {
        Self { target, count: 1 }
    }

    pub(crate) fn matches(&self, target: &Weak<dyn BubbleTarget>) -> bool {
        same_target(&self.target, target)
    }

    pub(crate) fn retain(&mut self) {
        self.count += 1;
    }

    /// Returns `true` when the last registration was released.
    pub(crate) fn release(&mut self) -> bool {
        self.count = self.count.saturating_sub(1);
        self.count == 0
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn BubbleTarget>> {
        self.target.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Handler = dyn Fn(u32) -> u32 + Send + Sync;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut subscribers: Subscribers<Handler> = Subscribers::default();
        let first = subscribers.subscribe(Arc::new(|x| x + 1));
        let second = subscribers.subscribe(Arc::new(|x| x * 2));
        assert_ne!(first, second);
        assert_eq!(subscribers.snapshot().len(), 2);

        assert!(subscribers.unsubscribe(first));
        assert!(!subscribers.unsubscribe(first));

        let handlers = subscribers.snapshot();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0](4), 8);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ModelEvent::Destroy.name(), "destroy");
        let event = ModelEvent::IdChange {
            prev: Value::Null,
            new: Value::from(42),
        };
        assert_eq!(event.name(), "idChange");
        let custom = ModelEvent::Custom {
            name: "ping".into(),
            payload: Value::Null,
        };
        assert_eq!(custom.name(), "ping");
    }
}
