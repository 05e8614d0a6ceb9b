// ============================================================================
// Bubble relay
// ============================================================================
//
// A list registers itself as a bubble target on each member so model
// events surface at list scope. Id changes re-key the persistent-id index
// and destroyed models are removed; every bubbled event is then handed to
// `on_item_event` subscribers.
//
// ============================================================================

use super::dispatch::{ErrorEvent, ErrorSource};
use super::identity::IdChangeOutcome;
use super::{ChangeOptions, ListShared};
use crate::core::ListError;
use crate::events::{BubbleTarget, ModelEvent};
use crate::model::Model;
use log::debug;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// A model event observed at list scope.
#[derive(Debug, Clone)]
pub struct ItemEvent {
    pub model: Arc<Model>,
    pub event: ModelEvent,
}

impl ItemEvent {
    pub fn client_id(&self) -> &str {
        self.model.client_id()
    }

    /// Event name prefixed by the originating model, e.g. `"c4:change"`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.model.client_id(), self.event.name())
    }
}

impl ListShared {
    fn as_target(&self) -> Weak<dyn BubbleTarget> {
        self.weak_self.clone()
    }

    pub(super) fn attach(&self, model: &Arc<Model>) {
        model.add_target(self.as_target());
    }

    /// Drops this list's registration only; other lists keep theirs.
    pub(super) fn detach(&self, model: &Arc<Model>) {
        if !model.remove_target(&self.as_target()) {
            debug!("model '{}' had no registration for this list", model.client_id());
        }
    }

    fn handle_id_change(&self, model: &Arc<Model>, prev: &Value, new: &Value) {
        let outcome = self.write_state().identity.apply_id_change(model, prev, new);
        if let IdChangeOutcome::Conflict(key) = outcome {
            let error = ListError::DuplicateIdentity(key);
            self.report(ErrorEvent::new(error, ErrorSource::IdChange).model(model));
        }
    }

    fn handle_destroy(&self, model: &Arc<Model>) {
        if self.read_state().identity.is_member(model) {
            // Failures are already on the error channel.
            let _ = self.remove_one(model, &ChangeOptions::new());
        }
    }
}

impl BubbleTarget for ListShared {
    fn receive(&self, source: &Arc<Model>, event: &ModelEvent) {
        match event {
            ModelEvent::IdChange { prev, new } => self.handle_id_change(source, prev, new),
            ModelEvent::Destroy => self.handle_destroy(source),
            ModelEvent::Change { .. } | ModelEvent::Custom { .. } => {}
        }

        let item_event = ItemEvent {
            model: Arc::clone(source),
            event: event.clone(),
        };
        let handlers = self.read_subscribers().item.snapshot();
        for handler in handlers {
            handler(&item_event);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{Attributes, ListError, attrs};
    use crate::events::ModelEvent;
    use crate::list::{ChangeKind, ChangeOptions, ErrorSource, ModelList};
    use crate::model::Model;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_id_assignment_updates_index() {
        let list = ModelList::new();
        let model = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();

        model.set("id", "42");
        assert!(Arc::ptr_eq(&list.get_by_id("42").unwrap(), &model));

        model.set("id", 43);
        assert!(list.get_by_id("42").is_none());
        assert!(Arc::ptr_eq(&list.get_by_id(43).unwrap(), &model));

        list.remove(&model, ChangeOptions::new()).unwrap();
        assert!(list.get_by_id(43).is_none());
    }

    #[test]
    fn test_id_change_does_not_move_model() {
        let list = ModelList::with_config(crate::list::ModelListConfig::new().sort_by("id"));
        let a = list.add(Model::new(attrs(json!({"id": 1}))), ChangeOptions::new()).unwrap();
        list.add(Model::new(attrs(json!({"id": 2}))), ChangeOptions::new()).unwrap();

        a.set("id", 3);
        assert_eq!(list.index_of(&a), Some(0));
        assert!(list.get_by_id(1).is_none());
        assert!(list.get_by_id(3).is_some());
    }

    #[test]
    fn test_removed_model_no_longer_updates_index() {
        let list = ModelList::new();
        let model = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();
        list.remove(&model, ChangeOptions::new()).unwrap();

        model.set("id", "late");
        assert!(list.get_by_id("late").is_none());
        assert_eq!(model.target_count(), 0);
    }

    #[test]
    fn test_shared_model_across_lists() {
        let left = ModelList::new();
        let right = ModelList::new();
        let model = Model::new(Attributes::new());
        left.add(&model, ChangeOptions::new()).unwrap();
        right.add(&model, ChangeOptions::new()).unwrap();
        assert_eq!(model.target_count(), 2);

        left.remove(&model, ChangeOptions::new()).unwrap();
        assert_eq!(model.target_count(), 1);

        model.set("id", 7);
        assert!(left.get_by_id(7).is_none());
        assert!(Arc::ptr_eq(&right.get_by_id(7).unwrap(), &model));
    }

    #[test]
    fn test_item_events_bubble_once() {
        let list = ModelList::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        list.on_item_event(move |event| sink.lock().unwrap().push(event.qualified_name()));

        let model = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();
        model.set("title", "x");
        model.fire(ModelEvent::Custom {
            name: "ping".into(),
            payload: Value::Null,
        });

        let expected = vec![
            format!("{}:change", model.client_id()),
            format!("{}:ping", model.client_id()),
        ];
        assert_eq!(*names.lock().unwrap(), expected);
    }

    #[test]
    fn test_conflicting_id_change_is_reported() {
        let list = ModelList::new();
        list.add(Model::new(attrs(json!({"id": 5}))), ChangeOptions::new()).unwrap();
        let mover = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        list.on_error(move |event| sink.lock().unwrap().push((event.src, event.error.clone())));

        mover.set("id", 5);

        assert_eq!(
            errors.lock().unwrap().as_slice(),
            &[(ErrorSource::IdChange, ListError::DuplicateIdentity("5".into()))]
        );
        assert!(!Arc::ptr_eq(&list.get_by_id(5).unwrap(), &mover));
    }

    #[test]
    fn test_rekey_after_conflict_indexes_member() {
        let list = ModelList::new();
        let holder = list.add(Model::new(attrs(json!({"id": 5}))), ChangeOptions::new()).unwrap();
        let mover = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();

        mover.set("id", 5);
        mover.set("id", 6);

        assert!(Arc::ptr_eq(&list.get_by_id(6).unwrap(), &mover));
        assert!(Arc::ptr_eq(&list.get_by_id(5).unwrap(), &holder));
    }

    #[test]
    fn test_released_id_passes_to_conflicted_member() {
        let list = ModelList::new();
        let holder = list.add(Model::new(attrs(json!({"id": 5}))), ChangeOptions::new()).unwrap();
        let mover = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();
        mover.set("id", 5);

        holder.set("id", 7);
        assert!(Arc::ptr_eq(&list.get_by_id(5).unwrap(), &mover));
        assert!(Arc::ptr_eq(&list.get_by_id(7).unwrap(), &holder));

        list.remove(&mover, ChangeOptions::new()).unwrap();
        assert!(list.get_by_id(5).is_none());
    }

    #[tokio::test]
    async fn test_destroyed_model_leaves_list() {
        let list = ModelList::new();
        let removed = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&removed);
        list.after(ChangeKind::Remove, move |_| *counter.lock().unwrap() += 1);

        let model = list.add(Model::new(Attributes::new()), ChangeOptions::new()).unwrap();
        model.destroy(false, &Attributes::new()).await.unwrap();

        assert!(list.is_empty());
        assert_eq!(*removed.lock().unwrap(), 1);
    }

    #[test]
    fn test_dropped_list_releases_models() {
        let model = Model::new(Attributes::new());
        {
            let list = ModelList::new();
            list.add(&model, ChangeOptions::new()).unwrap();
            assert_eq!(model.target_count(), 1);
        }
        assert_eq!(model.target_count(), 0);
        model.set("id", 1);
    }
}
