use crate::core::id_key;
use crate::model::Model;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Client-id and persistent-id indices over the members of one list.
#[derive(Default)]
pub(crate) struct IdentityTracker {
    by_client_id: HashMap<String, Arc<Model>>,
    by_id: HashMap<String, Arc<Model>>,
    /// Keys that some member carries without being indexed under them,
    /// because another member held the key when it was assigned.
    shadowed: HashSet<String>,
}

/// What happened to a persistent-id change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IdChangeOutcome {
    /// Mapping updated (or removed when the new id is undefined).
    Applied,
    /// The event does not concern a member of this list.
    Ignored,
    /// Another member already holds the new id; the mapping was left alone.
    Conflict(String),
}

impl IdentityTracker {
    pub(crate) fn get_by_client_id(&self, client_id: &str) -> Option<Arc<Model>> {
        self.by_client_id.get(client_id).cloned()
    }

    pub(crate) fn get_by_id(&self, key: &str) -> Option<Arc<Model>> {
        self.by_id.get(key).cloned()
    }

    /// `true` when this exact model is indexed under its client id.
    pub(crate) fn is_member(&self, model: &Arc<Model>) -> bool {
        self.by_client_id
            .get(model.client_id())
            .is_some_and(|member| Arc::ptr_eq(member, model))
    }

    /// Identity already taken by a member: the client id, or the
    /// persistent id key when defined.
    pub(crate) fn conflict(&self, model: &Model) -> Option<String> {
        if self.by_client_id.contains_key(model.client_id()) {
            return Some(model.client_id().to_string());
        }
        model.id_key().filter(|key| self.by_id.contains_key(key))
    }

    pub(crate) fn insert(&mut self, model: &Arc<Model>) {
        self.by_client_id
            .insert(model.client_id().to_string(), Arc::clone(model));
        if let Some(key) = model.id_key() {
            self.by_id.insert(key, Arc::clone(model));
        }
    }

    pub(crate) fn remove(&mut self, model: &Arc<Model>) {
        self.by_client_id.remove(model.client_id());
        if let Some(key) = model.id_key() {
            if self
                .by_id
                .get(&key)
                .is_some_and(|mapped| Arc::ptr_eq(mapped, model))
            {
                self.release(&key, model);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_client_id.clear();
        self.by_id.clear();
        self.shadowed.clear();
    }

    /// Drops the mapping for `key` held by `leaving`, handing the key to a
    /// shadowed member that still carries it.
    fn release(&mut self, key: &str, leaving: &Arc<Model>) {
        self.by_id.remove(key);
        if !self.shadowed.contains(key) {
            return;
        }

        let mut contenders = self.by_client_id.values().filter(|member| {
            !Arc::ptr_eq(member, leaving) && member.id_key().as_deref() == Some(key)
        });
        match contenders.next().cloned() {
            Some(successor) => {
                let more = contenders.next().is_some();
                self.by_id.insert(key.to_string(), successor);
                if !more {
                    self.shadowed.remove(key);
                }
            }
            None => {
                self.shadowed.remove(key);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_client_id.len()
    }

    pub(crate) fn id_count(&self) -> usize {
        self.by_id.len()
    }

    /// Re-keys `model` after its persistent id moved from `prev` to `new`.
    pub(crate) fn apply_id_change(
        &mut self,
        model: &Arc<Model>,
        prev: &Value,
        new: &Value,
    ) -> IdChangeOutcome {
        let prev_key = id_key(prev);
        let points_here = prev_key.as_ref().is_some_and(|key| {
            self.by_id
                .get(key)
                .is_some_and(|mapped| Arc::ptr_eq(mapped, model))
        });
        // A member left unindexed by an earlier conflict has no mapping
        // under `prev` but must still be re-keyed.
        if !points_here && !self.is_member(model) {
            return IdChangeOutcome::Ignored;
        }
        if let (true, Some(key)) = (points_here, &prev_key) {
            self.release(key, model);
        }

        if let Some(new_key) = id_key(new) {
            if let Some(holder) = self.by_id.get(&new_key) {
                if !Arc::ptr_eq(holder, model) {
                    self.shadowed.insert(new_key.clone());
                    return IdChangeOutcome::Conflict(new_key);
                }
            }
            self.by_id.insert(new_key, Arc::clone(model));
        }
        IdChangeOutcome::Applied
    }
}
