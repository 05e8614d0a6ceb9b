// ============================================================================
// Change dispatch
// ============================================================================
//
// Every mutation is described by a ChangeEvent and runs through
// `ListShared::dispatch`:
//
//   1. before phase - `on` subscribers see `&mut ChangeEvent` and may
//      prevent it (skipped when silent)
//   2. default action - the only code that touches the sequence, the
//      identity indices and the bubble registrations
//   3. after phase - `after` subscribers see the applied change
//      (skipped when silent or prevented)
//
// A mutation requested while a before phase of the same list is running
// is rejected with `ListError::ReentrantMutation`.
//
// ============================================================================

use super::inserter::sort_models;
use super::{ChangeOptions, ListShared, ModelInput};
use crate::core::{Attributes, ListError, Result};
use crate::model::Model;
use log::{debug, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
    Reset,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
            ChangeKind::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Origin tag carried by a change event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    Reset,
    /// Reorder of the current members; no membership change.
    Sort,
    Load,
    Create,
    Custom(String),
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSource::Reset => f.write_str("reset"),
            ChangeSource::Sort => f.write_str("sort"),
            ChangeSource::Load => f.write_str("load"),
            ChangeSource::Create => f.write_str("create"),
            ChangeSource::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Change {
    Add { model: Arc<Model>, index: usize },
    Remove { model: Arc<Model>, index: usize },
    /// New contents in final order (current members, reordered, for sort).
    Reset { models: Vec<Arc<Model>> },
}

/// Change descriptor handed to before/after subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    change: Change,
    src: Option<ChangeSource>,
    extra: Attributes,
    prevented: bool,
}

impl ChangeEvent {
    pub(crate) fn new(change: Change, src: Option<ChangeSource>, extra: Attributes) -> Self {
        Self {
            change,
            src,
            extra,
            prevented: false,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Add { .. } => ChangeKind::Add,
            Change::Remove { .. } => ChangeKind::Remove,
            Change::Reset { .. } => ChangeKind::Reset,
        }
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    /// The added or removed model.
    pub fn model(&self) -> Option<&Arc<Model>> {
        match &self.change {
            Change::Add { model, .. } | Change::Remove { model, .. } => Some(model),
            Change::Reset { .. } => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self.change {
            Change::Add { index, .. } | Change::Remove { index, .. } => Some(index),
            Change::Reset { .. } => None,
        }
    }

    /// Models carried by a reset; empty for add/remove.
    pub fn models(&self) -> &[Arc<Model>] {
        match &self.change {
            Change::Reset { models } => models.as_slice(),
            _ => &[],
        }
    }

    pub fn src(&self) -> Option<&ChangeSource> {
        self.src.as_ref()
    }

    /// Caller-supplied field from [`ChangeOptions::extra`].
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Cancel the default action. Only meaningful in the before phase.
    pub fn prevent_default(&mut self) {
        self.prevented = true;
    }

    pub fn is_prevented(&self) -> bool {
        self.prevented
    }
}

/// Operation that produced an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    Add,
    Remove,
    Reset,
    Sort,
    Load,
    Parse,
    IdChange,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSource::Add => "add",
            ErrorSource::Remove => "remove",
            ErrorSource::Reset => "reset",
            ErrorSource::Sort => "sort",
            ErrorSource::Load => "load",
            ErrorSource::Parse => "parse",
            ErrorSource::IdChange => "idChange",
        };
        f.write_str(name)
    }
}

/// Payload of the informational error channel.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub error: ListError,
    pub src: ErrorSource,
    pub model: Option<Arc<Model>>,
    pub index: Option<usize>,
    pub response: Option<Value>,
}

impl ErrorEvent {
    pub(crate) fn new(error: ListError, src: ErrorSource) -> Self {
        Self {
            error,
            src,
            model: None,
            index: None,
            response: None,
        }
    }

    pub(crate) fn model(mut self, model: &Arc<Model>) -> Self {
        self.model = Some(Arc::clone(model));
        self
    }

    pub(crate) fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn response(mut self, response: Option<Value>) -> Self {
        self.response = response;
        self
    }
}

struct BeforePhase<'a>(&'a AtomicUsize);

impl<'a> BeforePhase<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for BeforePhase<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ListShared {
    /// Publishes `event` on the error channel and hands back its error.
    /// Errors that only concern the caller, such as a veto surfacing from a
    /// transport, are handed back unpublished.
    pub(super) fn report(&self, event: ErrorEvent) -> ListError {
        if !event.error.is_reported() {
            debug!("{} error not published: {}", event.src, event.error);
            return event.error;
        }
        warn!("model list error ({}): {}", event.src, event.error);
        let error = event.error.clone();
        let handlers = self.read_subscribers().error.snapshot();
        for handler in handlers {
            handler(&event);
        }
        error
    }

    pub(super) fn ensure_not_dispatching(&self, src: ErrorSource) -> Result<()> {
        if self.before_depth.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        let error = ListError::ReentrantMutation(src.to_string());
        Err(self.report(ErrorEvent::new(error, src)))
    }

    pub(super) fn dispatch(&self, mut event: ChangeEvent, silent: bool) -> Result<()> {
        if silent {
            debug!("silent {} bypasses notifications", event.kind());
            return self.run_default_action(&event);
        }

        let before = self.read_subscribers().before.snapshot();
        {
            let _phase = BeforePhase::enter(&self.before_depth);
            for handler in before {
                handler(&mut event);
            }
        }

        if event.is_prevented() {
            debug!("{} prevented by a subscriber", event.kind());
            return Err(ListError::Prevented(event.kind().to_string()));
        }

        self.run_default_action(&event)?;

        let after = self.read_subscribers().after.snapshot();
        for handler in after {
            handler(&event);
        }
        Ok(())
    }

    fn run_default_action(&self, event: &ChangeEvent) -> Result<()> {
        match &event.change {
            Change::Add { model, index } => self.apply_add(model, *index),
            Change::Remove { model, index } => self.apply_remove(model, *index),
            Change::Reset { models } if event.src == Some(ChangeSource::Sort) => {
                self.apply_sort(models);
                Ok(())
            }
            Change::Reset { models } => {
                self.apply_reset(models);
                Ok(())
            }
        }
    }

    fn apply_add(&self, model: &Arc<Model>, index: usize) -> Result<()> {
        // Identity is checked again: a subscriber may have re-keyed the
        // model between validation and now.
        let conflict = {
            let mut state = self.write_state();
            match state.identity.conflict(model) {
                Some(identity) => Some(identity),
                None => {
                    let index = index.min(state.items.len());
                    state.identity.insert(model);
                    state.items.insert(index, Arc::clone(model));
                    self.attach(model);
                    None
                }
            }
        };

        match conflict {
            Some(identity) => {
                let error = ListError::DuplicateIdentity(identity);
                Err(self.report(ErrorEvent::new(error, ErrorSource::Add).model(model)))
            }
            None => Ok(()),
        }
    }

    fn apply_remove(&self, model: &Arc<Model>, index: usize) -> Result<()> {
        let removed = {
            let mut state = self.write_state();
            let position = if state
                .items
                .get(index)
                .is_some_and(|member| Arc::ptr_eq(member, model))
            {
                Some(index)
            } else {
                state.items.iter().position(|member| Arc::ptr_eq(member, model))
            };

            match position {
                Some(position) => {
                    state.items.remove(position);
                    state.identity.remove(model);
                    self.detach(model);
                    true
                }
                None => false,
            }
        };

        if removed {
            Ok(())
        } else {
            let error = ListError::NotFound(model.client_id().to_string());
            Err(self.report(ErrorEvent::new(error, ErrorSource::Remove).model(model)))
        }
    }

    fn apply_sort(&self, models: &[Arc<Model>]) {
        let mut state = self.write_state();
        let same_members = models.len() == state.items.len()
            && models.iter().all(|model| state.identity.is_member(model));
        if same_members {
            state.items = models.to_vec();
        } else if let Some(comparator) = &self.config.comparator {
            sort_models(&mut state.items, comparator);
        }
    }

    fn apply_reset(&self, models: &[Arc<Model>]) {
        {
            let mut state = self.write_state();
            state.identity.clear();
            let previous = std::mem::take(&mut state.items);
            for model in &previous {
                self.detach(model);
            }
        }

        // `models` is already in final order; explicit indices keep it.
        let inputs = models.iter().cloned().map(ModelInput::Model).collect();
        self.add_batch(inputs, ChangeOptions::silently().index(0), ErrorSource::Reset);
    }
}
