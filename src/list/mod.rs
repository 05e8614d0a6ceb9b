// ============================================================================
// ModelList - ordered observable collection of models
// ============================================================================
//
// Holds the authoritative sequence plus the client-id / persistent-id
// indices, keeps the sequence sorted when a comparator is configured, and
// routes every add/remove/reset/sort through the change dispatcher so the
// mutation can be observed or prevented.
//
// `ModelList` is a cheap handle; clones share the same list.
//
// ============================================================================

pub mod config;
pub mod dispatch;
mod identity;
pub mod inserter;
pub mod options;
pub mod persistence;
pub mod query;
pub mod relay;

pub use config::ModelListConfig;
pub use dispatch::{Change, ChangeEvent, ChangeKind, ChangeSource, ErrorEvent, ErrorSource};
pub use inserter::{Comparator, sorted_index};
pub use options::ChangeOptions;
pub use persistence::LoadEvent;
pub use relay::ItemEvent;

use crate::core::{Attributes, ListError, Result};
use crate::events::{Subscribers, SubscriptionId};
use crate::model::Model;
use identity::IdentityTracker;
use inserter::sort_models;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

pub type BeforeHandler = dyn Fn(&mut ChangeEvent) + Send + Sync;
pub type AfterHandler = dyn Fn(&ChangeEvent) + Send + Sync;
pub type ErrorHandler = dyn Fn(&ErrorEvent) + Send + Sync;
pub type LoadHandler = dyn Fn(&LoadEvent) + Send + Sync;
pub type ItemHandler = dyn Fn(&ItemEvent) + Send + Sync;

#[derive(Default)]
struct ListSubscribers {
    before: Subscribers<BeforeHandler>,
    after: Subscribers<AfterHandler>,
    error: Subscribers<ErrorHandler>,
    load: Subscribers<LoadHandler>,
    item: Subscribers<ItemHandler>,
}

impl ListSubscribers {
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.before.unsubscribe(id)
            || self.after.unsubscribe(id)
            || self.error.unsubscribe(id)
            || self.load.unsubscribe(id)
            || self.item.unsubscribe(id)
    }
}

#[derive(Default)]
struct ListState {
    items: Vec<Arc<Model>>,
    identity: IdentityTracker,
}

pub(crate) struct ListShared {
    config: ModelListConfig,
    state: RwLock<ListState>,
    subscribers: RwLock<ListSubscribers>,
    attributes: RwLock<Attributes>,
    before_depth: AtomicUsize,
    weak_self: Weak<ListShared>,
}

// ============================================================================
// INPUTS
// ============================================================================

/// Something add/reset can turn into a model.
#[derive(Debug, Clone)]
pub enum ModelInput {
    Model(Arc<Model>),
    /// Converted through the list's model factory.
    Attributes(Attributes),
}

impl From<Arc<Model>> for ModelInput {
    fn from(model: Arc<Model>) -> Self {
        ModelInput::Model(model)
    }
}

impl From<&Arc<Model>> for ModelInput {
    fn from(model: &Arc<Model>) -> Self {
        ModelInput::Model(Arc::clone(model))
    }
}

impl From<Attributes> for ModelInput {
    fn from(attributes: Attributes) -> Self {
        ModelInput::Attributes(attributes)
    }
}

/// Anything that yields an ordered batch of models or hashes, including
/// another list.
pub trait ModelSource {
    fn into_model_inputs(self) -> Vec<ModelInput>;
}

impl<T: Into<ModelInput>> ModelSource for Vec<T> {
    fn into_model_inputs(self) -> Vec<ModelInput> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<ModelInput>, const N: usize> ModelSource for [T; N] {
    fn into_model_inputs(self) -> Vec<ModelInput> {
        self.into_iter().map(Into::into).collect()
    }
}

impl ModelSource for &[Arc<Model>] {
    fn into_model_inputs(self) -> Vec<ModelInput> {
        self.iter().map(ModelInput::from).collect()
    }
}

impl ModelSource for &ModelList {
    fn into_model_inputs(self) -> Vec<ModelInput> {
        self.to_vec().into_iter().map(ModelInput::Model).collect()
    }
}

/// Element of a remove request.
#[derive(Debug, Clone)]
pub enum RemoveTarget {
    Model(Arc<Model>),
    Index(usize),
}

impl From<Arc<Model>> for RemoveTarget {
    fn from(model: Arc<Model>) -> Self {
        RemoveTarget::Model(model)
    }
}

impl From<&Arc<Model>> for RemoveTarget {
    fn from(model: &Arc<Model>) -> Self {
        RemoveTarget::Model(Arc::clone(model))
    }
}

impl From<usize> for RemoveTarget {
    fn from(index: usize) -> Self {
        RemoveTarget::Index(index)
    }
}

// ============================================================================
// SHARED STATE
// ============================================================================

impl ListShared {
    fn new(config: ModelListConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            attributes: RwLock::new(config.attributes.clone()),
            config,
            state: RwLock::new(ListState::default()),
            subscribers: RwLock::new(ListSubscribers::default()),
            before_depth: AtomicUsize::new(0),
            weak_self: weak_self.clone(),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ListState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ListState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_subscribers(&self) -> RwLockReadGuard<'_, ListSubscribers> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscribers(&self) -> RwLockWriteGuard<'_, ListSubscribers> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_attributes(&self) -> RwLockReadGuard<'_, Attributes> {
        self.attributes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_attributes(&self) -> RwLockWriteGuard<'_, Attributes> {
        self.attributes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, input: ModelInput) -> Arc<Model> {
        match input {
            ModelInput::Model(model) => model,
            ModelInput::Attributes(attributes) => self.config.model_factory.create(attributes),
        }
    }

    /// `src` names the operation on whose behalf errors are reported.
    fn add_one(&self, input: ModelInput, options: &ChangeOptions, src: ErrorSource) -> Result<Arc<Model>> {
        self.ensure_not_dispatching(src)?;
        let model = self.resolve(input);

        let index = {
            let state = self.read_state();
            match state.identity.conflict(&model) {
                Some(identity) => Err(identity),
                None => Ok(match options.index {
                    Some(index) => index.min(state.items.len()),
                    None => sorted_index(&state.items, self.config.comparator.as_ref(), &model),
                }),
            }
        };
        let index = match index {
            Ok(index) => index,
            Err(identity) => {
                let error = ListError::DuplicateIdentity(identity);
                return Err(self.report(ErrorEvent::new(error, src).model(&model)));
            }
        };

        let event = ChangeEvent::new(
            Change::Add {
                model: Arc::clone(&model),
                index,
            },
            options.src.clone(),
            options.extra.clone(),
        );
        self.dispatch(event, options.silent)?;
        Ok(model)
    }

    /// Adds each input in order. An explicit index advances past every
    /// inserted element so the batch stays contiguous.
    fn add_batch(
        &self,
        inputs: Vec<ModelInput>,
        mut options: ChangeOptions,
        src: ErrorSource,
    ) -> Vec<Option<Arc<Model>>> {
        inputs
            .into_iter()
            .map(|input| {
                let added = self.add_one(input, &options, src).ok();
                if let (Some(_), Some(index)) = (&added, options.index) {
                    options.index = Some(index + 1);
                }
                added
            })
            .collect()
    }

    fn remove_one(&self, model: &Arc<Model>, options: &ChangeOptions) -> Result<Arc<Model>> {
        self.ensure_not_dispatching(ErrorSource::Remove)?;

        let index = {
            let state = self.read_state();
            if state.identity.is_member(model) {
                state.items.iter().position(|member| Arc::ptr_eq(member, model))
            } else {
                None
            }
        };
        let Some(index) = index else {
            let error = ListError::NotFound(model.client_id().to_string());
            return Err(self.report(ErrorEvent::new(error, ErrorSource::Remove).model(model)));
        };

        let event = ChangeEvent::new(
            Change::Remove {
                model: Arc::clone(model),
                index,
            },
            options.src.clone(),
            options.extra.clone(),
        );
        self.dispatch(event, options.silent)?;
        Ok(Arc::clone(model))
    }

    fn remove_at(&self, index: usize, options: &ChangeOptions) -> Result<Arc<Model>> {
        let model = self.read_state().items.get(index).cloned();
        match model {
            Some(model) => self.remove_one(&model, options),
            None => Err(self.index_not_found(index)),
        }
    }

    fn index_not_found(&self, index: usize) -> ListError {
        let error = ListError::NotFound(format!("index {}", index));
        self.report(ErrorEvent::new(error, ErrorSource::Remove).index(index))
    }

    /// Resolves every index to a model up front, then removes one by one.
    fn remove_batch(&self, targets: Vec<RemoveTarget>, options: &ChangeOptions) -> Vec<Option<Arc<Model>>> {
        let resolved: Vec<std::result::Result<Arc<Model>, usize>> = {
            let state = self.read_state();
            targets
                .into_iter()
                .map(|target| match target {
                    RemoveTarget::Model(model) => Ok(model),
                    RemoveTarget::Index(index) => state.items.get(index).cloned().ok_or(index),
                })
                .collect()
        };

        resolved
            .into_iter()
            .map(|target| match target {
                Ok(model) => self.remove_one(&model, options).ok(),
                Err(index) => {
                    self.index_not_found(index);
                    None
                }
            })
            .collect()
    }

    fn reset(&self, inputs: Vec<ModelInput>, options: &ChangeOptions) -> Result<()> {
        self.ensure_not_dispatching(ErrorSource::Reset)?;

        let mut models: Vec<Arc<Model>> = inputs.into_iter().map(|input| self.resolve(input)).collect();
        if let Some(comparator) = &self.config.comparator {
            sort_models(&mut models, comparator);
        }

        let src = options.src.clone().unwrap_or(ChangeSource::Reset);
        let event = ChangeEvent::new(Change::Reset { models }, Some(src), options.extra.clone());
        self.dispatch(event, options.silent)
    }

    fn sort(&self, options: &ChangeOptions) -> Result<()> {
        let Some(comparator) = &self.config.comparator else {
            return Ok(());
        };
        self.ensure_not_dispatching(ErrorSource::Sort)?;

        let mut models = self.read_state().items.clone();
        sort_models(&mut models, comparator);

        let event = ChangeEvent::new(
            Change::Reset { models },
            Some(ChangeSource::Sort),
            options.extra.clone(),
        );
        self.dispatch(event, options.silent)
    }
}

// ============================================================================
// PUBLIC HANDLE
// ============================================================================

#[derive(Clone)]
pub struct ModelList {
    shared: Arc<ListShared>,
}

/// Non-owning handle, for subscribers that need to reach back into the list
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakModelList {
    shared: Weak<ListShared>,
}

impl WeakModelList {
    pub fn upgrade(&self) -> Option<ModelList> {
        self.shared.upgrade().map(|shared| ModelList { shared })
    }
}

impl ModelList {
    /// Empty list in insertion order.
    pub fn new() -> Self {
        Self::with_config(ModelListConfig::new())
    }

    pub fn with_config(config: ModelListConfig) -> Self {
        Self {
            shared: ListShared::new(config),
        }
    }

    pub fn config(&self) -> &ModelListConfig {
        &self.shared.config
    }

    pub fn comparator(&self) -> Option<&Comparator> {
        self.shared.config.comparator.as_ref()
    }

    pub fn downgrade(&self) -> WeakModelList {
        WeakModelList {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// `true` when both handles point at the same list.
    pub fn ptr_eq(&self, other: &ModelList) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Before-phase subscriber for `kind`; may call
    /// [`ChangeEvent::prevent_default`].
    pub fn on(
        &self,
        kind: ChangeKind,
        handler: impl Fn(&mut ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let handler: Arc<BeforeHandler> = Arc::new(move |event: &mut ChangeEvent| {
            if event.kind() == kind {
                handler(event);
            }
        });
        self.shared.write_subscribers().before.subscribe(handler)
    }

    /// After-phase subscriber for `kind`.
    pub fn after(
        &self,
        kind: ChangeKind,
        handler: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let handler: Arc<AfterHandler> = Arc::new(move |event: &ChangeEvent| {
            if event.kind() == kind {
                handler(event);
            }
        });
        self.shared.write_subscribers().after.subscribe(handler)
    }

    pub fn on_error(&self, handler: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.shared.write_subscribers().error.subscribe(Arc::new(handler))
    }

    pub fn on_load(&self, handler: impl Fn(&LoadEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.shared.write_subscribers().load.subscribe(Arc::new(handler))
    }

    /// Events bubbled up from member models.
    pub fn on_item_event(&self, handler: impl Fn(&ItemEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.shared.write_subscribers().item.subscribe(Arc::new(handler))
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.shared.write_subscribers().unsubscribe(id)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Adds one model (or hash) at `options.index`, or at its sorted
    /// position, or at the end.
    pub fn add(&self, input: impl Into<ModelInput>, options: ChangeOptions) -> Result<Arc<Model>> {
        self.shared.add_one(input.into(), &options, ErrorSource::Add)
    }

    /// Adds a batch in order; failed elements come back as `None`.
    pub fn add_many(&self, source: impl ModelSource, options: ChangeOptions) -> Vec<Option<Arc<Model>>> {
        self.shared.add_batch(source.into_model_inputs(), options, ErrorSource::Add)
    }

    pub fn remove(&self, target: impl Into<RemoveTarget>, options: ChangeOptions) -> Result<Arc<Model>> {
        match target.into() {
            RemoveTarget::Model(model) => self.shared.remove_one(&model, &options),
            RemoveTarget::Index(index) => self.shared.remove_at(index, &options),
        }
    }

    /// Removes a batch of models and/or indices. Indices refer to the list
    /// as it was before the call.
    pub fn remove_many<I, T>(&self, targets: I, options: ChangeOptions) -> Vec<Option<Arc<Model>>>
    where
        I: IntoIterator<Item = T>,
        T: Into<RemoveTarget>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.shared.remove_batch(targets, &options)
    }

    /// Replaces the whole contents with a single reset notification.
    pub fn reset(&self, source: impl ModelSource, options: ChangeOptions) -> Result<()> {
        self.shared.reset(source.into_model_inputs(), &options)
    }

    /// Empties the list (a reset with no models).
    pub fn clear(&self, options: ChangeOptions) -> Result<()> {
        self.shared.reset(Vec::new(), &options)
    }

    /// Re-sorts the current members; a no-op without comparator.
    pub fn sort(&self, options: ChangeOptions) -> Result<()> {
        self.shared.sort(&options)
    }
}

impl Default for ModelList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client_ids: Vec<String> = self
            .shared
            .read_state()
            .items
            .iter()
            .map(|model| model.client_id().to_string())
            .collect();
        f.debug_struct("ModelList")
            .field("items", &client_ids)
            .finish_non_exhaustive()
    }
}
