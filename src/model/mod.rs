// ============================================================================
// Model - the item stored in a ModelList
// ============================================================================
//
// A model is a bag of JSON attributes with:
// - an immutable client id assigned at construction ("c1", "c2", ...)
// - an optional persistent id held in the `id` attribute
// - its own subscribers plus a list of bubble targets (containing lists)
//
// Models are always handled through `Arc<Model>`; the same model may sit in
// several lists at once.
//
// ============================================================================

pub mod escape;

use crate::core::{Attributes, Result, id_key, value_to_text};
use crate::events::{BubbleTarget, ModelEvent, Subscribers, SubscriptionId, TargetRegistration};
use crate::sync::{NoopSync, SyncAction, SyncRequest, SyncTransport, parse_model_response};
use log::{debug, warn};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Attribute name holding the persistent id.
pub const ID_ATTRIBUTE: &str = "id";

/// Pseudo-attribute exposing the client id. Read-only.
pub const CLIENT_ID_ATTRIBUTE: &str = "clientId";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_client_id() -> String {
    format!("c{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

pub type ModelHandler = dyn Fn(&Arc<Model>, &ModelEvent) + Send + Sync;

struct ModelState {
    attributes: Attributes,
    subscribers: Subscribers<ModelHandler>,
    targets: Vec<TargetRegistration>,
}

pub struct Model {
    client_id: String,
    state: RwLock<ModelState>,
    sync: Arc<dyn SyncTransport>,
}

impl Model {
    /// Builds a model backed by the no-op transport.
    ///
    /// A string `clientId` key in `attributes` is taken as the client id
    /// (and removed from the attribute map); otherwise one is generated.
    pub fn new(attributes: Attributes) -> Arc<Self> {
        Self::with_sync(attributes, Arc::new(NoopSync))
    }

    pub fn with_sync(mut attributes: Attributes, sync: Arc<dyn SyncTransport>) -> Arc<Self> {
        let client_id = match attributes.remove(CLIENT_ID_ATTRIBUTE) {
            Some(Value::String(client_id)) => client_id,
            _ => generate_client_id(),
        };
        Arc::new(Self {
            client_id,
            state: RwLock::new(ModelState {
                attributes,
                subscribers: Subscribers::default(),
                targets: Vec::new(),
            }),
            sync,
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ModelState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Persistent id, `None` while undefined.
    pub fn id(&self) -> Option<Value> {
        self.read_state()
            .attributes
            .get(ID_ATTRIBUTE)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Key under which this model is indexed by persistent id.
    pub fn id_key(&self) -> Option<String> {
        self.read_state()
            .attributes
            .get(ID_ATTRIBUTE)
            .and_then(id_key)
    }

    /// `true` until the model has a persistent id.
    pub fn is_new(&self) -> bool {
        self.id_key().is_none()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if name == CLIENT_ID_ATTRIBUTE {
            return Some(Value::String(self.client_id.clone()));
        }
        self.read_state().attributes.get(name).cloned()
    }

    pub fn get_as_html(&self, name: &str) -> String {
        let value = self.get(name).unwrap_or(Value::Null);
        escape::escape_html(&value_to_text(&value))
    }

    pub fn get_as_url(&self, name: &str) -> String {
        let value = self.get(name).unwrap_or(Value::Null);
        escape::encode_url(&value_to_text(&value))
    }

    /// Sets one attribute and notifies subscribers and bubble targets.
    ///
    /// Setting `id` emits [`ModelEvent::IdChange`]; any other attribute
    /// emits [`ModelEvent::Change`]. Assigning an equal value is silent.
    pub fn set(self: &Arc<Self>, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if name == CLIENT_ID_ATTRIBUTE {
            warn!(
                "ignoring write to read-only attribute '{}' on model '{}'",
                name, self.client_id
            );
            return;
        }

        let prev = {
            let mut state = self.write_state();
            let prev = state.attributes.get(name).cloned().unwrap_or(Value::Null);
            if prev == value {
                return;
            }
            state.attributes.insert(name.to_string(), value.clone());
            prev
        };

        self.fire(Self::change_event(name, prev, value));
    }

    pub fn set_attributes(self: &Arc<Self>, attributes: Attributes) {
        for (name, value) in attributes {
            self.set(&name, value);
        }
    }

    /// Removes an attribute; subscribers see the new value as `null`.
    pub fn unset(self: &Arc<Self>, name: &str) {
        let prev = match self.write_state().attributes.remove(name) {
            Some(prev) => prev,
            None => return,
        };
        self.fire(Self::change_event(name, prev, Value::Null));
    }

    fn change_event(name: &str, prev: Value, new: Value) -> ModelEvent {
        if name == ID_ATTRIBUTE {
            ModelEvent::IdChange { prev, new }
        } else {
            ModelEvent::Change {
                attribute: name.to_string(),
                prev,
                new,
            }
        }
    }

    /// Plain attribute hash. The client id is not included.
    pub fn to_json(&self) -> Attributes {
        self.read_state().attributes.clone()
    }

    pub fn on(&self, handler: impl Fn(&Arc<Model>, &ModelEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.write_state().subscribers.subscribe(Arc::new(handler))
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.write_state().subscribers.unsubscribe(id)
    }

    /// Delivers `event` to this model's subscribers, then to every live
    /// bubble target.
    pub fn fire(self: &Arc<Self>, event: ModelEvent) {
        let (handlers, targets) = {
            let mut state = self.write_state();
            state.targets.retain(TargetRegistration::is_alive);
            let targets: Vec<Arc<dyn BubbleTarget>> = state
                .targets
                .iter()
                .filter_map(TargetRegistration::upgrade)
                .collect();
            (state.subscribers.snapshot(), targets)
        };

        for handler in handlers {
            handler(self, &event);
        }
        for target in targets {
            target.receive(self, &event);
        }
    }

    pub fn add_target(&self, target: Weak<dyn BubbleTarget>) {
        let mut state = self.write_state();
        match state.targets.iter_mut().find(|entry| entry.matches(&target)) {
            Some(entry) => entry.retain(),
            None => state.targets.push(TargetRegistration::new(target)),
        }
    }

    /// Drops one registration of `target`. Returns `false` if it was not
    /// registered.
    pub fn remove_target(&self, target: &Weak<dyn BubbleTarget>) -> bool {
        let mut state = self.write_state();
        let Some(position) = state.targets.iter().position(|entry| entry.matches(target)) else {
            return false;
        };
        if state.targets[position].release() {
            state.targets.remove(position);
        }
        true
    }

    /// Number of distinct live bubble targets.
    pub fn target_count(&self) -> usize {
        self.read_state()
            .targets
            .iter()
            .filter(|entry| entry.is_alive())
            .count()
    }

    /// Persists the model through its transport.
    ///
    /// New models are created, others updated. An object in the response
    /// is merged into the attributes, which is how a persistent id gets
    /// assigned.
    pub async fn save(self: &Arc<Self>, options: &Attributes) -> Result<()> {
        let action = if self.is_new() {
            SyncAction::Create
        } else {
            SyncAction::Update
        };
        let request = SyncRequest::new(options.clone()).payload(self.to_json());
        let response = self.sync.sync(action, &request).await?;
        if let Some(attributes) = parse_model_response(response)? {
            self.set_attributes(attributes);
        }
        debug!("model '{}' saved ({})", self.client_id, action);
        Ok(())
    }

    /// Destroys the model, deleting it through the transport first when
    /// `delete` is set and the model has been persisted. Containing lists
    /// remove it when they see [`ModelEvent::Destroy`].
    pub async fn destroy(self: &Arc<Self>, delete: bool, options: &Attributes) -> Result<()> {
        if delete && !self.is_new() {
            let request = SyncRequest::new(options.clone()).payload(self.to_json());
            self.sync.sync(SyncAction::Delete, &request).await?;
        }
        self.fire(ModelEvent::Destroy);
        Ok(())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("client_id", &self.client_id)
            .field("attributes", &self.read_state().attributes)
            .finish()
    }
}

// ============================================================================
// MODEL FACTORY
// ============================================================================

/// Builds models from raw attribute hashes on behalf of a list.
pub trait ModelFactory: Send + Sync {
    fn create(&self, attributes: Attributes) -> Arc<Model>;
}

impl<F> ModelFactory for F
where
    F: Fn(Attributes) -> Arc<Model> + Send + Sync,
{
    fn create(&self, attributes: Attributes) -> Arc<Model> {
        self(attributes)
    }
}

/// Plain models sharing one transport.
#[derive(Clone)]
pub struct DefaultModelFactory {
    sync: Arc<dyn SyncTransport>,
}

impl DefaultModelFactory {
    pub fn new(sync: Arc<dyn SyncTransport>) -> Self {
        Self { sync }
    }
}

impl Default for DefaultModelFactory {
    fn default() -> Self {
        Self::new(Arc::new(NoopSync))
    }
}

impl ModelFactory for DefaultModelFactory {
    fn create(&self, attributes: Attributes) -> Arc<Model> {
        Model::with_sync(attributes, Arc::clone(&self.sync))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ListError, attrs};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_client_ids_are_unique() {
        let a = Model::new(Attributes::new());
        let b = Model::new(Attributes::new());
        assert_ne!(a.client_id(), b.client_id());
        assert!(a.client_id().starts_with('c'));
    }

    #[test]
    fn test_explicit_client_id() {
        let model = Model::new(attrs(json!({"clientId": "c1", "name": "a"})));
        assert_eq!(model.client_id(), "c1");
        assert_eq!(model.get("clientId"), Some(json!("c1")));
        assert!(!model.to_json().contains_key("clientId"));
    }

    #[test]
    fn test_set_emits_change_and_id_change() {
        let model = Model::new(Attributes::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        model.on(move |_, event| sink.lock().unwrap().push(event.clone()));

        model.set("name", "x");
        model.set("name", "x");
        model.set("id", 42);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            ModelEvent::Change {
                attribute: "name".into(),
                prev: Value::Null,
                new: json!("x"),
            }
        );
        assert_eq!(
            seen[1],
            ModelEvent::IdChange {
                prev: Value::Null,
                new: json!(42),
            }
        );
        assert_eq!(model.id_key(), Some("42".to_string()));
    }

    #[test]
    fn test_client_id_is_read_only() {
        let model = Model::new(Attributes::new());
        let before = model.client_id().to_string();
        model.set("clientId", "other");
        assert_eq!(model.get("clientId"), Some(Value::String(before)));
    }

    #[test]
    fn test_unset_clears_id() {
        let model = Model::new(attrs(json!({"id": "7"})));
        assert!(!model.is_new());
        model.unset("id");
        assert!(model.is_new());
        assert_eq!(model.id(), None);
    }

    #[test]
    fn test_escaped_getters() {
        let model = Model::new(attrs(json!({"title": "<b>a & b</b>"})));
        assert_eq!(model.get_as_html("title"), "&lt;b&gt;a &amp; b&lt;&#x2F;b&gt;");
        assert_eq!(model.get_as_url("title"), "%3Cb%3Ea%20%26%20b%3C%2Fb%3E");
        assert_eq!(model.get_as_html("missing"), "");
    }

    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl BubbleTarget for Recorder {
        fn receive(&self, source: &Arc<Model>, event: &ModelEvent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}", source.client_id(), event.name()));
        }
    }

    #[test]
    fn test_bubble_targets_are_reference_counted() {
        let model = Model::new(Attributes::new());
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        let as_target: Arc<dyn BubbleTarget> = recorder.clone();
        let weak = Arc::downgrade(&as_target);

        model.add_target(weak.clone());
        model.add_target(weak.clone());
        assert_eq!(model.target_count(), 1);

        model.set("a", 1);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);

        assert!(model.remove_target(&weak));
        model.set("a", 2);
        assert_eq!(recorder.events.lock().unwrap().len(), 2);

        assert!(model.remove_target(&weak));
        assert!(!model.remove_target(&weak));
        model.set("a", 3);
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dead_targets_are_pruned() {
        let model = Model::new(Attributes::new());
        {
            let target: Arc<dyn BubbleTarget> = Arc::new(Recorder {
                events: Mutex::new(Vec::new()),
            });
            model.add_target(Arc::downgrade(&target));
            assert_eq!(model.target_count(), 1);
        }
        assert_eq!(model.target_count(), 0);
        model.set("a", 1);
    }

    struct AssigningSync;

    #[async_trait]
    impl SyncTransport for AssigningSync {
        async fn sync(&self, action: SyncAction, request: &SyncRequest) -> Result<Option<Value>> {
            match action {
                SyncAction::Create => {
                    let mut saved = request.payload.clone().unwrap_or_default();
                    saved.insert("id".into(), json!("42"));
                    Ok(Some(Value::Object(saved)))
                }
                SyncAction::Delete => Err(ListError::SyncFailure("read-only store".into())),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn test_save_assigns_persistent_id() {
        let model = Model::with_sync(attrs(json!({"name": "a"})), Arc::new(AssigningSync));
        assert!(model.is_new());
        model.save(&Attributes::new()).await.unwrap();
        assert_eq!(model.id(), Some(json!("42")));
        assert_eq!(model.get("name"), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_destroy_surfaces_sync_failure() {
        let model = Model::with_sync(attrs(json!({"id": 1})), Arc::new(AssigningSync));
        let err = model.destroy(true, &Attributes::new()).await.unwrap_err();
        assert_eq!(err, ListError::SyncFailure("read-only store".into()));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |mut attributes: Attributes| {
            attributes.insert("kind".into(), json!("custom"));
            Model::new(attributes)
        };
        let model = factory.create(Attributes::new());
        assert_eq!(model.get("kind"), Some(json!("custom")));
    }
}
