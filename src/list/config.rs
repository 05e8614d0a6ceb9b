use super::inserter::Comparator;
use crate::core::Attributes;
use crate::model::{DefaultModelFactory, Model, ModelFactory};
use crate::sync::{JsonResponseParser, NoopSync, ResponseParser, SyncTransport};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Model list configuration
///
/// Everything a list needs from the outside: ordering, how raw hashes
/// become models, and the persistence collaborators.
#[derive(Clone)]
pub struct ModelListConfig {
    /// Keeps the list sorted when set; insertion order otherwise
    pub comparator: Option<Comparator>,

    /// Converts attribute hashes passed to add/reset/load into models
    pub model_factory: Arc<dyn ModelFactory>,

    /// Transport used by `load`
    pub sync: Arc<dyn SyncTransport>,

    /// Decodes `load` responses
    pub parser: Arc<dyn ResponseParser>,

    /// List-level attributes; they shadow same-named model attributes in `get`
    pub attributes: Attributes,
}

impl ModelListConfig {
    pub fn new() -> Self {
        Self {
            comparator: None,
            model_factory: Arc::new(DefaultModelFactory::default()),
            sync: Arc::new(NoopSync),
            parser: Arc::new(JsonResponseParser),
            attributes: Attributes::new(),
        }
    }

    /// Sort by a key derived from each model
    pub fn comparator(mut self, key: impl Fn(&Model) -> Value + Send + Sync + 'static) -> Self {
        self.comparator = Some(Comparator::new(key));
        self
    }

    /// Sort by one attribute
    pub fn sort_by(mut self, attribute: impl Into<String>) -> Self {
        self.comparator = Some(Comparator::by_attribute(attribute));
        self
    }

    /// Replace the key ordering of the configured comparator
    ///
    /// Has no effect until a comparator is set.
    pub fn compare(
        mut self,
        compare: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparator = self.comparator.map(|c| c.with_compare(compare));
        self
    }

    pub fn model_factory(mut self, factory: impl ModelFactory + 'static) -> Self {
        self.model_factory = Arc::new(factory);
        self
    }

    /// Set the list transport; models built by the default factory share it
    pub fn sync(mut self, sync: Arc<dyn SyncTransport>) -> Self {
        self.model_factory = Arc::new(DefaultModelFactory::new(Arc::clone(&sync)));
        self.sync = sync;
        self
    }

    pub fn parser(mut self, parser: impl ResponseParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Default for ModelListConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelListConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelListConfig")
            .field("comparator", &self.comparator)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
