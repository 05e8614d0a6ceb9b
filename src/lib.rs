// ============================================================================
// RustModelList Library
// ============================================================================

//! Ordered, observable collections of models.
//!
//! A [`ModelList`] keeps its members sorted by an optional comparator,
//! indexes them by client id and persistent id, and routes every
//! add/remove/reset/sort through a two-phase notification that subscribers
//! can veto.
//!
//! ```
//! use rustmodelist::{ChangeKind, ChangeOptions, ModelList, ModelListConfig, attrs};
//! use serde_json::json;
//!
//! let list = ModelList::with_config(ModelListConfig::new().sort_by("value"));
//! list.on(ChangeKind::Add, |event| {
//!     if event.model().and_then(|m| m.get("value")) == Some(json!(13)) {
//!         event.prevent_default();
//!     }
//! });
//!
//! for value in [5, 1, 13, 3] {
//!     let _ = list.add(attrs(json!({ "value": value })), ChangeOptions::new());
//! }
//! assert_eq!(list.get("value"), json!([1, 3, 5]));
//! ```

pub mod core;
pub mod events;
pub mod list;
pub mod model;
pub mod prelude;
pub mod sync;

pub use crate::core::{Attributes, ListError, Result, attrs};
pub use crate::events::{BubbleTarget, ModelEvent, SubscriptionId};
pub use crate::list::{
    Change, ChangeEvent, ChangeKind, ChangeOptions, ChangeSource, Comparator, ErrorEvent,
    ErrorSource, ItemEvent, LoadEvent, ModelInput, ModelList, ModelListConfig, ModelSource,
    RemoveTarget, WeakModelList,
};
pub use crate::model::{DefaultModelFactory, Model, ModelFactory};
pub use crate::sync::{JsonResponseParser, NoopSync, ResponseParser, SyncAction, SyncRequest, SyncTransport};
