//! Everything an application needs to build and observe model lists.
//!
//! ```
//! use rustmodelist::prelude::*;
//! ```

pub use crate::core::{Attributes, ListError, Result, attrs};
pub use crate::events::{ModelEvent, SubscriptionId};
pub use crate::list::{
    ChangeEvent, ChangeKind, ChangeOptions, ChangeSource, ErrorEvent, ErrorSource, ItemEvent,
    LoadEvent, ModelList, ModelListConfig,
};
pub use crate::model::Model;
pub use crate::sync::{SyncAction, SyncRequest, SyncTransport};
