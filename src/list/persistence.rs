// ============================================================================
// Load / create
// ============================================================================
//
// The only async entry points of a list. Each awaits the transport once and
// touches the list only after the call resolves; the mutation itself then
// runs through the regular synchronous paths.
//
// ============================================================================

use super::dispatch::{ChangeSource, ErrorEvent, ErrorSource};
use super::{ChangeOptions, ModelInput, ModelList};
use crate::core::{Attributes, ListError, Result};
use crate::model::Model;
use crate::sync::{SyncAction, SyncRequest};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Published to `on_load` subscribers after a successful load.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    /// Raw transport response.
    pub response: Option<Value>,
    /// Hashes the list was reset with.
    pub parsed: Vec<Attributes>,
    /// Options the load was called with.
    pub options: Attributes,
}

impl ModelList {
    /// Fetches the contents through the configured transport and resets the
    /// list with them.
    ///
    /// A reset vetoed by a subscriber still completes the load; the list
    /// just keeps its old contents.
    pub async fn load(&self, options: Attributes) -> Result<LoadEvent> {
        let config = self.config();
        let request = SyncRequest::new(options.clone());

        let response = match config.sync.sync(SyncAction::Read, &request).await {
            Ok(response) => response,
            Err(error) => {
                return Err(self.shared.report(ErrorEvent::new(error, ErrorSource::Load)));
            }
        };

        let parsed = match config.parser.parse(response.as_ref()) {
            Ok(parsed) => parsed,
            Err(error) => {
                let event = ErrorEvent::new(error, ErrorSource::Parse).response(response);
                return Err(self.shared.report(event));
            }
        };

        let reset_options = ChangeOptions::new().src(ChangeSource::Load);
        match self.reset(parsed.clone(), reset_options) {
            Ok(()) | Err(ListError::Prevented(_)) => {}
            Err(error) => return Err(error),
        }
        debug!("loaded {} models", parsed.len());

        let event = LoadEvent {
            response,
            parsed,
            options,
        };
        let handlers = self.shared.read_subscribers().load.snapshot();
        for handler in handlers {
            handler(&event);
        }
        Ok(event)
    }

    /// Saves a new model through its transport, then adds it.
    ///
    /// `options.extra` is passed to the transport as request options. A
    /// failed save leaves the list untouched.
    pub async fn create(&self, input: impl Into<ModelInput>, options: ChangeOptions) -> Result<Arc<Model>> {
        let model = self.shared.resolve(input.into());
        model.save(&options.extra).await?;

        let options = match options.src {
            Some(_) => options,
            None => options.src(ChangeSource::Create),
        };
        self.add(model, options)
    }
}
