// ============================================================================
// Persistence collaborators
// ============================================================================
//
// The transport a model or list calls to create/read/update/delete its
// state, and the parser that turns a raw read response into attribute
// hashes. Both are traits so applications can plug in any backend; the
// defaults keep everything in memory.
//
// ============================================================================

use crate::core::{Attributes, ListError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Operation requested from a [`SyncTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncAction::Create => "create",
            SyncAction::Read => "read",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Arguments handed to the transport. Serializable so remote transports
/// can forward it as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Caller-supplied options, passed through untouched.
    #[serde(default)]
    pub options: Attributes,
    /// Serialized model for create/update/delete; `None` for list reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Attributes>,
}

impl SyncRequest {
    pub fn new(options: Attributes) -> Self {
        Self {
            options,
            payload: None,
        }
    }

    pub fn payload(mut self, payload: Attributes) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Single-shot asynchronous persistence call.
///
/// Errors are surfaced to callers verbatim; implementations should use
/// [`ListError::SyncFailure`] for transport problems.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn sync(&self, action: SyncAction, request: &SyncRequest) -> Result<Option<Value>>;
}

/// Transport that completes immediately without a response.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

#[async_trait]
impl SyncTransport for NoopSync {
    async fn sync(&self, _action: SyncAction, _request: &SyncRequest) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Turns a raw read response into the attribute hashes a list is reset with.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, response: Option<&Value>) -> Result<Vec<Attributes>>;
}

/// Accepts an array of objects, a JSON string holding one, or no response
/// at all (an empty list).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    fn parse_array(items: &[Value]) -> Result<Vec<Attributes>> {
        items
            .iter()
            .enumerate()
            .map(|(position, item)| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(ListError::ParseFailure(format!(
                    "element {} is not an object: {}",
                    position, other
                ))),
            })
            .collect()
    }
}

impl ResponseParser for JsonResponseParser {
    fn parse(&self, response: Option<&Value>) -> Result<Vec<Attributes>> {
        match response {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Self::parse_array(items),
            Some(Value::String(text)) => {
                let decoded: Value = serde_json::from_str(text)
                    .map_err(|err| ListError::ParseFailure(err.to_string()))?;
                match decoded {
                    Value::Null => Ok(Vec::new()),
                    Value::Array(items) => Self::parse_array(&items),
                    other => Err(ListError::ParseFailure(format!(
                        "expected an array, got {}",
                        other
                    ))),
                }
            }
            Some(other) => Err(ListError::ParseFailure(format!(
                "expected an array, got {}",
                other
            ))),
        }
    }
}

/// Decodes a single-model save response: an object, a JSON string holding
/// one, or nothing.
pub(crate) fn parse_model_response(response: Option<Value>) -> Result<Option<Attributes>> {
    match response {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(Value::Null) => Ok(None),
            Ok(other) => Err(ListError::ParseFailure(format!(
                "expected an object, got {}",
                other
            ))),
            Err(err) => Err(ListError::ParseFailure(err.to_string())),
        },
        Some(other) => Err(ListError::ParseFailure(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
