use thiserror::Error;

/// Errors produced by list and model operations.
///
/// Everything except `Prevented` is also published on the list's error
/// channel; a vetoed change is only returned to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error("Model '{0}' is already in the list")]
    DuplicateIdentity(String),

    #[error("Model is not in the list: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    ParseFailure(String),

    #[error("Sync error: {0}")]
    SyncFailure(String),

    #[error("{0} was prevented by a subscriber")]
    Prevented(String),

    #[error("Nested {0} while a change is being dispatched")]
    ReentrantMutation(String),
}

impl ListError {
    /// Whether this error belongs on the informational error channel.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            ListError::DuplicateIdentity(_)
                | ListError::NotFound(_)
                | ListError::ParseFailure(_)
                | ListError::SyncFailure(_)
                | ListError::ReentrantMutation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ListError>;
