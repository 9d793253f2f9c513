use thiserror::Error;

/// Stores the reasons an authentication block may be rejected as malformed
/// before any cryptographic checking happens
#[derive(Error, Debug)]
pub enum BlockError {
    /// The tag payload could not be read as the JSON block structure
    #[error("authentication block is not valid: {0}")]
    Json(#[from] serde_json::Error),
    /// The structure was parsed but one of the fields breaks its format
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl BlockError {
    pub fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
