use thiserror::Error;

/// Per-record ingestion failures. None of these abort a load.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("unknown event type: '{0}'")]
    UnknownEventType(String),

    #[error("{event_type}: missing required field '{field}'")]
    MissingRequiredField {
        event_type: &'static str,
        field: &'static str,
    },

    /// A field is present but has the wrong JSON type.
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] serde_json::Error),
}

pub(crate) fn require<T>(
    value: Option<T>,
    event_type: &'static str,
    field: &'static str,
) -> Result<T, EventError> {
    value.ok_or(EventError::MissingRequiredField { event_type, field })
}
