#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not a parseable structured-text value.
    #[error("Malformed payload: {0}")]
    Malformed(String),
    /// Payload parsed, but a required field is absent or has the wrong type.
    #[error("Missing or invalid field: {0}")]
    MissingField(String),
}

impl DecodeError {
    pub(crate) fn from_parse(error: &serde_json::Error) -> Self {
        DecodeError::Malformed(error.to_string())
    }

    pub(crate) fn from_shape(error: &serde_json::Error) -> Self {
        DecodeError::MissingField(error.to_string())
    }
}
