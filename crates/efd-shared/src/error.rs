//! Error types for the EFD poller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EfdError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from EFD: {body}")]
    Http { status: u16, body: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Column '{0}' missing from query result")]
    MissingColumn(String),

    #[error("Column '{column}' holds a non-numeric value: {value}")]
    NonNumeric { column: String, value: String },

    #[error("Credential lookup failed: {0}")]
    Credentials(String),

    #[error("Invalid query window '{0}'")]
    InvalidWindow(String),

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

impl From<serde_json::Error> for EfdError {
    fn from(e: serde_json::Error) -> Self {
        EfdError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_maps_to_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(EfdError::from(err), EfdError::Decode(_)));
    }

    #[test]
    fn test_non_numeric_message() {
        let err = EfdError::NonNumeric {
            column: "private_sndStamp".to_string(),
            value: "\"a, b\"".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Column 'private_sndStamp' holds a non-numeric value: \"a, b\""
        );
    }
}
