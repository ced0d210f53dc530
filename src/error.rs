//! Error types for handgrab
//!
//! Runtime input problems (missing hands, corrupt settings, degenerate
//! projections, failing collaborators) are recovered where they occur and
//! never reach this type. It only surfaces from the fallible edges: parsing
//! detector records, settings file I/O and scene queries that callers want to
//! inspect themselves.

use thiserror::Error;

/// Errors that can occur at the edges of the interaction core
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("Failed to parse frame record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame record: {0}")]
    InvalidRecord(#[from] crate::schema::ValidationError),

    #[error("Scene query failed: {0}")]
    SceneQuery(String),

    #[error("Unknown settings key: {0}")]
    UnknownSetting(String),
}
