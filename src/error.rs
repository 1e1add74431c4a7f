//! # Error Types
//!
//! Custom error types for the uplink pipeline using `thiserror`.

use thiserror::Error;

/// Main error type for the tracker uplink pipeline
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Malformed event, payload encoding or frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Fragment window does not hold the declared number of fragments
    #[error("Incomplete fragment group for {device_id}: expected {expected} fragments, found {found}")]
    IncompleteGroup {
        device_id: String,
        expected: usize,
        found: usize,
    },

    /// Fragment group has no head fragment (usually aged out of the window)
    #[error("Missing head fragment for {device_id} in sequence range {first_seq}..={last_seq}")]
    MissingHead {
        device_id: String,
        first_seq: u64,
        last_seq: u64,
    },

    /// Geolocation oracle rejected the request or returned an unusable answer
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Store, oracle or sink unavailable
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the uplink pipeline
pub type Result<T> = std::result::Result<T, TrackerError>;
