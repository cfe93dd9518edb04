//! Error types for the flomokit library.
//!
//! This module defines the error taxonomy shared by the request signer, the
//! paginated fetch engine, the graph builder and the exporters.

use std::io;

use thiserror::Error;

/// The main error type for flomokit.
#[derive(Error, Debug)]
pub enum FlomoError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised while writing row-oriented exports.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The request never produced a response (connection, timeout, TLS).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The server answered with a status other than 200.
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// The response envelope carried a non-zero application code.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body was not a decodable envelope.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// A timestamp could not be parsed.
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl From<reqwest::Error> for FlomoError {
    fn from(err: reqwest::Error) -> Self {
        FlomoError::Transport {
            message: err.to_string(),
        }
    }
}
