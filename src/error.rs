// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `Mindor` library.
//!
//! This module provides the error hierarchy for failures across the library:
//! protocol communication (REST and WebSocket), payload parsing, the cloud
//! API envelope, and energy persistence.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while persisting or loading energy records.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The cloud API returned a non-zero error code.
    #[error("API error {errcode}: {msg}")]
    Api {
        /// The `errcode` field of the response envelope.
        errcode: i64,
        /// The `msg` field of the response envelope.
        msg: String,
    },

    /// Device was not found in the state store.
    #[error("device not found")]
    DeviceNotFound,

    /// The push channel is not connected.
    #[error("not connected")]
    NotConnected,
}

/// Errors related to protocol communication (REST/WebSocket).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket connection or communication failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection to the push endpoint failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to parsing cloud payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// Unexpected payload format.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors related to durable energy-record storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = Error::Api {
            errcode: 1004,
            msg: "token expired".to_string(),
        };
        assert_eq!(err.to_string(), "API error 1004: token expired");
    }

    #[test]
    fn error_from_parse_error() {
        let parse_err = ParseError::MissingField("device_id".to_string());
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Parse(ParseError::MissingField(_))));
    }

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::Timeout(10_000);
        assert_eq!(err.to_string(), "request timed out after 10000 ms");
    }

    #[test]
    fn storage_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = StorageError::Io(io);
        assert!(err.to_string().contains("missing"));
    }
}
