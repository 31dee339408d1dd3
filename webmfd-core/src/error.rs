//! Error types for webmfd-core

use thiserror::Error;

/// Top-level error type for webmfd-core
#[derive(Error, Debug)]
pub enum WebMfdError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Errors related to session management
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session key already registered: {0}")]
    DuplicateKey(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Connection-level failures of a transport channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Channel for session {0} is closed")]
    Closed(String),

    #[error("Failed to send frame: {0}")]
    Send(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors from encoding or decoding button events and label sets
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("Button code {0} is not in the reserved set")]
    InvalidCode(i32),

    #[error("Unknown button: {0}")]
    UnknownButton(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("{0} is handled locally and has no wire code")]
    NotSendable(String),
}

/// Errors from parsing externally supplied session keys
#[derive(Error, Debug, PartialEq)]
pub enum KeyError {
    #[error("Session key must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Session key contains invalid character {0:?}")]
    InvalidCharacter(char),
}
