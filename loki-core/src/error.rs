//! Error types for Loki

use thiserror::Error;

/// Result type alias for Loki operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Loki
#[derive(Error, Debug)]
pub enum Error {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-specific error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid parameter error
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Interface not found
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    /// Interface error
    #[error("Interface error: {0}")]
    Interface(String),

    /// Packet construction error
    #[error("Packet construction error: {0}")]
    PacketConstruction(String),

    /// Packet parsing error
    #[error("Packet parsing error: {0}")]
    PacketParsing(String),

    /// Capture error
    #[error("Packet capture error: {0}")]
    Capture(String),

    /// Injection error
    #[error("Injection error: {0}")]
    Injection(String),

    /// Insufficient privileges
    #[error("Insufficient privileges: {0}")]
    InsufficientPrivileges(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Module lifecycle misuse (start twice, command to a stopped module, ...)
    #[error("Module '{module}': {reason}")]
    ModuleState { module: String, reason: String },
}

impl Error {
    /// Create a protocol error with a custom message
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a parsing error with a custom message
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        Error::PacketParsing(msg.into())
    }

    /// Create a packet construction error
    pub fn construction<S: Into<String>>(msg: S) -> Self {
        Error::PacketConstruction(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a module state error
    pub fn module_state<S: Into<String>>(module: S, reason: S) -> Self {
        Error::ModuleState {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand used by decoders when input runs out
    pub fn truncated(what: &str, need: usize, have: usize) -> Self {
        Error::PacketParsing(format!(
            "{} truncated: need {} bytes, have {}",
            what, need, have
        ))
    }
}
