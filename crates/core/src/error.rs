//! Error types for Ripple.

use crate::container::ContainerKind;
use crate::key::Key;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Ripple operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for state container operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A container was required but something else was supplied.
    #[error("expected an object or array, got {found}")]
    NotAContainer { found: &'static str },
    /// The key kind does not match the container kind.
    #[error("key {key} is not valid for an {kind}")]
    InvalidKey { key: Key, kind: ContainerKind },
    /// The assignment would make a node reachable from itself.
    #[error("assigning node {node} would create a cycle")]
    Cycle { node: u64 },
    /// The assigned node is bound to a different revision clock.
    #[error("node {node} is bound to a different revision clock")]
    ClockMismatch { node: u64 },
    /// A pending computation failed.
    #[error("pending computation rejected: {reason}")]
    Rejected { reason: String },
    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a not-a-container error.
    pub fn not_a_container(found: &'static str) -> Self {
        Error::NotAContainer { found }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(key: Key, kind: ContainerKind) -> Self {
        Error::InvalidKey { key, kind }
    }

    /// Creates a cycle error.
    pub fn cycle(node: u64) -> Self {
        Error::Cycle { node }
    }

    /// Creates a clock mismatch error.
    pub fn clock_mismatch(node: u64) -> Self {
        Error::ClockMismatch { node }
    }

    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}
