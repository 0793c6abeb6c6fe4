//! Navigation error types

use thiserror::Error;

use crate::types::LogicalNavigationId;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("Navigation id must not be empty")]
    EmptyNavigationId,

    #[error("Navigation already completed: {0}")]
    AlreadyCompleted(LogicalNavigationId),

    #[error("Adapter has been detached")]
    Detached,
}

/// Failure of the host policy callback. Always converted into a deny.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Host is not available")]
    Unavailable,

    #[error("Host rejected the request: {0}")]
    Rejected(String),

    #[error("Host policy callback panicked")]
    Panicked,
}
