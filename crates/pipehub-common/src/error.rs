//! Error types for PipeHub
//!
//! `PipehubError` carries the domain failures that map onto typed RPC
//! statuses at the gRPC boundary; everything else travels as `anyhow::Error`.

use std::fmt::{Display, Formatter};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum PipehubError {
    #[error("{0}")]
    IllegalArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("discovery agent error: {0}")]
    DiscoveryError(String),

    #[error("schema registry error: {0}")]
    RegistryError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}
