//! Shared error types and identifier derivations for PipeHub.

pub mod error;
pub mod ids;
pub mod schema;

pub use error::{AppError, PipehubError};
