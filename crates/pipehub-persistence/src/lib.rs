//! PipeHub Persistence - system of record for registrations
//!
//! This crate provides:
//! - SeaORM entity definitions for `modules` and `config_schemas`
//! - The [`traits::RegistryStore`] interface
//! - The SQL implementation with explicit transactions
//!
//! Table schemas are managed by the versioned SQL files under `migrations/`
//! at the repository root; the application never creates tables at runtime.

pub mod entity;
pub mod model;
pub mod store;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use model::{ServiceStatus, SyncStatus};
pub use store::SqlRegistryStore;
pub use traits::RegistryStore;
