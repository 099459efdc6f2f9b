//! Status enums stored as strings in the two registration tables.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered service module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Inactive,
    Unhealthy,
    Maintenance,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "ACTIVE",
            ServiceStatus::Inactive => "INACTIVE",
            ServiceStatus::Unhealthy => "UNHEALTHY",
            ServiceStatus::Maintenance => "MAINTENANCE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(ServiceStatus::Active),
            "INACTIVE" => Some(ServiceStatus::Inactive),
            "UNHEALTHY" => Some(ServiceStatus::Unhealthy),
            "MAINTENANCE" => Some(ServiceStatus::Maintenance),
            _ => None,
        }
    }
}

/// Synchronization status of a schema with the artifact registry.
///
/// Transitions: PENDING → SYNCED | FAILED; SYNCED → OUT_OF_SYNC (set by
/// external edit tooling); OUT_OF_SYNC/FAILED → SYNCED | FAILED via the
/// sync reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
    OutOfSync,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
            SyncStatus::OutOfSync => "OUT_OF_SYNC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(SyncStatus::Pending),
            "SYNCED" => Some(SyncStatus::Synced),
            "FAILED" => Some(SyncStatus::Failed),
            "OUT_OF_SYNC" => Some(SyncStatus::OutOfSync),
            _ => None,
        }
    }
}
