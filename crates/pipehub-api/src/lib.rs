//! Generated gRPC surface for the PipeHub registration platform.
//!
//! Two proto packages are compiled by `build.rs`:
//! - `registration.v1`: the hub's own service, event and discovery types
//! - `module.v1`: the contract modules implement (`PipeStepProcessor`)

pub mod module {
    pub mod v1 {
        tonic::include_proto!("module.v1");
    }
}

pub mod registration {
    pub mod v1 {
        tonic::include_proto!("registration.v1");
    }
}

/// Protobuf timestamp for the current system time.
pub fn now_timestamp() -> prost_types::Timestamp {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    prost_types::Timestamp {
        seconds: now.as_secs() as i64,
        nanos: now.subsec_nanos() as i32,
    }
}
