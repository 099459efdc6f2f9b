//! Request handlers behind the gRPC surface.

pub mod discovery;
pub mod module;
pub mod registration;
pub mod schema;

use pipehub_api::now_timestamp;
use pipehub_api::registration::v1::{EventType, RegistrationEvent};

/// Build a progress event for a registration stream.
pub(crate) fn create_event(
    event_type: EventType,
    message: &str,
    service_id: Option<&str>,
) -> RegistrationEvent {
    RegistrationEvent {
        event_type: event_type as i32,
        service_id: service_id.unwrap_or_default().to_string(),
        message: message.to_string(),
        error_detail: None,
        timestamp: Some(now_timestamp()),
    }
}

/// Build a terminal FAILED event carrying the failure reason.
pub(crate) fn create_failed_event(
    service_id: Option<&str>,
    message: &str,
    error_detail: &str,
) -> RegistrationEvent {
    RegistrationEvent {
        event_type: EventType::Failed as i32,
        service_id: service_id.unwrap_or_default().to_string(),
        message: message.to_string(),
        error_detail: Some(error_detail.to_string()),
        timestamp: Some(now_timestamp()),
    }
}
