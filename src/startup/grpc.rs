//! gRPC server setup.

use std::net::SocketAddr;

use tonic::transport::Server;
use tracing::{error, info};

use pipehub_api::registration::v1::platform_registration_server::PlatformRegistrationServer;

use crate::service::PlatformRegistrationService;

/// Spawn the registration gRPC server. The handle is kept by the caller
/// for shutdown.
pub fn spawn_grpc_server(
    addr: SocketAddr,
    service: PlatformRegistrationService,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(address = %addr, "Starting registration gRPC server");

        if let Err(e) = Server::builder()
            .add_service(PlatformRegistrationServer::new(service))
            .serve(addr)
            .await
        {
            error!(error = %e, "gRPC server terminated");
        }
    })
}
