//! Platform registration gRPC service.
//!
//! Thin delegation layer: each RPC forwards to the matching handler and
//! maps domain errors onto typed statuses.

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use pipehub_api::registration::v1::platform_registration_server::PlatformRegistration;
use pipehub_api::registration::v1::{
    service_lookup_request::Identifier, GetModuleSchemaRequest, ListModulesRequest,
    ListServicesRequest, ModuleDetails, ModuleListResponse, ModuleRegistrationRequest,
    ModuleSchemaResponse, RegistrationEvent, ServiceDetails, ServiceListResponse,
    ServiceLookupRequest, ServiceRegistrationRequest, ServiceResolveRequest,
    ServiceResolveResponse, UnregisterRequest, UnregisterResponse, WatchModulesRequest,
    WatchServicesRequest,
};
use pipehub_common::PipehubError;

use crate::handler::discovery::ServiceDiscoveryHandler;
use crate::handler::module::ModuleRegistrationHandler;
use crate::handler::registration::ServiceRegistrationHandler;
use crate::handler::schema::SchemaRetrievalHandler;

pub struct PlatformRegistrationService {
    registration: Arc<ServiceRegistrationHandler>,
    modules: Arc<ModuleRegistrationHandler>,
    discovery: ServiceDiscoveryHandler,
    schemas: Arc<SchemaRetrievalHandler>,
}

impl PlatformRegistrationService {
    pub fn new(
        registration: Arc<ServiceRegistrationHandler>,
        modules: Arc<ModuleRegistrationHandler>,
        discovery: ServiceDiscoveryHandler,
        schemas: Arc<SchemaRetrievalHandler>,
    ) -> Self {
        Self {
            registration,
            modules,
            discovery,
            schemas,
        }
    }
}

fn to_status(err: PipehubError) -> Status {
    match err {
        PipehubError::NotFound(message) => Status::not_found(message),
        PipehubError::IllegalArgument(message) => Status::invalid_argument(message),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl PlatformRegistration for PlatformRegistrationService {
    type RegisterServiceStream = ReceiverStream<Result<RegistrationEvent, Status>>;
    type RegisterModuleStream = ReceiverStream<Result<RegistrationEvent, Status>>;
    type WatchServicesStream = ReceiverStream<Result<ServiceListResponse, Status>>;
    type WatchModulesStream = ReceiverStream<Result<ModuleListResponse, Status>>;

    async fn register_service(
        &self,
        request: Request<ServiceRegistrationRequest>,
    ) -> Result<Response<Self::RegisterServiceStream>, Status> {
        let request = request.into_inner();
        info!(service_name = %request.service_name, "Received service registration request");
        Ok(Response::new(self.registration.register_service(request)))
    }

    async fn register_module(
        &self,
        request: Request<ModuleRegistrationRequest>,
    ) -> Result<Response<Self::RegisterModuleStream>, Status> {
        let request = request.into_inner();
        info!(module_name = %request.module_name, "Received module registration request");
        Ok(Response::new(self.modules.register_module(request)))
    }

    async fn unregister_service(
        &self,
        request: Request<UnregisterRequest>,
    ) -> Result<Response<UnregisterResponse>, Status> {
        let request = request.into_inner();
        info!(
            service_name = %request.service_name,
            host = %request.host,
            port = request.port,
            "Received service unregistration request"
        );
        Ok(Response::new(
            self.registration.unregister_service(request).await,
        ))
    }

    async fn unregister_module(
        &self,
        request: Request<UnregisterRequest>,
    ) -> Result<Response<UnregisterResponse>, Status> {
        let request = request.into_inner();
        info!(
            service_name = %request.service_name,
            host = %request.host,
            port = request.port,
            "Received module unregistration request"
        );
        Ok(Response::new(self.modules.unregister_module(request).await))
    }

    async fn list_services(
        &self,
        _request: Request<ListServicesRequest>,
    ) -> Result<Response<ServiceListResponse>, Status> {
        debug!("Received request to list all services");
        Ok(Response::new(self.discovery.list_services().await))
    }

    async fn list_modules(
        &self,
        _request: Request<ListModulesRequest>,
    ) -> Result<Response<ModuleListResponse>, Status> {
        debug!("Received request to list all modules");
        Ok(Response::new(self.discovery.list_modules().await))
    }

    async fn get_service(
        &self,
        request: Request<ServiceLookupRequest>,
    ) -> Result<Response<ServiceDetails>, Status> {
        let details = match request.into_inner().identifier {
            Some(Identifier::ServiceName(name)) => {
                debug!(service_name = %name, "Looking up service by name");
                self.discovery.get_service_by_name(&name).await
            }
            Some(Identifier::ServiceId(id)) => {
                debug!(service_id = %id, "Looking up service by ID");
                self.discovery.get_service_by_id(&id).await
            }
            None => {
                return Err(Status::invalid_argument("Must provide service name or ID"));
            }
        };

        details.map(Response::new).map_err(to_status)
    }

    async fn get_module(
        &self,
        request: Request<ServiceLookupRequest>,
    ) -> Result<Response<ModuleDetails>, Status> {
        let details = match request.into_inner().identifier {
            Some(Identifier::ServiceName(name)) => {
                debug!(module_name = %name, "Looking up module by name");
                self.discovery.get_module_by_name(&name).await
            }
            Some(Identifier::ServiceId(id)) => {
                debug!(module_id = %id, "Looking up module by ID");
                self.discovery.get_module_by_id(&id).await
            }
            None => {
                return Err(Status::invalid_argument("Must provide module name or ID"));
            }
        };

        details.map(Response::new).map_err(to_status)
    }

    async fn resolve_service(
        &self,
        request: Request<ServiceResolveRequest>,
    ) -> Result<Response<ServiceResolveResponse>, Status> {
        let request = request.into_inner();
        info!(
            service_name = %request.service_name,
            prefer_local = request.prefer_local,
            required_tags = ?request.required_tags,
            required_capabilities = ?request.required_capabilities,
            "Resolving service"
        );
        Ok(Response::new(self.discovery.resolve_service(request).await))
    }

    async fn watch_services(
        &self,
        _request: Request<WatchServicesRequest>,
    ) -> Result<Response<Self::WatchServicesStream>, Status> {
        info!("Received request to watch services for real-time updates");
        Ok(Response::new(self.discovery.watch_services()))
    }

    async fn watch_modules(
        &self,
        _request: Request<WatchModulesRequest>,
    ) -> Result<Response<Self::WatchModulesStream>, Status> {
        info!("Received request to watch modules for real-time updates");
        Ok(Response::new(self.discovery.watch_modules()))
    }

    async fn get_module_schema(
        &self,
        request: Request<GetModuleSchemaRequest>,
    ) -> Result<Response<ModuleSchemaResponse>, Status> {
        let request = request.into_inner();
        self.schemas
            .get_module_schema(&request.module_name, request.version.as_deref())
            .await
            .map(Response::new)
            .map_err(to_status)
    }
}
