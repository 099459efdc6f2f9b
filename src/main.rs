use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use pipehub::handler::discovery::ServiceDiscoveryHandler;
use pipehub::handler::module::ModuleRegistrationHandler;
use pipehub::handler::registration::ServiceRegistrationHandler;
use pipehub::handler::schema::SchemaRetrievalHandler;
use pipehub::health::{readiness_route, DependentServicesHealth};
use pipehub::module_client::GrpcModuleStubFactory;
use pipehub::service::PlatformRegistrationService;
use pipehub::settings;
use pipehub::startup;
use pipehub_apicurio::{ApicurioClient, SchemaRegistryClient};
use pipehub_consul::{ConsulClient, ConsulHealthChecker, DiscoveryClient};
use pipehub_events::{EventPublisher, KafkaConfig, KafkaEventPublisher};
use pipehub_persistence::{RegistryStore, SqlRegistryStore};

#[derive(Parser)]
#[command(version, about = "PipeHub service registration and discovery hub")]
struct Cli {
    #[arg(short = 'c', long = "config", default_value = "conf/application.yml")]
    config: String,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let settings = settings::load(&args.config)?;

    let _logging_guard =
        startup::logging::init_logging(&startup::logging::LoggingConfig::from_env())?;

    let db = connect_database(&settings.database).await?;

    // External collaborators; all shared as singletons
    let consul: Arc<dyn DiscoveryClient> =
        Arc::new(ConsulClient::new(&settings.consul.host, settings.consul.port)?);
    let apicurio: Arc<dyn SchemaRegistryClient> =
        Arc::new(ApicurioClient::new(&settings.apicurio.url)?);
    let events: Arc<dyn EventPublisher> = Arc::new(KafkaEventPublisher::new(KafkaConfig::new(
        settings.kafka.bootstrap_servers.clone(),
    ))?);
    let store: Arc<dyn RegistryStore> =
        Arc::new(SqlRegistryStore::new(db.clone(), apicurio.clone()));

    let health_checker = Arc::new(ConsulHealthChecker::new(consul.clone()));
    let stubs = Arc::new(GrpcModuleStubFactory::new(consul.clone()));

    let registration_handler = Arc::new(ServiceRegistrationHandler::new(
        consul.clone(),
        health_checker.clone(),
        events.clone(),
    ));
    let module_handler = Arc::new(ModuleRegistrationHandler::new(
        consul.clone(),
        health_checker.clone(),
        store.clone(),
        apicurio.clone(),
        stubs.clone(),
        events.clone(),
    ));
    let discovery_handler = ServiceDiscoveryHandler::new(consul.clone());
    let schema_handler = Arc::new(SchemaRetrievalHandler::new(
        store.clone(),
        apicurio.clone(),
        stubs.clone(),
    ));

    let grpc_service = PlatformRegistrationService::new(
        registration_handler.clone(),
        module_handler,
        discovery_handler,
        schema_handler,
    );

    let grpc_addr = format!("{}:{}", settings.server.address, settings.server.grpc_port).parse()?;
    let _grpc_server = startup::grpc::spawn_grpc_server(grpc_addr, grpc_service);

    startup::self_register::self_register(
        registration_handler,
        &settings.registration,
        env!("CARGO_PKG_VERSION"),
    );

    let health = web::Data::new(DependentServicesHealth::new(
        db,
        consul.clone(),
        apicurio.clone(),
    ));

    info!(
        address = %settings.server.address,
        port = settings.server.http_port,
        "Starting readiness HTTP server"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(health.clone())
            .route("/health/ready", web::get().to(readiness_route))
    })
    .bind((settings.server.address.as_str(), settings.server.http_port))?
    .run()
    .await?;

    Ok(())
}

async fn connect_database(
    settings: &settings::DatabaseSettings,
) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut options = ConnectOptions::new(settings.url.clone());
    options
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(settings.max_lifetime_secs));

    Database::connect(options).await
}
