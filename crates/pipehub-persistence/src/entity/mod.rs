//! Entity definitions for the registration system of record.

pub mod config_schema;
pub mod service_module;

pub mod prelude {
    pub use super::config_schema::Entity as ConfigSchema;
    pub use super::service_module::Entity as ServiceModule;
}
