//! Live environments: catalog access and connection management

pub mod catalog;
pub mod connection;

pub use catalog::{CatalogEntry, EnvironmentBackend, DEFINITION_NOT_AVAILABLE};
pub use connection::{EnvironmentInfo, EnvironmentManager, EnvironmentParams, EnvironmentRole};
