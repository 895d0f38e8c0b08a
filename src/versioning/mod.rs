//! Versioned object history: raw log ingestion and the version store

pub mod audit_log;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod store;

pub use audit_log::{AuditLogSource, SqlServerAuditLog};
pub use filter::IngestionFilter;
pub use ingest::{ChangeIngestor, SyncOutcome};
pub use model::{ObjectKey, ObjectVersion, VersionSummary};
pub use store::{PgVersionStore, VersionStore};
