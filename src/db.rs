//! Version store connection management
//!
//! Builds the PostgreSQL pool that backs the object history and
//! provisions its schema.

pub mod mssql;
pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Managed hosts that refuse plaintext connections
const TLS_HOST_MARKERS: &[&str] = &["neon.tech", "supabase.co", "azure.com", "rds.amazonaws.com"];

/// Whether the metadata database must be reached over TLS
pub fn requires_tls(config: &DatabaseConfig) -> bool {
    let explicit = std::env::var("DATABASE_URL")
        .map(|url| url.contains("sslmode=require"))
        .unwrap_or(false);
    explicit || TLS_HOST_MARKERS.iter().any(|m| config.host.contains(m))
}

/// Create the connection pool and verify it can reach the server
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let use_tls = requires_tls(config);

    let pool = if use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?
    };

    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    drop(client);

    info!(
        "Version store reachable at {}:{}/{} (TLS: {})",
        config.host, config.port, config.database, use_tls
    );
    Ok(pool)
}

/// Create the history table and its indexes if they don't exist
pub async fn ensure_schema(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;

    client.execute(queries::CREATE_OBJECT_VERSIONS, &[]).await?;
    client.execute(queries::CREATE_INDEX_OBJECT, &[]).await?;
    client.execute(queries::CREATE_INDEX_CHANGED_AT, &[]).await?;
    client.execute(queries::CREATE_INDEX_SOURCE_SEQUENCE, &[]).await?;

    debug!("object_versions schema verified");
    Ok(())
}
