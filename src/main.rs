//! SQL object version control server
//!
//! Records every change to stored procedures, functions, views and
//! triggers from a DDL audit log, compares objects across environments
//! and deploys or rolls back definitions with an idempotent
//! `CREATE OR ALTER` transform.
//!
//! The version history lives in PostgreSQL; environments and the audit
//! log are SQL Server databases.

mod compare;
mod config;
mod credentials;
mod db;
mod deploy;
mod environment;
mod error;
mod highlight;
mod models;
mod routes;
mod state;
mod versioning;

#[cfg(test)]
mod testing;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use crate::versioning::{PgVersionStore, SqlServerAuditLog, VersionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting SQL object version control server...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let pool = match db::create_pool(&settings.database).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("❌ FATAL: Failed to reach the version store: {}", e);
            error!("DATABASE_URL (or DB_*) must point at an accessible PostgreSQL database");
            return Err(e.into());
        }
    };

    let store = Arc::new(PgVersionStore::new(pool));
    store.ensure_schema().await?;
    info!("✅ Version store ready");

    let audit_log = Arc::new(SqlServerAuditLog::new(&settings.audit_log));
    info!(
        "📜 Audit log: {} on {}:{}",
        settings.audit_log.table, settings.audit_log.host, settings.audit_log.port
    );

    let state = Arc::new(AppState::new(store, audit_log, &settings));
    let app = create_router(state.clone(), &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Environments ───");
    info!("   POST   /api/environments                 - Connect source/target/target2");
    info!("   GET    /api/environments                 - List connected environments");
    info!("   DELETE /api/environments/{{role}}          - Disconnect an environment");
    info!("");
    info!("   ─── Version History ───");
    info!("   POST /api/sync                           - Ingest new audit-log events");
    info!("   GET  /api/history/recent                 - Recent changes");
    info!("   GET  /api/history/objects                - Tracked objects per environment");
    info!("   GET  /api/history/{{env}}/{{schema}}/{{name}}  - Versions of one object");
    info!("   GET  /api/versions/{{id}}                  - One version");
    info!("   GET  /api/versions/diff?from=&to=        - Diff two versions");
    info!("");
    info!("   ─── Comparison & Deploy ───");
    info!("   POST /api/compare/{{pair}}/load            - Load both catalogs");
    info!("   POST /api/compare/{{pair}}/scan            - Deep compare definitions");
    info!("   GET  /api/compare/{{pair}}/objects         - Filtered object list");
    info!("   POST /api/compare/{{pair}}/selection       - Change deploy selection");
    info!("   POST /api/compare/{{pair}}/deploy          - Deploy selected objects");
    info!("   POST /api/rollback                       - Re-apply a recorded version");
    info!("");
    info!("   POST /api/highlight                      - Tokenize T-SQL");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlvc_server=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
