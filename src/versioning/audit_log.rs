//! Raw DDL audit log access
//!
//! The log is written by a server-level DDL trigger into a table on the
//! audit server. We only ever read it.

use crate::config::AuditLogConfig;
use crate::db::mssql::{self, MssqlParams};
use crate::db::queries;
use crate::error::AppError;
use crate::versioning::filter::IngestionFilter;
use crate::versioning::model::{Actor, RawChangeEvent};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use tracing::debug;

/// Source of raw change events, ordered by sequence id
#[async_trait]
pub trait AuditLogSource: Send + Sync {
    /// Events with `sequence_id > watermark`, ascending. `filter` may be
    /// applied by the source; callers re-check it regardless.
    async fn events_after(
        &self,
        watermark: i64,
        environment: Option<&str>,
        filter: &IngestionFilter,
    ) -> Result<Vec<RawChangeEvent>, AppError>;
}

/// Audit log table on a SQL Server instance
pub struct SqlServerAuditLog {
    params: MssqlParams,
    table: String,
}

impl SqlServerAuditLog {
    pub fn new(config: &AuditLogConfig) -> Self {
        Self {
            params: MssqlParams {
                host: config.host.clone(),
                port: config.port,
                database: config.database.clone(),
                user: config.user.clone(),
                password: config.password.clone(),
                trust_cert: config.trust_cert,
            },
            table: config.table.clone(),
        }
    }

    fn decode(row: &tiberius::Row) -> Result<RawChangeEvent, AppError> {
        let occurred_at = row
            .try_get::<NaiveDateTime, usize>(11)?
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| AppError::Internal("Audit log row without CreatedOn".to_string()))?;

        Ok(RawChangeEvent {
            sequence_id: row.try_get::<i64, usize>(0)?.unwrap_or_default(),
            environment: mssql::text(row, 1)?,
            event_kind: mssql::text(row, 2)?,
            object_kind: mssql::text(row, 3)?,
            schema: mssql::text(row, 4)?,
            object_name: mssql::text(row, 5)?,
            command_text: mssql::text(row, 6)?,
            actor: Actor {
                host: mssql::text(row, 7)?,
                login: mssql::text(row, 8)?,
                ip: mssql::optional_text(row, 9)?,
                program: mssql::optional_text(row, 10)?,
            },
            occurred_at,
        })
    }
}

#[async_trait]
impl AuditLogSource for SqlServerAuditLog {
    async fn events_after(
        &self,
        watermark: i64,
        environment: Option<&str>,
        filter: &IngestionFilter,
    ) -> Result<Vec<RawChangeEvent>, AppError> {
        let sql = format!(
            "{}{} ORDER BY Id ASC",
            queries::select_audit_log(&self.table),
            filter.sql_predicates()
        );
        debug!("Reading audit log past {}: {}", watermark, sql);

        let mut client = mssql::connect(&self.params).await?;
        let environment = environment.unwrap_or("");
        let rows = client
            .query(sql.as_str(), &[&watermark, &environment])
            .await?
            .into_first_result()
            .await?;

        rows.iter().map(Self::decode).collect()
    }
}
