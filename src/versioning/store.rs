//! Version Store
//!
//! The single writer of `object_versions`. Think of this as "git log" for
//! each stored procedure, function, view and trigger.

use crate::db::{self, queries};
use crate::error::AppError;
use crate::versioning::model::{Actor, NewObjectVersion, ObjectKey, ObjectVersion, TrackedObject};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::debug;

/// Read/write access to the versioned object history
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Create the backing table on first use
    async fn ensure_schema(&self) -> Result<(), AppError>;

    /// Highest audit-log sequence id already recorded (0 when empty)
    async fn watermark(&self) -> Result<i64, AppError>;

    /// Append a version as `1 + max(version_number)` for its key
    async fn append(&self, version: NewObjectVersion) -> Result<ObjectVersion, AppError>;

    /// All versions of one object, newest first
    async fn history(&self, key: &ObjectKey) -> Result<Vec<ObjectVersion>, AppError>;

    async fn get(&self, version_id: i64) -> Result<Option<ObjectVersion>, AppError>;

    /// Latest changes across objects, newest first
    async fn recent_changes(
        &self,
        environment: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ObjectVersion>, AppError>;

    async fn tracked_objects(&self, environment: &str) -> Result<Vec<TrackedObject>, AppError>;

    async fn latest_version_number(&self, key: &ObjectKey) -> Result<Option<i32>, AppError>;
}

/// PostgreSQL-backed version store
pub struct PgVersionStore {
    pool: Pool,
}

impl PgVersionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn decode(row: &Row) -> ObjectVersion {
        ObjectVersion {
            version_id: row.get(0),
            environment: row.get(1),
            schema: row.get(2),
            object_name: row.get(3),
            object_kind: row.get(4),
            definition: row.get(5),
            event_kind: row.get(6),
            actor: Actor {
                login: row.get(7),
                host: row.get(8),
                ip: row.get(9),
                program: row.get(10),
            },
            changed_at: row.get(11),
            version_number: row.get(12),
            source_sequence_id: row.get(13),
        }
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        db::ensure_schema(&self.pool).await
    }

    async fn watermark(&self) -> Result<i64, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(queries::SELECT_WATERMARK, &[]).await?;
        Ok(row.get(0))
    }

    async fn append(&self, version: NewObjectVersion) -> Result<ObjectVersion, AppError> {
        let client = self.pool.get().await?;

        let row = client
            .query_one(
                queries::INSERT_VERSION,
                &[
                    &version.key.environment,
                    &version.key.schema,
                    &version.key.name,
                    &version.object_kind,
                    &version.definition,
                    &version.event_kind,
                    &version.actor.login,
                    &version.actor.host,
                    &version.actor.ip,
                    &version.actor.program,
                    &version.changed_at,
                    &version.source_sequence_id,
                ],
            )
            .await?;

        let version_id: i64 = row.get(0);
        let version_number: i32 = row.get(1);

        debug!("Recorded {} as v{} (id {})", version.key, version_number, version_id);

        Ok(ObjectVersion {
            version_id,
            environment: version.key.environment,
            schema: version.key.schema,
            object_name: version.key.name,
            object_kind: version.object_kind,
            definition: version.definition,
            event_kind: version.event_kind,
            actor: version.actor,
            changed_at: version.changed_at,
            version_number,
            source_sequence_id: version.source_sequence_id,
        })
    }

    async fn history(&self, key: &ObjectKey) -> Result<Vec<ObjectVersion>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &queries::select_history(),
                &[&key.environment, &key.schema, &key.name],
            )
            .await?;
        Ok(rows.iter().map(Self::decode).collect())
    }

    async fn get(&self, version_id: i64) -> Result<Option<ObjectVersion>, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_opt(&queries::select_version(), &[&version_id]).await?;
        Ok(row.as_ref().map(Self::decode))
    }

    async fn recent_changes(
        &self,
        environment: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ObjectVersion>, AppError> {
        let client = self.pool.get().await?;
        let environment = environment.unwrap_or("");
        let rows = client
            .query(&queries::select_recent(), &[&environment, &limit])
            .await?;
        Ok(rows.iter().map(Self::decode).collect())
    }

    async fn tracked_objects(&self, environment: &str) -> Result<Vec<TrackedObject>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::SELECT_TRACKED_OBJECTS, &[&environment])
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| TrackedObject {
                environment: r.get(0),
                schema: r.get(1),
                object_name: r.get(2),
                object_kind: r.get(3),
                version_count: r.get(4),
                last_changed: r.get(5),
            })
            .collect())
    }

    async fn latest_version_number(&self, key: &ObjectKey) -> Result<Option<i32>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                queries::SELECT_LATEST_VERSION_NUMBER,
                &[&key.environment, &key.schema, &key.name],
            )
            .await?;
        Ok(row.get(0))
    }
}
