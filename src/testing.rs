//! In-memory backends for unit tests

use crate::environment::catalog::{CatalogEntry, EnvironmentBackend};
use crate::error::AppError;
use crate::versioning::audit_log::AuditLogSource;
use crate::versioning::filter::IngestionFilter;
use crate::versioning::model::{
    Actor, NewObjectVersion, ObjectKey, ObjectVersion, RawChangeEvent, TrackedObject,
};
use crate::versioning::store::VersionStore;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn ssms_actor() -> Actor {
    Actor {
        login: "jdoe".into(),
        host: "WS042".into(),
        ip: Some("10.0.0.42".into()),
        program: Some("Microsoft SQL Server Management Studio - Query".into()),
    }
}

pub fn raw_event(sequence_id: i64, environment: &str, name: &str, command_text: &str) -> RawChangeEvent {
    RawChangeEvent {
        sequence_id,
        environment: environment.into(),
        event_kind: "ALTER_PROCEDURE".into(),
        object_kind: "PROCEDURE".into(),
        schema: "dbo".into(),
        object_name: name.into(),
        command_text: command_text.into(),
        actor: ssms_actor(),
        occurred_at: Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap() + Duration::minutes(sequence_id),
    }
}

/// Version store kept in a vector
#[derive(Default)]
pub struct MemoryVersionStore {
    rows: Mutex<Vec<ObjectVersion>>,
    fail_on_sequence: Mutex<Option<i64>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the append of this source sequence id fail
    pub fn fail_on(&self, sequence_id: i64) {
        *self.fail_on_sequence.lock().unwrap() = Some(sequence_id);
    }

    pub fn rows(&self) -> Vec<ObjectVersion> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn watermark(&self) -> Result<i64, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|v| v.source_sequence_id)
            .max()
            .unwrap_or(0))
    }

    async fn append(&self, version: NewObjectVersion) -> Result<ObjectVersion, AppError> {
        if *self.fail_on_sequence.lock().unwrap() == Some(version.source_sequence_id) {
            return Err(AppError::Internal("duplicate key value".into()));
        }

        let mut rows = self.rows.lock().unwrap();
        let version_number = rows
            .iter()
            .filter(|v| v.key() == version.key)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        let stored = ObjectVersion {
            version_id: rows.len() as i64 + 1,
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
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn history(&self, key: &ObjectKey) -> Result<Vec<ObjectVersion>, AppError> {
        let mut versions: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|v| &v.key() == key)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn get(&self, version_id: i64) -> Result<Option<ObjectVersion>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned())
    }

    async fn recent_changes(
        &self,
        environment: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ObjectVersion>, AppError> {
        let mut versions: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|v| environment.map_or(true, |e| v.environment == e))
            .cloned()
            .collect();
        versions.sort_by(|a, b| {
            b.changed_at
                .cmp(&a.changed_at)
                .then(b.version_id.cmp(&a.version_id))
        });
        versions.truncate(limit.max(0) as usize);
        Ok(versions)
    }

    async fn tracked_objects(&self, environment: &str) -> Result<Vec<TrackedObject>, AppError> {
        let mut grouped: BTreeMap<(String, String), TrackedObject> = BTreeMap::new();
        for v in self.rows.lock().unwrap().iter().filter(|v| v.environment == environment) {
            let entry = grouped
                .entry((v.schema.clone(), v.object_name.clone()))
                .or_insert_with(|| TrackedObject {
                    environment: v.environment.clone(),
                    schema: v.schema.clone(),
                    object_name: v.object_name.clone(),
                    object_kind: v.object_kind.clone(),
                    version_count: 0,
                    last_changed: None,
                });
            entry.version_count += 1;
            entry.last_changed = entry.last_changed.max(Some(v.changed_at));
        }
        Ok(grouped.into_values().collect())
    }

    async fn latest_version_number(&self, key: &ObjectKey) -> Result<Option<i32>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|v| &v.key() == key)
            .map(|v| v.version_number)
            .max())
    }
}

/// Audit log returning a fixed list of events; does not filter
pub struct ScriptedAuditLog {
    events: Mutex<Vec<RawChangeEvent>>,
}

impl ScriptedAuditLog {
    pub fn new(events: Vec<RawChangeEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }

    pub fn push(&self, event: RawChangeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl AuditLogSource for ScriptedAuditLog {
    async fn events_after(
        &self,
        watermark: i64,
        environment: Option<&str>,
        _filter: &IngestionFilter,
    ) -> Result<Vec<RawChangeEvent>, AppError> {
        let mut events: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.sequence_id > watermark)
            .filter(|e| environment.map_or(true, |env| e.environment == env))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence_id);
        Ok(events)
    }
}

/// Live environment backed by a map of definitions
pub struct ScriptedEnvironment {
    name: String,
    objects: Mutex<BTreeMap<(String, String), (String, Option<String>)>>,
    executed: Mutex<Vec<String>>,
    reject_containing: Mutex<Option<String>>,
    fail_fetch: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl ScriptedEnvironment {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            objects: Mutex::new(BTreeMap::new()),
            executed: Mutex::new(Vec::new()),
            reject_containing: Mutex::new(None),
            fail_fetch: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with(self, schema: &str, name: &str, definition: &str) -> Self {
        self.put(schema, name, definition);
        self
    }

    pub fn put(&self, schema: &str, name: &str, definition: &str) {
        self.objects.lock().unwrap().insert(
            (schema.into(), name.into()),
            ("SQL_STORED_PROCEDURE".into(), Some(definition.into())),
        );
    }

    /// Listed in the catalog but without a readable definition
    pub fn with_hidden(self, schema: &str, name: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((schema.into(), name.into()), ("SQL_STORED_PROCEDURE".into(), None));
        self
    }

    /// Reject any batch containing `needle`
    pub fn reject_batches_containing(&self, needle: &str) {
        *self.reject_containing.lock().unwrap() = Some(needle.into());
    }

    /// Make definition fetches of `name` fail
    pub fn fail_fetch_of(&self, name: &str) {
        *self.fail_fetch.lock().unwrap() = Some(name.into());
    }

    pub fn remove(&self, schema: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(schema.to_string(), name.to_string()));
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnvironmentBackend for ScriptedEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_objects(&self) -> Result<Vec<CatalogEntry>, AppError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|((schema, name), (kind, _))| CatalogEntry::new(schema.clone(), name.clone(), kind.clone()))
            .collect())
    }

    async fn fetch_definition(&self, schema: &str, name: &str) -> Result<Option<String>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.lock().unwrap().as_deref() == Some(name) {
            return Err(AppError::Connectivity("Connection reset by peer".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(schema.to_string(), name.to_string()))
            .and_then(|(_, def)| def.clone()))
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), AppError> {
        if let Some(needle) = self.reject_containing.lock().unwrap().as_deref() {
            if sql.contains(needle) {
                return Err(AppError::Connectivity(format!("Invalid object name '{}'", needle)));
            }
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}
