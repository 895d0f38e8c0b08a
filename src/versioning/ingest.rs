//! Change ingestion
//!
//! Pulls raw DDL events past the store's watermark and commits the ones
//! that pass the filter as new object versions, one at a time in sequence
//! order.

use crate::error::AppError;
use crate::versioning::audit_log::AuditLogSource;
use crate::versioning::filter::IngestionFilter;
use crate::versioning::model::NewObjectVersion;
use crate::versioning::store::VersionStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Versions committed by this run
    pub inserted: usize,
    /// Events past the watermark that the filter rejected
    pub filtered: usize,
    /// Watermark after the run
    pub watermark: i64,
    /// Set when an insert failed and the rest of the batch was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn status_message(&self) -> String {
        match &self.error {
            None => format!("Sync complete: {} new version(s)", self.inserted),
            Some(e) => format!(
                "Sync stopped after {} new version(s): {}",
                self.inserted, e
            ),
        }
    }
}

pub struct ChangeIngestor {
    store: Arc<dyn VersionStore>,
    log: Arc<dyn AuditLogSource>,
    filter: IngestionFilter,
    /// One sync at a time; concurrent runs would race on the watermark
    running: Mutex<()>,
}

impl ChangeIngestor {
    pub fn new(
        store: Arc<dyn VersionStore>,
        log: Arc<dyn AuditLogSource>,
        filter: IngestionFilter,
    ) -> Self {
        Self {
            store,
            log,
            filter,
            running: Mutex::new(()),
        }
    }

    /// Ingest new events, optionally for one environment.
    ///
    /// Failing to read the watermark or the log is an error. A failed insert
    /// is not: it ends the batch and is reported in the outcome, with every
    /// earlier insert kept.
    pub async fn sync(&self, environment: Option<&str>) -> Result<SyncOutcome, AppError> {
        let _guard = self.running.lock().await;

        let start = self.store.watermark().await?;
        let events = self
            .log
            .events_after(start, environment, &self.filter)
            .await?;
        debug!("{} raw event(s) past watermark {}", events.len(), start);

        let mut outcome = SyncOutcome {
            inserted: 0,
            filtered: 0,
            watermark: start,
            error: None,
        };

        for event in &events {
            if event.sequence_id <= start {
                continue;
            }
            if let Err(reason) = self.filter.check(event) {
                debug!(
                    "Skipping event {} ({}.{}): {:?}",
                    event.sequence_id, event.schema, event.object_name, reason
                );
                outcome.filtered += 1;
                continue;
            }

            match self.store.append(NewObjectVersion::from(event)).await {
                Ok(version) => {
                    outcome.inserted += 1;
                    outcome.watermark = outcome.watermark.max(version.source_sequence_id);
                }
                Err(e) => {
                    warn!(
                        "Ingestion stopped at event {} ({}): {}",
                        event.sequence_id, event.object_name, e
                    );
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        info!(
            "Sync finished: {} inserted, {} filtered, watermark {}",
            outcome.inserted, outcome.filtered, outcome.watermark
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;
    use crate::testing::{raw_event, MemoryVersionStore, ScriptedAuditLog};
    use crate::versioning::model::ObjectKey;
    use pretty_assertions::assert_eq;

    fn ingestor(store: Arc<MemoryVersionStore>, log: Arc<ScriptedAuditLog>) -> ChangeIngestor {
        ChangeIngestor::new(
            store,
            log,
            IngestionFilter::from_config(&IngestionConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_two_events_same_object_get_consecutive_versions() {
        let store = Arc::new(MemoryVersionStore::new());
        let log = Arc::new(ScriptedAuditLog::new(vec![
            raw_event(10, "Sales", "get_order_total", "CREATE PROCEDURE get_order_total AS SELECT 1"),
            raw_event(11, "Sales", "get_order_total", "ALTER PROCEDURE get_order_total AS SELECT 2"),
        ]));

        let outcome = ingestor(store.clone(), log).sync(None).await.unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.watermark, 11);
        let numbers: Vec<(i64, i32)> = store
            .rows()
            .iter()
            .map(|v| (v.source_sequence_id, v.version_number))
            .collect();
        assert_eq!(numbers, vec![(10, 1), (11, 2)]);
    }

    #[tokio::test]
    async fn test_rerun_without_new_events_inserts_nothing() {
        let store = Arc::new(MemoryVersionStore::new());
        let log = Arc::new(ScriptedAuditLog::new(vec![
            raw_event(1, "Sales", "a", "x"),
            raw_event(2, "Sales", "b", "y"),
        ]));
        let ingestor = ingestor(store.clone(), log);

        assert_eq!(ingestor.sync(None).await.unwrap().inserted, 2);
        let again = ingestor.sync(None).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.watermark, 2);
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_versions_are_gap_free_across_runs() {
        let store = Arc::new(MemoryVersionStore::new());
        let log = Arc::new(ScriptedAuditLog::new(vec![raw_event(1, "Sales", "p", "v1")]));
        let ingestor = ingestor(store.clone(), log.clone());
        ingestor.sync(None).await.unwrap();

        log.push(raw_event(5, "Sales", "p", "v2"));
        log.push(raw_event(6, "Sales", "q", "q1"));
        log.push(raw_event(9, "Sales", "p", "v3"));
        ingestor.sync(None).await.unwrap();

        let history = store.history(&ObjectKey::new("Sales", "dbo", "p")).await.unwrap();
        let numbers: Vec<i32> = history.iter().rev().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(history[0].definition, "v3");
    }

    #[tokio::test]
    async fn test_filtered_events_are_counted_not_stored() {
        let store = Arc::new(MemoryVersionStore::new());
        let mut job = raw_event(3, "Sales", "nightly", "x");
        job.actor.program = Some("SQLAgent - TSQL JobStep".into());
        let mut temp = raw_event(4, "Sales", "tmp_load", "x");
        temp.object_kind = "VIEW".into();
        let log = Arc::new(ScriptedAuditLog::new(vec![
            job,
            temp,
            raw_event(5, "Sales", "kept", "x"),
        ]));

        let outcome = ingestor(store.clone(), log).sync(None).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.filtered, 2);
        assert_eq!(store.rows()[0].object_name, "kept");
    }

    #[tokio::test]
    async fn test_insert_failure_keeps_earlier_rows_and_resumes() {
        let store = Arc::new(MemoryVersionStore::new());
        let log = Arc::new(ScriptedAuditLog::new(vec![
            raw_event(1, "Sales", "a", "x"),
            raw_event(2, "Sales", "b", "y"),
            raw_event(3, "Sales", "c", "z"),
        ]));
        store.fail_on(2);
        let ingestor = ingestor(store.clone(), log);

        let outcome = ingestor.sync(None).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.watermark, 1);
        assert!(!outcome.is_complete());
        assert!(outcome.status_message().starts_with("Sync stopped after 1"));

        store.fail_on(0);
        let resumed = ingestor.sync(None).await.unwrap();
        assert_eq!(resumed.inserted, 2);
        assert_eq!(resumed.watermark, 3);
    }

    #[tokio::test]
    async fn test_environment_filter() {
        let store = Arc::new(MemoryVersionStore::new());
        let log = Arc::new(ScriptedAuditLog::new(vec![
            raw_event(1, "Sales", "a", "x"),
            raw_event(2, "Billing", "a", "y"),
        ]));

        let outcome = ingestor(store.clone(), log).sync(Some("Billing")).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.rows()[0].environment, "Billing");
    }
}
