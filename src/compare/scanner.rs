//! Reconciliation scanner
//!
//! Owns the reconciled object list for one pair of environments. Catalog
//! loads rebuild the list and bump a generation counter; the deep scan
//! fetches definitions without holding the state lock and only writes its
//! results back while the generation it started from is still current.

use crate::compare::diff::{line_diff, DiffLine, DiffStats};
use crate::compare::filter::{is_visible, showing_label};
use crate::compare::normalize::definitions_equal;
use crate::compare::reconcile::{
    merge_catalogs, CompareStatus, ObjectId, ReconciledObject, StatusCounts,
};
use crate::environment::catalog::{definition_or_sentinel, EnvironmentBackend};
use crate::error::AppError;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Running position of a deep scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub running: bool,
    pub generation: u64,
}

/// Outcome of a deep scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub counts: StatusCounts,
    /// Objects compared by this run
    pub compared: usize,
    /// The catalog was reloaded while scanning; remaining results were dropped
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanSummary {
    pub fn status_message(&self) -> String {
        let counts = format!(
            "{} modified, {} identical, {} source only, {} target only",
            self.counts.modified,
            self.counts.identical,
            self.counts.source_only,
            self.counts.target_only
        );
        if self.stale {
            format!("Scan abandoned after the catalog was reloaded ({})", counts)
        } else if let Some(error) = &self.error {
            format!("Scan stopped: {} ({})", error, counts)
        } else {
            format!("Scan complete: {}", counts)
        }
    }
}

/// A filtered view of the reconciled list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListing {
    pub objects: Vec<ReconciledObject>,
    pub visible: usize,
    pub total: usize,
    pub label: String,
    pub selected: usize,
    pub counts: StatusCounts,
}

/// Both definitions of one object plus their aligned diff
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectComparison {
    pub object: ReconciledObject,
    /// `None` when the object does not exist on that side
    pub source_definition: Option<String>,
    pub target_definition: Option<String>,
    pub diff: Vec<DiffLine>,
    pub stats: DiffStats,
}

struct ScanState {
    generation: u64,
    objects: Vec<ReconciledObject>,
    source: Option<Arc<dyn EnvironmentBackend>>,
    target: Option<Arc<dyn EnvironmentBackend>>,
}

impl ScanState {
    fn position(&self, id: &ObjectId) -> Option<usize> {
        self.objects
            .binary_search_by(|o| (o.schema.as_str(), o.name.as_str()).cmp(&(id.schema.as_str(), id.name.as_str())))
            .ok()
    }

    fn find_mut(&mut self, id: &ObjectId) -> Option<&mut ReconciledObject> {
        self.position(id).map(move |i| &mut self.objects[i])
    }
}

fn record_comparison(object: &mut ReconciledObject, source: String, target: String) {
    object.status = if definitions_equal(&source, &target) {
        CompareStatus::Identical
    } else {
        CompareStatus::Modified
    };
    object.source_definition = Some(source);
    object.target_definition = Some(target);
    object.compared = true;
}

pub struct ReconciliationScanner {
    label: &'static str,
    state: RwLock<ScanState>,
    progress: watch::Sender<ScanProgress>,
    scanning: Mutex<()>,
}

impl ReconciliationScanner {
    pub fn new(label: &'static str) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        Self {
            label,
            state: RwLock::new(ScanState {
                generation: 0,
                objects: Vec::new(),
                source: None,
                target: None,
            }),
            progress,
            scanning: Mutex::new(()),
        }
    }

    /// Rebuild the list from live catalogs.
    ///
    /// Statuses, cached definitions and compared flags start over; the
    /// selection survives for keys that are still present. Any scan in
    /// flight becomes stale.
    pub async fn load(
        &self,
        source: Option<Arc<dyn EnvironmentBackend>>,
        target: Option<Arc<dyn EnvironmentBackend>>,
    ) -> Result<StatusCounts, AppError> {
        let source_catalog = match &source {
            Some(backend) => backend.list_objects().await?,
            None => Vec::new(),
        };
        let target_catalog = match &target {
            Some(backend) => backend.list_objects().await?,
            None => Vec::new(),
        };

        let mut merged = merge_catalogs(&source_catalog, &target_catalog);

        let mut state = self.state.write().await;
        let selected: HashSet<ObjectId> = state
            .objects
            .iter()
            .filter(|o| o.selected)
            .map(ReconciledObject::id)
            .collect();
        for object in &mut merged {
            object.selected = selected.contains(&object.id());
        }

        state.generation += 1;
        state.objects = merged;
        state.source = source;
        state.target = target;

        let counts = StatusCounts::of(&state.objects);
        let generation = state.generation;
        drop(state);

        self.progress.send_replace(ScanProgress {
            generation,
            ..ScanProgress::default()
        });

        info!(
            "{} catalog loaded: {} object(s), {} source only, {} target only",
            self.label, counts.total, counts.source_only, counts.target_only
        );
        Ok(counts)
    }

    /// Load again from the environments of the last load
    pub async fn reload(&self) -> Result<StatusCounts, AppError> {
        let (source, target) = {
            let state = self.state.read().await;
            (state.source.clone(), state.target.clone())
        };
        self.load(source, target).await
    }

    /// Compare every object present on both sides that has not been
    /// compared since the last load.
    ///
    /// A backend failure ends the scan; objects compared before it keep
    /// their results.
    pub async fn scan(&self) -> Result<ScanSummary, AppError> {
        let _running = self
            .scanning
            .try_lock()
            .map_err(|_| AppError::Conflict(format!("A {} scan is already running", self.label)))?;

        let (generation, source, target, pending) = {
            let state = self.state.read().await;
            let source = state.source.clone().ok_or_else(|| {
                AppError::NotConnected(format!("{}: left environment not loaded", self.label))
            })?;
            let target = state.target.clone().ok_or_else(|| {
                AppError::NotConnected(format!("{}: right environment not loaded", self.label))
            })?;
            let pending: Vec<ObjectId> = state
                .objects
                .iter()
                .filter(|o| o.needs_scan())
                .map(ReconciledObject::id)
                .collect();
            (state.generation, source, target, pending)
        };

        let total = pending.len();
        let mut compared = 0;
        let mut stale = false;
        let mut error = None;
        debug!("{} scan: {} object(s) to compare", self.label, total);

        for (index, id) in pending.iter().enumerate() {
            self.progress.send_replace(ScanProgress {
                current: index + 1,
                total,
                object: Some(id.to_string()),
                running: true,
                generation,
            });

            let fetched = async {
                let left = definition_or_sentinel(source.as_ref(), &id.schema, &id.name).await?;
                let right = definition_or_sentinel(target.as_ref(), &id.schema, &id.name).await?;
                Ok::<_, AppError>((left, right))
            }
            .await;

            let (left, right) = match fetched {
                Ok(definitions) => definitions,
                Err(e) => {
                    warn!("{} scan stopped at {}: {}", self.label, id, e);
                    error = Some(format!("{}: {}", id, e));
                    break;
                }
            };

            if !self.apply_scanned(generation, id, left, right).await {
                stale = true;
                break;
            }
            compared += 1;
        }

        let counts = StatusCounts::of(&self.state.read().await.objects);

        if stale {
            info!("{} scan abandoned: catalog reloaded", self.label);
        } else {
            self.progress.send_replace(ScanProgress {
                current: compared,
                total,
                object: None,
                running: false,
                generation,
            });
            info!(
                "{} scan finished: {} compared, {} modified, {} identical",
                self.label, compared, counts.modified, counts.identical
            );
        }

        Ok(ScanSummary {
            counts,
            compared,
            stale,
            error,
        })
    }

    /// Write one scan result back; `false` when the list was rebuilt since
    /// `generation`.
    async fn apply_scanned(&self, generation: u64, id: &ObjectId, left: String, right: String) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        if let Some(object) = state.find_mut(id) {
            record_comparison(object, left, right);
        }
        true
    }

    /// Fetch and diff one object on demand, refreshing its cached definitions
    pub async fn compare_object(&self, id: &ObjectId) -> Result<ObjectComparison, AppError> {
        let (generation, object, source, target) = {
            let state = self.state.read().await;
            let object = state
                .position(id)
                .map(|i| state.objects[i].clone())
                .ok_or_else(|| AppError::NotFound(format!("Object {} not found", id)))?;
            (state.generation, object, state.source.clone(), state.target.clone())
        };

        let source_definition = match (&source, object.in_source) {
            (Some(backend), true) => Some(definition_or_sentinel(backend.as_ref(), &id.schema, &id.name).await?),
            _ => None,
        };
        let target_definition = match (&target, object.in_target) {
            (Some(backend), true) => Some(definition_or_sentinel(backend.as_ref(), &id.schema, &id.name).await?),
            _ => None,
        };

        let diff = line_diff(
            source_definition.as_deref().unwrap_or_default(),
            target_definition.as_deref().unwrap_or_default(),
        );
        let stats = DiffStats::of(&diff);

        let mut object = object;
        {
            let mut state = self.state.write().await;
            if state.generation == generation {
                if let Some(current) = state.find_mut(id) {
                    match (&source_definition, &target_definition) {
                        (Some(left), Some(right)) => {
                            record_comparison(current, left.clone(), right.clone());
                        }
                        (left, right) => {
                            current.source_definition = left.clone();
                            current.target_definition = right.clone();
                        }
                    }
                    object = current.clone();
                }
            }
        }

        Ok(ObjectComparison {
            object,
            source_definition,
            target_definition,
            diff,
            stats,
        })
    }

    pub async fn get(&self, id: &ObjectId) -> Option<ReconciledObject> {
        let state = self.state.read().await;
        state.position(id).map(|i| state.objects[i].clone())
    }

    pub async fn objects(&self) -> Vec<ReconciledObject> {
        self.state.read().await.objects.clone()
    }

    pub async fn list(&self, query: &str, differences_only: bool) -> ObjectListing {
        let state = self.state.read().await;
        let objects: Vec<ReconciledObject> = state
            .objects
            .iter()
            .filter(|o| is_visible(o, query, differences_only))
            .cloned()
            .collect();

        ObjectListing {
            visible: objects.len(),
            total: state.objects.len(),
            label: showing_label(objects.len(), state.objects.len()),
            selected: state.objects.iter().filter(|o| o.selected).count(),
            counts: StatusCounts::of(&state.objects),
            objects,
        }
    }

    pub async fn counts(&self) -> StatusCounts {
        StatusCounts::of(&self.state.read().await.objects)
    }

    /// Environments of the last load
    pub async fn backends(
        &self,
    ) -> (
        Option<Arc<dyn EnvironmentBackend>>,
        Option<Arc<dyn EnvironmentBackend>>,
    ) {
        let state = self.state.read().await;
        (state.source.clone(), state.target.clone())
    }

    // ==================== Selection ====================

    /// Set the selection flag of the given objects; returns how many exist
    pub async fn set_selected(&self, ids: &[ObjectId], selected: bool) -> usize {
        let mut state = self.state.write().await;
        let mut found = 0;
        for id in ids {
            if let Some(object) = state.find_mut(id) {
                object.selected = selected;
                found += 1;
            }
        }
        found
    }

    /// Select every visible object that exists in the source
    pub async fn select_visible(&self, query: &str, differences_only: bool) -> usize {
        let mut state = self.state.write().await;
        let mut count = 0;
        for object in state.objects.iter_mut() {
            if object.in_source && is_visible(object, query, differences_only) {
                object.selected = true;
                count += 1;
            }
        }
        count
    }

    pub async fn clear_selection(&self) {
        let mut state = self.state.write().await;
        for object in state.objects.iter_mut() {
            object.selected = false;
        }
    }

    pub async fn selected(&self) -> Vec<ReconciledObject> {
        self.state
            .read()
            .await
            .objects
            .iter()
            .filter(|o| o.selected)
            .cloned()
            .collect()
    }

    pub async fn selected_count(&self) -> usize {
        self.state.read().await.objects.iter().filter(|o| o.selected).count()
    }

    // ==================== Progress ====================

    pub fn progress(&self) -> ScanProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }
}
