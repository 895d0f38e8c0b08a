//! Catalog reconciliation
//!
//! Merges the catalogs of a pair of environments into one ordered list
//! keyed by (schema, name). "Source" is the left side of the pair and
//! "target" the right side.

use crate::environment::catalog::CatalogEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareStatus {
    /// In both, definitions not compared yet
    Both,
    SourceOnly,
    TargetOnly,
    Identical,
    Modified,
}

impl CompareStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            CompareStatus::Both | CompareStatus::Identical => "=",
            CompareStatus::Modified => "~",
            CompareStatus::SourceOnly => "+",
            CompareStatus::TargetOnly => "-",
        }
    }

    pub fn is_difference(&self) -> bool {
        matches!(
            self,
            CompareStatus::SourceOnly | CompareStatus::TargetOnly | CompareStatus::Modified
        )
    }
}

/// Schema-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub schema: String,
    pub name: String,
}

impl ObjectId {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledObject {
    pub schema: String,
    pub name: String,
    pub type_desc: String,
    pub in_source: bool,
    pub in_target: bool,
    pub status: CompareStatus,
    #[serde(skip)]
    pub source_definition: Option<String>,
    #[serde(skip)]
    pub target_definition: Option<String>,
    pub compared: bool,
    pub selected: bool,
}

impl ReconciledObject {
    fn from_flags(entry: &CatalogEntry, in_source: bool, in_target: bool) -> Self {
        Self {
            schema: entry.schema.clone(),
            name: entry.name.clone(),
            type_desc: entry.type_desc.clone(),
            in_source,
            in_target,
            status: initial_status(in_source, in_target),
            source_definition: None,
            target_definition: None,
            compared: false,
            selected: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.schema.clone(), self.name.clone())
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn icon(&self) -> &'static str {
        self.status.icon()
    }

    /// Whether a deep scan still has to fetch this object
    pub fn needs_scan(&self) -> bool {
        self.status == CompareStatus::Both && !self.compared
    }
}

fn initial_status(in_source: bool, in_target: bool) -> CompareStatus {
    match (in_source, in_target) {
        (true, false) => CompareStatus::SourceOnly,
        (false, true) => CompareStatus::TargetOnly,
        _ => CompareStatus::Both,
    }
}

/// Union of both catalogs, sorted by (schema, name)
pub fn merge_catalogs(source: &[CatalogEntry], target: &[CatalogEntry]) -> Vec<ReconciledObject> {
    let mut merged: BTreeMap<ObjectId, ReconciledObject> = BTreeMap::new();

    for entry in source {
        merged
            .entry(ObjectId::new(entry.schema.clone(), entry.name.clone()))
            .or_insert_with(|| ReconciledObject::from_flags(entry, true, false));
    }

    for entry in target {
        merged
            .entry(ObjectId::new(entry.schema.clone(), entry.name.clone()))
            .and_modify(|obj| {
                obj.in_target = true;
                obj.status = initial_status(obj.in_source, true);
            })
            .or_insert_with(|| ReconciledObject::from_flags(entry, false, true));
    }

    merged.into_values().collect()
}

/// Aggregate counts over a reconciled list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: usize,
    pub source_only: usize,
    pub target_only: usize,
    pub modified: usize,
    pub identical: usize,
    /// In both, not compared yet
    pub unscanned: usize,
}

impl StatusCounts {
    pub fn of(objects: &[ReconciledObject]) -> Self {
        let mut counts = Self {
            total: objects.len(),
            ..Self::default()
        };
        for obj in objects {
            match obj.status {
                CompareStatus::SourceOnly => counts.source_only += 1,
                CompareStatus::TargetOnly => counts.target_only += 1,
                CompareStatus::Modified => counts.modified += 1,
                CompareStatus::Identical => counts.identical += 1,
                CompareStatus::Both => counts.unscanned += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn proc(schema: &str, name: &str) -> CatalogEntry {
        CatalogEntry::new(schema, name, "SQL_STORED_PROCEDURE")
    }

    #[test]
    fn test_merge_classifies_and_sorts() {
        let source = vec![proc("dbo", "zeta"), proc("dbo", "alpha"), proc("sales", "only_src")];
        let target = vec![proc("dbo", "alpha"), proc("audit", "only_tgt")];

        let merged = merge_catalogs(&source, &target);
        let view: Vec<(String, CompareStatus)> = merged
            .iter()
            .map(|o| (o.qualified_name(), o.status))
            .collect();

        assert_eq!(
            view,
            vec![
                ("audit.only_tgt".to_string(), CompareStatus::TargetOnly),
                ("dbo.alpha".to_string(), CompareStatus::Both),
                ("dbo.zeta".to_string(), CompareStatus::SourceOnly),
                ("sales.only_src".to_string(), CompareStatus::SourceOnly),
            ]
        );
        assert!(merged[1].in_source && merged[1].in_target);
    }

    #[test]
    fn test_icons() {
        assert_eq!(CompareStatus::Both.icon(), "=");
        assert_eq!(CompareStatus::Identical.icon(), "=");
        assert_eq!(CompareStatus::Modified.icon(), "~");
        assert_eq!(CompareStatus::SourceOnly.icon(), "+");
        assert_eq!(CompareStatus::TargetOnly.icon(), "-");
    }

    #[test]
    fn test_counts() {
        let merged = merge_catalogs(&[proc("dbo", "a"), proc("dbo", "b")], &[proc("dbo", "b")]);
        let counts = StatusCounts::of(&merged);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.source_only, 1);
        assert_eq!(counts.unscanned, 1);
    }
}
