//! Versioned object history types
//!
//! `RawChangeEvent` is what the DDL audit log hands us; `ObjectVersion` is
//! what the version store keeps. Both are decoded once at the backend
//! boundary and never travel further as raw rows.

use crate::compare::normalize::definition_fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema used when the audit log has none for an event
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Who made a change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub login: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

/// One row of the raw DDL audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChangeEvent {
    pub sequence_id: i64,
    pub environment: String,
    pub event_kind: String,
    pub object_kind: String,
    pub schema: String,
    pub object_name: String,
    pub command_text: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Identity of a tracked object within one environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKey {
    pub environment: String,
    pub schema: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(environment: impl Into<String>, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.environment, self.schema, self.name)
    }
}

/// A version about to be appended; the store assigns its number.
#[derive(Debug, Clone)]
pub struct NewObjectVersion {
    pub key: ObjectKey,
    pub object_kind: String,
    pub definition: String,
    pub event_kind: String,
    pub actor: Actor,
    pub changed_at: DateTime<Utc>,
    /// 0 for versions not sourced from the audit log
    pub source_sequence_id: i64,
}

impl From<&RawChangeEvent> for NewObjectVersion {
    fn from(event: &RawChangeEvent) -> Self {
        let schema = if event.schema.trim().is_empty() {
            DEFAULT_SCHEMA.to_string()
        } else {
            event.schema.clone()
        };

        Self {
            key: ObjectKey::new(event.environment.clone(), schema, event.object_name.clone()),
            object_kind: event.object_kind.clone(),
            definition: event.command_text.clone(),
            event_kind: event.event_kind.clone(),
            actor: event.actor.clone(),
            changed_at: event.occurred_at,
            source_sequence_id: event.sequence_id,
        }
    }
}

/// One recorded definition of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectVersion {
    pub version_id: i64,
    pub environment: String,
    pub schema: String,
    pub object_name: String,
    pub object_kind: String,
    pub definition: String,
    pub event_kind: String,
    pub actor: Actor,
    pub changed_at: DateTime<Utc>,
    pub version_number: i32,
    pub source_sequence_id: i64,
}

impl ObjectVersion {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.environment.clone(), self.schema.clone(), self.object_name.clone())
    }

    /// SHA-256 of the whitespace-normalized definition
    pub fn checksum(&self) -> String {
        definition_fingerprint(&self.definition)
    }

    /// e.g. "v3 - jdoe@WS042 - Mar 04, 14:10"
    pub fn label(&self) -> String {
        format!(
            "v{} - {}@{} - {}",
            self.version_number,
            self.actor.login,
            self.actor.host,
            self.changed_at.format("%b %d, %H:%M")
        )
    }
}

/// Lightweight listing row for the recent-changes feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version_id: i64,
    pub environment: String,
    pub schema: String,
    pub object_name: String,
    pub object_kind: String,
    pub event_kind: String,
    pub changed_by: String,
    pub host_name: String,
    pub changed_at: DateTime<Utc>,
    pub version_number: i32,
    pub checksum: String,
}

impl From<&ObjectVersion> for VersionSummary {
    fn from(version: &ObjectVersion) -> Self {
        Self {
            version_id: version.version_id,
            environment: version.environment.clone(),
            schema: version.schema.clone(),
            object_name: version.object_name.clone(),
            object_kind: version.object_kind.clone(),
            event_kind: version.event_kind.clone(),
            changed_by: version.actor.login.clone(),
            host_name: version.actor.host.clone(),
            changed_at: version.changed_at,
            version_number: version.version_number,
            checksum: version.checksum(),
        }
    }
}

/// Per-object rollup of the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedObject {
    pub environment: String,
    pub schema: String,
    pub object_name: String,
    pub object_kind: String,
    pub version_count: i64,
    pub last_changed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(schema: &str) -> RawChangeEvent {
        RawChangeEvent {
            sequence_id: 7,
            environment: "Sales".into(),
            event_kind: "ALTER_PROCEDURE".into(),
            object_kind: "PROCEDURE".into(),
            schema: schema.into(),
            object_name: "get_order_total".into(),
            command_text: "ALTER PROCEDURE dbo.get_order_total AS SELECT 1".into(),
            actor: Actor {
                login: "jdoe".into(),
                host: "WS042".into(),
                ip: None,
                program: Some("Microsoft SQL Server Management Studio".into()),
            },
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 4, 14, 10, 0).unwrap(),
        }
    }

    #[test]
    fn test_new_version_from_event() {
        let new = NewObjectVersion::from(&event("sales"));
        assert_eq!(new.key, ObjectKey::new("Sales", "sales", "get_order_total"));
        assert_eq!(new.source_sequence_id, 7);
        assert!(new.definition.starts_with("ALTER PROCEDURE"));
    }

    #[test]
    fn test_missing_schema_defaults_to_dbo() {
        let new = NewObjectVersion::from(&event(""));
        assert_eq!(new.key.schema, DEFAULT_SCHEMA);
    }
}
