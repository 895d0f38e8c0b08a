//! SQL query constants and builders
//!
//! Contains all SQL used by the application: PostgreSQL statements for the
//! version store and T-SQL statements for environments and the audit log.

// ==================== Version store (PostgreSQL) ====================

/// Backing table for recorded object versions
pub const CREATE_OBJECT_VERSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS object_versions (
        version_id BIGSERIAL PRIMARY KEY,
        environment VARCHAR(128) NOT NULL,
        schema_name VARCHAR(128) NOT NULL,
        object_name VARCHAR(128) NOT NULL,
        object_kind VARCHAR(64) NOT NULL,
        definition TEXT NOT NULL DEFAULT '',
        event_kind VARCHAR(64) NOT NULL,
        actor_login VARCHAR(128) NOT NULL DEFAULT '',
        actor_host VARCHAR(128) NOT NULL DEFAULT '',
        actor_ip VARCHAR(64),
        actor_program VARCHAR(256),
        changed_at TIMESTAMPTZ NOT NULL,
        version_number INTEGER NOT NULL CHECK (version_number >= 1),
        source_sequence_id BIGINT NOT NULL DEFAULT 0,
        UNIQUE (environment, schema_name, object_name, version_number)
    )
"#;

pub const CREATE_INDEX_OBJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_object_versions_object ON object_versions(environment, schema_name, object_name)";

pub const CREATE_INDEX_CHANGED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_object_versions_changed_at ON object_versions(changed_at DESC)";

pub const CREATE_INDEX_SOURCE_SEQUENCE: &str =
    "CREATE INDEX IF NOT EXISTS idx_object_versions_source_sequence ON object_versions(source_sequence_id)";

/// Highest audit-log sequence id already ingested
pub const SELECT_WATERMARK: &str =
    "SELECT COALESCE(MAX(source_sequence_id), 0)::BIGINT FROM object_versions";

/// Append a version; the number is computed in the same statement so a
/// batch never works from a stale maximum.
pub const INSERT_VERSION: &str = r#"
    INSERT INTO object_versions
        (environment, schema_name, object_name, object_kind, definition, event_kind,
         actor_login, actor_host, actor_ip, actor_program, changed_at, version_number,
         source_sequence_id)
    SELECT $1::TEXT, $2::TEXT, $3::TEXT, $4::TEXT, $5::TEXT, $6::TEXT,
           $7::TEXT, $8::TEXT, $9::TEXT, $10::TEXT, $11::TIMESTAMPTZ,
           COALESCE(MAX(version_number), 0) + 1,
           $12::BIGINT
    FROM object_versions
    WHERE environment = $1::TEXT AND schema_name = $2::TEXT AND object_name = $3::TEXT
    RETURNING version_id, version_number
"#;

const VERSION_COLUMNS: &str = "version_id, environment, schema_name, object_name, object_kind, \
     definition, event_kind, actor_login, actor_host, actor_ip, actor_program, changed_at, \
     version_number, source_sequence_id";

/// Full history of one object, newest first
pub fn select_history() -> String {
    format!(
        "SELECT {} FROM object_versions \
         WHERE environment = $1 AND schema_name = $2 AND object_name = $3 \
         ORDER BY version_number DESC",
        VERSION_COLUMNS
    )
}

/// One version by id
pub fn select_version() -> String {
    format!("SELECT {} FROM object_versions WHERE version_id = $1", VERSION_COLUMNS)
}

/// Latest changes, optionally for one environment ('' = all)
pub fn select_recent() -> String {
    format!(
        "SELECT {} FROM object_versions \
         WHERE ($1 = '' OR environment = $1) \
         ORDER BY changed_at DESC, version_id DESC \
         LIMIT $2",
        VERSION_COLUMNS
    )
}

pub const SELECT_TRACKED_OBJECTS: &str = r#"
    SELECT environment, schema_name, object_name, MAX(object_kind) AS object_kind,
           COUNT(*)::BIGINT AS version_count, MAX(changed_at) AS last_changed
    FROM object_versions
    WHERE environment = $1
    GROUP BY environment, schema_name, object_name
    ORDER BY schema_name, object_name
"#;

pub const SELECT_LATEST_VERSION_NUMBER: &str = r#"
    SELECT MAX(version_number)
    FROM object_versions
    WHERE environment = $1 AND schema_name = $2 AND object_name = $3
"#;

// ==================== Environments (SQL Server) ====================

/// Non-system code objects: procedures, scalar/table functions, views, triggers
pub const MSSQL_LIST_OBJECTS: &str = r#"
    SELECT s.name AS schema_name, o.name AS object_name, o.type_desc
    FROM sys.objects o
    JOIN sys.schemas s ON o.schema_id = s.schema_id
    WHERE o.type IN ('P', 'FN', 'IF', 'TF', 'V', 'TR')
      AND o.is_ms_shipped = 0
    ORDER BY s.name, o.name
"#;

/// Full source text of one module
pub const MSSQL_GET_DEFINITION: &str = r#"
    SELECT m.definition
    FROM sys.sql_modules m
    JOIN sys.objects o ON m.object_id = o.object_id
    JOIN sys.schemas s ON o.schema_id = s.schema_id
    WHERE s.name = @P1 AND o.name = @P2
"#;

pub const MSSQL_PING: &str = "SELECT @@VERSION";

/// Raw DDL events past the watermark. `@P2 = ''` disables the environment
/// filter; the remaining predicates are appended by `audit_log_filter`.
pub fn select_audit_log(table: &str) -> String {
    format!(
        "SELECT CAST(Id AS BIGINT), DatabaseName, EventType, ObjectType, SchemaName, ObjectName, \
                CommandText, HostName, LoginName, IpAddress, ProgramName, \
                CAST(CreatedOn AS DATETIME2) \
         FROM {} \
         WHERE Id > @P1 AND (@P2 = '' OR DatabaseName = @P2)",
        table
    )
}

/// SQL builder for safe literal and identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote a T-SQL string literal
    pub fn quote_literal(value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    /// `IN (...)` list of string literals
    pub fn literal_list(values: &[String]) -> String {
        values
            .iter()
            .map(|v| Self::quote_literal(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
