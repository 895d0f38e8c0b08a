//! Environment catalog access
//!
//! An environment is one SQL Server database holding the live code objects.

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Shown in place of a definition the backend cannot return
pub const DEFINITION_NOT_AVAILABLE: &str = "-- Definition not available";

/// A code object observed live in one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub schema: String,
    pub name: String,
    /// Engine type description, e.g. `SQL_STORED_PROCEDURE`
    pub type_desc: String,
}

impl CatalogEntry {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, type_desc: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            type_desc: type_desc.into(),
        }
    }
}

/// Operations on one live environment
#[async_trait]
pub trait EnvironmentBackend: Send + Sync {
    /// Database name, used to match recorded versions to environments
    fn name(&self) -> &str;

    /// Non-system procedures, functions, views and triggers
    async fn list_objects(&self) -> Result<Vec<CatalogEntry>, AppError>;

    /// Full source text, `None` when the backend has none
    async fn fetch_definition(&self, schema: &str, name: &str) -> Result<Option<String>, AppError>;

    /// Execute one statement batch
    async fn execute_batch(&self, sql: &str) -> Result<(), AppError>;
}

/// Fetch a definition, substituting the sentinel when it is missing
pub async fn definition_or_sentinel(
    backend: &dyn EnvironmentBackend,
    schema: &str,
    name: &str,
) -> Result<String, AppError> {
    Ok(backend
        .fetch_definition(schema, name)
        .await?
        .unwrap_or_else(|| DEFINITION_NOT_AVAILABLE.to_string()))
}
