//! Vintage-keyed schema normalization.
//!
//! Source files drift across years: the same logical column appears under
//! different names per vintage. Each vintage declares its renames once; the
//! mapping is resolved at ingestion so everything downstream sees only
//! canonical column names.

use crate::{Result, ZonalError};
use polars::prelude::*;
use std::collections::HashMap;

/// Column mapping for one input vintage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VintageSchema {
    /// Vintage identifier, e.g. `"2010"` or `"2016h2"`
    pub vintage: String,
    /// Source column name to canonical column name
    pub renames: HashMap<String, String>,
    /// Canonical columns that must exist after renaming
    pub required: Vec<String>,
}

impl VintageSchema {
    /// Rename a vintage table into the canonical schema.
    ///
    /// Renames are applied non-strictly (a vintage may omit columns another
    /// vintage carries), then structurally required columns are checked and
    /// their absence raised.
    pub fn resolve(&self, df: &DataFrame) -> Result<DataFrame> {
        let existing: Vec<String> = self.renames.keys().cloned().collect();
        let new: Vec<String> = existing
            .iter()
            .map(|source| self.renames[source].clone())
            .collect();

        let resolved = df.clone().lazy().rename(existing, new, false).collect()?;

        for column in &self.required {
            if resolved
                .get_column_names()
                .iter()
                .all(|c| c.as_str() != column.as_str())
            {
                return Err(ZonalError::MissingColumn(column.clone()));
            }
        }
        Ok(resolved)
    }
}

/// Registry of vintage schemas for one dataset family.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<String, VintageSchema>,
}

impl SchemaCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vintage schema, replacing any previous one for the vintage.
    pub fn register(&mut self, schema: VintageSchema) {
        self.schemas.insert(schema.vintage.clone(), schema);
    }

    /// Schema for a vintage id.
    pub fn get(&self, vintage: &str) -> Result<&VintageSchema> {
        self.schemas
            .get(vintage)
            .ok_or_else(|| ZonalError::InvalidArgument(format!("unknown vintage: {vintage}")))
    }

    /// Resolve a table through the schema registered for `vintage`.
    pub fn resolve(&self, vintage: &str, df: &DataFrame) -> Result<DataFrame> {
        self.get(vintage)?.resolve(df)
    }
}
