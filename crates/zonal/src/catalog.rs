//! Structured table keys and the persistence boundary.
//!
//! Persisted tables are scoped by `(family, granularity, title)`. The
//! formatted name (`expected_zonepickup_hour_sandy` and friends) is produced
//! in exactly one place, [`TableKey::name`]; engine code and callers pass
//! structured keys, never pre-formatted strings.

use crate::{Result, ZonalError};
use derive_more::Display;
use polars::prelude::*;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// Stratification granularity.
///
/// `Date` strata are `(dayofweek, zone)`; `Hour` strata add the hour of day.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Granularity {
    /// Day-of-week stratification
    #[display("date")]
    Date,
    /// Day-of-week by hour-of-day stratification
    #[display("hour")]
    Hour,
}

impl Granularity {
    /// Number of hour strata: 24 for hourly, 1 otherwise.
    pub const fn hour_cardinality(self) -> usize {
        match self {
            Self::Date => 1,
            Self::Hour => 24,
        }
    }
}

impl FromStr for Granularity {
    type Err = ZonalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" | "day" => Ok(Self::Date),
            "hour" => Ok(Self::Hour),
            other => Err(ZonalError::InvalidArgument(format!(
                "invalid granularity: {other}"
            ))),
        }
    }
}

/// Key identifying one persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableKey {
    /// Table family, e.g. `expected_zonepickup` or `standard_load`
    pub family: String,
    /// Stratification granularity of the table's contents
    pub granularity: Granularity,
    /// Caller-chosen experiment scope, e.g. `sandy`
    pub title: String,
}

impl TableKey {
    /// Build a key.
    pub fn new(family: impl Into<String>, granularity: Granularity, title: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            granularity,
            title: title.into(),
        }
    }

    /// The formatted table name: `<family>_<granularity>_<title>`.
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.family, self.granularity, self.title)
    }
}

/// Row accounting for one batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Formatted table name written to
    pub table: String,
    /// Rows written by this call
    pub rows: usize,
    /// Whether an existing table was replaced (vs appended to or created)
    pub replaced: bool,
}

/// Persistence boundary for expectation/standardized tables.
///
/// Writers follow single-writer-per-title discipline; the store does not
/// coordinate concurrent writers to the same key. `overwrite = true`
/// replaces (idempotent recompute); `overwrite = false` appends, which is
/// intended for incremental loads under distinct titles.
pub trait TableStore {
    /// Read a table by key.
    fn read(&self, key: &TableKey) -> Result<DataFrame>;

    /// Write a table by key.
    fn write(&self, key: &TableKey, df: &DataFrame, overwrite: bool) -> Result<WriteReport>;

    /// Whether a table exists for the key.
    fn contains(&self, key: &TableKey) -> bool;
}

/// In-process table store backed by a map of named frames.
///
/// The production record store lives outside this crate; this store backs
/// orchestration tests and small interactive runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, DataFrame>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableStore for MemoryStore {
    fn read(&self, key: &TableKey) -> Result<DataFrame> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&key.name())
            .cloned()
            .ok_or_else(|| ZonalError::TableNotFound(key.name()))
    }

    fn write(&self, key: &TableKey, df: &DataFrame, overwrite: bool) -> Result<WriteReport> {
        let name = key.name();
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = match tables.get_mut(&name) {
            Some(existing) if !overwrite => {
                let stacked = existing.vstack(df)?;
                *existing = stacked;
                false
            }
            Some(existing) => {
                *existing = df.clone();
                true
            }
            None => {
                tables.insert(name.clone(), df.clone());
                false
            }
        };
        Ok(WriteReport {
            table: name,
            rows: df.height(),
            replaced,
        })
    }

    fn contains(&self, key: &TableKey) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.contains_key(&key.name())
    }
}
