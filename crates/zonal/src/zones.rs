//! Spatial zone domain and categorical lookups.
//!
//! The engines treat spatial keys as opaque integers; this module owns the
//! declared key space. The lookup typically comes from a zone table mapping
//! every valid id to a human label and, for trip data, a coarser group
//! (zone to borough).

use crate::{Result, ZonalError};
use std::collections::HashMap;

/// One declared spatial zone.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZoneInfo {
    /// Zone id (the spatial key used in every table)
    pub id: i64,
    /// Human-readable label
    pub label: String,
    /// Coarser grouping key, e.g. borough
    pub group: Option<String>,
}

/// The set of declared zones for one dataset.
#[derive(Debug, Clone, Default)]
pub struct ZoneLookup {
    zones: Vec<ZoneInfo>,
    by_id: HashMap<i64, usize>,
}

impl ZoneLookup {
    /// Build a lookup, rejecting duplicate ids.
    pub fn new(zones: Vec<ZoneInfo>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(zones.len());
        for (idx, zone) in zones.iter().enumerate() {
            if by_id.insert(zone.id, idx).is_some() {
                return Err(ZonalError::InvalidArgument(format!(
                    "duplicate zone id {}",
                    zone.id
                )));
            }
        }
        Ok(Self { zones, by_id })
    }

    /// Zone metadata by id.
    pub fn get(&self, id: i64) -> Option<&ZoneInfo> {
        self.by_id.get(&id).map(|&idx| &self.zones[idx])
    }

    /// Label for a zone id.
    pub fn label(&self, id: i64) -> Option<&str> {
        self.get(id).map(|z| z.label.as_str())
    }

    /// Grouping key (e.g. borough) for a zone id.
    pub fn group(&self, id: i64) -> Option<&str> {
        self.get(id).and_then(|z| z.group.as_deref())
    }

    /// Smallest and largest declared ids, if any zones are declared.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let min = self.zones.iter().map(|z| z.id).min()?;
        let max = self.zones.iter().map(|z| z.id).max()?;
        Some((min, max))
    }

    /// Number of declared zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zones are declared.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// The spatial key domain an expectation table must cover exactly once per
/// stratum, regardless of which keys were actually observed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SpatialDomain {
    ids: Vec<i64>,
}

impl SpatialDomain {
    /// Domain from explicit ids (deduplicated, ascending).
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Domain from declared min/max bounds.
    ///
    /// The covered range is `min..max-1`: the top declared id is excluded.
    /// This reproduces the reference pipeline's range arithmetic exactly and
    /// is relied on by existing expectation tables, so it is preserved
    /// rather than widened.
    pub fn from_bounds(min: i64, max: i64) -> Self {
        Self {
            ids: (min..max - 1).collect(),
        }
    }

    /// Domain derived from a zone lookup's declared bounds.
    pub fn from_lookup(lookup: &ZoneLookup) -> Result<Self> {
        let (min, max) = lookup
            .bounds()
            .ok_or_else(|| ZonalError::InvalidArgument("empty zone lookup".into()))?;
        Ok(Self::from_bounds(min, max))
    }

    /// The ids in ascending order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Number of ids in the domain.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the domain is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Declared mapping for a categorical column.
///
/// A value outside the mapping is a hard failure: it indicates upstream
/// schema drift that silent NaN handling would mask.
#[derive(Debug, Clone, Default)]
pub struct CategoricalMap {
    column: String,
    mapping: HashMap<String, i64>,
}

impl CategoricalMap {
    /// Mapping for `column` from raw values to canonical codes.
    pub fn new(column: impl Into<String>, mapping: HashMap<String, i64>) -> Self {
        Self {
            column: column.into(),
            mapping,
        }
    }

    /// Canonical code for a raw value.
    pub fn code(&self, value: &str) -> Result<i64> {
        self.mapping
            .get(value)
            .copied()
            .ok_or_else(|| ZonalError::UnexpectedCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lookup() -> ZoneLookup {
        ZoneLookup::new(vec![
            ZoneInfo {
                id: 1,
                label: "Newark Airport".into(),
                group: Some("EWR".into()),
            },
            ZoneInfo {
                id: 2,
                label: "Jamaica Bay".into(),
                group: Some("Queens".into()),
            },
            ZoneInfo {
                id: 5,
                label: "Arden Heights".into(),
                group: Some("Staten Island".into()),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_access() {
        let lookup = lookup();
        assert_eq!(lookup.label(2), Some("Jamaica Bay"));
        assert_eq!(lookup.group(5), Some("Staten Island"));
        assert_eq!(lookup.get(9), None);
        assert_eq!(lookup.bounds(), Some((1, 5)));
    }

    #[test]
    fn test_lookup_rejects_duplicates() {
        let result = ZoneLookup::new(vec![
            ZoneInfo {
                id: 1,
                label: "a".into(),
                group: None,
            },
            ZoneInfo {
                id: 1,
                label: "b".into(),
                group: None,
            },
        ]);
        assert!(matches!(result, Err(ZonalError::InvalidArgument(_))));
    }

    #[rstest]
    #[case(1, 5, vec![1, 2, 3])]
    #[case(1, 3, vec![1])]
    #[case(1, 2, vec![])]
    fn test_domain_from_bounds_excludes_top(
        #[case] min: i64,
        #[case] max: i64,
        #[case] expected: Vec<i64>,
    ) {
        assert_eq!(SpatialDomain::from_bounds(min, max).ids(), &expected[..]);
    }

    #[test]
    fn test_domain_from_ids_sorts_and_dedups() {
        let domain = SpatialDomain::from_ids([3, 1, 3, 2]);
        assert_eq!(domain.ids(), &[1, 2, 3]);
    }

    #[test]
    fn test_categorical_map_rejects_unknown() {
        let map = CategoricalMap::new(
            "payment_type",
            HashMap::from([("CSH".to_string(), 1), ("CRD".to_string(), 2)]),
        );
        assert_eq!(map.code("CSH").unwrap(), 1);
        let err = map.code("BARTER");
        assert!(matches!(err, Err(ZonalError::UnexpectedCategory { .. })));
    }
}
