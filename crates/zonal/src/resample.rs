//! Resampling of irregular per-zone observations onto a contiguous hour grid.
//!
//! Each zone's metric columns are interpolated independently: a column's own
//! observed offsets define its domain, so two columns of the same zone may
//! cover different offset ranges. Columns with too few observations are
//! skipped (recorded, not raised).

use crate::stratum::require_columns;
use crate::time::{self, hours_between};
use crate::{Result, ZonalError};
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Offset column added by [`index_timedelta`].
pub const TIMEDELTA_COL: &str = "timedelta";

/// Replace the timestamp column with integer `timedelta` hours relative to a
/// reference instant (`timestamp - reference`, floored to whole hours).
pub fn index_timedelta(
    df: &DataFrame,
    timestamp_col: &str,
    reference: NaiveDateTime,
) -> Result<DataFrame> {
    require_columns(df, &[timestamp_col])?;
    let timestamps = df.column(timestamp_col)?.str()?.clone();
    let mut offsets = Vec::with_capacity(df.height());
    for value in timestamps.iter() {
        let value = value.ok_or_else(|| {
            ZonalError::Computation(format!("null timestamp in column {timestamp_col}"))
        })?;
        offsets.push(hours_between(time::parse_local(value)?, reference));
    }

    let mut df = df.drop(timestamp_col)?;
    df.with_column(Column::new(TIMEDELTA_COL.into(), offsets))?;
    Ok(df)
}

/// A contiguous hourly series for one zone and one metric column.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSeries {
    /// First hour offset covered
    pub start: i64,
    /// One value per hour from `start`, no gaps
    pub values: Vec<f64>,
}

impl ZoneSeries {
    /// Last hour offset covered (inclusive).
    pub fn end(&self) -> i64 {
        self.start + self.values.len() as i64 - 1
    }

    /// Number of hourly points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series holds no points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at an hour offset, if covered.
    pub fn get(&self, offset: i64) -> Option<f64> {
        if offset < self.start || offset > self.end() {
            return None;
        }
        Some(self.values[(offset - self.start) as usize])
    }

    /// `(offset, value)` pairs in offset order.
    pub fn pairs(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, &v)| (self.start + idx as i64, v))
    }
}

/// Piecewise-linear interpolation at every integer hour in the observed
/// range. `xs` must be non-empty, strictly increasing, and parallel to `ys`.
fn interpolate(xs: &[i64], ys: &[f64]) -> ZoneSeries {
    let start = xs[0];
    let end = xs[xs.len() - 1];
    let mut values = Vec::with_capacity((end - start + 1) as usize);
    let mut segment = 0usize;
    for t in start..=end {
        while segment + 1 < xs.len() && xs[segment + 1] <= t {
            segment += 1;
        }
        if xs[segment] == t {
            values.push(ys[segment]);
        } else {
            let x0 = xs[segment] as f64;
            let x1 = xs[segment + 1] as f64;
            let frac = (t as f64 - x0) / (x1 - x0);
            values.push(ys[segment] + frac * (ys[segment + 1] - ys[segment]));
        }
    }
    ZoneSeries { start, values }
}

/// Resampled series keyed by zone, then metric column.
#[derive(Debug, Clone, Default)]
pub struct Resampled {
    /// Interpolated series per zone and column
    pub series: BTreeMap<i64, BTreeMap<String, ZoneSeries>>,
    /// `(zone, column)` pairs dropped for insufficient data
    pub skipped: Vec<(i64, String)>,
}

impl Resampled {
    /// Zones holding at least one resampled column, ascending.
    pub fn zones(&self) -> impl Iterator<Item = i64> + '_ {
        self.series.keys().copied()
    }

    /// Series for a zone and column.
    pub fn get(&self, zone: i64, column: &str) -> Option<&ZoneSeries> {
        self.series.get(&zone)?.get(column)
    }

    /// Flatten into a long frame for diagnostics: per zone, columns are
    /// outer-joined on offset, with NaN where a column does not cover an
    /// offset. Column order is the ascending union of column names.
    pub fn to_frame(&self, zone_col: &str) -> Result<DataFrame> {
        let columns: BTreeSet<&str> = self
            .series
            .values()
            .flat_map(|cols| cols.keys().map(String::as_str))
            .collect();

        let mut zone_out = Vec::new();
        let mut offset_out = Vec::new();
        let mut value_out: BTreeMap<&str, Vec<f64>> =
            columns.iter().map(|&c| (c, Vec::new())).collect();

        for (&zone, cols) in &self.series {
            let offsets: BTreeSet<i64> = cols
                .values()
                .flat_map(|s| s.pairs().map(|(offset, _)| offset))
                .collect();
            for offset in offsets {
                zone_out.push(zone);
                offset_out.push(offset);
                for &column in &columns {
                    let value = cols
                        .get(column)
                        .and_then(|s| s.get(offset))
                        .unwrap_or(f64::NAN);
                    if let Some(out) = value_out.get_mut(column) {
                        out.push(value);
                    }
                }
            }
        }

        let mut out = vec![
            Column::new(zone_col.into(), zone_out),
            Column::new(TIMEDELTA_COL.into(), offset_out),
        ];
        for (column, values) in value_out {
            out.push(Column::new(column.into(), values));
        }
        Ok(DataFrame::new(out)?)
    }
}

/// Resample every float column of a timedelta-indexed frame, per zone.
///
/// Rows with missing (null or NaN) values are dropped per column before
/// interpolation; a zone+column with fewer than `min_count` remaining
/// observations is recorded in `skipped` and omitted. Duplicate offsets
/// collapse to the first observation. Within one output series, offsets are
/// contiguous from the column's own min to max offset; no extrapolation
/// occurs beyond observed bounds.
pub fn resample(df: &DataFrame, zone_col: &str, min_count: usize) -> Result<Resampled> {
    require_columns(df, &[zone_col, TIMEDELTA_COL])?;

    let value_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| {
            c.dtype() == &DataType::Float64
                && c.name().as_str() != zone_col
                && c.name().as_str() != TIMEDELTA_COL
        })
        .map(|c| c.name().to_string())
        .collect();

    let zones = df.column(zone_col)?.i64()?.clone();
    let offsets = df.column(TIMEDELTA_COL)?.i64()?.clone();

    let zone_domain: BTreeSet<i64> = zones.into_no_null_iter().collect();

    let mut result = Resampled::default();
    for &zone in &zone_domain {
        let mut per_column: BTreeMap<String, ZoneSeries> = BTreeMap::new();
        for column in &value_cols {
            let values = df.column(column)?.f64()?;
            let mut pairs: Vec<(i64, f64)> = Vec::new();
            for idx in 0..df.height() {
                if zones.get(idx) != Some(zone) {
                    continue;
                }
                let (Some(offset), Some(value)) = (offsets.get(idx), values.get(idx)) else {
                    continue;
                };
                if value.is_nan() {
                    continue;
                }
                pairs.push((offset, value));
            }
            pairs.sort_by_key(|&(offset, _)| offset);
            pairs.dedup_by_key(|&mut (offset, _)| offset);

            if pairs.is_empty() || pairs.len() < min_count {
                result.skipped.push((zone, column.clone()));
                continue;
            }

            let xs: Vec<i64> = pairs.iter().map(|&(offset, _)| offset).collect();
            let ys: Vec<f64> = pairs.iter().map(|&(_, value)| value).collect();
            per_column.insert(column.clone(), interpolate(&xs, &ys));
        }
        if !per_column.is_empty() {
            result.series.insert(zone, per_column);
        }
    }
    Ok(result)
}
