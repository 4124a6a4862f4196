//! Shift-search normalized cross-correlation between resampled series.
//!
//! For each candidate shift, the second series is slid along its hour axis,
//! the overlapping offsets are intersected, and a single normalized
//! dot-product correlation is computed from scratch over the overlap. The
//! best shift per zone is reported together with the overlap count at that
//! shift.

use crate::resample::{Resampled, ZoneSeries};
use crate::Result;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Correlations closer than this are treated as tied when selecting the
/// best shift.
const TIE_EPS: f64 = 1e-12;

/// Cross-correlation of two equal-length slices.
///
/// Normalized form: `a` is centered and scaled by `std(a) * n`, `b` by
/// `std(b)` (population std), and the dot product taken; the result equals
/// the Pearson correlation. Zero-variance input propagates non-finite
/// values rather than raising.
pub fn cross_corr(a: &[f64], b: &[f64], normalized: bool) -> f64 {
    if !normalized {
        return a.iter().zip(b).map(|(x, y)| x * y).sum();
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let std_a = (a.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / n).sqrt();
    let std_b = (b.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / n).sqrt();
    a.iter()
        .zip(b)
        .map(|(x, y)| ((x - mean_a) / (std_a * n)) * ((y - mean_b) / std_b))
        .sum()
}

/// Best shift for one zone.
///
/// All fields are NaN when every candidate shift was under-covered.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LagResult {
    /// Shift (hours) maximizing correlation
    pub shift: f64,
    /// Correlation at that shift
    pub rho: f64,
    /// Overlap sample count at that shift
    pub count: f64,
}

impl LagResult {
    const fn insufficient() -> Self {
        Self {
            shift: f64::NAN,
            rho: f64::NAN,
            count: f64::NAN,
        }
    }

    /// Whether no candidate shift had enough overlap.
    pub fn is_insufficient(&self) -> bool {
        self.shift.is_nan()
    }
}

/// Output of [`max_cross_corr`].
#[derive(Debug, Clone)]
pub struct MaxCrossCorr {
    /// Best shift per zone
    pub by_zone: BTreeMap<i64, LagResult>,
    /// Full `(shift, zone, rho)` table, NaN rho where under-covered
    pub rho: DataFrame,
    /// `(shift, zone)` pairs skipped for insufficient overlap
    pub skipped: Vec<(i64, i64)>,
}

impl MaxCrossCorr {
    /// Per-zone summary frame: `zone`, `max_shift`, `max_rho`, `max_count`.
    pub fn summary_frame(&self) -> Result<DataFrame> {
        let zones: Vec<i64> = self.by_zone.keys().copied().collect();
        let shifts: Vec<f64> = self.by_zone.values().map(|r| r.shift).collect();
        let rhos: Vec<f64> = self.by_zone.values().map(|r| r.rho).collect();
        let counts: Vec<f64> = self.by_zone.values().map(|r| r.count).collect();
        Ok(df![
            "zone" => zones,
            "max_shift" => shifts,
            "max_rho" => rhos,
            "max_count" => counts,
        ]?)
    }
}

/// Overlapping slices of `a` and `b` after sliding `b` by `shift` hours.
fn overlap<'s>(a: &'s ZoneSeries, b: &'s ZoneSeries, shift: i64) -> Option<(&'s [f64], &'s [f64])> {
    let start = a.start.max(b.start + shift);
    let end = a.end().min(b.end() + shift);
    if end < start {
        return None;
    }
    let a_from = (start - a.start) as usize;
    let b_from = (start - shift - b.start) as usize;
    let len = (end - start + 1) as usize;
    Some((&a.values[a_from..a_from + len], &b.values[b_from..b_from + len]))
}

/// Find, per zone, the candidate shift maximizing normalized
/// cross-correlation between `col_a` of `a` and `col_b` of `b`.
///
/// Iterates the zones present in `a`; a zone or shift whose overlap after
/// sliding is below `min_overlap` (the boundary itself is sufficient)
/// records NaN rho and a skip entry, never an error. Shifts whose
/// correlations differ by less than 1e-12 are treated as tied; ties prefer
/// the smallest absolute shift, then the smallest signed shift.
pub fn max_cross_corr(
    a: &Resampled,
    col_a: &str,
    b: &Resampled,
    col_b: &str,
    shifts: &[i64],
    min_overlap: usize,
) -> Result<MaxCrossCorr> {
    let zones: Vec<i64> = a.zones().collect();

    let mut rho_shifts = Vec::with_capacity(shifts.len() * zones.len());
    let mut rho_zones = Vec::with_capacity(shifts.len() * zones.len());
    let mut rho_values = Vec::with_capacity(shifts.len() * zones.len());
    let mut skipped = Vec::new();
    let mut best: BTreeMap<i64, Option<(i64, f64, usize)>> =
        zones.iter().map(|&z| (z, None)).collect();

    for &shift in shifts {
        for &zone in &zones {
            let series = a
                .get(zone, col_a)
                .zip(b.get(zone, col_b))
                .and_then(|(sa, sb)| overlap(sa, sb, shift));

            rho_shifts.push(shift);
            rho_zones.push(zone);
            let Some((sa, sb)) = series.filter(|(sa, _)| sa.len() >= min_overlap) else {
                rho_values.push(f64::NAN);
                skipped.push((shift, zone));
                continue;
            };

            let rho = cross_corr(sa, sb, true);
            rho_values.push(rho);
            if rho.is_nan() {
                continue;
            }

            let entry = best.entry(zone).or_default();
            *entry = match *entry {
                None => Some((shift, rho, sa.len())),
                Some((best_shift, best_rho, best_count)) => {
                    let tied = (rho - best_rho).abs() <= TIE_EPS;
                    let preferred = shift.abs() < best_shift.abs()
                        || (shift.abs() == best_shift.abs() && shift < best_shift);
                    if rho > best_rho + TIE_EPS || (tied && preferred) {
                        Some((shift, rho, sa.len()))
                    } else {
                        Some((best_shift, best_rho, best_count))
                    }
                }
            };
        }
    }

    let by_zone = zones
        .iter()
        .map(|&zone| {
            let result = best
                .get(&zone)
                .copied()
                .flatten()
                .map_or(LagResult::insufficient(), |(shift, rho, count)| LagResult {
                    shift: shift as f64,
                    rho,
                    count: count as f64,
                });
            (zone, result)
        })
        .collect();

    let rho = df![
        "shift" => rho_shifts,
        "zone" => rho_zones,
        "rho" => rho_values,
    ]?;

    Ok(MaxCrossCorr {
        by_zone,
        rho,
        skipped,
    })
}
