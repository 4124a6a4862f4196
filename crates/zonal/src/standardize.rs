//! Standardization of observations against a baseline expectation table.
//!
//! Each observation is joined to its stratum's baseline statistics and
//! converted to `z_<c> = (raw - mean_<c>) / var_<c>`. Division is by the
//! population variance, not the standard deviation: the reference pipeline
//! standardizes this way throughout and every persisted z-score table
//! depends on it, so the behavior is preserved bit-for-bit rather than
//! corrected (see DESIGN.md).

use crate::catalog::{Granularity, TableKey, TableStore, WriteReport};
use crate::stratum::{filter_window, require_columns, stratum_keys, with_stratum_columns};
use crate::time::TimeWindow;
use crate::{Result, ZonalError};
use polars::prelude::*;

/// Inputs for one standardization pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StandardizeConfig {
    /// Event-local timestamp column
    pub timestamp_col: String,
    /// Spatial key column
    pub zone_col: String,
    /// Metric columns to standardize
    pub value_cols: Vec<String>,
    /// Raw columns carried through unchanged (e.g. trip counts)
    pub passthrough_cols: Vec<String>,
    /// Stratum granularity; must match the expectation table
    pub granularity: Granularity,
    /// Observation period to standardize (inclusive)
    pub window: TimeWindow,
    /// Minimum reference observations a stratum needs to standardize against
    pub min_num_rows: usize,
}

/// Standardize observations against an expectation table.
///
/// Strata whose baseline was computed from fewer than `min_num_rows`
/// reference observations are removed from the expectation before the join;
/// observations in such strata (or in strata absent from the expectation
/// domain) keep their row but carry NaN z-scores, which downstream
/// consumers treat as excluded. Partial success is the normal outcome, not
/// a failure mode.
pub fn standardize(
    observations: &DataFrame,
    expected: &DataFrame,
    config: &StandardizeConfig,
) -> Result<DataFrame> {
    let mut required = vec![config.timestamp_col.as_str(), config.zone_col.as_str()];
    required.extend(config.value_cols.iter().map(String::as_str));
    required.extend(config.passthrough_cols.iter().map(String::as_str));
    require_columns(observations, &required)?;

    let mut expected_required = vec!["dayofweek", "num_rows"];
    if config.granularity == Granularity::Hour {
        expected_required.push("hour");
    }
    expected_required.push(config.zone_col.as_str());
    let stat_cols: Vec<String> = config
        .value_cols
        .iter()
        .flat_map(|c| [format!("mean_{c}"), format!("var_{c}")])
        .collect();
    expected_required.extend(stat_cols.iter().map(String::as_str));
    require_columns(expected, &expected_required)?;

    // Baselines from under-observed strata are unusable; NaN num_rows
    // (unobserved) never qualifies.
    let keys = stratum_keys(config.granularity, &config.zone_col);
    let mut baseline_cols = keys.clone();
    baseline_cols.extend(stat_cols.iter().map(|c| col(c.as_str())));
    let baseline = expected
        .clone()
        .lazy()
        .filter(
            col("num_rows")
                .gt_eq(lit(config.min_num_rows as f64))
                .and(col("num_rows").is_not_nan()),
        )
        .select(baseline_cols)
        .collect()?;

    let observed = filter_window(observations, &config.timestamp_col, &config.window)?;
    let observed = with_stratum_columns(observed, &config.timestamp_col, config.granularity)?;

    let z_cols: Vec<Expr> = config
        .value_cols
        .iter()
        .map(|c| {
            ((col(c.as_str()) - col(format!("mean_{c}").as_str()))
                / col(format!("var_{c}").as_str()))
            .fill_null(lit(f64::NAN))
            .alias(format!("z_{c}").as_str())
        })
        .collect();

    let mut output_cols = vec![col(config.timestamp_col.as_str()), col(config.zone_col.as_str())];
    output_cols.extend(config.passthrough_cols.iter().map(|c| col(c.as_str())));
    output_cols.extend(
        config.value_cols
            .iter()
            .map(|c| col(format!("z_{c}").as_str())),
    );

    let standardized = observed
        .lazy()
        .join(baseline.lazy(), keys.clone(), keys, JoinArgs::new(JoinType::Left))
        .with_columns(z_cols)
        .select(output_cols)
        .collect()?;
    Ok(standardized)
}

/// Standardize and persist under a structured key.
pub fn build_standard<S: TableStore>(
    store: &S,
    key: &TableKey,
    observations: &DataFrame,
    expected: &DataFrame,
    config: &StandardizeConfig,
    overwrite: bool,
) -> Result<(DataFrame, WriteReport)> {
    if key.granularity != config.granularity {
        return Err(ZonalError::InvalidArgument(format!(
            "table key granularity {} does not match config granularity {}",
            key.granularity, config.granularity
        )));
    }
    let standardized = standardize(observations, expected, config)?;
    let report = store.write(key, &standardized, overwrite)?;
    Ok((standardized, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_num_rows: usize) -> StandardizeConfig {
        StandardizeConfig {
            timestamp_col: "pickup_datetime".into(),
            zone_col: "zone".into(),
            value_cols: vec!["mean_pace".into()],
            passthrough_cols: vec!["trip_count".into()],
            granularity: Granularity::Hour,
            window: TimeWindow::parse("2012-10-28 00:00:00", "2012-11-03 23:59:59").unwrap(),
            min_num_rows,
        }
    }

    // Expectation rows for (dayofweek=2, hour=5) across three zones with
    // reference counts 10, 2, and 7.
    fn expected() -> DataFrame {
        df![
            "dayofweek" => [2i64, 2, 2],
            "hour" => [5i64, 5, 5],
            "zone" => [1i64, 2, 3],
            "mean_mean_pace" => [15.0, 8.0, 12.0],
            "var_mean_pace" => [25.0, 4.0, 9.0],
            "min_mean_pace" => [10.0, 6.0, 9.0],
            "num_rows" => [10.0, 2.0, 7.0],
        ]
        .unwrap()
    }

    // 2012-10-31 05:00:00 is a Wednesday (dayofweek 2), hour 5.
    fn observations() -> DataFrame {
        df![
            "pickup_datetime" => [
                "2012-10-31 05:10:00",
                "2012-10-31 05:20:00",
                "2012-10-31 05:30:00",
            ],
            "zone" => [1i64, 2, 3],
            "mean_pace" => [20.0, 8.0, 15.0],
            "trip_count" => [120i64, 3, 45],
        ]
        .unwrap()
    }

    #[test]
    fn test_z_divides_by_variance() {
        let out = standardize(&observations(), &expected(), &config(5)).unwrap();
        let z = out.column("z_mean_pace").unwrap().f64().unwrap();
        let zones = out.column("zone").unwrap().i64().unwrap();

        for idx in 0..out.height() {
            if zones.get(idx) == Some(1) {
                // (20 - 15) / 25, variance in the denominator.
                assert!((z.get(idx).unwrap() - 0.2).abs() < 1e-12);
            }
            if zones.get(idx) == Some(3) {
                // (15 - 12) / 9
                assert!((z.get(idx).unwrap() - 1.0 / 3.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_min_num_rows_excludes_stratum() {
        let out = standardize(&observations(), &expected(), &config(5)).unwrap();
        let z = out.column("z_mean_pace").unwrap().f64().unwrap();
        let zones = out.column("zone").unwrap().i64().unwrap();

        // Rows survive the left join but under-observed strata carry NaN.
        assert_eq!(out.height(), 3);
        for idx in 0..out.height() {
            let value = z.get(idx).unwrap();
            match zones.get(idx).unwrap() {
                2 => assert!(value.is_nan()),
                _ => assert!(value.is_finite()),
            }
        }
    }

    #[test]
    fn test_min_num_rows_boundary_inclusive() {
        let out = standardize(&observations(), &expected(), &config(7)).unwrap();
        let z = out.column("z_mean_pace").unwrap().f64().unwrap();
        let zones = out.column("zone").unwrap().i64().unwrap();

        for idx in 0..out.height() {
            let value = z.get(idx).unwrap();
            match zones.get(idx).unwrap() {
                1 => assert!(value.is_finite()),
                3 => assert!(value.is_finite(), "count == min_num_rows must qualify"),
                _ => assert!(value.is_nan()),
            }
        }
    }

    #[test]
    fn test_passthrough_and_schema() {
        let out = standardize(&observations(), &expected(), &config(5)).unwrap();
        assert_eq!(
            out.get_column_names()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            vec!["pickup_datetime", "zone", "trip_count", "z_mean_pace"],
        );
    }

    #[test]
    fn test_window_filters_observations() {
        let mut config = config(5);
        config.window = TimeWindow::parse("2012-11-01 00:00:00", "2012-11-03 23:59:59").unwrap();
        let out = standardize(&observations(), &expected(), &config).unwrap();
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn test_missing_expected_stats_raise() {
        let bad = df![
            "dayofweek" => [2i64],
            "hour" => [5i64],
            "zone" => [1i64],
            "num_rows" => [10.0],
        ]
        .unwrap();
        let err = standardize(&observations(), &bad, &config(5));
        assert!(matches!(err, Err(ZonalError::MissingColumn(_))));
    }
}
