//! Baseline expectation over (day-of-week, hour, zone) strata.
//!
//! For a reference period, computes the population mean/variance (and min
//! and observation count) of each metric over every stratum in the full
//! cross-product of the day-of-week, hour, and declared zone domains. Strata
//! with no observations are emitted with NaN statistics and NaN `num_rows`,
//! which is the only way downstream code distinguishes "no data" from "zero
//! variance observed".

use crate::catalog::{Granularity, TableKey, TableStore, WriteReport};
use crate::time::{self, ReferenceWindow, TimeWindow};
use crate::zones::SpatialDomain;
use crate::{Result, ZonalError};
use chrono::{Datelike, Timelike};
use polars::prelude::*;

/// Inputs for one expectation computation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExpectedConfig {
    /// Event-local timestamp column
    pub timestamp_col: String,
    /// Spatial key column
    pub zone_col: String,
    /// Metric columns to aggregate
    pub value_cols: Vec<String>,
    /// Whether strata include the hour of day
    pub granularity: Granularity,
    /// Declared spatial key domain
    pub domain: SpatialDomain,
    /// Reference period (minus optional disruption exclusion)
    pub reference: ReferenceWindow,
}

pub(crate) fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    for column in columns {
        if df.get_column_names().iter().all(|c| c.as_str() != *column) {
            return Err(ZonalError::MissingColumn((*column).to_string()));
        }
    }
    Ok(())
}

/// Restrict rows to an inclusive window by formatted-timestamp comparison.
pub(crate) fn filter_window(
    df: &DataFrame,
    timestamp_col: &str,
    window: &TimeWindow,
) -> Result<DataFrame> {
    let (start, end) = window.bounds();
    let filtered = df
        .clone()
        .lazy()
        .filter(
            col(timestamp_col)
                .gt_eq(lit(start))
                .and(col(timestamp_col).lt_eq(lit(end))),
        )
        .collect()?;
    Ok(filtered)
}

fn filter_reference(
    df: &DataFrame,
    timestamp_col: &str,
    reference: &ReferenceWindow,
) -> Result<DataFrame> {
    let filtered = filter_window(df, timestamp_col, &reference.include)?;
    let Some(exclude) = reference.exclude else {
        return Ok(filtered);
    };
    let (start, end) = exclude.bounds();
    let filtered = filtered
        .lazy()
        .filter(
            col(timestamp_col)
                .lt(lit(start))
                .or(col(timestamp_col).gt(lit(end))),
        )
        .collect()?;
    Ok(filtered)
}

/// Append `dayofweek` (Monday = 0) and, for hourly granularity, `hour`
/// columns derived from the local timestamp column.
pub(crate) fn with_stratum_columns(
    df: DataFrame,
    timestamp_col: &str,
    granularity: Granularity,
) -> Result<DataFrame> {
    let timestamps = df.column(timestamp_col)?.str()?.clone();
    let mut dayofweek = Vec::with_capacity(df.height());
    let mut hour = Vec::with_capacity(df.height());
    for value in timestamps.iter() {
        let value = value.ok_or_else(|| {
            ZonalError::Computation(format!("null timestamp in column {timestamp_col}"))
        })?;
        let dt = time::parse_local(value)?;
        dayofweek.push(i64::from(dt.weekday().num_days_from_monday()));
        hour.push(i64::from(dt.hour()));
    }

    let mut df = df;
    df.with_column(Column::new("dayofweek".into(), dayofweek))?;
    if granularity == Granularity::Hour {
        df.with_column(Column::new("hour".into(), hour))?;
    }
    Ok(df)
}

/// Stratum key columns for a granularity, ending with the zone column.
pub(crate) fn stratum_keys(granularity: Granularity, zone_col: &str) -> Vec<Expr> {
    match granularity {
        Granularity::Date => vec![col("dayofweek"), col(zone_col)],
        Granularity::Hour => vec![col("dayofweek"), col("hour"), col(zone_col)],
    }
}

/// Dense cross-product of the day-of-week, hour, and zone domains.
fn cross_product(granularity: Granularity, zone_col: &str, domain: &SpatialDomain) -> Result<DataFrame> {
    let hours = granularity.hour_cardinality() as i64;
    let capacity = 7 * hours as usize * domain.len();
    let mut dayofweek = Vec::with_capacity(capacity);
    let mut hour = Vec::with_capacity(capacity);
    let mut zone = Vec::with_capacity(capacity);
    for dow in 0..7i64 {
        for h in 0..hours {
            for &id in domain.ids() {
                dayofweek.push(dow);
                hour.push(h);
                zone.push(id);
            }
        }
    }

    let mut columns = vec![Column::new("dayofweek".into(), dayofweek)];
    if granularity == Granularity::Hour {
        columns.push(Column::new("hour".into(), hour));
    }
    columns.push(Column::new(zone_col.into(), zone));
    Ok(DataFrame::new(columns)?)
}

/// Compute the dense expectation table for a reference period.
///
/// The output has exactly `7 x (24 if hourly) x |domain|` rows. Observed
/// strata carry `mean_<c>`, `var_<c>` (population variance), `min_<c>` per
/// metric column and the exact `num_rows`; unobserved strata carry NaN
/// everywhere. Sparse input never raises; only structural problems (missing
/// columns, unparseable timestamps) do.
pub fn compute_expected(df: &DataFrame, config: &ExpectedConfig) -> Result<DataFrame> {
    let mut required = vec![config.timestamp_col.as_str(), config.zone_col.as_str()];
    required.extend(config.value_cols.iter().map(String::as_str));
    require_columns(df, &required)?;

    let reference = filter_reference(df, &config.timestamp_col, &config.reference)?;
    let reference = with_stratum_columns(reference, &config.timestamp_col, config.granularity)?;

    let keys = stratum_keys(config.granularity, &config.zone_col);
    let mut aggs = Vec::with_capacity(config.value_cols.len() * 3 + 1);
    let mut stat_cols = Vec::with_capacity(config.value_cols.len() * 3 + 1);
    for column in &config.value_cols {
        for (stat, expr) in [
            ("mean", col(column.as_str()).mean()),
            ("var", col(column.as_str()).var(0)),
            ("min", col(column.as_str()).min()),
        ] {
            let name = format!("{stat}_{column}");
            aggs.push(expr.alias(name.as_str()));
            stat_cols.push(name);
        }
    }
    aggs.push(len().alias("num_rows"));
    stat_cols.push("num_rows".to_string());

    let aggregated = reference.lazy().group_by(keys.clone()).agg(aggs);

    let dense = cross_product(config.granularity, &config.zone_col, &config.domain)?;
    let stats: Vec<Expr> = stat_cols
        .iter()
        .map(|name| {
            col(name.as_str())
                .cast(DataType::Float64)
                .fill_null(lit(f64::NAN))
        })
        .collect();
    let sort_cols: Vec<PlSmallStr> = match config.granularity {
        Granularity::Date => vec!["dayofweek".into(), config.zone_col.as_str().into()],
        Granularity::Hour => vec![
            "dayofweek".into(),
            "hour".into(),
            config.zone_col.as_str().into(),
        ],
    };

    let expected = dense
        .lazy()
        .join(
            aggregated,
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .with_columns(stats)
        .sort(sort_cols, Default::default())
        .collect()?;
    Ok(expected)
}

/// Compute and persist an expectation table under a structured key.
///
/// Callers recomputing a title pass `overwrite = true`; append mode is for
/// incremental loads under distinct titles and will stack rows if reused.
pub fn build_expected<S: TableStore>(
    store: &S,
    key: &TableKey,
    df: &DataFrame,
    config: &ExpectedConfig,
    overwrite: bool,
) -> Result<(DataFrame, WriteReport)> {
    if key.granularity != config.granularity {
        return Err(ZonalError::InvalidArgument(format!(
            "table key granularity {} does not match config granularity {}",
            key.granularity, config.granularity
        )));
    }
    let expected = compute_expected(df, config)?;
    let report = store.write(key, &expected, overwrite)?;
    Ok((expected, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryStore;

    fn config(granularity: Granularity) -> ExpectedConfig {
        ExpectedConfig {
            timestamp_col: "pickup_datetime".into(),
            zone_col: "zone".into(),
            value_cols: vec!["mean_pace".into()],
            granularity,
            domain: SpatialDomain::from_ids([1, 2]),
            reference: ReferenceWindow::new(
                TimeWindow::parse("2012-10-01 00:00:00", "2012-10-31 23:59:59").unwrap(),
            ),
        }
    }

    // Both timestamps fall on a Wednesday (dayofweek 2) in hour 5.
    fn observations() -> DataFrame {
        df![
            "pickup_datetime" => ["2012-10-03 05:15:00", "2012-10-10 05:45:00"],
            "zone" => [1i64, 1],
            "mean_pace" => [10.0, 20.0],
        ]
        .unwrap()
    }

    fn stat_at(df: &DataFrame, dow: i64, hour: i64, zone: i64, column: &str) -> f64 {
        let dows = df.column("dayofweek").unwrap().i64().unwrap();
        let hours = df.column("hour").unwrap().i64().unwrap();
        let zones = df.column("zone").unwrap().i64().unwrap();
        let values = df.column(column).unwrap().f64().unwrap();
        for idx in 0..df.height() {
            if dows.get(idx) == Some(dow) && hours.get(idx) == Some(hour) && zones.get(idx) == Some(zone)
            {
                return values.get(idx).unwrap();
            }
        }
        panic!("stratum ({dow}, {hour}, {zone}) not found");
    }

    #[test]
    fn test_observed_stratum_stats() {
        let expected = compute_expected(&observations(), &config(Granularity::Hour)).unwrap();

        assert!((stat_at(&expected, 2, 5, 1, "mean_mean_pace") - 15.0).abs() < 1e-12);
        assert!((stat_at(&expected, 2, 5, 1, "var_mean_pace") - 25.0).abs() < 1e-12);
        assert!((stat_at(&expected, 2, 5, 1, "min_mean_pace") - 10.0).abs() < 1e-12);
        assert!((stat_at(&expected, 2, 5, 1, "num_rows") - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stratum_is_nan_not_zero() {
        let expected = compute_expected(&observations(), &config(Granularity::Hour)).unwrap();

        assert!(stat_at(&expected, 2, 5, 2, "mean_mean_pace").is_nan());
        assert!(stat_at(&expected, 2, 5, 2, "var_mean_pace").is_nan());
        assert!(stat_at(&expected, 2, 5, 2, "num_rows").is_nan());
    }

    #[test]
    fn test_hourly_output_is_dense() {
        let expected = compute_expected(&observations(), &config(Granularity::Hour)).unwrap();
        assert_eq!(expected.height(), 7 * 24 * 2);
    }

    #[test]
    fn test_date_output_is_dense() {
        let expected = compute_expected(&observations(), &config(Granularity::Date)).unwrap();
        assert_eq!(expected.height(), 7 * 2);
        // No hour column at date granularity.
        assert!(expected.column("hour").is_err());
    }

    #[test]
    fn test_empty_input_is_all_nan() {
        let empty = df![
            "pickup_datetime" => Vec::<String>::new(),
            "zone" => Vec::<i64>::new(),
            "mean_pace" => Vec::<f64>::new(),
        ]
        .unwrap();

        let expected = compute_expected(&empty, &config(Granularity::Hour)).unwrap();
        assert_eq!(expected.height(), 7 * 24 * 2);
        let num_rows = expected.column("num_rows").unwrap().f64().unwrap();
        assert!(num_rows.into_no_null_iter().all(f64::is_nan));
    }

    #[test]
    fn test_exclusion_window_drops_disruption_rows() {
        let mut config = config(Granularity::Hour);
        config.reference = ReferenceWindow::excluding(
            config.reference.include,
            TimeWindow::parse("2012-10-10 00:00:00", "2012-10-10 23:59:59").unwrap(),
        );

        let expected = compute_expected(&observations(), &config).unwrap();
        assert!((stat_at(&expected, 2, 5, 1, "num_rows") - 1.0).abs() < 1e-12);
        assert!((stat_at(&expected, 2, 5, 1, "mean_mean_pace") - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column_raises() {
        let df = df!["zone" => [1i64]].unwrap();
        let err = compute_expected(&df, &config(Granularity::Hour));
        assert!(matches!(err, Err(ZonalError::MissingColumn(_))));
    }

    #[test]
    fn test_build_expected_persists() {
        let store = MemoryStore::new();
        let key = TableKey::new("expected_zonepickup", Granularity::Hour, "sandy");
        let (expected, report) =
            build_expected(&store, &key, &observations(), &config(Granularity::Hour), true).unwrap();

        assert_eq!(report.table, "expected_zonepickup_hour_sandy");
        assert_eq!(report.rows, expected.height());
        assert_eq!(store.read(&key).unwrap().height(), expected.height());
    }

    #[test]
    fn test_build_expected_granularity_mismatch() {
        let store = MemoryStore::new();
        let key = TableKey::new("expected_zonepickup", Granularity::Date, "sandy");
        let err = build_expected(&store, &key, &observations(), &config(Granularity::Hour), true);
        assert!(matches!(err, Err(ZonalError::InvalidArgument(_))));
    }
}
