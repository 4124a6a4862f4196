//! Query-and-clean layer over persisted standardized tables.
//!
//! These loaders read z-score tables back through the catalog and prepare
//! them for resampling: window and minimum-count filtering, absolute-value
//! companions for the z columns, dataset-distinguishing column suffixes,
//! and optional collapsing to per-zone or per-zone-per-date means.

use crate::catalog::{TableKey, TableStore};
use crate::stratum::{filter_window, require_columns};
use crate::time::TimeWindow;
use crate::{Result, ZonalError};
use derive_more::Display;
use polars::prelude::*;
use std::str::FromStr;

/// Which end of a trip the standardized table is keyed on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TripType {
    /// Trips keyed by drop-off time and zone
    #[display("dropoff")]
    Dropoff,
    /// Trips keyed by pickup time and zone
    #[display("pickup")]
    Pickup,
}

impl TripType {
    /// Timestamp column in the standardized trips table.
    pub const fn datetime_col(self) -> &'static str {
        match self {
            Self::Dropoff => "dropoff_datetime",
            Self::Pickup => "pickup_datetime",
        }
    }

    /// Zone column in the standardized trips table.
    pub const fn zone_col(self) -> &'static str {
        match self {
            Self::Dropoff => "dropoff_location_id",
            Self::Pickup => "pickup_location_id",
        }
    }

    /// Suffix distinguishing this dataset's value columns after loading.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Dropoff => "_drop",
            Self::Pickup => "_pick",
        }
    }
}

impl FromStr for TripType {
    type Err = ZonalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dropoff" => Ok(Self::Dropoff),
            "pickup" => Ok(Self::Pickup),
            other => Err(ZonalError::InvalidArgument(format!(
                "invalid trip type: {other}"
            ))),
        }
    }
}

/// Load standardized trip z-scores at hourly resolution.
///
/// Keeps rows inside the window with `trip_count` strictly above
/// `trip_count_filter`, adds `abs_z_*` companions, and suffixes every value
/// column with the trip type so two trip datasets can share one frame.
pub fn load_trips_zone_hour<S: TableStore>(
    store: &S,
    key: &TableKey,
    window: &TimeWindow,
    trip_count_filter: i64,
    trip_type: TripType,
) -> Result<DataFrame> {
    let df = store.read(key)?;
    let datetime_col = trip_type.datetime_col();
    let zone_col = trip_type.zone_col();
    require_columns(&df, &[datetime_col, zone_col, "trip_count"])?;

    let df = filter_window(&df, datetime_col, window)?;
    let df = df
        .lazy()
        .filter(col("trip_count").gt(lit(trip_count_filter)))
        .collect()?;

    let z_cols: Vec<String> = df
        .get_column_names()
        .iter()
        .filter(|c| c.as_str().starts_with("z_"))
        .map(|c| c.to_string())
        .collect();
    let abs_cols: Vec<Expr> = z_cols
        .iter()
        .map(|c| col(c.as_str()).abs().alias(format!("abs_{c}").as_str()))
        .collect();

    let df = df.lazy().with_columns(abs_cols).collect()?;

    let suffix = trip_type.suffix();
    let renames: Vec<(String, String)> = df
        .get_column_names()
        .iter()
        .filter(|c| c.as_str() != datetime_col && c.as_str() != zone_col)
        .map(|c| (c.to_string(), format!("{c}{suffix}")))
        .collect();
    let existing: Vec<String> = renames.iter().map(|(from, _)| from.clone()).collect();
    let new: Vec<String> = renames.into_iter().map(|(_, to)| to).collect();

    let df = df
        .lazy()
        .rename(existing, new, true)
        .sort(
            [PlSmallStr::from(zone_col), PlSmallStr::from(datetime_col)],
            Default::default(),
        )
        .collect()?;
    Ok(df)
}

fn mean_by_keys(df: DataFrame, keys: Vec<Expr>, key_names: &[&str]) -> Result<DataFrame> {
    let value_means: Vec<Expr> = df
        .get_columns()
        .iter()
        .filter(|c| {
            !key_names.contains(&c.name().as_str())
                && matches!(c.dtype(), DataType::Float64 | DataType::Int64)
        })
        .map(|c| col(c.name().as_str()).mean())
        .collect();
    let sort_cols: Vec<PlSmallStr> = key_names.iter().map(|&k| PlSmallStr::from(k)).collect();

    let df = df
        .lazy()
        .group_by(keys)
        .agg(value_means)
        .sort(sort_cols, Default::default())
        .collect()?;
    Ok(df)
}

/// Hourly trips collapsed to one mean row per zone and calendar date.
pub fn load_trips_zone_date<S: TableStore>(
    store: &S,
    key: &TableKey,
    window: &TimeWindow,
    trip_count_filter: i64,
    trip_type: TripType,
) -> Result<DataFrame> {
    let hourly = load_trips_zone_hour(store, key, window, trip_count_filter, trip_type)?;
    let datetime_col = trip_type.datetime_col();
    let zone_col = trip_type.zone_col();

    let timestamps = hourly.column(datetime_col)?.str()?.clone();
    let mut dates = Vec::with_capacity(hourly.height());
    for value in timestamps.iter() {
        let value = value.ok_or_else(|| {
            ZonalError::Computation(format!("null timestamp in column {datetime_col}"))
        })?;
        dates.push(value.get(..10).unwrap_or(value).to_string());
    }
    let mut hourly = hourly.drop(datetime_col)?;
    hourly.with_column(Column::new("date".into(), dates))?;

    mean_by_keys(hourly, vec![col(zone_col), col("date")], &[zone_col, "date"])
}

/// Hourly trips collapsed to one mean row per zone over the whole window.
pub fn load_trips_zone<S: TableStore>(
    store: &S,
    key: &TableKey,
    window: &TimeWindow,
    trip_count_filter: i64,
    trip_type: TripType,
) -> Result<DataFrame> {
    let hourly = load_trips_zone_hour(store, key, window, trip_count_filter, trip_type)?;
    let datetime_col = trip_type.datetime_col();
    let zone_col = trip_type.zone_col();

    let hourly = hourly.drop(datetime_col)?;
    mean_by_keys(hourly, vec![col(zone_col)], &[zone_col])
}

/// Load forecast error rows for a window, adding `percent_err_p0`.
pub fn load_forecast_error<S: TableStore>(
    store: &S,
    key: &TableKey,
    window: &TimeWindow,
) -> Result<DataFrame> {
    let df = store.read(key)?;
    require_columns(&df, &["datetime", "zone", "forecast_error_p0"])?;

    let df = filter_window(&df, "datetime", window)?;
    let df = df
        .lazy()
        .with_column((col("forecast_error_p0") * lit(100.0)).alias("percent_err_p0"))
        .sort(
            [PlSmallStr::from("zone"), PlSmallStr::from("datetime")],
            Default::default(),
        )
        .collect()?;
    Ok(df)
}
