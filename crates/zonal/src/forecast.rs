//! Load forecast error derivation.
//!
//! Actual integrated load and the day-N-ahead forecast vintages arrive as
//! separate UTC-stamped tables; the forecast error for vintage `h` is the
//! signed relative error `(forecast_p<h> - load) / load`. Timestamps are
//! localized to the event zone before anything downstream joins on them.

use crate::stratum::require_columns;
use crate::time::{self, format_local, utc_to_local};
use crate::{Result, ZonalError};
use chrono_tz::Tz;
use polars::prelude::*;

/// Rewrite a UTC timestamp column into event-local wall-clock time.
pub fn localize_timestamps(df: &DataFrame, timestamp_col: &str, zone: Tz) -> Result<DataFrame> {
    require_columns(df, &[timestamp_col])?;
    let timestamps = df.column(timestamp_col)?.str()?.clone();
    let mut local = Vec::with_capacity(df.height());
    for value in timestamps.iter() {
        let value = value.ok_or_else(|| {
            ZonalError::Computation(format!("null timestamp in column {timestamp_col}"))
        })?;
        local.push(format_local(utc_to_local(time::parse_local(value)?, zone)));
    }

    let mut df = df.clone();
    df.with_column(Column::new(timestamp_col.into(), local))?;
    Ok(df)
}

/// Join actual load with its forecast vintages and compute per-vintage
/// relative error columns `forecast_error_p0..p<n-1>`.
///
/// `load` must carry a `load` column; `forecast` must carry
/// `forecast_p<h>` for every requested vintage. The join on
/// `(timestamp, zone)` is inner: hours present in only one table drop out.
pub fn forecast_error(
    load: &DataFrame,
    forecast: &DataFrame,
    timestamp_col: &str,
    zone_col: &str,
    num_vintages: usize,
) -> Result<DataFrame> {
    require_columns(load, &[timestamp_col, zone_col, "load"])?;
    let forecast_cols: Vec<String> = (0..num_vintages).map(|h| format!("forecast_p{h}")).collect();
    let mut forecast_required = vec![timestamp_col, zone_col];
    forecast_required.extend(forecast_cols.iter().map(String::as_str));
    require_columns(forecast, &forecast_required)?;

    let keys = vec![col(timestamp_col), col(zone_col)];
    let error_cols: Vec<Expr> = forecast_cols
        .iter()
        .enumerate()
        .map(|(h, c)| {
            ((col(c.as_str()) - col("load")) / col("load"))
                .alias(format!("forecast_error_p{h}").as_str())
        })
        .collect();

    let mut output = vec![col(timestamp_col), col(zone_col)];
    output.extend((0..num_vintages).map(|h| col(format!("forecast_error_p{h}").as_str())));

    let errors = load
        .clone()
        .lazy()
        .join(
            forecast.clone().lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Inner),
        )
        .with_columns(error_cols)
        .select(output)
        .sort(
            [
                PlSmallStr::from(zone_col),
                PlSmallStr::from(timestamp_col),
            ],
            Default::default(),
        )
        .collect()?;
    Ok(errors)
}
