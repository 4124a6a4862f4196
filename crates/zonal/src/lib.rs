#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod correlate;
pub mod error;
pub mod forecast;
pub mod loaders;
pub mod resample;
pub mod schema;
pub mod standardize;
pub mod stratum;
pub mod time;
pub mod zones;

// Re-export core types
pub use catalog::{Granularity, MemoryStore, TableKey, TableStore, WriteReport};
pub use correlate::{cross_corr, max_cross_corr, LagResult, MaxCrossCorr};
pub use error::{Result, ZonalError};
pub use resample::{index_timedelta, resample, Resampled, ZoneSeries};
pub use standardize::{build_standard, standardize, StandardizeConfig};
pub use stratum::{build_expected, compute_expected, ExpectedConfig};
pub use time::{ReferenceWindow, TimeWindow};
pub use zones::{SpatialDomain, ZoneInfo, ZoneLookup};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
