//! Time dimension resolution for time-enabled WMS layers.
//!
//! Turns the TIME axis advertised in a GetCapabilities document into an
//! ordered, deduplicated list of normalized UTC timestamps.

pub mod capabilities;
pub mod dimension;
pub mod duration;
pub mod error;
pub mod resolver;

pub use capabilities::parse_capabilities;
pub use dimension::{
    expand_dimension, expand_interval, format_timestamp, normalize_timestamp, parse_timestamp,
    TimeDimension, MAX_INTERVAL_STEPS,
};
pub use duration::parse_iso_duration;
pub use error::{DimensionError, DimensionResult};
pub use resolver::{CapabilitiesSource, HttpCapabilitiesSource, TimeDimensionResolver};
