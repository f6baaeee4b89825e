//! Input validation helpers for the command line.
//!
//! - **URL validation**: only http(s) feed URLs are registered
//! - **Interval parsing**: `agg` durations like `1m` or `1h30m`

mod interval;
mod url_validator;

pub use interval::{parse_interval, IntervalError};
pub use url_validator::{validate_feed_url, UrlValidationError};
