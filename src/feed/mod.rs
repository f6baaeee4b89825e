//! Feed retrieval: HTTP fetching, RSS parsing and publish-date normalization.
//!
//! - [`fetcher`] - HTTP retrieval with timeout, size limit and retry policy
//! - [`parser`] - RSS document to [`Entry`] list, document order preserved
//! - [`dates`] - tolerant parsing of the raw `<pubDate>` strings
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{normalize_date, Fetcher};
//!
//! let fetcher = Fetcher::new(reqwest::Client::new());
//! for entry in fetcher.fetch("https://example.com/rss").await? {
//!     let published = normalize_date(&entry.published)?;
//! }
//! ```

mod dates;
mod fetcher;
mod parser;

pub use dates::{normalize_date, zone_offset, DateFormatError, Layout, LAYOUTS};
pub use fetcher::{FetchError, Fetcher};
pub use parser::{parse_entries, Entry, ParseError};
