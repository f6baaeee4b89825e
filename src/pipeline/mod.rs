//! Feed polling pipeline.
//!
//! - [`selector`] - which feed to poll next
//! - [`ingestor`] - entries to stored posts, one transaction per poll
//! - [`scheduler`] - the timed loop driving both

mod ingestor;
mod scheduler;
mod selector;

pub use ingestor::{ingest, prepare_post, EntryError, IngestReport, RejectedEntry};
pub use scheduler::{report_cycle, CycleError, CycleReport, Scheduler, SchedulerState};
pub use selector::{select_eligible_feed, select_next_feed, SelectionError};
