//! gator: a multi-user RSS aggregator backed by SQLite.
//!
//! The [`pipeline`] polls registered feeds on a fixed interval and stores new
//! entries as posts; the [`commands`] manage users, feeds and follows.

pub mod commands;
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod storage;
pub mod util;
