//! Resumable change-feed consumer.
//!
//! Tails a long-polling change feed, queues matching file events, runs a
//! bounded worker pool that extracts and tags metadata, and periodically
//! checkpoints the lowest fully processed sequence number so a restart
//! resumes without losing events.

pub mod checkpoint;
pub mod cmd;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod http;
pub mod orchestrator;
pub mod queue;
pub mod space;
pub mod store;
pub mod types;
pub mod util;
pub mod worker;

pub use error::{Error, Result};
