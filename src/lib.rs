//! Student dropout risk inference and recommendation engine
//!
//! Replays a fitted feature transform over raw student records, scores them with a
//! persisted classifier, buckets the dropout probability into risk tiers and derives
//! intervention recommendations. Exposed as a library, an HTTP service and a CLI.

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};
