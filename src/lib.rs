//! Reviewscope - Google Maps review intelligence
//!
//! Discovers a brand's listings through an external crawling service, scrapes
//! their reviews, optionally enriches each place with AI analysis, and derives
//! aggregate statistics. Runs can be exported as JSON and kept in a local
//! history.

pub mod cli;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod history;
pub mod jobs;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod stats;

pub use error::{Result, ScopeError};
