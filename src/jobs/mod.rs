//! External batch jobs: listing discovery and review scraping
//!
//! The [`JobProvider`] trait is the boundary to the crawling service. The
//! [`JobPoller`] drives a started job to a terminal state on a fixed
//! schedule, and [`ApifyProvider`] is the production implementation.

mod apify;
mod poller;

pub use apify::ApifyProvider;
pub use poller::{format_elapsed, JobPoller, PollSchedule, ProgressBand};

use crate::error::Result;
use crate::model::{JobHandle, RawRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status of an external job as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    /// Provider-supplied failure message
    Failed(String),
}

/// How aggressively the listing search crawls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    #[default]
    Balanced,
    /// Crawls 50% more listings than requested
    Aggressive,
}

impl DiscoveryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "balanced" => Some(DiscoveryMode::Balanced),
            "aggressive" => Some(DiscoveryMode::Aggressive),
            _ => None,
        }
    }
}

/// Input for the listing search job
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub query: String,
    /// Empty, "world", "italy", or free text
    pub location_hint: String,
    pub max_results: u32,
    pub mode: DiscoveryMode,
    pub skip_closed: bool,
}

impl DiscoveryRequest {
    /// Search string sent to the crawler
    pub fn search_string(&self) -> String {
        let location = self.location_hint.trim();
        match location.to_lowercase().as_str() {
            "" | "world" => self.query.clone(),
            "italy" => format!("{} in Italy", self.query),
            _ => format!("{} in {}", self.query, location),
        }
    }

    /// Country code restriction, only set for Italy-wide searches
    pub fn country_code(&self) -> Option<&'static str> {
        (self.location_hint.trim().eq_ignore_ascii_case("italy")).then_some("it")
    }

    /// Listing budget after applying the search mode
    pub fn crawl_budget(&self) -> u32 {
        match self.mode {
            DiscoveryMode::Balanced => self.max_results,
            DiscoveryMode::Aggressive => (self.max_results as f64 * 1.5).round() as u32,
        }
    }
}

/// Input for the review scrape job
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRequest {
    pub urls: Vec<String>,
    pub max_reviews_per_place: u32,
}

/// Boundary to the external crawling service
#[async_trait]
pub trait JobProvider: Send + Sync {
    /// Start the listing search job
    async fn start_discovery(&self, request: &DiscoveryRequest) -> Result<JobHandle>;

    /// Start the review scrape job scoped to the given place URLs
    async fn start_scrape(&self, request: &ScrapeRequest) -> Result<JobHandle>;

    /// Current status of a job
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Full result set of a succeeded job
    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<RawRecord>>;
}

/// Suspension point between poll ticks
///
/// Injected so tests can simulate polling cycles without real delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(location: &str, mode: DiscoveryMode) -> DiscoveryRequest {
        DiscoveryRequest {
            query: "Caffè Nero".to_string(),
            location_hint: location.to_string(),
            max_results: 50,
            mode,
            skip_closed: false,
        }
    }

    #[test]
    fn test_search_string_by_location() {
        assert_eq!(request("", DiscoveryMode::Balanced).search_string(), "Caffè Nero");
        assert_eq!(request("world", DiscoveryMode::Balanced).search_string(), "Caffè Nero");
        assert_eq!(
            request("italy", DiscoveryMode::Balanced).search_string(),
            "Caffè Nero in Italy"
        );
        assert_eq!(
            request("Milano", DiscoveryMode::Balanced).search_string(),
            "Caffè Nero in Milano"
        );
    }

    #[test]
    fn test_country_code_only_for_italy() {
        assert_eq!(request("italy", DiscoveryMode::Balanced).country_code(), Some("it"));
        assert_eq!(request("Milano", DiscoveryMode::Balanced).country_code(), None);
    }

    #[test]
    fn test_aggressive_budget() {
        assert_eq!(request("", DiscoveryMode::Balanced).crawl_budget(), 50);
        assert_eq!(request("", DiscoveryMode::Aggressive).crawl_budget(), 75);

        let mut odd = request("", DiscoveryMode::Aggressive);
        odd.max_results = 5;
        assert_eq!(odd.crawl_budget(), 8);
    }
}
