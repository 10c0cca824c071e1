// Apify actor runs as the job provider

use super::{DiscoveryRequest, JobProvider, JobStatus, ScrapeRequest};
use crate::config::ApifyConfig;
use crate::error::{Result, ScopeError};
use crate::model::{JobHandle, JobKind, RawRecord};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("reviewscope/", env!("CARGO_PKG_VERSION"));

/// Envelope of every Apify API response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    id: String,
    status: String,
}

/// Client for the listing search and review scrape actors
pub struct ApifyProvider {
    http_client: reqwest::Client,
    token: String,
    base_url: String,
    discovery_actor: String,
    scrape_actor: String,
    language: String,
}

impl ApifyProvider {
    pub fn new(config: &ApifyConfig, token: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScopeError::Http {
                source: e,
                context: "Failed to build Apify client".to_string(),
            })?;

        Ok(Self {
            http_client,
            token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            discovery_actor: config.discovery_actor.clone(),
            scrape_actor: config.scrape_actor.clone(),
            language: config.language.clone(),
        })
    }

    /// Build a provider with the token read from the configured env var
    pub fn from_config(config: &ApifyConfig) -> Result<Self> {
        let token = std::env::var(&config.api_key_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ScopeError::MissingCredential {
                env_var: config.api_key_env.clone(),
            })?;
        Self::new(config, token)
    }

    /// Actor input for the listing search
    pub fn discovery_input(&self, request: &DiscoveryRequest) -> Value {
        let mut input = json!({
            "searchStringsArray": [request.search_string()],
            "maxCrawledPlaces": request.crawl_budget(),
            "language": self.language,
            "maxReviews": 0,
            "includeWebsiteUrl": true,
            "includeReviews": false,
            "skipClosedPlaces": request.skip_closed,
        });
        if let Some(code) = request.country_code() {
            input["countryCode"] = json!(code);
        }
        input
    }

    /// Actor input for the review scrape
    pub fn scrape_input(&self, request: &ScrapeRequest) -> Value {
        let start_urls: Vec<Value> = request.urls.iter().map(|url| json!({ "url": url })).collect();
        json!({
            "startUrls": start_urls,
            "maxReviews": request.max_reviews_per_place,
            "reviewsSort": "newest",
            "language": self.language,
        })
    }

    async fn start_run(&self, actor: &str, input: &Value, kind: JobKind) -> Result<JobHandle> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await
            .map_err(|e| ScopeError::Http {
                source: e,
                context: format!("Failed to start {} run", kind.label()),
            })?;

        let run: Envelope<RunInfo> = read_json(response, "actor run start").await?;
        info!(job_id = %run.data.id, actor, "Started {} job", kind.label());
        Ok(JobHandle::new(run.data.id, kind))
    }
}

/// Map an Apify run status to a job status
pub fn map_run_status(status: &str, kind: JobKind) -> JobStatus {
    match status {
        "READY" | "RUNNING" => JobStatus::Running,
        "SUCCEEDED" => JobStatus::Succeeded,
        "FAILED" | "ABORTED" | "TIMED-OUT" => {
            JobStatus::Failed(format!("{} {}", kind.label(), status.to_lowercase()))
        }
        other => {
            warn!(status = other, "Unknown run status, continuing to poll");
            JobStatus::Running
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ScopeError::Api {
            status: status.as_u16(),
            context: context.to_string(),
            message,
        });
    }

    let body = response.text().await.map_err(|e| ScopeError::Http {
        source: e,
        context: format!("Failed to read {} response", context),
    })?;
    serde_json::from_str(&body).map_err(|e| ScopeError::Json {
        source: e,
        context: format!("Failed to parse {} response", context),
    })
}

#[async_trait]
impl JobProvider for ApifyProvider {
    async fn start_discovery(&self, request: &DiscoveryRequest) -> Result<JobHandle> {
        debug!(
            query = %request.search_string(),
            budget = request.crawl_budget(),
            "Starting listing search"
        );
        let input = self.discovery_input(request);
        self.start_run(&self.discovery_actor, &input, JobKind::Discovery)
            .await
    }

    async fn start_scrape(&self, request: &ScrapeRequest) -> Result<JobHandle> {
        debug!(
            places = request.urls.len(),
            max_reviews = request.max_reviews_per_place,
            "Starting review scrape"
        );
        let input = self.scrape_input(request);
        self.start_run(&self.scrape_actor, &input, JobKind::Scrape)
            .await
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let url = format!("{}/actor-runs/{}", self.base_url, handle.job_id);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ScopeError::Http {
                source: e,
                context: format!("Failed to check {} status", handle.kind.label()),
            })?;

        let run: Envelope<RunInfo> = read_json(response, "run status").await?;
        Ok(map_run_status(&run.data.status, handle.kind))
    }

    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<RawRecord>> {
        let url = format!(
            "{}/actor-runs/{}/dataset/items",
            self.base_url, handle.job_id
        );
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("format", "json"), ("clean", "true")])
            .send()
            .await
            .map_err(|e| ScopeError::Http {
                source: e,
                context: format!("Failed to fetch {} results", handle.kind.label()),
            })?;

        let items: Vec<Value> = read_json(response, "dataset items").await?;
        Ok(items.into_iter().map(RawRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jobs::DiscoveryMode;

    fn provider() -> ApifyProvider {
        ApifyProvider::new(&Config::default().apify, "token".to_string()).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_run_status("READY", JobKind::Discovery), JobStatus::Running);
        assert_eq!(map_run_status("RUNNING", JobKind::Scrape), JobStatus::Running);
        assert_eq!(map_run_status("SUCCEEDED", JobKind::Scrape), JobStatus::Succeeded);
        assert_eq!(
            map_run_status("TIMED-OUT", JobKind::Discovery),
            JobStatus::Failed("search timed-out".to_string())
        );
        assert_eq!(
            map_run_status("ABORTED", JobKind::Scrape),
            JobStatus::Failed("scrape aborted".to_string())
        );
        assert_eq!(map_run_status("PAUSED", JobKind::Scrape), JobStatus::Running);
    }

    #[test]
    fn test_discovery_input() {
        let request = DiscoveryRequest {
            query: "Pizzeria Da Michele".to_string(),
            location_hint: "italy".to_string(),
            max_results: 20,
            mode: DiscoveryMode::Aggressive,
            skip_closed: true,
        };
        let input = provider().discovery_input(&request);

        assert_eq!(input["searchStringsArray"][0], "Pizzeria Da Michele in Italy");
        assert_eq!(input["maxCrawledPlaces"], 30);
        assert_eq!(input["countryCode"], "it");
        assert_eq!(input["includeReviews"], false);
        assert_eq!(input["skipClosedPlaces"], true);
    }

    #[test]
    fn test_scrape_input() {
        let request = ScrapeRequest {
            urls: vec!["https://www.google.com/maps/place/A".to_string()],
            max_reviews_per_place: 40,
        };
        let input = provider().scrape_input(&request);

        assert_eq!(input["startUrls"][0]["url"], "https://www.google.com/maps/place/A");
        assert_eq!(input["maxReviews"], 40);
        assert_eq!(input["reviewsSort"], "newest");
        assert_eq!(input["language"], "it");
    }
}
