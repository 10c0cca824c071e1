//! Pipeline controller
//!
//! Sequences discovery, selection, review scraping, optional enrichment and
//! statistics. All per-run state lives in a [`RunContext`] owned by the
//! caller, so runs can be repeated or driven side by side.
//!
//! ```text
//! Idle -> Discovering -> Selecting -> Scraping -> [Enriching] -> Done
//!              |                          |             |
//!              +--------------------------+-------------+-> Failed
//! ```

mod context;

pub use crate::progress::{ProgressBus, ProgressEvent, Stage};
pub use context::{PipelineState, RunContext};

use crate::config::Config;
use crate::enrichment::{Analyzer, Enricher, SamplingPolicy};
use crate::error::{Result, ScopeError};
use crate::jobs::{
    DiscoveryRequest, JobPoller, JobProvider, PollSchedule, ScrapeRequest, Sleeper,
};
use crate::model::{AiStats, Place, RunArtifact, SearchMode};
use crate::normalize::{normalize, normalize_listings, parse_place_urls};
use crate::stats::compute_stats;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What the user searched for
#[derive(Debug, Clone)]
pub enum SearchQuery {
    /// Listing search by brand name
    Brand(DiscoveryRequest),
    /// Pasted place URLs, no search job
    Urls(Vec<String>),
}

impl SearchQuery {
    pub fn mode(&self) -> SearchMode {
        match self {
            SearchQuery::Brand(_) => SearchMode::Brand,
            SearchQuery::Urls(_) => SearchMode::Url,
        }
    }
}

/// Places picked for the review scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Positions in the discovered list
    Indices(Vec<usize>),
}

/// Options for the scrape and enrichment stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    pub max_reviews: u32,
    pub ai_enabled: bool,
}

/// Schedules and enrichment settings for the controller
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub discovery: PollSchedule,
    pub scrape: PollSchedule,
    pub batch_size: usize,
    pub sampling: SamplingPolicy,
    /// Reported when enrichment is requested without an analyzer
    pub analysis_key_env: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            discovery: PollSchedule::discovery(
                config.discovery_interval(),
                config.polling.discovery_max_attempts,
            ),
            scrape: PollSchedule::scrape(
                config.scrape_interval(),
                config.polling.scrape_max_attempts,
            ),
            batch_size: config.enrichment.batch_size,
            sampling: SamplingPolicy::from_config(&config.enrichment),
            analysis_key_env: config.openai.api_key_env.clone(),
        }
    }
}

/// Drives runs through the pipeline states
pub struct Pipeline {
    provider: Arc<dyn JobProvider>,
    analyzer: Option<Arc<dyn Analyzer>>,
    poller: JobPoller,
    settings: PipelineSettings,
    progress: ProgressBus,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn JobProvider>,
        settings: PipelineSettings,
        sleeper: Arc<dyn Sleeper>,
        progress: ProgressBus,
    ) -> Self {
        Self {
            provider,
            analyzer: None,
            poller: JobPoller::new(sleeper, progress.clone()),
            settings,
            progress,
        }
    }

    /// Enable AI enrichment
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Find selectable places for `query`
    ///
    /// Allowed from Idle, Done and Failed; the latter two start a fresh run.
    /// Invalid input leaves the context Idle. An empty result is a valid
    /// outcome.
    pub async fn discover<'c>(
        &self,
        ctx: &'c mut RunContext,
        query: SearchQuery,
    ) -> Result<&'c [Place]> {
        if ctx.state.is_finished() {
            ctx.reset();
        }
        if ctx.state != PipelineState::Idle {
            return Err(ctx.invalid_state("discover"));
        }

        let mode = query.mode();
        match query {
            SearchQuery::Urls(lines) => {
                let places = parse_place_urls(&lines)?;
                ctx.mode = Some(mode);
                info!(run_id = %ctx.run_id, places = places.len(), "Using pasted place URLs");
                ctx.discovered = places;
            }
            SearchQuery::Brand(request) => {
                if request.query.trim().is_empty() {
                    return Err(ScopeError::Validation(
                        "Brand name cannot be empty".to_string(),
                    ));
                }
                ctx.mode = Some(mode);
                ctx.query = Some(request.query.trim().to_string());
                ctx.state = PipelineState::Discovering;

                let places = match self.run_discovery(ctx, &request).await {
                    Ok(places) => places,
                    Err(e) => return Err(fail(ctx, e)),
                };
                ctx.discovered = places;
            }
        }

        ctx.state = PipelineState::Selecting;
        self.progress.publish(
            Stage::Discovery,
            50,
            format!("{} places found", ctx.discovered.len()),
        );
        Ok(&ctx.discovered)
    }

    async fn run_discovery(
        &self,
        ctx: &mut RunContext,
        request: &DiscoveryRequest,
    ) -> Result<Vec<Place>> {
        self.progress
            .publish(Stage::Discovery, 10, "Starting listing search...");
        let handle = self.provider.start_discovery(request).await?;
        ctx.discovery_job = Some(handle.clone());

        let records = self
            .poller
            .poll_until_terminal(self.provider.as_ref(), &handle, &self.settings.discovery)
            .await?;
        ctx.discovery_job = None;

        let places = normalize_listings(&records);
        info!(
            run_id = %ctx.run_id,
            records = records.len(),
            places = places.len(),
            "Listing search finished"
        );
        Ok(places)
    }

    /// Scrape reviews for the selected places and build the run artifact
    ///
    /// An empty selection, or enrichment requested without an analyzer,
    /// leaves the context in Selecting with no job started. Job failures and
    /// timeouts move it to Failed; enrichment failures never do.
    pub async fn scrape(
        &self,
        ctx: &mut RunContext,
        selection: &Selection,
        options: ScrapeOptions,
    ) -> Result<RunArtifact> {
        if ctx.state != PipelineState::Selecting {
            return Err(ctx.invalid_state("scrape"));
        }

        let urls: Vec<String> = resolve_selection(&ctx.discovered, selection)?
            .iter()
            .map(|p| p.scrape_url())
            .collect();

        let analyzer = match (&self.analyzer, options.ai_enabled) {
            (Some(analyzer), true) => Some(analyzer.clone()),
            (None, true) => {
                return Err(ScopeError::MissingCredential {
                    env_var: self.settings.analysis_key_env.clone(),
                });
            }
            (_, false) => None,
        };

        ctx.state = PipelineState::Scraping;
        let mut places = match self.run_scrape(ctx, urls, options.max_reviews).await {
            Ok(places) => places,
            Err(e) => return Err(fail(ctx, e)),
        };

        let mut aggregate = None;
        if let Some(analyzer) = analyzer {
            ctx.state = PipelineState::Enriching;
            let enricher = Enricher::new(
                analyzer,
                self.settings.batch_size,
                self.settings.sampling,
                self.progress.clone(),
            );
            aggregate = enricher.enrich(&mut places).await.aggregate;
        }

        let mut aggregate_stats = compute_stats(&places);
        aggregate_stats.ai_stats = aggregate.map(|analysis| AiStats { analysis });

        ctx.state = PipelineState::Done;
        self.progress.publish(
            Stage::Done,
            100,
            format!(
                "Done: {} places, {} reviews",
                aggregate_stats.total_places, aggregate_stats.total_reviews
            ),
        );
        info!(
            run_id = %ctx.run_id,
            places = aggregate_stats.total_places,
            reviews = aggregate_stats.total_reviews,
            "Run complete"
        );

        Ok(RunArtifact {
            run_id: ctx.run_id,
            mode: ctx.mode.unwrap_or(SearchMode::Brand),
            query: ctx.query.clone(),
            ai_enabled: options.ai_enabled,
            completed_at: Utc::now(),
            places,
            aggregate_stats,
        })
    }

    async fn run_scrape(
        &self,
        ctx: &mut RunContext,
        urls: Vec<String>,
        max_reviews: u32,
    ) -> Result<Vec<Place>> {
        self.progress.publish(
            Stage::Scrape,
            10,
            format!("Starting review scrape for {} places...", urls.len()),
        );
        let request = ScrapeRequest {
            urls,
            max_reviews_per_place: max_reviews,
        };
        let handle = self.provider.start_scrape(&request).await?;
        ctx.scrape_job = Some(handle.clone());

        let records = self
            .poller
            .poll_until_terminal(self.provider.as_ref(), &handle, &self.settings.scrape)
            .await?;
        ctx.scrape_job = None;

        let places = normalize(&records);
        info!(
            run_id = %ctx.run_id,
            records = records.len(),
            places = places.len(),
            "Review scrape finished"
        );
        Ok(places)
    }

    /// Discover, select and scrape in one call
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        query: SearchQuery,
        selection: &Selection,
        options: ScrapeOptions,
    ) -> Result<RunArtifact> {
        self.discover(ctx, query).await?;
        self.scrape(ctx, selection, options).await
    }
}

/// Move the run to Failed when `err` ends it, dropping partial data
///
/// Contained errors leave the state untouched.
fn fail(ctx: &mut RunContext, err: ScopeError) -> ScopeError {
    if err.aborts_run() {
        error!(run_id = %ctx.run_id, state = %ctx.state, "Run failed: {}", err);
        ctx.fail(err.to_string());
    } else {
        warn!(run_id = %ctx.run_id, state = %ctx.state, "Contained error: {}", err);
    }
    err
}

fn resolve_selection<'a>(places: &'a [Place], selection: &Selection) -> Result<Vec<&'a Place>> {
    let selected: Vec<&Place> = match selection {
        Selection::All => places.iter().collect(),
        Selection::Indices(indices) => {
            let mut seen = Vec::with_capacity(indices.len());
            for &i in indices {
                if i >= places.len() {
                    return Err(ScopeError::Validation(format!(
                        "Selection index {} is out of range ({} places)",
                        i,
                        places.len()
                    )));
                }
                if !seen.contains(&i) {
                    seen.push(i);
                }
            }
            seen.into_iter().map(|i| &places[i]).collect()
        }
    };

    if selected.is_empty() {
        return Err(ScopeError::Validation(
            "Select at least one place to scrape".to_string(),
        ));
    }
    Ok(selected)
}
