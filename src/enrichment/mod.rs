//! Optional AI enrichment of scraped places
//!
//! [`Enricher`] analyzes places in fixed-size batches: the calls within a
//! batch run concurrently and the next batch starts only once every call of
//! the current one has settled, so at most `batch_size` requests are in
//! flight. A failed call leaves that place without analysis and never stops
//! the run. A final brand-level call runs over the reviews of every place.

mod openai;
mod prompt;
mod sampling;

pub use openai::{parse_analysis, OpenAiAnalyzer};
pub use prompt::{aggregate_prompt, place_prompt};
pub use sampling::{SampledReview, SamplingPolicy};

use crate::error::{Result, ScopeError};
use crate::model::{AnalysisResult, Place, Review};
use crate::progress::{ProgressBus, Stage};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Brand name used when the first place has no usable title
pub const DEFAULT_BRAND: &str = "Brand";

/// Boundary to the text analysis service
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Structured analysis of one place's reviews
    async fn analyze_place(
        &self,
        place_name: &str,
        reviews: &[Review],
        sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult>;

    /// Brand-level analysis over the reviews of every place
    async fn analyze_aggregate(
        &self,
        reviews: &[Review],
        brand: &str,
        total_places: usize,
        sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult>;
}

/// What happened to one place during enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceOutcome {
    Analyzed,
    Skipped,
    Failed,
}

/// Summary of an enrichment pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentReport {
    pub analyzed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Brand-level analysis, absent when that call failed
    pub aggregate: Option<AnalysisResult>,
}

/// Brand name heuristic: text before the first hyphen of the first title
pub fn brand_name(places: &[Place]) -> String {
    places
        .first()
        .and_then(|p| p.title.split('-').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BRAND)
        .to_string()
}

/// Batched, failure-tolerant enrichment orchestrator
pub struct Enricher {
    analyzer: Arc<dyn Analyzer>,
    batch_size: usize,
    sampling: SamplingPolicy,
    progress: ProgressBus,
}

impl Enricher {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        batch_size: usize,
        sampling: SamplingPolicy,
        progress: ProgressBus,
    ) -> Self {
        Self {
            analyzer,
            batch_size: batch_size.max(1),
            sampling,
            progress,
        }
    }

    /// Attach analyses to `places` in place and run the brand-level call
    pub async fn enrich(&self, places: &mut [Place]) -> EnrichmentReport {
        let total = places.len();
        let mut report = EnrichmentReport::default();
        let mut done = 0usize;

        info!(
            places = total,
            batch_size = self.batch_size,
            sampling = self.sampling.enabled,
            "Starting AI enrichment"
        );

        for batch in places.chunks_mut(self.batch_size) {
            let titles: Vec<String> = batch.iter().map(|p| p.title.clone()).collect();
            let outcomes = join_all(batch.iter_mut().map(|place| self.enrich_place(place))).await;

            for outcome in outcomes {
                match outcome {
                    PlaceOutcome::Analyzed => report.analyzed += 1,
                    PlaceOutcome::Skipped => report.skipped += 1,
                    PlaceOutcome::Failed => report.failed += 1,
                }
            }

            done += batch.len();
            self.progress.publish(
                Stage::Enrichment,
                batch_percent(done, total),
                format!("Analyzed: {}", titles.join(", ")),
            );
        }

        self.progress
            .publish(Stage::Enrichment, 90, "Brand-level analysis...");
        report.aggregate = self.enrich_aggregate(places).await;
        self.progress
            .publish(Stage::Enrichment, 99, "AI analysis complete");

        info!(
            analyzed = report.analyzed,
            skipped = report.skipped,
            failed = report.failed,
            aggregate = report.aggregate.is_some(),
            "AI enrichment finished"
        );
        report
    }

    async fn enrich_place(&self, place: &mut Place) -> PlaceOutcome {
        if place.reviews.is_empty() || place.analysis.is_some() {
            return PlaceOutcome::Skipped;
        }

        let result = self
            .analyzer
            .analyze_place(&place.title, &place.reviews, &self.sampling)
            .await;

        match result {
            Ok(analysis) => {
                place.analysis = Some(analysis);
                PlaceOutcome::Analyzed
            }
            Err(e) => {
                let err = ScopeError::Enrichment {
                    place: place.title.clone(),
                    message: e.to_string(),
                };
                warn!("{}; continuing without analysis", err);
                PlaceOutcome::Failed
            }
        }
    }

    async fn enrich_aggregate(&self, places: &[Place]) -> Option<AnalysisResult> {
        let reviews: Vec<Review> = places
            .iter()
            .flat_map(|p| p.reviews.iter().cloned())
            .collect();
        let brand = brand_name(places);

        match self
            .analyzer
            .analyze_aggregate(&reviews, &brand, places.len(), &self.sampling)
            .await
        {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                let err = ScopeError::AggregateEnrichment(e.to_string());
                warn!("{}; continuing without brand-level analysis", err);
                None
            }
        }
    }
}

fn batch_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    ((done as f64 / total as f64) * 90.0).round() as u8
}
