//! In-memory fakes for driving the pipeline without network or timers
#![allow(dead_code)]

use async_trait::async_trait;
use reviewscope::enrichment::{Analyzer, SamplingPolicy};
use reviewscope::error::{Result, ScopeError};
use reviewscope::jobs::{
    DiscoveryRequest, JobProvider, JobStatus, PollSchedule, ScrapeRequest, Sleeper,
};
use reviewscope::model::{AnalysisResult, JobHandle, JobKind, RawRecord, Review};
use reviewscope::pipeline::{Pipeline, PipelineSettings, ProgressBus};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sleeper that returns immediately and counts its calls
#[derive(Default)]
pub struct InstantSleeper {
    pub sleeps: AtomicU32,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted crawling service
pub struct FakeProvider {
    pub listings: Vec<Value>,
    pub reviews: Vec<Value>,
    /// Status checks answered with Running before the job succeeds
    pub running_checks: u32,
    /// Terminal failure reported instead of success
    pub failure: Option<String>,
    pub started: Mutex<Vec<JobKind>>,
    pub scraped_urls: Mutex<Vec<String>>,
    pub status_checks: AtomicU32,
}

impl FakeProvider {
    pub fn new(listings: Vec<Value>, reviews: Vec<Value>) -> Self {
        Self {
            listings,
            reviews,
            running_checks: 1,
            failure: None,
            started: Mutex::new(Vec::new()),
            scraped_urls: Mutex::new(Vec::new()),
            status_checks: AtomicU32::new(0),
        }
    }

    pub fn never_finishing() -> Self {
        Self {
            running_checks: u32::MAX,
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    pub fn started_jobs(&self) -> Vec<JobKind> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobProvider for FakeProvider {
    async fn start_discovery(&self, _request: &DiscoveryRequest) -> Result<JobHandle> {
        self.started.lock().unwrap().push(JobKind::Discovery);
        Ok(JobHandle::new("search-1", JobKind::Discovery))
    }

    async fn start_scrape(&self, request: &ScrapeRequest) -> Result<JobHandle> {
        self.started.lock().unwrap().push(JobKind::Scrape);
        self.scraped_urls
            .lock()
            .unwrap()
            .extend(request.urls.iter().cloned());
        Ok(JobHandle::new("scrape-1", JobKind::Scrape))
    }

    async fn job_status(&self, _handle: &JobHandle) -> Result<JobStatus> {
        let check = self.status_checks.fetch_add(1, Ordering::SeqCst);
        if check < self.running_checks {
            return Ok(JobStatus::Running);
        }
        match &self.failure {
            Some(message) => Ok(JobStatus::Failed(message.clone())),
            None => Ok(JobStatus::Succeeded),
        }
    }

    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<RawRecord>> {
        let records = match handle.kind {
            JobKind::Discovery => &self.listings,
            JobKind::Scrape => &self.reviews,
        };
        Ok(records.iter().cloned().map(RawRecord::from).collect())
    }
}

/// Analyzer that fails for one place and tracks concurrency
#[derive(Default)]
pub struct FakeAnalyzer {
    pub failing_place: Option<String>,
    pub fail_aggregate: bool,
    pub place_calls: AtomicUsize,
    pub aggregate_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn failing_for(place: &str) -> Self {
        Self {
            failing_place: Some(place.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze_place(
        &self,
        place_name: &str,
        _reviews: &[Review],
        _sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_place.as_deref() == Some(place_name) {
            return Err(ScopeError::MalformedResponse {
                context: place_name.to_string(),
                message: "expected value at line 1 column 1".to_string(),
            });
        }
        Ok(AnalysisResult {
            strengths: vec![format!("{} staff", place_name)],
            priorities: vec!["a".into(), "b".into(), "c".into()],
            ..Default::default()
        })
    }

    async fn analyze_aggregate(
        &self,
        _reviews: &[Review],
        brand: &str,
        _total_places: usize,
        _sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_aggregate {
            return Err(ScopeError::MalformedResponse {
                context: "brand analysis".to_string(),
                message: "truncated".to_string(),
            });
        }
        Ok(AnalysisResult {
            strengths: vec![format!("{} overall", brand)],
            ..Default::default()
        })
    }
}

pub fn settings(max_attempts: u32, batch_size: usize) -> PipelineSettings {
    PipelineSettings {
        discovery: PollSchedule::discovery(Duration::from_secs(2), max_attempts),
        scrape: PollSchedule::scrape(Duration::from_secs(3), max_attempts),
        batch_size,
        sampling: SamplingPolicy::default(),
        analysis_key_env: "OPENAI_API_KEY".to_string(),
    }
}

pub fn pipeline(provider: Arc<FakeProvider>, settings: PipelineSettings) -> Pipeline {
    Pipeline::new(
        provider,
        settings,
        Arc::new(InstantSleeper::default()),
        ProgressBus::new(),
    )
}

/// Listing search record
pub fn listing(place_id: &str, title: &str) -> Value {
    json!({
        "placeId": place_id,
        "title": title,
        "address": format!("Via {}, Milano", title),
        "url": format!("https://www.google.com/maps/place/?q=place_id:{}", place_id),
        "totalScore": 4.2,
        "reviewsCount": 120,
    })
}

/// Flat review record carrying its place metadata
pub fn flat_review(place_id: &str, title: &str, stars: u8, text: &str) -> Value {
    json!({
        "placeId": place_id,
        "title": title,
        "stars": stars,
        "text": text,
        "name": "Giulia",
    })
}

/// `count` places each with three reviews
pub fn scraped_places(count: usize) -> Vec<Value> {
    (0..count)
        .flat_map(|i| {
            let id = format!("P{}", i);
            let title = format!("Cafe {} - Milano", i);
            vec![
                flat_review(&id, &title, 5, "ottimo caffè, personale gentile"),
                flat_review(&id, &title, 4, "caffè buono, personale veloce"),
                flat_review(&id, &title, 1, "attesa lunga"),
            ]
        })
        .collect()
}
