// Bounded fixed-interval polling of external jobs

use super::{JobProvider, JobStatus, Sleeper};
use crate::error::{Result, ScopeError};
use crate::model::{JobHandle, JobKind, RawRecord};
use crate::progress::{ProgressBus, Stage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress range reported while a job is polled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub base: f64,
    pub span: f64,
    pub cap: f64,
}

impl ProgressBand {
    /// `min(cap, base + attempt / max_attempts * span)`
    pub fn percent(&self, attempt: u32, max_attempts: u32) -> u8 {
        let fraction = attempt as f64 / max_attempts.max(1) as f64;
        (self.base + fraction * self.span).min(self.cap).round() as u8
    }
}

/// Fixed interval and attempt budget; timeouts are attempt-count based
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
    pub band: ProgressBand,
}

impl PollSchedule {
    /// Listing search: 2s x 150 by default (about 5 minutes)
    pub fn discovery(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            band: ProgressBand {
                base: 10.0,
                span: 40.0,
                cap: 45.0,
            },
        }
    }

    /// Review scrape: 3s x 200 by default (about 10 minutes)
    pub fn scrape(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            band: ProgressBand {
                base: 10.0,
                span: 80.0,
                cap: 90.0,
            },
        }
    }
}

/// Human-readable elapsed time: "45s" or "2m 5s"
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (mins, secs) = (secs / 60, secs % 60);
    if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Drives external jobs to a terminal state
///
/// Owns no state between polling sessions. A failed status check is not
/// retried: the error ends the session immediately without consuming an
/// attempt.
pub struct JobPoller {
    sleeper: Arc<dyn Sleeper>,
    progress: ProgressBus,
}

impl JobPoller {
    pub fn new(sleeper: Arc<dyn Sleeper>, progress: ProgressBus) -> Self {
        Self { sleeper, progress }
    }

    /// Poll `handle` until it succeeds, then fetch its full result set
    pub async fn poll_until_terminal(
        &self,
        provider: &dyn JobProvider,
        handle: &JobHandle,
        schedule: &PollSchedule,
    ) -> Result<Vec<RawRecord>> {
        let attempts = self
            .poll_status(&handle.job_id, handle.kind, schedule, || {
                provider.job_status(handle)
            })
            .await?;

        let records = provider.fetch_results(handle).await?;
        info!(
            job_id = %handle.job_id,
            attempts,
            records = records.len(),
            "Job {} succeeded",
            handle.kind.label()
        );
        Ok(records)
    }

    /// Issue one status check per tick until a terminal status
    ///
    /// Returns the number of checks issued when the job succeeded.
    pub async fn poll_status<F, Fut>(
        &self,
        job_id: &str,
        kind: JobKind,
        schedule: &PollSchedule,
        mut fetch_status: F,
    ) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobStatus>>,
    {
        let stage = match kind {
            JobKind::Discovery => Stage::Discovery,
            JobKind::Scrape => Stage::Scrape,
        };

        for attempt in 1..=schedule.max_attempts {
            let elapsed = schedule.interval * attempt;
            self.progress.publish(
                stage,
                schedule.band.percent(attempt, schedule.max_attempts),
                format!(
                    "{} in progress... {} elapsed",
                    capitalize(kind.label()),
                    format_elapsed(elapsed)
                ),
            );

            match fetch_status().await? {
                JobStatus::Running => {
                    debug!(job_id, attempt, "Job still running");
                }
                JobStatus::Succeeded => return Ok(attempt),
                JobStatus::Failed(message) => {
                    warn!(job_id, attempt, "Job failed: {}", message);
                    return Err(ScopeError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
            }

            if attempt < schedule.max_attempts {
                self.sleeper.sleep(schedule.interval).await;
            }
        }

        warn!(
            job_id,
            attempts = schedule.max_attempts,
            "Job did not finish within its attempt budget"
        );
        Err(ScopeError::PollTimeout {
            job_id: job_id.to_string(),
            attempts: schedule.max_attempts,
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
