// Per-run state threaded through the controller

use crate::error::ScopeError;
use crate::model::{JobHandle, Place, SearchMode};
use std::fmt;
use uuid::Uuid;

/// Controller state machine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Discovering,
    Selecting,
    Scraping,
    Enriching,
    Done,
    Failed {
        message: String,
    },
}

impl PipelineState {
    /// Done or Failed; a new run may start from here
    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Discovering => write!(f, "discovering"),
            PipelineState::Selecting => write!(f, "selecting"),
            PipelineState::Scraping => write!(f, "scraping"),
            PipelineState::Enriching => write!(f, "enriching"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed { message } => write!(f, "failed ({})", message),
        }
    }
}

/// Identifiers and intermediate data of one pipeline run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub mode: Option<SearchMode>,
    /// Brand name in brand mode
    pub query: Option<String>,
    /// Places offered for selection
    pub discovered: Vec<Place>,
    /// Held only while the job is being polled
    pub discovery_job: Option<JobHandle>,
    pub scrape_job: Option<JobHandle>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::Idle,
            mode: None,
            query: None,
            discovered: Vec::new(),
            discovery_job: None,
            scrape_job: None,
        }
    }

    /// Start over with a fresh run id
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Enter Failed and drop everything collected so far
    pub fn fail(&mut self, message: impl Into<String>) {
        self.discovered.clear();
        self.discovery_job = None;
        self.scrape_job = None;
        self.state = PipelineState::Failed {
            message: message.into(),
        };
    }

    pub(crate) fn invalid_state(&self, operation: &str) -> ScopeError {
        ScopeError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
