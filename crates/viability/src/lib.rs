//! Viability Library
//!
//! Job orchestration for broadcast station analyses:
//! - Simulation records with a single queued → done/failed transition
//! - Viability jobs (class limits, interference, protected contour)
//! - Contour-only jobs and direct point-to-point field checks
//! - Queue dispatch with a synchronous fallback at the submission boundary
//! - JSON loaders and engine configuration

use coverage::{CoverageError, ErrorKind};
use propagation::PropagationError;
use thiserror::Error;
use uuid::Uuid;

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod loader;
pub mod simulation;
pub mod store;

pub use config::EngineConfig;
pub use dispatch::{DispatchError, JobBoundary, JobDispatcher, QueueDispatcher, Submission};
pub use engine::{ContourOutcome, Engine, JobOutcome, P2pOutcome, ViabilityOutcome};
pub use simulation::{truncate_message, AnalysisKind, ContourTag, Job, Simulation, SimulationStatus, MAX_MESSAGE_CHARS};
pub use store::{CoverageResult, MemoryStore, ResultStore, StationStore};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Station not found: {0}")]
    StationNotFound(String),
    #[error("Station {0} has no valid position")]
    NoPosition(String),
    #[error("Simulation not found: {0}")]
    SimulationNotFound(Uuid),
    #[error("Simulation {0} already reached a terminal state")]
    AlreadyTerminal(Uuid),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Coverage error: {0}")]
    Coverage(#[from] CoverageError),
    #[error("Propagation error: {0}")]
    Propagation(#[from] PropagationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Job worker failed: {0}")]
    Worker(String),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::StationNotFound(_) | JobError::NoPosition(_) | JobError::Json(_) => ErrorKind::Input,
            JobError::SimulationNotFound(_) | JobError::AlreadyTerminal(_) => ErrorKind::Input,
            JobError::Store(_) | JobError::Io(_) => ErrorKind::DataUnavailable,
            JobError::Dispatch(_) => ErrorKind::Dispatch,
            JobError::Coverage(e) => e.kind(),
            JobError::Propagation(PropagationError::InvalidInput(_)) => ErrorKind::Input,
            JobError::Propagation(_) | JobError::Worker(_) => ErrorKind::Computation,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
