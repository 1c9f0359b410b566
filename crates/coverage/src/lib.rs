//! Coverage Library
//!
//! Broadcast station coverage and compatibility analysis:
//! - Station records (FM, RTR, TV, RTV, community radio)
//! - Regulatory tables: class limits, protection ratios, contour levels
//! - Protected-contour generation by per-bearing root finding
//! - Neighbour interference evaluation with tiered field prediction

use propagation::PropagationError;
use serde::{Deserialize, Serialize};
use terrain::TerrainError;
use thiserror::Error;

pub mod contour;
pub mod interference;
pub mod normative;
pub mod station;

pub use contour::{Contour, ContourGenerator, ContourRequest, ContourSettings, Radial};
pub use interference::{
    CompatibilityReport, FieldPolicy, FieldTier, InterferenceEvaluator, InterferenceSettings, Neighbor,
    NeighborAssessment, NeighborQuery, NeighborSource, Offset, Outcome, SpectrumFilter, Violation,
};
pub use normative::{ChannelDelta, ClassCheck, ClassLimit, NormativeTables, RadComNorm};
pub use station::{ChannelBand, Service, Station, Technology};

/// Failure categories shared by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing input; fatal for the job
    Input,
    /// External data missing; normally recovered by a fallback
    DataUnavailable,
    /// Numerical or geometric failure; fatal for the job
    Computation,
    /// Job could not be handed to a worker
    Dispatch,
}

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),
    #[error("Contour for station {station} has {valid} valid bearings")]
    DegenerateContour { station: String, valid: usize },
    #[error("Computation failed: {0}")]
    Computation(String),
    #[error("Terrain error: {0}")]
    Terrain(#[from] TerrainError),
    #[error("Propagation error: {0}")]
    Propagation(#[from] PropagationError),
}

impl CoverageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoverageError::InvalidInput(_) => ErrorKind::Input,
            CoverageError::DataUnavailable(_) | CoverageError::Terrain(_) => ErrorKind::DataUnavailable,
            CoverageError::DegenerateContour { .. } | CoverageError::Computation(_) => ErrorKind::Computation,
            CoverageError::Propagation(PropagationError::InvalidInput(_)) => ErrorKind::Input,
            CoverageError::Propagation(PropagationError::Io(_)) => ErrorKind::DataUnavailable,
            CoverageError::Propagation(_) => ErrorKind::Computation,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
