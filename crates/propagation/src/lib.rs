//! Propagation Library
//!
//! Field-strength and path-loss models for VHF/UHF broadcast services:
//! - ITU-R P.1546 tabulated curves with bracket interpolation
//! - P.526 single-obstacle knife-edge diffraction with an Assis roughness term
//! - A coarse point-to-point diffraction estimate for direct station checks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod curves;
pub mod diffraction;
pub mod p2p;

pub use curves::{CurveSet, CurveTable, CURVES_PATH_ENV};
pub use diffraction::{
    field_from_power, free_space_loss_db, knife_edge_loss_db, DiffractionConfig, DiffractionModel,
    Obstacle, PathLoss,
};
pub use p2p::{P2pEstimate, SimplifiedP2p};

/// Field strength at 1 km from a 1 kW ERP dipole in free space (dBµV/m)
pub const FIELD_AT_1KM_1KW_DBUV: f64 = 106.92;

/// Lowest ERP used in dB conversions (kW)
pub const MIN_ERP_KW: f64 = 0.001;

/// `10·log10(ERP)` with the ERP floored at [`MIN_ERP_KW`]. NaN stays NaN.
pub fn erp_gain_db(erp_kw: f64) -> f64 {
    if erp_kw.is_nan() {
        return f64::NAN;
    }
    10.0 * erp_kw.max(MIN_ERP_KW).log10()
}

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid curve table: {0}")]
    InvalidTable(String),
    #[error("Curve set contains no tables")]
    EmptyCurveSet,
    #[error("Invalid terrain profile: {0}")]
    InvalidProfile(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PropagationError>;

/// Propagation path category of a curve table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    #[serde(alias = "Land", alias = "LAND")]
    Land,
    #[serde(alias = "Sea", alias = "SEA")]
    Sea,
}

impl Default for PathType {
    fn default() -> Self {
        PathType::Land
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathType::Land => write!(f, "land"),
            PathType::Sea => write!(f, "sea"),
        }
    }
}

impl FromStr for PathType {
    type Err = PropagationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "land" => Ok(PathType::Land),
            "sea" => Ok(PathType::Sea),
            other => Err(PropagationError::InvalidInput(format!("unknown path type '{}'", other))),
        }
    }
}
