//! Terrain Library
//!
//! Spherical geodesy and terrain elevation sampling for broadcast propagation:
//! - Forward/inverse great-circle math on a spherical Earth
//! - Point and radial elevation sampling with graceful degradation
//! - Effective antenna height above mean terrain
//! - Local SRTM `.hgt` tile source with a per-tile cache
//! - Timeout-bounded wrapper for slow or remote elevation sources

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod elevation;
pub mod geodesy;
pub mod srtm;

pub use elevation::{
    EffectiveHeight, ElevationConfig, ElevationProvider, ElevationSource, FlatTerrain, HeightSource,
    NoTerrain, Profile, TimeoutSource,
};
pub use geodesy::{destination_point, haversine_km, haversine_m, initial_bearing, GeoPoint};
pub use srtm::{tile_name, SrtmTiles};

#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unexpected tile size in {path:?}: {len} bytes")]
    TileSize { path: PathBuf, len: usize },
    #[error("Elevation lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("Elevation lookup runtime is not running")]
    WorkerGone,
    #[error("No elevation at ({lat:.5}, {lon:.5})")]
    Unavailable { lat: f64, lon: f64 },
    #[error("No valid terrain samples out of {0}")]
    NoValidSamples(usize),
    #[error("Incomplete terrain profile: {valid} of {total} samples valid")]
    IncompleteProfile { valid: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, TerrainError>;
