//! Engine configuration
//!
//! Every field has a default; a JSON file may override any subset, and a few
//! environment variables override the file.

use crate::Result;
use coverage::{ContourSettings, InterferenceSettings};
use propagation::{CurveSet, DiffractionConfig, PathType, SimplifiedP2p, CURVES_PATH_ENV};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use terrain::{ElevationConfig, ElevationProvider, ElevationSource, NoTerrain, SrtmTiles, TimeoutSource};
use tracing::{info, warn};

pub const SRTM_DIR_ENV: &str = "COVERAGE_SRTM_DIR";
pub const ELEVATION_TIMEOUT_ENV: &str = "COVERAGE_ELEVATION_TIMEOUT_MS";

/// Time percentage used when a job does not name one
pub const DEFAULT_TIME_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Curve dataset; the built-in reference set when absent
    pub curves_path: Option<PathBuf>,
    /// Directory of SRTM `.hgt` tiles; no terrain when absent
    pub srtm_dir: Option<PathBuf>,
    pub elevation: ElevationConfig,
    pub contour: ContourSettings,
    pub interference: InterferenceSettings,
    pub diffraction: DiffractionConfig,
    pub p2p: SimplifiedP2p,
    pub default_time_percent: f64,
    pub default_path: PathType,
    /// Run a job inline once when the dispatcher refuses it
    pub sync_fallback: bool,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            curves_path: None,
            srtm_dir: None,
            elevation: ElevationConfig::default(),
            contour: ContourSettings::default(),
            interference: InterferenceSettings::default(),
            diffraction: DiffractionConfig::default(),
            p2p: SimplifiedP2p::default(),
            default_time_percent: DEFAULT_TIME_PERCENT,
            default_path: PathType::Land,
            sync_fallback: true,
            queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Defaults, or the JSON file at `path`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        info!("Loading engine config from {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = lookup(CURVES_PATH_ENV).filter(|v| !v.is_empty()) {
            self.curves_path = Some(PathBuf::from(p));
        }
        if let Some(d) = lookup(SRTM_DIR_ENV).filter(|v| !v.is_empty()) {
            self.srtm_dir = Some(PathBuf::from(d));
        }
        if let Some(raw) = lookup(ELEVATION_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.elevation.timeout_ms = ms,
                Err(_) => warn!("Ignoring {}={:?}: not a number of milliseconds", ELEVATION_TIMEOUT_ENV, raw),
            }
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn time_percent_or_default(&self, time_percent: Option<f64>) -> f64 {
        time_percent
            .filter(|t| t.is_finite() && *t > 0.0 && *t < 100.0)
            .unwrap_or(self.default_time_percent)
    }

    /// Curve set from `curves_path`, or the process-wide set.
    pub fn curves(&self) -> Arc<CurveSet> {
        match &self.curves_path {
            Some(path) => Arc::new(CurveSet::load_or_reference(Some(path.as_path()))),
            None => CurveSet::global(),
        }
    }

    /// Elevation provider over the SRTM directory, each lookup bounded by the
    /// configured timeout.
    pub fn elevation_provider(&self) -> Result<ElevationProvider> {
        let source: Arc<dyn ElevationSource> = match &self.srtm_dir {
            Some(dir) => {
                let tiles: Arc<dyn ElevationSource> = Arc::new(SrtmTiles::new(dir.clone()));
                let timeout = Duration::from_millis(self.elevation.timeout_ms);
                info!("Terrain from {:?} (lookup timeout {:?})", dir, timeout);
                Arc::new(TimeoutSource::spawn(tiles, timeout).map_err(coverage::CoverageError::from)?)
            }
            None => {
                info!("No terrain directory configured; using nominal heights");
                Arc::new(NoTerrain)
            }
        };
        Ok(ElevationProvider::with_config(source, self.elevation.clone()))
    }
}
