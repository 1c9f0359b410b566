//! Elevation sampling with graceful degradation
//!
//! Every lookup goes through an [`ElevationSource`], the contract for the
//! external elevation collaborator: a number, "absent", or an error. The
//! [`ElevationProvider`] turns that into the operations the propagation code
//! needs (point samples, radial means, effective height, path profiles) and
//! never lets a source error escape where "absent" is the documented outcome.

use crate::geodesy::GeoPoint;
use crate::{Result, TerrainError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, trace, warn};

/// Default nominal antenna height when a station has none (m)
pub const DEFAULT_FALLBACK_HEIGHT_M: f64 = 30.0;

/// External elevation collaborator.
pub trait ElevationSource: Send + Sync {
    /// Terrain elevation in meters above sea level, `None` when the source has no data.
    fn elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>>;
}

/// Constant-elevation terrain
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain(pub f64);

impl ElevationSource for FlatTerrain {
    fn elevation(&self, _lat: f64, _lon: f64) -> Result<Option<f64>> {
        Ok(Some(self.0))
    }
}

/// Source with no data anywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerrain;

impl ElevationSource for NoTerrain {
    fn elevation(&self, _lat: f64, _lon: f64) -> Result<Option<f64>> {
        Ok(None)
    }
}

/// Elevation sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Per-lookup timeout for slow/remote sources (ms)
    pub timeout_ms: u64,
    /// Start of the mean-terrain window along a radial (m)
    pub radial_start_m: f64,
    /// End of the mean-terrain window along a radial (m)
    pub radial_end_m: f64,
    /// Samples taken inside the mean-terrain window
    pub radial_samples: usize,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            radial_start_m: 3000.0,
            radial_end_m: 15000.0,
            radial_samples: 20,
        }
    }
}

/// Where an effective height came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightSource {
    /// Site ground minus mean radial terrain
    Terrain,
    /// Nominal mounting height (terrain unavailable or implausible)
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveHeight {
    pub height_m: f64,
    pub source: HeightSource,
}

/// Terrain profile between two points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Distance of each sample from the start (m), non-decreasing
    pub distances_m: Vec<f64>,
    /// Elevation of each sample above sea level (m)
    pub elevations_m: Vec<f64>,
}

impl Profile {
    pub fn new(distances_m: Vec<f64>, elevations_m: Vec<f64>) -> Self {
        Self { distances_m, elevations_m }
    }

    pub fn len(&self) -> usize {
        self.distances_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances_m.is_empty()
    }

    /// Total path length (m)
    pub fn total_m(&self) -> f64 {
        self.distances_m.last().copied().unwrap_or(0.0)
    }

    pub fn first_elevation(&self) -> Option<f64> {
        self.elevations_m.first().copied()
    }

    pub fn last_elevation(&self) -> Option<f64> {
        self.elevations_m.last().copied()
    }
}

/// Terrain sampling front-end over an [`ElevationSource`]
#[derive(Clone)]
pub struct ElevationProvider {
    source: Arc<dyn ElevationSource>,
    config: ElevationConfig,
}

impl ElevationProvider {
    pub fn new(source: Arc<dyn ElevationSource>) -> Self {
        Self::with_config(source, ElevationConfig::default())
    }

    pub fn with_config(source: Arc<dyn ElevationSource>, config: ElevationConfig) -> Self {
        Self { source, config }
    }

    /// Provider over perfectly flat terrain at `elevation_m`
    pub fn flat(elevation_m: f64) -> Self {
        Self::new(Arc::new(FlatTerrain(elevation_m)))
    }

    /// Provider with no terrain data at all
    pub fn unavailable() -> Self {
        Self::new(Arc::new(NoTerrain))
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    /// Elevation at a point, as a typed result.
    pub fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(TerrainError::Unavailable { lat, lon });
        }
        match self.source.elevation(lat, lon)? {
            Some(h) if h.is_finite() => Ok(h),
            _ => Err(TerrainError::Unavailable { lat, lon }),
        }
    }

    /// Elevation at a point; any failure is reported as absent.
    pub fn sample_height(&self, lat: f64, lon: f64) -> Option<f64> {
        match self.sample(lat, lon) {
            Ok(h) => Some(h),
            Err(TerrainError::Unavailable { .. }) => None,
            Err(e) => {
                debug!("Elevation lookup at ({:.5}, {:.5}) failed: {}", lat, lon, e);
                None
            }
        }
    }

    /// Mean elevation of `samples` equally spaced points along a bearing between
    /// `start_m` and `end_m`. Fails only if none of the samples is valid.
    pub fn radial_mean(
        &self,
        lat: f64,
        lon: f64,
        bearing_deg: f64,
        start_m: f64,
        end_m: f64,
        samples: usize,
    ) -> Result<f64> {
        let origin = GeoPoint::new(lat, lon);
        let samples = samples.max(1);
        let span = (samples - 1).max(1) as f64;

        let heights: Vec<f64> = (0..samples)
            .filter_map(|i| {
                let dist = start_m + (end_m - start_m) * i as f64 / span;
                let p = origin.destination(bearing_deg, dist);
                self.sample_height(p.latitude, p.longitude)
            })
            .collect();

        if heights.is_empty() {
            return Err(TerrainError::NoValidSamples(samples));
        }
        Ok(heights.iter().sum::<f64>() / heights.len() as f64)
    }

    /// Antenna height above mean terrain from terrain data alone.
    ///
    /// `ground(site) - mean(terrain along the radial window)`. Errors when any
    /// required sample is unavailable.
    pub fn terrain_effective_height(&self, lat: f64, lon: f64, bearing_deg: f64) -> Result<f64> {
        let ground = self.sample(lat, lon)?;
        let mean = self.radial_mean(
            lat,
            lon,
            bearing_deg,
            self.config.radial_start_m,
            self.config.radial_end_m,
            self.config.radial_samples,
        )?;
        Ok(ground - mean)
    }

    /// Effective height with the nominal-height fallback applied.
    ///
    /// Non-positive or unavailable terrain heights yield `fallback_m`.
    pub fn effective_height(&self, lat: f64, lon: f64, bearing_deg: f64, fallback_m: f64) -> EffectiveHeight {
        match self.terrain_effective_height(lat, lon, bearing_deg) {
            Ok(h) if h.is_finite() && h > 0.0 => EffectiveHeight {
                height_m: h,
                source: HeightSource::Terrain,
            },
            Ok(h) => {
                trace!("Implausible effective height {:.1} m at bearing {:.0}, using fallback", h, bearing_deg);
                EffectiveHeight {
                    height_m: fallback_m,
                    source: HeightSource::Fallback,
                }
            }
            Err(e) => {
                trace!("Effective height unavailable at bearing {:.0}: {}", bearing_deg, e);
                EffectiveHeight {
                    height_m: fallback_m,
                    source: HeightSource::Fallback,
                }
            }
        }
    }

    /// Geodesic terrain profile from `from` to `to`, both endpoints included.
    ///
    /// Unavailable when an endpoint is missing or more than half of the samples
    /// are. Interior gaps are filled by linear interpolation.
    pub fn path_profile(&self, from: GeoPoint, to: GeoPoint, samples: usize) -> Result<Profile> {
        let total_m = from.distance_m(&to);
        if total_m <= 1.0 {
            let h0 = self.sample(from.latitude, from.longitude)?;
            return Ok(Profile::new(vec![0.0, total_m], vec![h0, h0]));
        }

        let samples = samples.max(2);
        let bearing = from.bearing_to(&to);
        let span = (samples - 1) as f64;

        let mut distances = Vec::with_capacity(samples);
        let mut raw = Vec::with_capacity(samples);
        for i in 0..samples {
            let dist = total_m * i as f64 / span;
            let p = from.destination(bearing, dist);
            distances.push(dist);
            raw.push(self.sample_height(p.latitude, p.longitude));
        }

        let valid = raw.iter().filter(|h| h.is_some()).count();
        let endpoints_ok = raw.first().map_or(false, Option::is_some) && raw.last().map_or(false, Option::is_some);
        if !endpoints_ok || valid * 2 < samples {
            return Err(TerrainError::IncompleteProfile { valid, total: samples });
        }

        let elevations = fill_gaps(&distances, &raw);
        Ok(Profile::new(distances, elevations))
    }

    /// Coarse profile along the straight lat/lon line between two points.
    ///
    /// Missing samples are dropped, so the profile may be shorter than requested
    /// or empty.
    pub fn linear_profile(&self, from: GeoPoint, to: GeoPoint, samples: usize) -> Profile {
        let total_m = from.distance_m(&to);
        let mut profile = Profile::default();
        if total_m <= 0.0 {
            return profile;
        }

        let samples = samples.max(1);
        for i in 0..=samples {
            let frac = i as f64 / samples as f64;
            let lat = from.latitude + (to.latitude - from.latitude) * frac;
            let lon = from.longitude + (to.longitude - from.longitude) * frac;
            if let Some(h) = self.sample_height(lat, lon) {
                profile.distances_m.push(total_m * frac);
                profile.elevations_m.push(h);
            }
        }
        profile
    }
}

/// Linear interpolation across interior `None`s; endpoints must be `Some`.
fn fill_gaps(distances: &[f64], raw: &[Option<f64>]) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len());
    let mut prev: Option<(f64, f64)> = None;

    for (i, h) in raw.iter().enumerate() {
        match h {
            Some(h) => {
                out.push(*h);
                prev = Some((distances[i], *h));
            }
            None => {
                let next = raw[i + 1..]
                    .iter()
                    .zip(&distances[i + 1..])
                    .find_map(|(h, d)| h.map(|h| (*d, h)));
                let value = match (prev, next) {
                    (Some((d0, h0)), Some((d1, h1))) if d1 > d0 => {
                        h0 + (h1 - h0) * (distances[i] - d0) / (d1 - d0)
                    }
                    (Some((_, h0)), _) => h0,
                    (None, Some((_, h1))) => h1,
                    (None, None) => 0.0,
                };
                out.push(value);
            }
        }
    }
    out
}

/// Timeout-bounded wrapper around a slow or remote [`ElevationSource`].
///
/// Each lookup runs as its own blocking task on a runtime owned by the wrapper
/// and is raced against `tokio::time::timeout`. A lookup that hangs only holds
/// its own thread; later lookups are not queued behind it.
///
/// Must not be called from inside an async context; run callers through
/// `spawn_blocking` or `block_in_place`.
pub struct TimeoutSource {
    inner: Arc<dyn ElevationSource>,
    runtime: Option<Runtime>,
    timeout: Duration,
}

impl TimeoutSource {
    pub fn spawn(inner: Arc<dyn ElevationSource>, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("elevation-lookup")
            .enable_time()
            .build()?;

        Ok(Self {
            inner,
            runtime: Some(runtime),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ElevationSource for TimeoutSource {
    fn elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        let runtime = self.runtime.as_ref().ok_or(TerrainError::WorkerGone)?;
        let inner = self.inner.clone();
        let lookup = runtime.spawn_blocking(move || inner.elevation(lat, lon));

        match runtime.block_on(tokio::time::timeout(self.timeout, lookup)) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Elevation lookup at ({:.5}, {:.5}) aborted: {}", lat, lon, e);
                Err(TerrainError::WorkerGone)
            }
            Err(_) => {
                warn!("Elevation lookup at ({:.5}, {:.5}) timed out after {:?}", lat, lon, self.timeout);
                Err(TerrainError::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for TimeoutSource {
    fn drop(&mut self) {
        // Hung lookups are abandoned, not joined
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("Elevation lookup runtime stopped");
        }
    }
}
