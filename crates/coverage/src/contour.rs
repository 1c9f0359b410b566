//! Protected-service contour generation
//!
//! For each bearing the generator finds the distance at which the predicted
//! field falls to the target level, by bisection between a service floor and
//! a ceiling. The per-bearing points form a closed ring around the station.

use crate::station::{Service, Station, Technology};
use crate::{CoverageError, Result};
use geojson::{Feature, Geometry, JsonObject, Value};
use propagation::{erp_gain_db, CurveSet, PathType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use terrain::{ElevationProvider, GeoPoint, HeightSource};
use tracing::{debug, warn};

/// Upper search bound for any contour (km)
pub const MAX_CONTOUR_KM: f64 = 200.0;

/// Minimum number of valid bearings for a contour
pub const MIN_CONTOUR_BEARINGS: usize = 3;

/// Time percentage of the upper curve used for digital TV location statistics
const DIGITAL_TV_UPPER_TIME_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    /// Angular step between bearings (degrees)
    pub step_deg: f64,
    /// Bisection rounds per bearing
    pub rounds: u32,
    /// Search ceiling when the class has no tighter cap (km)
    pub ceiling_km: f64,
    /// Minimum radius for FM, RTR and community radio (km)
    pub radio_floor_km: f64,
    /// Minimum radius for TV and RTV (km)
    pub tv_floor_km: f64,
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            step_deg: 5.0,
            rounds: 20,
            ceiling_km: MAX_CONTOUR_KM,
            radio_floor_km: 3.0,
            tv_floor_km: 5.0,
        }
    }
}

impl ContourSettings {
    pub fn floor_km(&self, service: Service) -> f64 {
        if service.is_tv() {
            self.tv_floor_km
        } else {
            self.radio_floor_km
        }
    }

    fn bearings(&self) -> Vec<f64> {
        let step = if self.step_deg.is_finite() && self.step_deg > 0.0 {
            self.step_deg
        } else {
            5.0
        };
        let count = (360.0 / step).round().max(1.0) as usize;
        (0..count).map(|i| i as f64 * step).filter(|b| *b < 360.0).collect()
    }
}

/// Contour query for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourRequest {
    pub target_dbuv_m: f64,
    pub time_percent: f64,
    pub path: PathType,
    /// Regulatory cap on the radius (km)
    pub cap_km: Option<f64>,
}

/// Solved radial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Radial {
    pub bearing_deg: f64,
    pub distance_km: f64,
    pub erp_kw: f64,
    pub effective_height_m: f64,
    pub height_source: HeightSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub station_id: String,
    pub target_dbuv_m: f64,
    pub time_percent: f64,
    pub path: PathType,
    pub radials: Vec<Radial>,
    /// Closed ring, first point repeated at the end
    pub ring: Vec<GeoPoint>,
}

impl Contour {
    pub fn mean_distance_km(&self) -> f64 {
        if self.radials.is_empty() {
            return 0.0;
        }
        self.radials.iter().map(|r| r.distance_km).sum::<f64>() / self.radials.len() as f64
    }

    pub fn is_closed(&self) -> bool {
        self.ring.len() >= MIN_CONTOUR_BEARINGS + 1 && self.ring.first() == self.ring.last()
    }

    /// GeoJSON Feature with a single-ring Polygon (lon, lat order)
    pub fn to_geojson(&self, tag: &str) -> Feature {
        let ring: Vec<Vec<f64>> = self.ring.iter().map(|p| vec![p.longitude, p.latitude]).collect();

        let mut properties = JsonObject::new();
        properties.insert("station_id".to_string(), self.station_id.clone().into());
        properties.insert("kind".to_string(), tag.into());
        properties.insert("target_dbuv_m".to_string(), self.target_dbuv_m.into());
        properties.insert("time_percent".to_string(), self.time_percent.into());
        properties.insert("path".to_string(), self.path.to_string().into());
        properties.insert("mean_distance_km".to_string(), self.mean_distance_km().into());

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Bisection on `field(d) - target` over `[lo, hi]`: the field is assumed to
/// decrease with distance, so `lo` moves out while the field is still above
/// target. Returns the upper bracket.
pub fn bisect<F>(field: F, target: f64, lo: f64, hi: f64, rounds: u32) -> f64
where
    F: Fn(f64) -> f64,
{
    let (mut lo, mut hi) = (lo, hi);
    for _ in 0..rounds {
        let mid = 0.5 * (lo + hi);
        if field(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

#[derive(Clone)]
pub struct ContourGenerator {
    curves: Arc<CurveSet>,
    elevation: ElevationProvider,
    settings: ContourSettings,
}

impl ContourGenerator {
    pub fn new(curves: Arc<CurveSet>, elevation: ElevationProvider, settings: ContourSettings) -> Self {
        Self {
            curves,
            elevation,
            settings,
        }
    }

    pub fn settings(&self) -> &ContourSettings {
        &self.settings
    }

    /// Predicted field (dBµV/m) at `dist_km` for a station radiating `erp_kw`
    /// from an effective height `height_m`.
    pub fn field_at(
        &self,
        station: &Station,
        dist_km: f64,
        height_m: f64,
        erp_kw: f64,
        time_percent: f64,
        path: PathType,
    ) -> f64 {
        let freq = station.frequency_or_default();
        let e = self.curves.field_strength(freq, dist_km, height_m, time_percent, path);
        let e = if station.service.is_tv() && station.technology == Technology::Digital {
            let e10 = self
                .curves
                .field_strength(freq, dist_km, height_m, DIGITAL_TV_UPPER_TIME_PERCENT, path);
            2.0 * e - e10
        } else {
            e
        };
        e + erp_gain_db(erp_kw)
    }

    pub fn generate(&self, station: &Station, request: &ContourRequest) -> Result<Contour> {
        let origin = station
            .valid_position()
            .ok_or_else(|| CoverageError::DegenerateContour {
                station: station.id.clone(),
                valid: 0,
            })?;

        let ceiling = request
            .cap_km
            .filter(|c| c.is_finite() && *c > 0.0)
            .map_or(self.settings.ceiling_km, |c| c.min(self.settings.ceiling_km));
        let floor = self.settings.floor_km(station.service).min(ceiling);
        let fallback_h = station.fallback_height_m();

        let mut radials = Vec::new();
        let mut ring = Vec::new();
        for bearing in self.settings.bearings() {
            let erp = station.erp_toward(bearing);
            let height = self
                .elevation
                .effective_height(origin.latitude, origin.longitude, bearing, fallback_h);

            let field = |d: f64| self.field_at(station, d, height.height_m, erp, request.time_percent, request.path);
            let dist = bisect(field, request.target_dbuv_m, floor, ceiling, self.settings.rounds).clamp(floor, ceiling);

            let point = origin.destination(bearing, dist * 1000.0);
            if !dist.is_finite() || !field(dist).is_finite() || !point.is_valid() {
                warn!("Station {}: no valid radial at {:.0}°", station.id, bearing);
                continue;
            }

            debug!(
                "Station {} bearing {:.0}°: {:.2} km (ERP {:.3} kW, h_eff {:.1} m {:?})",
                station.id, bearing, dist, erp, height.height_m, height.source
            );
            radials.push(Radial {
                bearing_deg: bearing,
                distance_km: dist,
                erp_kw: erp,
                effective_height_m: height.height_m,
                height_source: height.source,
            });
            ring.push(point);
        }

        if radials.len() < MIN_CONTOUR_BEARINGS {
            return Err(CoverageError::DegenerateContour {
                station: station.id.clone(),
                valid: radials.len(),
            });
        }

        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }

        Ok(Contour {
            station_id: station.id.clone(),
            target_dbuv_m: request.target_dbuv_m,
            time_percent: request.time_percent,
            path: request.path,
            radials,
            ring,
        })
    }
}
