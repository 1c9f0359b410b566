//! Neighbour interference evaluation
//!
//! Every co- and adjacent-channel neighbour within the search radius is
//! assessed independently: required C/I from the protection tables, the
//! interfering field at the subject from an ordered list of propagation tiers,
//! and a pass/violation verdict against `target - C/I`.

use crate::normative::{ChannelDelta, NormativeTables};
use crate::station::Station;
use crate::{CoverageError, Result};
use propagation::{erp_gain_db, field_from_power, CurveSet, DiffractionModel, PathType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use terrain::{ElevationProvider, GeoPoint};
use tracing::{debug, info, warn};

/// Receiver antenna height above ground at the subject (m)
pub const RX_HEIGHT_M: f64 = 10.0;

/// Neighbour search query
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub filter: SpectrumFilter,
    pub exclude_id: String,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumFilter {
    /// Carrier inside `[min_mhz, max_mhz]`
    Frequency { min_mhz: f64, max_mhz: f64 },
    /// TV channel whose offset from `channel` is protected
    Channel { channel: u32 },
}

impl NeighborQuery {
    /// Distance to `station` (km) if it satisfies the query
    pub fn matches(&self, station: &Station) -> Option<f64> {
        if station.id == self.exclude_id {
            return None;
        }
        let pos = station.valid_position()?;
        let in_spectrum = match &self.filter {
            SpectrumFilter::Frequency { min_mhz, max_mhz } => station
                .frequency_mhz
                .map_or(false, |f| f >= *min_mhz && f <= *max_mhz),
            SpectrumFilter::Channel { channel } => station
                .channel
                .map_or(false, |c| ChannelDelta::between(*channel, c).is_protected()),
        };
        if !in_spectrum {
            return None;
        }
        let dist = self.center.distance_km(&pos);
        (dist <= self.radius_km).then_some(dist)
    }
}

/// Candidate neighbour with its distance to the subject
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub station: Station,
    pub distance_km: f64,
}

/// Neighbour lookup collaborator
pub trait NeighborSource: Send + Sync {
    fn neighbors(&self, query: &NeighborQuery) -> Result<Vec<Neighbor>>;
}

/// Propagation tier used for an interfering field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTier {
    /// P.526 over a sampled geodesic profile
    Diffraction,
    /// P.1546 curves with effective height toward the subject
    Curve,
}

impl fmt::Display for FieldTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTier::Diffraction => write!(f, "P.526/Assis"),
            FieldTier::Curve => write!(f, "P.1546"),
        }
    }
}

/// Ordered fallback chain of field tiers; the first tier that yields a finite
/// field wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    pub tiers: Vec<FieldTier>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![FieldTier::Diffraction, FieldTier::Curve],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterferenceSettings {
    pub search_radius_km: f64,
    /// Half-width of the FM co/adjacent window (MHz)
    pub fm_window_mhz: f64,
    pub max_neighbors: usize,
    pub rx_height_m: f64,
    pub profile_samples: usize,
    pub policy: FieldPolicy,
}

impl Default for InterferenceSettings {
    fn default() -> Self {
        Self {
            search_radius_km: 300.0,
            fm_window_mhz: 0.5,
            max_neighbors: 100,
            rx_height_m: RX_HEIGHT_M,
            profile_samples: 96,
            policy: FieldPolicy::default(),
        }
    }
}

/// Spectral separation between subject and neighbour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Offset {
    FrequencyKhz(f64),
    Channel(ChannelDelta),
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::FrequencyKhz(khz) => write!(f, "Δf={:.0} kHz", khz),
            Offset::Channel(delta) => write!(f, "Δch={}", delta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub neighbor_id: String,
    pub offset: Offset,
    pub required_ci_db: f64,
    pub field_dbuv_m: f64,
    pub limit_dbuv_m: f64,
    pub distance_km: f64,
    pub model: FieldTier,
}

impl Violation {
    pub fn message(&self) -> String {
        format!(
            "Interference: station {} {} C/I req={} dB field={:.1} dBµV/m > limit {:.1} dBµV/m (dist {:.1} km, {})",
            self.neighbor_id,
            self.offset,
            self.required_ci_db,
            self.field_dbuv_m,
            self.limit_dbuv_m,
            self.distance_km,
            self.model
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Clear { field_dbuv_m: f64, limit_dbuv_m: f64, model: FieldTier },
    Violation(Violation),
    /// No protection ratio for this offset
    Unverifiable(String),
    /// Every field tier failed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborAssessment {
    pub neighbor_id: String,
    pub distance_km: f64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Evaluation ran; false means the verdict is unknown, not a pass
    pub evaluated: bool,
    pub assessments: Vec<NeighborAssessment>,
    /// Reason evaluation could not begin
    pub note: Option<String>,
}

impl CompatibilityReport {
    pub fn not_evaluated(reason: impl Into<String>) -> Self {
        Self {
            evaluated: false,
            assessments: Vec::new(),
            note: Some(reason.into()),
        }
    }

    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.assessments.iter().filter_map(|a| match &a.outcome {
            Outcome::Violation(v) => Some(v),
            _ => None,
        })
    }

    /// Evaluated with no violations
    pub fn compatible(&self) -> bool {
        self.evaluated && self.violations().next().is_none()
    }

    pub fn unverifiable_count(&self) -> usize {
        self.assessments
            .iter()
            .filter(|a| matches!(a.outcome, Outcome::Unverifiable(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.assessments
            .iter()
            .filter(|a| matches!(a.outcome, Outcome::Failed(_)))
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        let mut msgs: Vec<String> = self.violations().map(Violation::message).collect();
        if let Some(note) = &self.note {
            msgs.push(format!("Interference not evaluated ({})", note));
        }
        msgs
    }
}

#[derive(Clone)]
pub struct InterferenceEvaluator {
    curves: Arc<CurveSet>,
    elevation: ElevationProvider,
    diffraction: DiffractionModel,
    norms: Arc<NormativeTables>,
    settings: InterferenceSettings,
}

impl InterferenceEvaluator {
    pub fn new(
        curves: Arc<CurveSet>,
        elevation: ElevationProvider,
        diffraction: DiffractionModel,
        norms: Arc<NormativeTables>,
        settings: InterferenceSettings,
    ) -> Self {
        Self {
            curves,
            elevation,
            diffraction,
            norms,
            settings,
        }
    }

    pub fn settings(&self) -> &InterferenceSettings {
        &self.settings
    }

    /// Neighbour query for `subject`, or why none can be built
    pub fn query_for(&self, subject: &Station) -> std::result::Result<NeighborQuery, String> {
        let center = subject
            .valid_position()
            .ok_or_else(|| "station has no position".to_string())?;

        let filter = if subject.service.is_tv() {
            let channel = subject.channel.ok_or_else(|| "station has no channel".to_string())?;
            SpectrumFilter::Channel { channel }
        } else {
            let f = subject
                .frequency_mhz
                .filter(|f| f.is_finite() && *f > 0.0)
                .ok_or_else(|| "station has no frequency".to_string())?;
            SpectrumFilter::Frequency {
                min_mhz: f - self.settings.fm_window_mhz,
                max_mhz: f + self.settings.fm_window_mhz,
            }
        };

        Ok(NeighborQuery {
            center,
            radius_km: self.settings.search_radius_km,
            filter,
            exclude_id: subject.id.clone(),
            limit: self.settings.max_neighbors,
        })
    }

    pub fn evaluate(
        &self,
        subject: &Station,
        time_percent: f64,
        path: PathType,
        source: &dyn NeighborSource,
    ) -> CompatibilityReport {
        let query = match self.query_for(subject) {
            Ok(q) => q,
            Err(reason) => {
                debug!("Interference for {} not evaluated: {}", subject.id, reason);
                return CompatibilityReport::not_evaluated(reason);
            }
        };

        let mut neighbors = match source.neighbors(&query) {
            Ok(n) => n,
            Err(e) => {
                warn!("Neighbour lookup for {} failed: {}", subject.id, e);
                return CompatibilityReport::not_evaluated("neighbour lookup failed");
            }
        };
        neighbors.retain(|n| n.station.id != subject.id);
        neighbors.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.station.id.cmp(&b.station.id))
        });
        neighbors.truncate(query.limit);

        let target = self.norms.target_level(subject);
        let assessments: Vec<NeighborAssessment> = neighbors
            .iter()
            .map(|n| NeighborAssessment {
                neighbor_id: n.station.id.clone(),
                distance_km: n.distance_km,
                outcome: self.assess(subject, n, target, time_percent, path),
            })
            .collect();

        let report = CompatibilityReport {
            evaluated: true,
            assessments,
            note: None,
        };
        info!(
            "Station {}: {} neighbours, {} violations, {} unverifiable, {} failed",
            subject.id,
            report.assessments.len(),
            report.violations().count(),
            report.unverifiable_count(),
            report.failed_count()
        );
        report
    }

    fn required_ratio(&self, subject: &Station, neighbor: &Station) -> std::result::Result<(Offset, f64), String> {
        if subject.service.is_tv() {
            let (Some(desired), Some(interfering)) = (subject.channel, neighbor.channel) else {
                return Err("no channel".to_string());
            };
            let delta = ChannelDelta::between(desired, interfering);
            self.norms
                .tv_ratio(subject.technology, neighbor.technology, delta)
                .map(|r| (Offset::Channel(delta), r.ci_db))
                .ok_or_else(|| format!("no {}/{} ratio for {}", subject.technology, neighbor.technology, delta))
        } else {
            let (Some(f0), Some(f1)) = (subject.frequency_mhz, neighbor.frequency_mhz) else {
                return Err("no frequency".to_string());
            };
            let delta_khz = (f1 - f0).abs() * 1000.0;
            self.norms
                .fm_ratio(delta_khz)
                .map(|r| (Offset::FrequencyKhz(delta_khz), r.ci_db))
                .ok_or_else(|| format!("no ratio for Δf={:.0} kHz", delta_khz))
        }
    }

    fn assess(&self, subject: &Station, neighbor: &Neighbor, target: f64, time_percent: f64, path: PathType) -> Outcome {
        let (offset, ci_db) = match self.required_ratio(subject, &neighbor.station) {
            Ok(r) => r,
            Err(reason) => return Outcome::Unverifiable(reason),
        };

        let (field, model) = match self.interfering_field(subject, &neighbor.station, time_percent, path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Neighbour {} of {} not assessed: {}", neighbor.station.id, subject.id, e);
                return Outcome::Failed(e.to_string());
            }
        };

        let limit = target - ci_db;
        debug!(
            "Neighbour {} ({:.1} km): field {:.1} dBµV/m, limit {:.1} dBµV/m via {}",
            neighbor.station.id, neighbor.distance_km, field, limit, model
        );

        if field > limit {
            Outcome::Violation(Violation {
                neighbor_id: neighbor.station.id.clone(),
                offset,
                required_ci_db: ci_db,
                field_dbuv_m: field,
                limit_dbuv_m: limit,
                distance_km: neighbor.distance_km,
                model,
            })
        } else {
            Outcome::Clear {
                field_dbuv_m: field,
                limit_dbuv_m: limit,
                model,
            }
        }
    }

    /// Field of `neighbor` at the subject, trying each policy tier in order.
    pub fn interfering_field(
        &self,
        subject: &Station,
        neighbor: &Station,
        time_percent: f64,
        path: PathType,
    ) -> Result<(f64, FieldTier)> {
        let rx = subject
            .valid_position()
            .ok_or_else(|| CoverageError::InvalidInput(format!("station {} has no position", subject.id)))?;
        let tx = neighbor
            .valid_position()
            .ok_or_else(|| CoverageError::InvalidInput(format!("station {} has no position", neighbor.id)))?;

        let mut last_err = CoverageError::Computation("no field tiers configured".to_string());
        for tier in &self.settings.policy.tiers {
            let result = match tier {
                FieldTier::Diffraction => self.diffraction_field(subject, neighbor, tx, rx),
                FieldTier::Curve => self.curve_field(subject, neighbor, tx, rx, time_percent, path),
            };
            match result {
                Ok(field) if field.is_finite() => return Ok((field, *tier)),
                Ok(field) => {
                    debug!("{} tier gave non-finite field {} for {}", tier, field, neighbor.id);
                    last_err = CoverageError::Computation(format!("{} field is not finite", tier));
                }
                Err(e) => {
                    debug!("{} tier failed for {}: {}", tier, neighbor.id, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn interferer_frequency(subject: &Station, neighbor: &Station) -> f64 {
        neighbor
            .frequency_mhz
            .or(subject.frequency_mhz)
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or_else(|| neighbor.service.default_frequency_mhz())
    }

    fn diffraction_field(&self, subject: &Station, neighbor: &Station, tx: GeoPoint, rx: GeoPoint) -> Result<f64> {
        let profile = self.elevation.path_profile(tx, rx, self.settings.profile_samples)?;
        let (Some(tx_ground), Some(rx_ground)) = (profile.first_elevation(), profile.last_elevation()) else {
            return Err(CoverageError::DataUnavailable("empty terrain profile".to_string()));
        };

        let tx_asl = tx_ground + neighbor.fallback_height_m();
        let rx_asl = rx_ground + self.settings.rx_height_m;
        let freq = Self::interferer_frequency(subject, neighbor);
        let loss = self.diffraction.profile_loss(&profile, freq, tx_asl, rx_asl)?;
        Ok(field_from_power(neighbor.erp_toward(tx.bearing_to(&rx)), loss.total_db))
    }

    fn curve_field(
        &self,
        subject: &Station,
        neighbor: &Station,
        tx: GeoPoint,
        rx: GeoPoint,
        time_percent: f64,
        path: PathType,
    ) -> Result<f64> {
        let bearing = tx.bearing_to(&rx);
        let height = self
            .elevation
            .effective_height(tx.latitude, tx.longitude, bearing, neighbor.fallback_height_m());
        let freq = Self::interferer_frequency(subject, neighbor);
        let e = self
            .curves
            .field_strength(freq, tx.distance_km(&rx), height.height_m, time_percent, path);
        Ok(e + erp_gain_db(neighbor.erp_toward(bearing)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normative::{FmProtectionRatio, TvProtectionRatio};
    use crate::station::{Service, Technology};

    struct Fixed(Vec<Station>);

    impl NeighborSource for Fixed {
        fn neighbors(&self, query: &NeighborQuery) -> Result<Vec<Neighbor>> {
            Ok(self
                .0
                .iter()
                .filter_map(|s| {
                    query.matches(s).map(|d| Neighbor {
                        station: s.clone(),
                        distance_km: d,
                    })
                })
                .collect())
        }
    }

    struct Unreachable;

    impl NeighborSource for Unreachable {
        fn neighbors(&self, _query: &NeighborQuery) -> Result<Vec<Neighbor>> {
            Err(CoverageError::DataUnavailable("store offline".to_string()))
        }
    }

    fn norms() -> Arc<NormativeTables> {
        Arc::new(NormativeTables {
            fm_protection: vec![
                FmProtectionRatio { kind: "co-channel".into(), delta_khz: 0.0, ci_db: 37.0 },
                FmProtectionRatio { kind: "adjacent_200khz".into(), delta_khz: 200.0, ci_db: 6.0 },
            ],
            tv_protection: vec![TvProtectionRatio {
                kind: "co-channel".into(),
                desired: Technology::Digital,
                interfering: Technology::Digital,
                delta: ChannelDelta(0),
                ci_db: 19.0,
            }],
            ..Default::default()
        })
    }

    fn evaluator(elevation: ElevationProvider, norms: Arc<NormativeTables>) -> InterferenceEvaluator {
        InterferenceEvaluator::new(
            Arc::new(CurveSet::reference()),
            elevation,
            DiffractionModel::default(),
            norms,
            InterferenceSettings::default(),
        )
    }

    fn fm(id: &str, lat: f64, lon: f64, freq: f64, erp: f64) -> Station {
        Station::new(id, Service::Fm)
            .with_position(lat, lon)
            .with_frequency(freq)
            .with_erp(erp)
    }

    #[test]
    fn test_query_filters() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let subject = fm("S", -15.9, -47.1, 100.1, 5.0);
        let query = eval.query_for(&subject).unwrap();

        assert!(query.matches(&fm("A", -15.9, -47.0, 100.5, 1.0)).is_some());
        assert!(query.matches(&fm("B", -15.9, -47.0, 100.7, 1.0)).is_none());
        assert!(query.matches(&fm("C", -25.9, -47.0, 100.1, 1.0)).is_none());
        assert!(query.matches(&subject).is_none());

        let tv = Station::new("T", Service::Tv)
            .with_position(-15.9, -47.1)
            .with_channel(30, Technology::Digital);
        let query = eval.query_for(&tv).unwrap();
        let other = |ch| {
            Station::new("U", Service::Tv)
                .with_position(-15.8, -47.1)
                .with_channel(ch, Technology::Digital)
        };
        assert!(query.matches(&other(31)).is_some());
        assert!(query.matches(&other(45)).is_some());
        assert!(query.matches(&other(33)).is_none());
    }

    #[test]
    fn test_not_evaluated_without_frequency_or_position() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let source = Fixed(vec![]);

        let no_freq = Station::new("S", Service::Fm).with_position(-15.9, -47.1);
        let report = eval.evaluate(&no_freq, 50.0, PathType::Land, &source);
        assert!(!report.evaluated);
        assert!(!report.compatible());

        let no_pos = Station::new("S", Service::Fm).with_frequency(100.0);
        assert!(!eval.evaluate(&no_pos, 50.0, PathType::Land, &source).evaluated);

        let subject = fm("S", -15.9, -47.1, 100.0, 1.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Unreachable);
        assert!(!report.evaluated);
        assert!(report.messages()[0].contains("not evaluated"));
    }

    #[test]
    fn test_co_channel_violation_on_flat_terrain() {
        let eval = evaluator(ElevationProvider::flat(1000.0), norms());
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let near = fm("N", -15.9, -47.0907, 100.0, 50.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![near]));

        assert!(report.evaluated);
        assert!(!report.compatible());
        let v = report.violations().next().unwrap();
        assert_eq!(v.neighbor_id, "N");
        assert_eq!(v.model, FieldTier::Diffraction);
        assert_eq!(v.limit_dbuv_m, 66.0 - 37.0);
        assert!(v.message().starts_with("Interference: station N Δf=0 kHz C/I req=37 dB"));
    }

    #[test]
    fn test_curve_tier_when_terrain_missing() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let near = fm("N", -15.9, -47.0907, 100.0, 50.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![near]));
        let v = report.violations().next().unwrap();
        assert_eq!(v.model, FieldTier::Curve);
    }

    #[test]
    fn test_distant_weak_neighbor_is_clear() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let far = fm("F", -13.5, -47.1, 100.2, 0.01);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![far]));
        assert!(report.compatible());
        assert!(matches!(report.assessments[0].outcome, Outcome::Clear { .. }));
    }

    #[test]
    fn test_missing_ratio_is_unverifiable() {
        let eval = evaluator(ElevationProvider::unavailable(), Arc::new(NormativeTables::default()));
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let near = fm("N", -15.9, -47.0907, 100.0, 50.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![near]));
        assert!(report.evaluated);
        assert!(report.compatible());
        assert_eq!(report.unverifiable_count(), 1);
    }

    #[test]
    fn test_failing_neighbor_does_not_stop_others() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let broken = fm("A-broken", -15.9, -47.0907, 100.0, f64::NAN);
        let valid = fm("B-valid", -15.9, -47.05, 100.0, 50.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![valid, broken]));

        assert_eq!(report.assessments.len(), 2);
        assert_eq!(report.assessments[0].neighbor_id, "A-broken");
        assert!(matches!(report.assessments[0].outcome, Outcome::Failed(_)));
        assert!(matches!(report.assessments[1].outcome, Outcome::Violation(_)));
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_stable_ordering_and_limit() {
        let eval = InterferenceEvaluator::new(
            Arc::new(CurveSet::reference()),
            ElevationProvider::unavailable(),
            DiffractionModel::default(),
            norms(),
            InterferenceSettings {
                max_neighbors: 2,
                ..Default::default()
            },
        );
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let stations = vec![
            fm("c", -15.9, -47.0, 100.0, 1.0),
            fm("b", -15.9, -47.0, 100.0, 1.0),
            fm("a", -15.9, -46.5, 100.0, 1.0),
        ];
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(stations));
        let ids: Vec<&str> = report.assessments.iter().map(|a| a.neighbor_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_policy_order_is_respected() {
        let eval = InterferenceEvaluator::new(
            Arc::new(CurveSet::reference()),
            ElevationProvider::flat(500.0),
            DiffractionModel::default(),
            norms(),
            InterferenceSettings {
                policy: FieldPolicy {
                    tiers: vec![FieldTier::Curve, FieldTier::Diffraction],
                },
                ..Default::default()
            },
        );
        let subject = fm("S", -15.9, -47.1, 100.0, 5.0);
        let neighbor = fm("N", -15.9, -47.0, 100.0, 1.0);
        let (_, tier) = eval.interfering_field(&subject, &neighbor, 50.0, PathType::Land).unwrap();
        assert_eq!(tier, FieldTier::Curve);

        let empty = InterferenceEvaluator::new(
            Arc::new(CurveSet::reference()),
            ElevationProvider::flat(500.0),
            DiffractionModel::default(),
            norms(),
            InterferenceSettings {
                policy: FieldPolicy { tiers: vec![] },
                ..Default::default()
            },
        );
        assert!(empty.interfering_field(&subject, &neighbor, 50.0, PathType::Land).is_err());
    }

    #[test]
    fn test_tv_channel_ratio() {
        let eval = evaluator(ElevationProvider::unavailable(), norms());
        let subject = Station::new("T1", Service::Tv)
            .with_position(-15.9, -47.1)
            .with_channel(30, Technology::Digital)
            .with_frequency(569.0)
            .with_erp(10.0);
        let co = Station::new("T2", Service::Tv)
            .with_position(-15.9, -47.05)
            .with_channel(30, Technology::Digital)
            .with_frequency(569.0)
            .with_erp(10.0);
        let adj = Station::new("T3", Service::Tv)
            .with_position(-15.9, -47.05)
            .with_channel(31, Technology::Digital)
            .with_frequency(575.0)
            .with_erp(10.0);
        let report = eval.evaluate(&subject, 50.0, PathType::Land, &Fixed(vec![co, adj]));
        assert_eq!(report.violations().count(), 1);
        assert_eq!(report.unverifiable_count(), 1);
        let v = report.violations().next().unwrap();
        assert_eq!(v.offset, Offset::Channel(ChannelDelta(0)));
        assert_eq!(v.limit_dbuv_m, 51.0 - 19.0);
    }
}
