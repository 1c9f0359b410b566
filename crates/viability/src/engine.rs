//! Job execution
//!
//! A viability job validates the station, checks class limits, evaluates
//! neighbour interference and generates the protected contour. Interference
//! that cannot be evaluated is reported, never counted as a pass; a contour
//! failure fails the job. Every job ends in exactly one terminal state.

use crate::config::EngineConfig;
use crate::simulation::{truncate_message, AnalysisKind, ContourTag, Job, Simulation, SimulationStatus, MAX_MESSAGE_CHARS};
use crate::store::{CoverageResult, ResultStore, StationStore};
use crate::{JobError, Result};
use coverage::{
    CompatibilityReport, Contour, ContourGenerator, ContourRequest, InterferenceEvaluator,
    Neighbor, NeighborQuery, NeighborSource, NormativeTables, Station,
};
use propagation::{CurveSet, DiffractionModel, PathType, SimplifiedP2p};
use serde::Serialize;
use std::sync::Arc;
use terrain::{ElevationProvider, GeoPoint};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ViabilityOutcome {
    pub simulation_id: Uuid,
    pub station_id: String,
    pub approved: bool,
    pub contour_id: Uuid,
    pub tag: ContourTag,
    pub mean_distance_km: f64,
    pub messages: Vec<String>,
    pub compatibility_evaluated: bool,
    pub class_verified: bool,
    #[serde(skip)]
    pub report: CompatibilityReport,
    #[serde(skip)]
    pub contour: Contour,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContourOutcome {
    pub simulation_id: Uuid,
    pub station_id: String,
    pub contour_id: Uuid,
    pub tag: ContourTag,
    pub target_dbuv_m: f64,
    pub mean_distance_km: f64,
    #[serde(skip)]
    pub contour: Contour,
}

#[derive(Debug, Clone, Serialize)]
pub struct P2pOutcome {
    pub tx_id: String,
    pub rx_id: String,
    pub field_dbuv_m: f64,
    pub distance_km: f64,
    pub diffraction_db: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobOutcome {
    Viability(ViabilityOutcome),
    Contour(ContourOutcome),
}

impl JobOutcome {
    pub fn simulation_id(&self) -> Uuid {
        match self {
            JobOutcome::Viability(v) => v.simulation_id,
            JobOutcome::Contour(c) => c.simulation_id,
        }
    }

    pub fn contour(&self) -> &Contour {
        match self {
            JobOutcome::Viability(v) => &v.contour,
            JobOutcome::Contour(c) => &c.contour,
        }
    }
}

/// Neighbour searches answered by the station store
struct StoreNeighbors<'a>(&'a dyn StationStore);

impl NeighborSource for StoreNeighbors<'_> {
    fn neighbors(&self, query: &NeighborQuery) -> coverage::Result<Vec<Neighbor>> {
        self.0.neighbors(query)
    }
}

pub struct Engine {
    config: EngineConfig,
    elevation: ElevationProvider,
    norms: Arc<NormativeTables>,
    contours: ContourGenerator,
    interference: InterferenceEvaluator,
    p2p: SimplifiedP2p,
    stations: Arc<dyn StationStore>,
    results: Arc<dyn ResultStore>,
}

impl Engine {
    /// Engine with curves and terrain taken from `config`.
    pub fn new(
        config: EngineConfig,
        norms: NormativeTables,
        stations: Arc<dyn StationStore>,
        results: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let curves = config.curves();
        let elevation = config.elevation_provider()?;
        Ok(Self::with_parts(config, curves, elevation, norms, stations, results))
    }

    pub fn with_parts(
        config: EngineConfig,
        curves: Arc<CurveSet>,
        elevation: ElevationProvider,
        norms: NormativeTables,
        stations: Arc<dyn StationStore>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        let norms = Arc::new(norms);
        let contours = ContourGenerator::new(curves.clone(), elevation.clone(), config.contour.clone());
        let interference = InterferenceEvaluator::new(
            curves,
            elevation.clone(),
            DiffractionModel::new(config.diffraction.clone()),
            norms.clone(),
            config.interference.clone(),
        );
        Self {
            p2p: config.p2p.clone(),
            config,
            elevation,
            norms,
            contours,
            interference,
            stations,
            results,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn norms(&self) -> &NormativeTables {
        &self.norms
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    /// Record a queued simulation and return its job.
    pub fn create_job(
        &self,
        kind: AnalysisKind,
        station_id: &str,
        time_percent: Option<f64>,
        path: Option<PathType>,
    ) -> Result<Job> {
        let sim = Simulation::queued(kind, station_id, time_percent, path);
        let job = sim.job();
        self.results.create_simulation(sim)?;
        info!("Queued {} simulation {} for station {}", kind, job.simulation_id, station_id);
        Ok(job)
    }

    /// Mark a queued simulation failed with a truncated message.
    pub fn fail(&self, simulation_id: Uuid, message: &str) -> Result<()> {
        self.results.finish(
            simulation_id,
            SimulationStatus::Failed,
            truncate_message(message, MAX_MESSAGE_CHARS),
        )
    }

    /// Execute a queued job and move it to its terminal state.
    pub fn run(&self, job: &Job) -> Result<JobOutcome> {
        let sim = self
            .results
            .simulation(job.simulation_id)?
            .ok_or(JobError::SimulationNotFound(job.simulation_id))?;
        if sim.status.is_terminal() {
            return Err(JobError::AlreadyTerminal(job.simulation_id));
        }

        let computed = match job.kind {
            AnalysisKind::Viability => self.viability(job).map(|(v, r)| (JobOutcome::Viability(v), r)),
            AnalysisKind::Contour => self.contour_only(job).map(|(c, r)| (JobOutcome::Contour(c), r)),
        };

        match computed {
            Ok((outcome, result)) => {
                let message = match &outcome {
                    JobOutcome::Viability(v) => verdict_message(v.approved, &v.messages),
                    JobOutcome::Contour(c) => format!("Contour {:.2} km", c.mean_distance_km),
                };
                // A stored contour always belongs to a finished simulation
                self.results.finish(
                    job.simulation_id,
                    SimulationStatus::Done,
                    truncate_message(&message, MAX_MESSAGE_CHARS),
                )?;
                self.results.save_result(result)?;
                info!("Simulation {} done: {}", job.simulation_id, message);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Simulation {} failed: {}", job.simulation_id, e);
                if let Err(store_err) = self.fail(job.simulation_id, &e.to_string()) {
                    error!("Could not mark simulation {} failed: {}", job.simulation_id, store_err);
                }
                Err(e)
            }
        }
    }

    pub fn evaluate_viability(
        &self,
        station_id: &str,
        time_percent: Option<f64>,
        path: Option<PathType>,
    ) -> Result<ViabilityOutcome> {
        let job = self.create_job(AnalysisKind::Viability, station_id, time_percent, path)?;
        match self.run(&job)? {
            JobOutcome::Viability(v) => Ok(v),
            JobOutcome::Contour(_) => Err(JobError::Worker("viability job produced a contour outcome".to_string())),
        }
    }

    pub fn generate_contour(
        &self,
        station_id: &str,
        time_percent: Option<f64>,
        path: Option<PathType>,
    ) -> Result<ContourOutcome> {
        let job = self.create_job(AnalysisKind::Contour, station_id, time_percent, path)?;
        match self.run(&job)? {
            JobOutcome::Contour(c) => Ok(c),
            JobOutcome::Viability(_) => Err(JobError::Worker("contour job produced a viability outcome".to_string())),
        }
    }

    /// Direct field of `tx_id` at the site of `rx_id`. No simulation is recorded.
    pub fn point_to_point_field(&self, tx_id: &str, rx_id: &str) -> Result<P2pOutcome> {
        let (tx, tx_pos) = self.positioned_station(tx_id)?;
        let (_, rx_pos) = self.positioned_station(rx_id)?;

        let erp = tx.erp_toward(tx_pos.bearing_to(&rx_pos));
        let estimate = self
            .p2p
            .field(&self.elevation, tx_pos, rx_pos, tx.frequency_or_default(), erp)?;
        info!(
            "P2P {} -> {}: {:.1} dBµV/m at {:.2} km",
            tx_id, rx_id, estimate.field_dbuv_m, estimate.distance_km
        );
        Ok(P2pOutcome {
            tx_id: tx_id.to_string(),
            rx_id: rx_id.to_string(),
            field_dbuv_m: estimate.field_dbuv_m,
            distance_km: estimate.distance_km,
            diffraction_db: estimate.diffraction_db,
        })
    }

    fn positioned_station(&self, id: &str) -> Result<(Station, GeoPoint)> {
        let station = self
            .stations
            .station(id)?
            .ok_or_else(|| JobError::StationNotFound(id.to_string()))?;
        let pos = station
            .valid_position()
            .ok_or_else(|| JobError::NoPosition(id.to_string()))?;
        Ok((station, pos))
    }

    /// Contour for the job and the record to store once the job is done.
    fn contour_for(&self, station: &Station, job: &Job, tag: ContourTag) -> Result<(CoverageResult, Contour)> {
        let request = ContourRequest {
            target_dbuv_m: self.norms.target_level(station),
            time_percent: self.config.time_percent_or_default(job.time_percent),
            path: job.path.unwrap_or(self.config.default_path),
            cap_km: self.norms.contour_cap_km(station),
        };
        let contour = self.contours.generate(station, &request)?;

        let result = CoverageResult {
            id: Uuid::new_v4(),
            simulation_id: job.simulation_id,
            tag,
            target_dbuv_m: request.target_dbuv_m,
            ring: contour.ring.clone(),
            mean_distance_km: contour.mean_distance_km(),
        };
        Ok((result, contour))
    }

    fn contour_only(&self, job: &Job) -> Result<(ContourOutcome, CoverageResult)> {
        let (station, _) = self.positioned_station(&job.station_id)?;
        let tag = ContourTag::for_job(station.service, AnalysisKind::Contour);
        let (result, contour) = self.contour_for(&station, job, tag)?;
        let outcome = ContourOutcome {
            simulation_id: job.simulation_id,
            station_id: station.id.clone(),
            contour_id: result.id,
            tag,
            target_dbuv_m: contour.target_dbuv_m,
            mean_distance_km: contour.mean_distance_km(),
            contour,
        };
        Ok((outcome, result))
    }

    fn viability(&self, job: &Job) -> Result<(ViabilityOutcome, CoverageResult)> {
        let (station, _) = self.positioned_station(&job.station_id)?;
        let time_percent = self.config.time_percent_or_default(job.time_percent);
        let path = job.path.unwrap_or(self.config.default_path);

        let class = self.norms.check_class_limits(&station);
        let report = self
            .interference
            .evaluate(&station, time_percent, path, &StoreNeighbors(self.stations.as_ref()));

        let tag = ContourTag::for_job(station.service, AnalysisKind::Viability);
        let (result, contour) = self.contour_for(&station, job, tag)?;

        let mut messages = class.messages.clone();
        messages.extend(report.messages());

        let outcome = ViabilityOutcome {
            simulation_id: job.simulation_id,
            station_id: station.id.clone(),
            approved: class.within_limits && report.compatible(),
            contour_id: result.id,
            tag,
            mean_distance_km: contour.mean_distance_km(),
            messages,
            compatibility_evaluated: report.evaluated,
            class_verified: class.verified,
            report,
            contour,
        };
        Ok((outcome, result))
    }
}

fn verdict_message(approved: bool, messages: &[String]) -> String {
    let verdict = if approved { "Approved" } else { "Rejected" };
    if messages.is_empty() {
        verdict.to_string()
    } else {
        format!("{}: {}", verdict, messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use coverage::normative::FmProtectionRatio;
    use coverage::{ClassLimit, Service};

    fn norms() -> NormativeTables {
        NormativeTables {
            fm_classes: vec![ClassLimit {
                class: "C".into(),
                band: None,
                max_erp_kw: 10.0,
                max_height_m: 150.0,
                max_contour_km: Some(15.0),
            }],
            fm_protection: vec![FmProtectionRatio {
                kind: "co-channel".into(),
                delta_khz: 0.0,
                ci_db: 37.0,
            }],
            ..Default::default()
        }
    }

    fn fm(id: &str, lon: f64, erp: f64) -> Station {
        Station::new(id, Service::Fm)
            .with_position(-15.9, lon)
            .with_frequency(100.0)
            .with_erp(erp)
            .with_class("C")
    }

    fn engine(stations: Vec<Station>) -> (Engine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_stations(stations));
        let engine = Engine::with_parts(
            EngineConfig::default(),
            Arc::new(CurveSet::reference()),
            ElevationProvider::unavailable(),
            norms(),
            store.clone(),
            store.clone(),
        );
        (engine, store)
    }

    #[test]
    fn test_verdict_message() {
        assert_eq!(verdict_message(true, &[]), "Approved");
        assert_eq!(
            verdict_message(false, &["a".to_string(), "b".to_string()]),
            "Rejected: a; b"
        );
    }

    #[test]
    fn test_missing_station_fails_job() {
        let (engine, store) = engine(vec![]);
        let err = engine.evaluate_viability("nope", None, None).unwrap_err();
        assert!(matches!(err, JobError::StationNotFound(_)));

        let sims = store.simulations();
        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0].status, SimulationStatus::Failed);
        assert!(sims[0].message.as_deref().unwrap_or("").contains("nope"));
        assert_eq!(store.result_count(), 0);
    }

    #[test]
    fn test_station_without_position_fails() {
        let (engine, store) = engine(vec![Station::new("X", Service::Fm).with_frequency(100.0)]);
        assert!(matches!(
            engine.generate_contour("X", None, None).unwrap_err(),
            JobError::NoPosition(_)
        ));
        assert_eq!(store.simulations()[0].status, SimulationStatus::Failed);
    }

    #[test]
    fn test_lone_station_is_approved() {
        let (engine, store) = engine(vec![fm("A", -47.1, 5.0)]);
        let outcome = engine.evaluate_viability("A", None, None).unwrap();
        assert!(outcome.approved);
        assert!(outcome.compatibility_evaluated);
        assert!(outcome.class_verified);
        assert!(outcome.mean_distance_km <= 15.0 + 1e-9);

        let sim = store.simulation(outcome.simulation_id).unwrap().unwrap();
        assert_eq!(sim.status, SimulationStatus::Done);
        assert_eq!(sim.message.as_deref(), Some("Approved"));

        let results = store.results_for(outcome.simulation_id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, outcome.contour_id);
        assert_eq!(results[0].tag, ContourTag::FmProtectedViability);
    }

    #[test]
    fn test_class_excess_rejects() {
        let (engine, _) = engine(vec![fm("A", -47.1, 50.0)]);
        let outcome = engine.evaluate_viability("A", None, None).unwrap();
        assert!(!outcome.approved);
        assert!(outcome.messages[0].contains("exceeds class limit"));
    }

    #[test]
    fn test_unevaluated_interference_is_not_a_pass() {
        let station = Station::new("A", Service::Fm).with_position(-15.9, -47.1).with_class("C");
        let (engine, _) = engine(vec![station]);
        let outcome = engine.evaluate_viability("A", None, None).unwrap();
        assert!(!outcome.compatibility_evaluated);
        assert!(!outcome.approved);
        assert!(outcome.messages.iter().any(|m| m.contains("not evaluated")));
    }

    #[test]
    fn test_job_runs_once() {
        let (engine, _) = engine(vec![fm("A", -47.1, 5.0)]);
        let job = engine.create_job(AnalysisKind::Contour, "A", None, None).unwrap();
        engine.run(&job).unwrap();
        assert!(matches!(engine.run(&job).unwrap_err(), JobError::AlreadyTerminal(_)));
    }

    /// Store that accepts everything but cannot move a simulation to a terminal state
    struct StuckStore(MemoryStore);

    impl ResultStore for StuckStore {
        fn create_simulation(&self, simulation: Simulation) -> Result<()> {
            self.0.create_simulation(simulation)
        }

        fn simulation(&self, id: Uuid) -> Result<Option<Simulation>> {
            self.0.simulation(id)
        }

        fn finish(&self, _id: Uuid, _status: SimulationStatus, _message: String) -> Result<()> {
            Err(JobError::Store("status update rejected".to_string()))
        }

        fn save_result(&self, result: CoverageResult) -> Result<()> {
            self.0.save_result(result)
        }

        fn results_for(&self, simulation_id: Uuid) -> Result<Vec<CoverageResult>> {
            self.0.results_for(simulation_id)
        }
    }

    fn stuck_engine(stations: Vec<Station>) -> (Engine, Arc<StuckStore>) {
        let stations = Arc::new(MemoryStore::with_stations(stations));
        let results = Arc::new(StuckStore(MemoryStore::new()));
        let engine = Engine::with_parts(
            EngineConfig::default(),
            Arc::new(CurveSet::reference()),
            ElevationProvider::unavailable(),
            norms(),
            stations,
            results.clone(),
        );
        (engine, results)
    }

    #[test]
    fn test_job_error_survives_failed_status_update() {
        let (engine, _) = stuck_engine(vec![]);
        let err = engine.evaluate_viability("nope", None, None).unwrap_err();
        assert!(matches!(err, JobError::StationNotFound(ref id) if id == "nope"), "got {:?}", err);
    }

    #[test]
    fn test_no_result_stored_for_unfinished_simulation() {
        let (engine, results) = stuck_engine(vec![fm("A", -47.1, 5.0)]);
        let err = engine.generate_contour("A", None, None).unwrap_err();
        assert!(matches!(err, JobError::Store(_)));
        assert_eq!(results.0.result_count(), 0);
    }

    #[test]
    fn test_point_to_point_field() {
        let (engine, _) = engine(vec![fm("A", -47.1, 1.0), fm("B", -47.0, 1.0)]);
        let p2p = engine.point_to_point_field("A", "B").unwrap();
        assert!((p2p.distance_km - 10.7).abs() < 0.2);
        assert_eq!(p2p.diffraction_db, 0.0);
        let expected = 106.92 - 20.0 * p2p.distance_km.log10();
        assert!((p2p.field_dbuv_m - expected).abs() < 1e-6);

        assert!(matches!(
            engine.point_to_point_field("A", "A").unwrap_err(),
            JobError::Propagation(_)
        ));
    }
}
