//! End-to-end job scenarios over the in-memory store

use coverage::normative::FmProtectionRatio;
use coverage::{ClassLimit, NormativeTables, Service, Station, Technology};
use propagation::CurveSet;
use std::sync::Arc;
use terrain::ElevationProvider;
use viability::{
    AnalysisKind, ContourTag, DispatchError, Engine, EngineConfig, Job, JobBoundary, JobDispatcher, JobError,
    MemoryStore, ResultStore, SimulationStatus,
};

fn norms() -> NormativeTables {
    NormativeTables {
        fm_classes: vec![ClassLimit {
            class: "C".into(),
            band: None,
            max_erp_kw: 10.0,
            max_height_m: 150.0,
            max_contour_km: Some(15.0),
        }],
        fm_protection: vec![
            FmProtectionRatio {
                kind: "co-channel".into(),
                delta_khz: 0.0,
                ci_db: 37.0,
            },
            FmProtectionRatio {
                kind: "adjacent_200khz".into(),
                delta_khz: 200.0,
                ci_db: 6.0,
            },
        ],
        ..Default::default()
    }
}

fn subject() -> Station {
    Station::new("FM-BSB", Service::Fm)
        .with_position(-15.9, -47.1)
        .with_frequency(100.0)
        .with_erp(5.0)
        .with_class("C")
}

fn setup(stations: Vec<Station>) -> (Arc<Engine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_stations(stations));
    let engine = Engine::with_parts(
        EngineConfig::default(),
        Arc::new(CurveSet::reference()),
        ElevationProvider::unavailable(),
        norms(),
        store.clone(),
        store.clone(),
    );
    (Arc::new(engine), store)
}

struct Unreachable;

impl JobDispatcher for Unreachable {
    fn enqueue(&self, _job: Job) -> Result<(), DispatchError> {
        Err(DispatchError::Unavailable("connection refused".to_string()))
    }
}

#[test]
fn capped_fm_contour_without_terrain() {
    let (engine, store) = setup(vec![subject()]);
    let outcome = engine.evaluate_viability("FM-BSB", None, None).unwrap();

    assert!(outcome.approved, "messages: {:?}", outcome.messages);
    assert_eq!(outcome.contour.radials.len(), 72);
    for r in &outcome.contour.radials {
        assert!(r.distance_km <= 15.0 + 1e-9);
        assert!((r.distance_km - 15.0).abs() < 1e-6);
    }
    assert!(outcome.contour.is_closed());

    let results = store.results_for(outcome.simulation_id).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ring.len(), 73);
    assert_eq!(results[0].target_dbuv_m, 66.0);
}

#[test]
fn close_co_channel_neighbor_is_rejected() {
    let neighbor = Station::new("FM-NEAR", Service::Fm)
        .with_position(-15.9, -47.0907)
        .with_frequency(100.0)
        .with_erp(50.0);
    let (engine, store) = setup(vec![subject(), neighbor]);

    let outcome = engine.evaluate_viability("FM-BSB", None, None).unwrap();
    assert!(outcome.compatibility_evaluated);
    assert!(!outcome.approved);
    assert!(outcome.messages.iter().any(|m| m.contains("station FM-NEAR")));

    let sim = store.simulation(outcome.simulation_id).unwrap().unwrap();
    assert_eq!(sim.status, SimulationStatus::Done);
    let message = sim.message.unwrap();
    assert!(message.starts_with("Rejected: Interference: station FM-NEAR"));
    assert!(message.chars().count() <= 250);
}

#[test]
fn unreachable_dispatcher_fails_job() {
    let (engine, store) = setup(vec![subject()]);
    let boundary = JobBoundary::new(engine, Arc::new(Unreachable)).with_sync_fallback(false);

    let err = boundary
        .submit(AnalysisKind::Viability, "FM-BSB", None, None)
        .unwrap_err();
    assert!(matches!(err, JobError::Dispatch(_)));

    let sims = store.simulations();
    assert_eq!(sims.len(), 1);
    assert_eq!(sims[0].status, SimulationStatus::Failed);
    assert!(!sims[0].message.as_deref().unwrap_or("").is_empty());
    assert_eq!(store.result_count(), 0);
}

#[test]
fn unreachable_dispatcher_runs_inline_with_fallback() {
    let (engine, store) = setup(vec![subject()]);
    let boundary = JobBoundary::new(engine, Arc::new(Unreachable));

    let submission = boundary
        .submit(AnalysisKind::Viability, "FM-BSB", None, None)
        .unwrap();
    let sim = store.simulation(submission.simulation_id()).unwrap().unwrap();
    assert_eq!(sim.status, SimulationStatus::Done);
    assert_eq!(store.result_count(), 1);
}

#[test]
fn viability_is_idempotent() {
    let neighbor = Station::new("FM-ADJ", Service::Fm)
        .with_position(-15.7, -47.3)
        .with_frequency(100.2)
        .with_erp(3.0);
    let (engine, _) = setup(vec![subject(), neighbor]);

    let first = engine.evaluate_viability("FM-BSB", Some(50.0), None).unwrap();
    let second = engine.evaluate_viability("FM-BSB", Some(50.0), None).unwrap();

    assert_ne!(first.simulation_id, second.simulation_id);
    assert_eq!(first.approved, second.approved);
    assert_eq!(first.messages, second.messages);
    assert_eq!(first.mean_distance_km, second.mean_distance_km);
    assert_eq!(first.contour.ring, second.contour.ring);
    assert_eq!(first.report, second.report);
}

#[test]
fn contour_tags_by_service_and_kind() {
    let tv = Station::new("TV-30", Service::Tv)
        .with_position(-15.8, -47.9)
        .with_channel(30, Technology::Digital)
        .with_frequency(569.0)
        .with_erp(10.0);
    let radcom = Station::new("RC-1", Service::RadCom)
        .with_position(-15.6, -47.6)
        .with_frequency(104.9)
        .with_erp(0.02);
    let (engine, store) = setup(vec![subject(), tv, radcom]);

    let fm = engine.generate_contour("FM-BSB", None, None).unwrap();
    assert_eq!(fm.tag, ContourTag::FmProtected);

    let tv = engine.generate_contour("TV-30", None, None).unwrap();
    assert_eq!(tv.tag, ContourTag::TvProtected);
    assert_eq!(tv.target_dbuv_m, 51.0);

    let rc = engine.evaluate_viability("RC-1", None, None).unwrap();
    assert_eq!(rc.tag, ContourTag::RadcomService);
    assert!(rc.contour.radials.iter().all(|r| (r.distance_km - 1.0).abs() < 1e-9));
    assert!(rc.approved, "messages: {:?}", rc.messages);

    let stored = store.results_for(tv.simulation_id).unwrap();
    assert_eq!(stored[0].tag, ContourTag::TvProtected);
}
