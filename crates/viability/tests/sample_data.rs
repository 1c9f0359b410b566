//! Jobs over the bundled sample station and normative files

use std::path::PathBuf;
use std::sync::Arc;
use terrain::ElevationProvider;
use viability::{loader, ContourTag, Engine, EngineConfig, MemoryStore};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

fn engine() -> Engine {
    let stations = loader::load_stations(data_dir().join("stations.json")).unwrap();
    let norms = loader::load_normative(data_dir().join("normative.json")).unwrap();
    let store = Arc::new(MemoryStore::with_stations(stations));
    Engine::with_parts(
        EngineConfig::default(),
        propagation::CurveSet::global(),
        ElevationProvider::unavailable(),
        norms,
        store.clone(),
        store,
    )
}

#[test]
fn sample_files_load() {
    let stations = loader::load_stations(data_dir().join("stations.json")).unwrap();
    assert_eq!(stations.len(), 6);
    assert!(stations.iter().all(|s| s.valid_position().is_some()));

    let norms = loader::load_normative(data_dir().join("normative.json")).unwrap();
    assert_eq!(norms.fm_classes.len(), 5);
    assert_eq!(norms.radcom.service_radius_km, 1.0);
}

#[test]
fn community_radio_within_limits() {
    let outcome = engine().evaluate_viability("RC-DF-0042", None, None).unwrap();
    assert!(outcome.approved, "messages: {:?}", outcome.messages);
    assert!(outcome.class_verified);
    assert_eq!(outcome.tag, ContourTag::RadcomService);
    assert!((outcome.mean_distance_km - 1.0).abs() < 1e-9);
}

#[test]
fn tv_contour_capped_by_class() {
    let outcome = engine().generate_contour("TV-DF-0030", None, None).unwrap();
    assert_eq!(outcome.tag, ContourTag::TvProtected);
    assert_eq!(outcome.target_dbuv_m, 51.0);
    assert!(outcome.contour.radials.iter().all(|r| r.distance_km <= 58.0 + 1e-9));
}
