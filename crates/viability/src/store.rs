//! Persistence collaborators
//!
//! Stations are read through [`StationStore`] (which also answers neighbour
//! searches); simulations and coverage results go through [`ResultStore`].
//! [`MemoryStore`] backs both for the CLI and tests.

use crate::simulation::{ContourTag, Simulation, SimulationStatus};
use crate::{JobError, Result};
use chrono::Utc;
use coverage::{Neighbor, NeighborQuery, NeighborSource, Station};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use terrain::GeoPoint;
use tracing::debug;
use uuid::Uuid;

pub trait StationStore: NeighborSource {
    fn station(&self, id: &str) -> Result<Option<Station>>;
}

pub trait ResultStore: Send + Sync {
    fn create_simulation(&self, simulation: Simulation) -> Result<()>;

    fn simulation(&self, id: Uuid) -> Result<Option<Simulation>>;

    /// Move a queued simulation to `status`. A simulation that already reached
    /// a terminal state is left untouched.
    fn finish(&self, id: Uuid, status: SimulationStatus, message: String) -> Result<()>;

    fn save_result(&self, result: CoverageResult) -> Result<()>;

    fn results_for(&self, simulation_id: Uuid) -> Result<Vec<CoverageResult>>;
}

/// Stored contour of a finished simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub id: Uuid,
    pub simulation_id: Uuid,
    pub tag: ContourTag,
    pub target_dbuv_m: f64,
    pub ring: Vec<GeoPoint>,
    pub mean_distance_km: f64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: RwLock<HashMap<String, Station>>,
    simulations: RwLock<HashMap<Uuid, Simulation>>,
    results: RwLock<Vec<CoverageResult>>,
}

fn poisoned<T>(_: T) -> JobError {
    JobError::Store("store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.stations.write() {
            for s in stations {
                map.insert(s.id.clone(), s);
            }
        }
        store
    }

    pub fn insert_station(&self, station: Station) -> Result<()> {
        self.stations.write().map_err(poisoned)?.insert(station.id.clone(), station);
        Ok(())
    }

    pub fn station_count(&self) -> usize {
        self.stations.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Station ids in sorted order
    pub fn station_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .stations
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn simulations(&self) -> Vec<Simulation> {
        let mut sims: Vec<Simulation> = self
            .simulations
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        sims.sort_by_key(|s| s.created_at);
        sims
    }

    pub fn result_count(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or(0)
    }
}

impl NeighborSource for MemoryStore {
    fn neighbors(&self, query: &NeighborQuery) -> coverage::Result<Vec<Neighbor>> {
        let stations = self
            .stations
            .read()
            .map_err(|_| coverage::CoverageError::DataUnavailable("station store lock poisoned".to_string()))?;

        let mut found: Vec<Neighbor> = stations
            .values()
            .filter_map(|s| {
                query.matches(s).map(|distance_km| Neighbor {
                    station: s.clone(),
                    distance_km,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.station.id.cmp(&b.station.id))
        });
        found.truncate(query.limit);
        debug!("Neighbour search around {:?}: {} matches", query.center, found.len());
        Ok(found)
    }
}

impl StationStore for MemoryStore {
    fn station(&self, id: &str) -> Result<Option<Station>> {
        Ok(self.stations.read().map_err(poisoned)?.get(id).cloned())
    }
}

impl ResultStore for MemoryStore {
    fn create_simulation(&self, simulation: Simulation) -> Result<()> {
        self.simulations
            .write()
            .map_err(poisoned)?
            .insert(simulation.id, simulation);
        Ok(())
    }

    fn simulation(&self, id: Uuid) -> Result<Option<Simulation>> {
        Ok(self.simulations.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn finish(&self, id: Uuid, status: SimulationStatus, message: String) -> Result<()> {
        let mut sims = self.simulations.write().map_err(poisoned)?;
        let sim = sims.get_mut(&id).ok_or(JobError::SimulationNotFound(id))?;
        if sim.status.is_terminal() {
            return Err(JobError::AlreadyTerminal(id));
        }
        sim.status = status;
        sim.message = Some(message);
        sim.updated_at = Utc::now();
        Ok(())
    }

    fn save_result(&self, result: CoverageResult) -> Result<()> {
        self.results.write().map_err(poisoned)?.push(result);
        Ok(())
    }

    fn results_for(&self, simulation_id: Uuid) -> Result<Vec<CoverageResult>> {
        Ok(self
            .results
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|r| r.simulation_id == simulation_id)
            .cloned()
            .collect())
    }
}
