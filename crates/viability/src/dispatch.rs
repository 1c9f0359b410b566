//! Job dispatch
//!
//! Submitted jobs go to a [`JobDispatcher`]. The in-process dispatcher is a
//! bounded tokio channel drained by one worker task that runs each job on the
//! blocking pool. When the dispatcher refuses a job the [`JobBoundary`] runs it
//! inline once, or fails it when that fallback is disabled.

use crate::engine::{Engine, JobOutcome};
use crate::simulation::{AnalysisKind, Job};
use crate::{JobError, Result};
use propagation::PathType;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("job queue is full")]
    QueueFull,
    #[error("job queue is closed")]
    Closed,
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Job hand-off collaborator
pub trait JobDispatcher: Send + Sync {
    fn enqueue(&self, job: Job) -> std::result::Result<(), DispatchError>;
}

pub struct QueueDispatcher {
    tx: mpsc::Sender<Job>,
}

impl QueueDispatcher {
    /// Dispatcher and the receiving end of its queue, with no worker attached.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Dispatcher with a worker task on the current runtime. The worker stops
    /// once every dispatcher handle is dropped and the queue is drained.
    pub fn spawn(engine: Arc<Engine>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel(capacity);
        let handle = tokio::spawn(run_worker(engine, rx));
        (dispatcher, handle)
    }
}

impl JobDispatcher for QueueDispatcher {
    fn enqueue(&self, job: Job) -> std::result::Result<(), DispatchError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Drain `rx`, running each job on the blocking pool.
pub async fn run_worker(engine: Arc<Engine>, mut rx: mpsc::Receiver<Job>) {
    info!("Job worker started");
    while let Some(job) = rx.recv().await {
        let id = job.simulation_id;
        let worker_engine = engine.clone();
        match tokio::task::spawn_blocking(move || worker_engine.run(&job)).await {
            Ok(Ok(outcome)) => info!("Job {} finished ({})", id, kind_of(&outcome)),
            // already recorded as failed by the engine
            Ok(Err(e)) => warn!("Job {} failed: {}", id, e),
            Err(join) => {
                error!("Job {} worker panicked: {}", id, join);
                if let Err(e) = engine.fail(id, "internal error") {
                    error!("Could not mark job {} failed: {}", id, e);
                }
            }
        }
    }
    info!("Job worker stopped");
}

fn kind_of(outcome: &JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Viability(v) if v.approved => "approved",
        JobOutcome::Viability(_) => "rejected",
        JobOutcome::Contour(_) => "contour",
    }
}

#[derive(Debug)]
pub enum Submission {
    /// Handed to the dispatcher
    Queued(Uuid),
    /// Dispatcher refused the job and it ran inline
    Completed(JobOutcome),
}

impl Submission {
    pub fn simulation_id(&self) -> Uuid {
        match self {
            Submission::Queued(id) => *id,
            Submission::Completed(outcome) => outcome.simulation_id(),
        }
    }
}

/// Submission boundary between callers and the dispatcher
pub struct JobBoundary {
    engine: Arc<Engine>,
    dispatcher: Arc<dyn JobDispatcher>,
    sync_fallback: bool,
}

impl JobBoundary {
    pub fn new(engine: Arc<Engine>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        let sync_fallback = engine.config().sync_fallback;
        Self {
            engine,
            dispatcher,
            sync_fallback,
        }
    }

    pub fn with_sync_fallback(mut self, enabled: bool) -> Self {
        self.sync_fallback = enabled;
        self
    }

    /// Record a queued simulation and hand it to the dispatcher.
    ///
    /// Runs inline on the calling thread when the dispatcher refuses and the
    /// fallback is enabled.
    pub fn submit(
        &self,
        kind: AnalysisKind,
        station_id: &str,
        time_percent: Option<f64>,
        path: Option<PathType>,
    ) -> Result<Submission> {
        let job = self.engine.create_job(kind, station_id, time_percent, path)?;
        let id = job.simulation_id;

        match self.dispatcher.enqueue(job.clone()) {
            Ok(()) => Ok(Submission::Queued(id)),
            Err(e) if self.sync_fallback => {
                warn!("Dispatch of {} refused ({}); running inline", id, e);
                Ok(Submission::Completed(self.engine.run(&job)?))
            }
            Err(e) => {
                warn!("Dispatch of {} refused ({}); failing job", id, e);
                self.engine.fail(id, &format!("Dispatch failed: {}", e))?;
                Err(JobError::Dispatch(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::simulation::SimulationStatus;
    use crate::store::{MemoryStore, ResultStore};
    use coverage::{NormativeTables, Service, Station};
    use propagation::CurveSet;
    use terrain::ElevationProvider;

    struct Offline;

    impl JobDispatcher for Offline {
        fn enqueue(&self, _job: Job) -> std::result::Result<(), DispatchError> {
            Err(DispatchError::Unavailable("broker unreachable".to_string()))
        }
    }

    fn engine() -> (Arc<Engine>, Arc<MemoryStore>) {
        let station = Station::new("FM-1", Service::Fm)
            .with_position(-15.9, -47.1)
            .with_frequency(100.0)
            .with_erp(1.0);
        let store = Arc::new(MemoryStore::with_stations(vec![station]));
        let engine = Engine::with_parts(
            EngineConfig::default(),
            Arc::new(CurveSet::reference()),
            ElevationProvider::unavailable(),
            NormativeTables::default(),
            store.clone(),
            store.clone(),
        );
        (Arc::new(engine), store)
    }

    #[test]
    fn test_queue_full_and_closed() {
        let (dispatcher, rx) = QueueDispatcher::channel(1);
        let (engine, _) = engine();
        let job = engine.create_job(AnalysisKind::Contour, "FM-1", None, None).unwrap();

        assert_eq!(dispatcher.enqueue(job.clone()), Ok(()));
        assert_eq!(dispatcher.enqueue(job.clone()), Err(DispatchError::QueueFull));
        drop(rx);
        assert_eq!(dispatcher.enqueue(job), Err(DispatchError::Closed));
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (engine, store) = engine();
        let (dispatcher, handle) = QueueDispatcher::spawn(engine.clone(), 4);
        let boundary = JobBoundary::new(engine, Arc::new(dispatcher));

        let submission = boundary.submit(AnalysisKind::Contour, "FM-1", None, None).unwrap();
        let id = submission.simulation_id();
        assert!(matches!(submission, Submission::Queued(_)));

        drop(boundary);
        handle.await.unwrap();

        let sim = store.simulation(id).unwrap().unwrap();
        assert_eq!(sim.status, SimulationStatus::Done);
        assert_eq!(store.results_for(id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_records_failures() {
        let (engine, store) = engine();
        let (dispatcher, handle) = QueueDispatcher::spawn(engine.clone(), 4);
        let boundary = JobBoundary::new(engine, Arc::new(dispatcher));

        let id = boundary
            .submit(AnalysisKind::Viability, "missing", None, None)
            .unwrap()
            .simulation_id();
        drop(boundary);
        handle.await.unwrap();

        let sim = store.simulation(id).unwrap().unwrap();
        assert_eq!(sim.status, SimulationStatus::Failed);
        assert!(store.results_for(id).unwrap().is_empty());
    }

    #[test]
    fn test_refused_job_runs_inline() {
        let (engine, store) = engine();
        let boundary = JobBoundary::new(engine, Arc::new(Offline)).with_sync_fallback(true);
        let submission = boundary.submit(AnalysisKind::Contour, "FM-1", None, None).unwrap();
        assert!(matches!(submission, Submission::Completed(JobOutcome::Contour(_))));

        let sim = store.simulation(submission.simulation_id()).unwrap().unwrap();
        assert_eq!(sim.status, SimulationStatus::Done);
    }

    #[test]
    fn test_refused_job_fails_without_fallback() {
        let (engine, store) = engine();
        let boundary = JobBoundary::new(engine, Arc::new(Offline)).with_sync_fallback(false);
        let err = boundary
            .submit(AnalysisKind::Viability, "FM-1", None, None)
            .unwrap_err();
        assert!(matches!(err, JobError::Dispatch(DispatchError::Unavailable(_))));

        let sims = store.simulations();
        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0].status, SimulationStatus::Failed);
        assert!(sims[0].message.as_deref().is_some_and(|m| m.starts_with("Dispatch failed")));
        assert_eq!(store.result_count(), 0);
    }
}
