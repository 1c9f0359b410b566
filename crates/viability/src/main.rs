//! Broadcast Viability CLI
//!
//! Runs coverage and compatibility analyses against a station file.
//!
//! Usage:
//!   viability --stations data/stations.json --normative data/normative.json \
//!             evaluate FM-1 --geojson fm1.geojson
//!   viability --stations data/stations.json contour TV-7 --path sea
//!   viability --stations data/stations.json p2p FM-1 FM-2
//!   viability --stations data/stations.json batch --contour-only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coverage::{Contour, NormativeTables};
use propagation::PathType;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viability::{
    loader, AnalysisKind, ContourTag, Engine, EngineConfig, JobBoundary, MemoryStore, QueueDispatcher, ResultStore,
};

#[derive(Parser, Debug)]
#[command(name = "viability", about = "Broadcast station coverage and compatibility analysis")]
struct Args {
    /// Station records (JSON)
    #[arg(long, global = true)]
    stations: Option<PathBuf>,

    /// Normative tables (JSON); without them limits and ratios are unverifiable
    #[arg(long, global = true)]
    normative: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of SRTM .hgt tiles
    #[arg(long, global = true)]
    srtm_dir: Option<PathBuf>,

    /// P.1546 curve dataset (JSON)
    #[arg(long, global = true)]
    curves: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Class limits, interference and protected contour for one station
    Evaluate {
        station: String,
        #[arg(long)]
        time_percent: Option<f64>,
        #[arg(long)]
        path: Option<PathType>,
        /// Write the contour as a GeoJSON Feature
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Protected contour only
    Contour {
        station: String,
        #[arg(long)]
        time_percent: Option<f64>,
        #[arg(long)]
        path: Option<PathType>,
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Field of one station at the site of another
    P2p { tx: String, rx: String },
    /// Queue jobs for several stations (all loaded stations when none given)
    Batch {
        station_ids: Vec<String>,
        #[arg(long)]
        contour_only: bool,
        #[arg(long)]
        time_percent: Option<f64>,
        #[arg(long)]
        path: Option<PathType>,
    },
}

fn write_geojson(path: &Path, contour: &Contour, tag: ContourTag) -> Result<()> {
    info!("Writing GeoJSON to {:?}", path);
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &contour.to_geojson(tag.as_str()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "viability=debug,coverage=debug,propagation=debug,terrain=debug"
    } else {
        "viability=info,coverage=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = EngineConfig::load(args.config.as_deref())?;
    config.apply_env();
    if let Some(curves) = args.curves {
        config.curves_path = Some(curves);
    }
    if let Some(dir) = args.srtm_dir {
        config.srtm_dir = Some(dir);
    }

    let stations_path = args.stations.as_deref().context("--stations is required")?;
    let store = Arc::new(MemoryStore::with_stations(loader::load_stations(stations_path)?));

    let norms = match &args.normative {
        Some(path) => loader::load_normative(path)?,
        None => {
            warn!("No normative tables given; class limits and protection ratios are unverifiable");
            NormativeTables::default()
        }
    };

    let queue_capacity = config.queue_capacity;
    let engine = Arc::new(Engine::new(config, norms, store.clone(), store.clone())?);

    match args.command {
        Command::Evaluate {
            station,
            time_percent,
            path,
            geojson,
        } => {
            let worker = engine.clone();
            let outcome =
                tokio::task::spawn_blocking(move || worker.evaluate_viability(&station, time_percent, path)).await??;
            if let Some(out) = geojson {
                write_geojson(&out, &outcome.contour, outcome.tag)?;
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Contour {
            station,
            time_percent,
            path,
            geojson,
        } => {
            let worker = engine.clone();
            let outcome =
                tokio::task::spawn_blocking(move || worker.generate_contour(&station, time_percent, path)).await??;
            if let Some(out) = geojson {
                write_geojson(&out, &outcome.contour, outcome.tag)?;
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::P2p { tx, rx } => {
            let worker = engine.clone();
            let outcome = tokio::task::spawn_blocking(move || worker.point_to_point_field(&tx, &rx)).await??;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Batch {
            station_ids,
            contour_only,
            time_percent,
            path,
        } => {
            let ids = if station_ids.is_empty() {
                store.station_ids()
            } else {
                station_ids
            };
            let kind = if contour_only {
                AnalysisKind::Contour
            } else {
                AnalysisKind::Viability
            };

            let (dispatcher, handle) = QueueDispatcher::spawn(engine.clone(), queue_capacity);
            let boundary = JobBoundary::new(engine.clone(), Arc::new(dispatcher));
            let mut submitted = Vec::new();
            for id in &ids {
                match tokio::task::block_in_place(|| boundary.submit(kind, id, time_percent, path)) {
                    Ok(submission) => submitted.push(submission.simulation_id()),
                    Err(e) => warn!("Station {} not submitted: {}", id, e),
                }
            }
            drop(boundary);
            handle.await?;

            info!("{} of {} jobs submitted", submitted.len(), ids.len());
            let mut sims = Vec::new();
            for id in submitted {
                if let Some(sim) = store.simulation(id)? {
                    sims.push(sim);
                }
            }
            println!("{}", serde_json::to_string_pretty(&sims)?);
        }
    }

    Ok(())
}
