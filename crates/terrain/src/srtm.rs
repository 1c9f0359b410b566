//! Local SRTM `.hgt` tile source
//!
//! Tiles are named after their south-west corner (`S16W048.hgt`) and hold a
//! square grid of big-endian signed 16-bit heights, north row first. Both the
//! 3 arc-second (1201²) and 1 arc-second (3601²) layouts are accepted.

use crate::elevation::ElevationSource;
use crate::{Result, TerrainError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Void marker used by SRTM
pub const VOID_VALUE: i16 = -32768;

const SRTM3_SIZE: usize = 1201;
const SRTM1_SIZE: usize = 3601;

/// Tile name for the 1°×1° cell containing (lat, lon), without extension
pub fn tile_name(lat: f64, lon: f64) -> String {
    let lat_floor = lat.floor() as i32;
    let lon_floor = lon.floor() as i32;
    let ns = if lat_floor >= 0 { 'N' } else { 'S' };
    let ew = if lon_floor >= 0 { 'E' } else { 'W' };
    format!("{}{:02}{}{:03}", ns, lat_floor.abs(), ew, lon_floor.abs())
}

#[derive(Debug)]
struct Tile {
    size: usize,
    heights: Vec<i16>,
}

impl Tile {
    fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let size = match bytes.len() {
            n if n == SRTM3_SIZE * SRTM3_SIZE * 2 => SRTM3_SIZE,
            n if n == SRTM1_SIZE * SRTM1_SIZE * 2 => SRTM1_SIZE,
            n => {
                return Err(TerrainError::TileSize {
                    path: path.to_path_buf(),
                    len: n,
                })
            }
        };

        let heights = bytes
            .chunks_exact(2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .collect();

        Ok(Self { size, heights })
    }

    /// Nearest-cell lookup; `None` for voids
    fn height_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let last = (self.size - 1) as f64;
        let lat_floor = lat.floor();
        let lon_floor = lon.floor();

        let row = ((lat_floor + 1.0 - lat) * last).round().clamp(0.0, last) as usize;
        let col = ((lon - lon_floor) * last).round().clamp(0.0, last) as usize;

        match self.heights.get(row * self.size + col).copied() {
            Some(VOID_VALUE) | None => None,
            Some(h) => Some(f64::from(h)),
        }
    }
}

/// Directory of `.hgt` tiles with an in-memory per-tile cache.
///
/// Missing or unreadable tiles are remembered so the filesystem is probed once
/// per tile.
pub struct SrtmTiles {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Option<Arc<Tile>>>>,
}

impl SrtmTiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Using SRTM tiles from {}", dir.display());
        Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of tiles (present or missing) already probed
    pub fn cached_tiles(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn tile(&self, name: &str) -> Option<Arc<Tile>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.get(name) {
                return entry.clone();
            }
        }

        let path = self.dir.join(format!("{}.hgt", name));
        let loaded = match std::fs::read(&path) {
            Ok(bytes) => match Tile::parse(&path, &bytes) {
                Ok(tile) => {
                    debug!("Loaded SRTM tile {} ({}x{})", name, tile.size, tile.size);
                    Some(Arc::new(tile))
                }
                Err(e) => {
                    warn!("Ignoring SRTM tile {}: {}", name, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("SRTM tile {} not present", name);
                None
            }
            Err(e) => {
                warn!("Failed to read SRTM tile {}: {}", path.display(), e);
                None
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.entry(name.to_string()).or_insert(loaded).clone()
    }
}

impl ElevationSource for SrtmTiles {
    fn elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Ok(None);
        }
        let name = tile_name(lat, lon);
        Ok(self.tile(&name).and_then(|tile| tile.height_at(lat, lon)))
    }
}
