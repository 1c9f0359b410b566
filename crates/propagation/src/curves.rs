//! ITU-R P.1546 tabulated field-strength curves
//!
//! A [`CurveSet`] holds one [`CurveTable`] per (frequency, time %, path type).
//! Each table is a grid of field strength (dBµV/m for 1 kW ERP) over distance
//! and effective transmitting height. Lookups pick the closest tabulated time
//! percentage, bracket the frequency and interpolate bilinearly inside the
//! grid, clamping at the edges. Results are never extrapolated.

use crate::{PathType, PropagationError, Result, FIELD_AT_1KM_1KW_DBUV};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Environment variable naming a JSON curve file for the process-wide set
pub const CURVES_PATH_ENV: &str = "COVERAGE_CURVES_PATH";

/// Tabulated frequencies of the built-in reference set (MHz)
pub const REFERENCE_FREQUENCIES_MHZ: [f64; 3] = [100.0, 600.0, 2000.0];

/// Tabulated time percentages of the built-in reference set
pub const REFERENCE_TIME_PERCENTS: [f64; 3] = [50.0, 10.0, 1.0];

/// Effective transmitting heights of the P.1546 tables (m)
pub const REFERENCE_HEIGHTS_M: [f64; 8] = [10.0, 20.0, 37.5, 75.0, 150.0, 300.0, 600.0, 1200.0];

static GLOBAL: OnceLock<Arc<CurveSet>> = OnceLock::new();

/// P.1546 distance breakpoints (km)
pub fn reference_distances_km() -> Vec<f64> {
    let mut d: Vec<f64> = (1..=20).map(f64::from).collect();
    d.extend((25..=100).step_by(5).map(f64::from));
    d.extend((110..=200).step_by(10).map(f64::from));
    d.extend((225..=1000).step_by(25).map(f64::from));
    d
}

/// Serialized form of one table; a height of 0 marks the maximum-field column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTable {
    frequency_mhz: f64,
    time_percent: f64,
    path: PathType,
    heights_m: Vec<f64>,
    distances_km: Vec<f64>,
    fields: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCurveFile {
    datasets: Vec<RawTable>,
}

/// One (frequency, time %, path) field-strength grid
#[derive(Debug, Clone, PartialEq)]
pub struct CurveTable {
    frequency_mhz: f64,
    time_percent: f64,
    path: PathType,
    distances_km: Vec<f64>,
    heights_m: Vec<f64>,
    /// `fields[distance][height]`
    fields: Vec<Vec<f64>>,
    /// Upper bound per distance, from the height-0 column
    max_field: Option<Vec<f64>>,
}

impl CurveTable {
    /// Build a table from raw rows. A column whose height is 0 is taken as the
    /// maximum-field bound and removed from the height breakpoints.
    pub fn new(
        frequency_mhz: f64,
        time_percent: f64,
        path: PathType,
        heights_m: Vec<f64>,
        distances_km: Vec<f64>,
        fields: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let invalid = |msg: String| {
            PropagationError::InvalidTable(format!("{} MHz {}% {}: {}", frequency_mhz, time_percent, path, msg))
        };

        if !(frequency_mhz.is_finite() && frequency_mhz > 0.0) {
            return Err(invalid("frequency must be positive".to_string()));
        }
        if distances_km.is_empty() {
            return Err(invalid("no distance breakpoints".to_string()));
        }
        if fields.len() != distances_km.len() {
            return Err(invalid(format!(
                "{} field rows for {} distances",
                fields.len(),
                distances_km.len()
            )));
        }
        if let Some(row) = fields.iter().find(|row| row.len() != heights_m.len()) {
            return Err(invalid(format!("row of {} values for {} heights", row.len(), heights_m.len())));
        }
        if fields.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite field value".to_string()));
        }

        let max_col = heights_m.iter().position(|h| *h == 0.0);
        let keep: Vec<usize> = (0..heights_m.len()).filter(|i| Some(*i) != max_col).collect();
        if keep.is_empty() {
            return Err(invalid("no height breakpoints".to_string()));
        }

        let heights: Vec<f64> = keep.iter().map(|i| heights_m[*i]).collect();
        if !is_non_decreasing(&distances_km) {
            return Err(invalid("distances are not non-decreasing".to_string()));
        }
        if !is_non_decreasing(&heights) {
            return Err(invalid("heights are not non-decreasing".to_string()));
        }

        let max_field = max_col.map(|c| fields.iter().map(|row| row[c]).collect());
        let fields = fields
            .iter()
            .map(|row| keep.iter().map(|i| row[*i]).collect())
            .collect();

        Ok(Self {
            frequency_mhz,
            time_percent,
            path,
            distances_km,
            heights_m: heights,
            fields,
            max_field,
        })
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.frequency_mhz
    }

    pub fn time_percent(&self) -> f64 {
        self.time_percent
    }

    pub fn path(&self) -> PathType {
        self.path
    }

    pub fn distances_km(&self) -> &[f64] {
        &self.distances_km
    }

    pub fn heights_m(&self) -> &[f64] {
        &self.heights_m
    }

    pub fn has_max_field(&self) -> bool {
        self.max_field.is_some()
    }

    /// Bilinear interpolation over distance × height, clamped to the grid and
    /// capped by the maximum-field column when present.
    pub fn interpolate(&self, dist_km: f64, height_m: f64) -> f64 {
        let (i0, i1, td) = bracket(&self.distances_km, dist_km);
        let (j0, j1, th) = bracket(&self.heights_m, height_m);

        let v00 = self.fields[i0][j0];
        let v01 = self.fields[i0][j1];
        let v10 = self.fields[i1][j0];
        let v11 = self.fields[i1][j1];

        let v0 = v00 + (v01 - v00) * th;
        let v1 = v10 + (v11 - v10) * th;
        let value = v0 + (v1 - v0) * td;

        match &self.max_field {
            Some(max) => value.min(max[i0] + (max[i1] - max[i0]) * td),
            None => value,
        }
    }

    fn to_raw(&self) -> RawTable {
        let mut heights_m = self.heights_m.clone();
        let mut fields = self.fields.clone();
        if let Some(max) = &self.max_field {
            heights_m.insert(0, 0.0);
            for (row, m) in fields.iter_mut().zip(max) {
                row.insert(0, *m);
            }
        }
        RawTable {
            frequency_mhz: self.frequency_mhz,
            time_percent: self.time_percent,
            path: self.path,
            heights_m,
            distances_km: self.distances_km.clone(),
            fields,
        }
    }
}

fn is_non_decreasing(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[0] <= w[1])
}

/// Locate `x` in ascending `values`: `(i0, i1, t)` with `values[i0] <= x <= values[i1]`
/// and `t` the fraction between them. Outside the range both indices point at the
/// nearest end and `t` is 0.
pub fn bracket(values: &[f64], x: f64) -> (usize, usize, f64) {
    let last = values.len().saturating_sub(1);
    if values.is_empty() || x <= values[0] {
        return (0, 0, 0.0);
    }
    if x >= values[last] {
        return (last, last, 0.0);
    }
    for (i, w) in values.windows(2).enumerate() {
        let (v0, v1) = (w[0], w[1]);
        if v0 <= x && x <= v1 {
            let t = if v1 == v0 { 0.0 } else { (x - v0) / (v1 - v0) };
            return (i, i + 1, t);
        }
    }
    (last, last, 0.0)
}

/// Sorted, deduplicated copy
fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

/// Immutable collection of curve tables
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSet {
    tables: Vec<CurveTable>,
}

impl CurveSet {
    pub fn new(tables: Vec<CurveTable>) -> Result<Self> {
        if tables.is_empty() {
            return Err(PropagationError::EmptyCurveSet);
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[CurveTable] {
        &self.tables
    }

    /// Parse a `{ "datasets": [...] }` document.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawCurveFile = serde_json::from_str(json)?;
        let tables = raw
            .datasets
            .into_iter()
            .map(|t| CurveTable::new(t.frequency_mhz, t.time_percent, t.path, t.heights_m, t.distances_km, t.fields))
            .collect::<Result<Vec<_>>>()?;
        Self::new(tables)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_json(&content)?;
        info!("Loaded {} curve tables from {}", set.tables.len(), path.display());
        Ok(set)
    }

    pub fn to_json(&self) -> Result<String> {
        let raw = RawCurveFile {
            datasets: self.tables.iter().map(CurveTable::to_raw).collect(),
        };
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Built-in reference tables from the simplified field model
    /// `E = 106.92 − 20·log10(d) + 10·log10(h/10)` for 1 kW ERP.
    pub fn reference() -> Self {
        let distances = reference_distances_km();
        let heights = REFERENCE_HEIGHTS_M.to_vec();
        let fields: Vec<Vec<f64>> = distances
            .iter()
            .map(|d| {
                heights
                    .iter()
                    .map(|h| FIELD_AT_1KM_1KW_DBUV - 20.0 * d.log10() + 10.0 * (h / 10.0).log10())
                    .collect()
            })
            .collect();

        let mut tables = Vec::new();
        for path in [PathType::Land, PathType::Sea] {
            for time in REFERENCE_TIME_PERCENTS {
                for freq in REFERENCE_FREQUENCIES_MHZ {
                    tables.push(CurveTable {
                        frequency_mhz: freq,
                        time_percent: time,
                        path,
                        distances_km: distances.clone(),
                        heights_m: heights.clone(),
                        fields: fields.clone(),
                        max_field: None,
                    });
                }
            }
        }
        Self { tables }
    }

    /// Load from `path`, falling back to the reference tables on any failure.
    pub fn load_or_reference(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::load(p) {
                Ok(set) => set,
                Err(e) => {
                    warn!("Failed to load curves from {}: {}; using reference tables", p.display(), e);
                    Self::reference()
                }
            },
            None => {
                info!("No curve file configured; using reference tables");
                Self::reference()
            }
        }
    }

    /// Process-wide curve set, initialised once on first use from
    /// `COVERAGE_CURVES_PATH` or the reference tables.
    pub fn global() -> Arc<CurveSet> {
        GLOBAL
            .get_or_init(|| {
                let path = std::env::var_os(CURVES_PATH_ENV).map(std::path::PathBuf::from);
                Arc::new(Self::load_or_reference(path.as_deref()))
            })
            .clone()
    }

    /// Install the process-wide set before first use. Returns the set back if
    /// one is already installed.
    pub fn install_global(set: CurveSet) -> std::result::Result<(), CurveSet> {
        GLOBAL
            .set(Arc::new(set))
            .map_err(|arc| Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Field strength (dBµV/m) for 1 kW ERP.
    pub fn field_strength(
        &self,
        freq_mhz: f64,
        dist_km: f64,
        height_m: f64,
        time_percent: f64,
        path: PathType,
    ) -> f64 {
        let by_path: Vec<&CurveTable> = self.tables.iter().filter(|t| t.path == path).collect();
        let candidates = if by_path.is_empty() {
            debug!("No {} curves tabulated, matching on all paths", path);
            self.tables.iter().collect()
        } else {
            by_path
        };

        let times = distinct(candidates.iter().map(|t| t.time_percent));
        let time = times
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, t| match best {
                Some(b) if (b - time_percent).abs() <= (t - time_percent).abs() => Some(b),
                _ => Some(t),
            })
            .unwrap_or(time_percent);
        let at_time: Vec<&CurveTable> = candidates.into_iter().filter(|t| t.time_percent == time).collect();

        let freqs = distinct(at_time.iter().map(|t| t.frequency_mhz));
        let (k0, k1, _) = bracket(&freqs, freq_mhz);
        let (f0, f1) = (freqs[k0], freqs[k1]);

        let table_at = |f: f64| at_time.iter().find(|t| t.frequency_mhz == f).copied();
        let (Some(t0), Some(t1)) = (table_at(f0), table_at(f1)) else {
            return f64::NAN;
        };

        let v0 = t0.interpolate(dist_km, height_m);
        if k0 == k1 {
            return v0;
        }
        let v1 = t1.interpolate(dist_km, height_m);
        let w = (freq_mhz.log10() - f0.log10()) / (f1.log10() - f0.log10());
        v0 + (v1 - v0) * w
    }
}
