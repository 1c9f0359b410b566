//! P.526 single-obstacle diffraction path loss
//!
//! Total loss over a sampled terrain profile:
//! - Free-space loss over the full path length
//! - Knife-edge loss of the worst clearance violation of the line of sight
//! - Assis-style roughness term from the RMS curvature of the profile

use crate::{erp_gain_db, PropagationError, Result, FIELD_AT_1KM_1KW_DBUV};
use serde::{Deserialize, Serialize};
use terrain::Profile;
use tracing::trace;

/// Knife-edge loss is zero at or below this Fresnel parameter
pub const KNIFE_EDGE_V_MIN: f64 = -0.78;

/// Speed of light over 1 MHz, as used for wavelength in meters
const WAVELENGTH_NUMERATOR_M: f64 = 300.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffractionConfig {
    /// Add the roughness term
    pub apply_assis: bool,
    /// Scale applied to the RMS profile curvature (dB per unit)
    pub assis_factor: f64,
    /// Upper bound on the roughness term (dB)
    pub assis_cap_db: f64,
}

impl Default for DiffractionConfig {
    fn default() -> Self {
        Self {
            apply_assis: true,
            assis_factor: 1.0,
            assis_cap_db: 10.0,
        }
    }
}

/// Dominant obstruction of a path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Distance from the transmitter (m)
    pub distance_m: f64,
    /// Height above the line of sight (m)
    pub clearance_m: f64,
    /// Fresnel-Kirchhoff parameter
    pub v: f64,
}

/// Path loss with its components
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathLoss {
    pub total_db: f64,
    pub free_space_db: f64,
    pub diffraction_db: f64,
    pub roughness_db: f64,
    pub obstacle: Option<Obstacle>,
}

/// Free-space loss (dB) for `freq_mhz` over `dist_km`
pub fn free_space_loss_db(freq_mhz: f64, dist_km: f64) -> f64 {
    32.45 + 20.0 * freq_mhz.log10() + 20.0 * dist_km.log10()
}

pub fn wavelength_m(freq_mhz: f64) -> f64 {
    WAVELENGTH_NUMERATOR_M / freq_mhz
}

/// Fresnel-Kirchhoff parameter for an edge `h` above the line of sight
pub fn fresnel_v(h_m: f64, d1_m: f64, d2_m: f64, wavelength_m: f64) -> f64 {
    h_m * (2.0 * (d1_m + d2_m) / (wavelength_m * d1_m * d2_m)).sqrt()
}

/// ITU-R P.526 single knife-edge approximation (dB)
pub fn knife_edge_loss_db(v: f64) -> f64 {
    if v <= KNIFE_EDGE_V_MIN {
        return 0.0;
    }
    6.9 + 20.0 * (((v - 0.1).powi(2) + 1.0).sqrt() + v - 0.1).log10()
}

/// RMS of the second differences of the profile slope, scaled and capped
pub fn assis_roughness_db(distances_m: &[f64], elevations_m: &[f64], factor: f64, cap_db: f64) -> f64 {
    if distances_m.len() < 3 || elevations_m.len() < 3 {
        return 0.0;
    }

    let slopes: Vec<f64> = distances_m
        .windows(2)
        .zip(elevations_m.windows(2))
        .filter_map(|(d, h)| {
            let dd = d[1] - d[0];
            (dd > 0.0).then(|| (h[1] - h[0]) / dd)
        })
        .collect();
    if slopes.len() < 2 {
        return 0.0;
    }

    let curvatures: Vec<f64> = slopes.windows(2).map(|s| s[1] - s[0]).collect();
    let rms = (curvatures.iter().map(|c| c * c).sum::<f64>() / curvatures.len() as f64).sqrt();
    (rms * factor).min(cap_db)
}

/// Field strength (dBµV/m) from ERP and total path loss
pub fn field_from_power(erp_kw: f64, loss_db: f64) -> f64 {
    FIELD_AT_1KM_1KW_DBUV + erp_gain_db(erp_kw) - loss_db
}

#[derive(Debug, Clone, Default)]
pub struct DiffractionModel {
    config: DiffractionConfig,
}

impl DiffractionModel {
    pub fn new(config: DiffractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiffractionConfig {
        &self.config
    }

    /// Total loss along a sampled profile between antennas at `tx_asl_m` and
    /// `rx_asl_m` above sea level.
    pub fn path_loss(
        &self,
        distances_m: &[f64],
        elevations_m: &[f64],
        freq_mhz: f64,
        tx_asl_m: f64,
        rx_asl_m: f64,
    ) -> Result<PathLoss> {
        if distances_m.is_empty() || elevations_m.is_empty() {
            return Err(PropagationError::InvalidProfile("empty profile".to_string()));
        }
        if distances_m.len() != elevations_m.len() {
            return Err(PropagationError::InvalidProfile(format!(
                "{} distances for {} elevations",
                distances_m.len(),
                elevations_m.len()
            )));
        }
        if !(freq_mhz.is_finite() && freq_mhz > 0.0) {
            return Err(PropagationError::InvalidInput(format!("frequency {} MHz", freq_mhz)));
        }

        let total_m = distances_m[distances_m.len() - 1];
        if !(total_m > 0.0) {
            return Ok(PathLoss::default());
        }

        let free_space_db = free_space_loss_db(freq_mhz, total_m / 1000.0);

        let last = distances_m.len() - 1;
        let mut worst: Option<(f64, f64)> = None;
        for i in 1..last {
            let (d, h) = (distances_m[i], elevations_m[i]);
            if d <= 0.0 || d >= total_m {
                continue;
            }
            let los = tx_asl_m + (rx_asl_m - tx_asl_m) * (d / total_m);
            let clearance = h - los;
            if clearance > 0.0 && worst.map_or(true, |(_, c)| clearance > c) {
                worst = Some((d, clearance));
            }
        }

        let obstacle = worst.map(|(d, clearance)| Obstacle {
            distance_m: d,
            clearance_m: clearance,
            v: fresnel_v(clearance, d, total_m - d, wavelength_m(freq_mhz)),
        });
        let diffraction_db = obstacle.map_or(0.0, |o| knife_edge_loss_db(o.v));

        let roughness_db = if self.config.apply_assis {
            assis_roughness_db(distances_m, elevations_m, self.config.assis_factor, self.config.assis_cap_db)
        } else {
            0.0
        };

        let total_db = free_space_db + diffraction_db + roughness_db;
        trace!(
            "Path loss {:.1} dB over {:.1} km (fs {:.1}, diff {:.1}, rough {:.1})",
            total_db,
            total_m / 1000.0,
            free_space_db,
            diffraction_db,
            roughness_db
        );

        Ok(PathLoss {
            total_db,
            free_space_db,
            diffraction_db,
            roughness_db,
            obstacle,
        })
    }

    pub fn profile_loss(&self, profile: &Profile, freq_mhz: f64, tx_asl_m: f64, rx_asl_m: f64) -> Result<PathLoss> {
        self.path_loss(&profile.distances_m, &profile.elevations_m, freq_mhz, tx_asl_m, rx_asl_m)
    }
}
