//! Coarse point-to-point field estimate
//!
//! Lower-fidelity tier used for direct two-station checks. It samples a
//! lat/lon-linear profile, takes the single highest point relative to the chord
//! between the end ground levels and applies one knife-edge loss to a
//! free-space field. It is not the full worst-obstacle model of
//! [`crate::diffraction`] and its Fresnel parameter is deliberately smoothed.

use crate::diffraction::{knife_edge_loss_db, wavelength_m};
use crate::{erp_gain_db, PropagationError, Result, FIELD_AT_1KM_1KW_DBUV};
use serde::{Deserialize, Serialize};
use terrain::{ElevationProvider, GeoPoint, Profile};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifiedP2p {
    /// Scale on the Fresnel parameter for rounded hilltops
    pub smoothing: f64,
    /// Profile intervals between the two stations
    pub samples: usize,
}

impl Default for SimplifiedP2p {
    fn default() -> Self {
        Self {
            smoothing: 0.5,
            samples: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct P2pEstimate {
    pub field_dbuv_m: f64,
    pub distance_km: f64,
    pub diffraction_db: f64,
    /// Smoothed Fresnel parameter of the highest point, if any interior sample
    pub v: Option<f64>,
}

impl SimplifiedP2p {
    /// Highest smoothed Fresnel parameter over the interior of `profile`,
    /// measured against the chord joining its first and last samples.
    pub fn max_v(&self, profile: &Profile, freq_mhz: f64) -> Option<f64> {
        if profile.len() < 3 {
            return None;
        }
        let (d_start, d_end) = (profile.distances_m[0], profile.total_m());
        let (h_start, h_end) = (profile.first_elevation()?, profile.last_elevation()?);
        let span = d_end - d_start;
        if span <= 0.0 {
            return None;
        }

        let lambda = wavelength_m(freq_mhz);
        profile
            .distances_m
            .iter()
            .zip(&profile.elevations_m)
            .filter_map(|(d, h)| {
                let d1 = d - d_start;
                let d2 = d_end - d;
                if d1 <= 0.0 || d2 <= 0.0 {
                    return None;
                }
                let chord = h_start + (h_end - h_start) * d1 / span;
                let rel = h - chord;
                Some(self.smoothing * rel * (2.0 / lambda * (1.0 / d1 + 1.0 / d2)).sqrt())
            })
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
    }

    /// Field (dBµV/m) at `rx` from a transmitter at `tx`.
    pub fn field(
        &self,
        provider: &ElevationProvider,
        tx: GeoPoint,
        rx: GeoPoint,
        freq_mhz: f64,
        erp_kw: f64,
    ) -> Result<P2pEstimate> {
        if !(freq_mhz.is_finite() && freq_mhz > 0.0) {
            return Err(PropagationError::InvalidInput(format!("frequency {} MHz", freq_mhz)));
        }
        let distance_km = tx.distance_km(&rx);
        if !(distance_km > 0.0) {
            return Err(PropagationError::InvalidInput("transmitter and receiver coincide".to_string()));
        }

        let profile = provider.linear_profile(tx, rx, self.samples);
        let v = self.max_v(&profile, freq_mhz);
        let diffraction_db = v.map_or(0.0, knife_edge_loss_db);
        debug!(
            "P2P {:.1} km: {} profile samples, v={:?}, L={:.1} dB",
            distance_km,
            profile.len(),
            v,
            diffraction_db
        );

        let field_dbuv_m = FIELD_AT_1KM_1KW_DBUV + erp_gain_db(erp_kw) - 20.0 * distance_km.log10() - diffraction_db;
        Ok(P2pEstimate {
            field_dbuv_m,
            distance_km,
            diffraction_db,
            v,
        })
    }
}
