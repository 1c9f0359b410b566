//! Regulatory threshold tables
//!
//! Class limits, protection ratios and protected-contour field levels. Missing
//! entries always mean "unverifiable"; nothing here defaults a missing ratio to
//! zero.

use crate::station::{ChannelBand, Service, Station, Technology};
use crate::{CoverageError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protected field level of FM, RTR and community radio (dBµV/m)
pub const FM_PROTECTED_LEVEL_DBUV: f64 = 66.0;

/// Digital TV protected level when the table has no entry (dBµV/m)
pub const DIGITAL_TV_FALLBACK_LEVEL_DBUV: f64 = 51.0;

/// Analog TV protected level when the table has no entry (dBµV/m)
pub const ANALOG_TV_FALLBACK_LEVEL_DBUV: f64 = 64.0;

/// Channel offsets that carry a TV protection requirement
pub const PROTECTED_CHANNEL_OFFSETS: [i32; 5] = [0, 1, 7, 14, 15];

/// Power, height and contour limits of one station class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLimit {
    pub class: String,
    /// TV classes are defined per band; FM classes carry none
    #[serde(default)]
    pub band: Option<ChannelBand>,
    pub max_erp_kw: f64,
    pub max_height_m: f64,
    #[serde(default)]
    pub max_contour_km: Option<f64>,
}

/// Required C/I for an FM frequency offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmProtectionRatio {
    /// Interference type (co-channel, adjacent_200khz, ...)
    #[serde(default)]
    pub kind: String,
    pub delta_khz: f64,
    pub ci_db: f64,
}

/// Required C/I for a TV technology pair and channel offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvProtectionRatio {
    #[serde(default)]
    pub kind: String,
    pub desired: Technology,
    pub interfering: Technology,
    pub delta: ChannelDelta,
    pub ci_db: f64,
}

/// Protected-contour field level for a TV technology and band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourLevel {
    pub technology: Technology,
    pub band: ChannelBand,
    pub level_dbuv_m: f64,
}

/// Community radio limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadComNorm {
    pub max_erp_w: f64,
    pub max_height_m: f64,
    pub service_radius_km: f64,
}

impl Default for RadComNorm {
    fn default() -> Self {
        Self {
            max_erp_w: 25.0,
            max_height_m: 30.0,
            service_radius_km: 1.0,
        }
    }
}

/// Interfering channel minus desired channel, labelled `n`, `n+1`, `n-7`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelDelta(pub i32);

impl ChannelDelta {
    pub fn between(desired: u32, interfering: u32) -> Self {
        ChannelDelta(interfering as i32 - desired as i32)
    }

    pub fn is_protected(&self) -> bool {
        PROTECTED_CHANNEL_OFFSETS.contains(&self.0.abs())
    }

    pub fn label(&self) -> String {
        match self.0 {
            0 => "n".to_string(),
            d if d > 0 => format!("n+{}", d),
            d => format!("n{}", d),
        }
    }
}

impl fmt::Display for ChannelDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ChannelDelta {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let rest = s
            .strip_prefix('n')
            .or_else(|| s.strip_prefix('N'))
            .ok_or_else(|| CoverageError::InvalidInput(format!("channel delta '{}'", s)))?;
        if rest.is_empty() {
            return Ok(ChannelDelta(0));
        }
        let value = rest
            .strip_prefix('+')
            .unwrap_or(rest)
            .parse::<i32>()
            .map_err(|_| CoverageError::InvalidInput(format!("channel delta '{}'", s)))?;
        Ok(ChannelDelta(value))
    }
}

impl TryFrom<String> for ChannelDelta {
    type Error = CoverageError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ChannelDelta> for String {
    fn from(d: ChannelDelta) -> Self {
        d.label()
    }
}

/// Outcome of the class-limit check
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassCheck {
    /// A norm was found and compared
    pub verified: bool,
    /// No limit exceeded (true when unverified)
    pub within_limits: bool,
    pub messages: Vec<String>,
}

/// All normative tables, read once and shared read-only
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormativeTables {
    pub fm_classes: Vec<ClassLimit>,
    pub tv_digital_classes: Vec<ClassLimit>,
    pub tv_analog_classes: Vec<ClassLimit>,
    pub fm_protection: Vec<FmProtectionRatio>,
    pub tv_protection: Vec<TvProtectionRatio>,
    pub contour_levels: Vec<ContourLevel>,
    pub radcom: RadComNorm,
}

impl NormativeTables {
    /// Class norm of a station; TV classes prefer an entry for the station's band.
    pub fn class_limit(&self, station: &Station) -> Option<&ClassLimit> {
        let class = station.class.as_deref()?;
        match station.service {
            Service::Fm | Service::Rtr => self.fm_classes.iter().find(|c| c.class == class),
            Service::Tv | Service::Rtv => {
                let table = match station.technology {
                    Technology::Digital => &self.tv_digital_classes,
                    Technology::Analog => &self.tv_analog_classes,
                };
                let band = station.band();
                table
                    .iter()
                    .find(|c| c.class == class && c.band.is_some() && c.band == band)
                    .or_else(|| table.iter().find(|c| c.class == class))
            }
            Service::RadCom => None,
        }
    }

    /// Upper bound on the protected-contour radius of a station (km)
    pub fn contour_cap_km(&self, station: &Station) -> Option<f64> {
        if station.service == Service::RadCom {
            return Some(self.radcom.service_radius_km);
        }
        self.class_limit(station)
            .and_then(|c| c.max_contour_km)
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Protected field level (dBµV/m)
    pub fn target_level(&self, station: &Station) -> f64 {
        if !station.service.is_tv() {
            return FM_PROTECTED_LEVEL_DBUV;
        }
        let band = station.band().unwrap_or(ChannelBand::Uhf);
        self.contour_levels
            .iter()
            .find(|l| l.technology == station.technology && l.band == band && l.level_dbuv_m > 0.0)
            .map(|l| l.level_dbuv_m)
            .unwrap_or(match station.technology {
                Technology::Digital => DIGITAL_TV_FALLBACK_LEVEL_DBUV,
                Technology::Analog => ANALOG_TV_FALLBACK_LEVEL_DBUV,
            })
    }

    /// Ratio for the tabulated offset closest to `delta_khz`
    pub fn fm_ratio(&self, delta_khz: f64) -> Option<&FmProtectionRatio> {
        self.fm_protection
            .iter()
            .filter(|r| r.delta_khz.is_finite())
            .min_by(|a, b| (a.delta_khz - delta_khz).abs().total_cmp(&(b.delta_khz - delta_khz).abs()))
    }

    pub fn tv_ratio(&self, desired: Technology, interfering: Technology, delta: ChannelDelta) -> Option<&TvProtectionRatio> {
        self.tv_protection
            .iter()
            .find(|r| r.desired == desired && r.interfering == interfering && r.delta == delta)
    }

    /// Compare power and height against the class norm.
    pub fn check_class_limits(&self, station: &Station) -> ClassCheck {
        let mut check = ClassCheck {
            verified: false,
            within_limits: true,
            messages: Vec::new(),
        };

        let (erp, max_erp, height, max_height, unit, factor) = if station.service == Service::RadCom {
            let n = &self.radcom;
            (station.erp_kw, n.max_erp_w, station.hnmt_m, n.max_height_m, "W", 1000.0)
        } else {
            match self.class_limit(station) {
                Some(c) => (station.erp_kw, c.max_erp_kw, station.hnmt_m, c.max_height_m, "kW", 1.0),
                None => {
                    check.messages.push(match &station.class {
                        Some(class) => format!("Class {} not found in norms; not verified", class),
                        None => "Station has no class; limits not verified".to_string(),
                    });
                    return check;
                }
            }
        };

        check.verified = true;
        if let Some(erp) = erp.map(|e| e * factor) {
            if erp > max_erp {
                check.within_limits = false;
                check
                    .messages
                    .push(format!("ERP {} {} exceeds class limit {} {}", erp, unit, max_erp, unit));
            }
        }
        if let Some(h) = height {
            if h > max_height {
                check.within_limits = false;
                check
                    .messages
                    .push(format!("HNMT {} m exceeds class limit {} m", h, max_height));
            }
        }
        check
    }
}
