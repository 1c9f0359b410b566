//! Broadcast station records

use propagation::MIN_ERP_KW;
use serde::{Deserialize, Serialize};
use std::fmt;
use terrain::geodesy::normalize_bearing;
use terrain::GeoPoint;

/// Nominal mounting height when a station has no HNMT (m)
pub const DEFAULT_HEIGHT_M: f64 = 30.0;

/// ERP assumed when a station has none on record (kW)
pub const DEFAULT_ERP_KW: f64 = 1.0;

/// Entries in a per-bearing gain table (one per 5°)
pub const GAIN_TABLE_LEN: usize = 72;

const GAIN_TABLE_STEP_DEG: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    #[serde(rename = "FM")]
    Fm,
    #[serde(rename = "RTR")]
    Rtr,
    #[serde(rename = "TV")]
    Tv,
    #[serde(rename = "RTV")]
    Rtv,
    #[serde(rename = "RadCom", alias = "RADCOM")]
    RadCom,
}

impl Service {
    /// FM broadcast family (FM, RTR, community radio)
    pub fn is_radio(&self) -> bool {
        matches!(self, Service::Fm | Service::Rtr | Service::RadCom)
    }

    pub fn is_tv(&self) -> bool {
        matches!(self, Service::Tv | Service::Rtv)
    }

    /// Carrier assumed when a station has no frequency on record (MHz)
    pub fn default_frequency_mhz(&self) -> f64 {
        if self.is_tv() {
            600.0
        } else {
            100.0
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Service::Fm => "FM",
            Service::Rtr => "RTR",
            Service::Tv => "TV",
            Service::Rtv => "RTV",
            Service::RadCom => "RadCom",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    #[default]
    Analog,
    Digital,
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technology::Analog => write!(f, "analog"),
            Technology::Digital => write!(f, "digital"),
        }
    }
}

/// TV channel band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelBand {
    /// Channels 2-6
    VhfLow,
    /// Channels 7-13
    VhfHigh,
    Uhf,
}

impl ChannelBand {
    pub fn from_channel(channel: u32) -> Self {
        match channel {
            2..=6 => ChannelBand::VhfLow,
            7..=13 => ChannelBand::VhfHigh,
            _ => ChannelBand::Uhf,
        }
    }
}

/// Transmitting station as read from the station store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub service: Service,
    #[serde(default)]
    pub technology: Technology,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    #[serde(default)]
    pub frequency_mhz: Option<f64>,
    #[serde(default)]
    pub erp_kw: Option<f64>,
    /// Height above mean terrain (m)
    #[serde(default)]
    pub hnmt_m: Option<f64>,
    /// Gain relative to omnidirectional per 5° bearing (dB)
    #[serde(default)]
    pub gain_pattern_db: Option<Vec<f64>>,
}

impl Station {
    pub fn new(id: impl Into<String>, service: Service) -> Self {
        Self {
            id: id.into(),
            name: None,
            service,
            technology: Technology::default(),
            channel: None,
            class: None,
            position: None,
            frequency_mhz: None,
            erp_kw: None,
            hnmt_m: None,
            gain_pattern_db: None,
        }
    }

    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.position = Some(GeoPoint::new(lat, lon));
        self
    }

    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = Some(frequency_mhz);
        self
    }

    pub fn with_erp(mut self, erp_kw: f64) -> Self {
        self.erp_kw = Some(erp_kw);
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_channel(mut self, channel: u32, technology: Technology) -> Self {
        self.channel = Some(channel);
        self.technology = technology;
        self
    }

    pub fn with_height(mut self, hnmt_m: f64) -> Self {
        self.hnmt_m = Some(hnmt_m);
        self
    }

    pub fn with_gain_pattern(mut self, gains_db: Vec<f64>) -> Self {
        self.gain_pattern_db = Some(gains_db);
        self
    }

    /// Position if present and inside valid coordinate ranges
    pub fn valid_position(&self) -> Option<GeoPoint> {
        self.position.filter(GeoPoint::is_valid)
    }

    pub fn band(&self) -> Option<ChannelBand> {
        self.channel.map(ChannelBand::from_channel)
    }

    pub fn nominal_erp_kw(&self) -> f64 {
        self.erp_kw.unwrap_or(DEFAULT_ERP_KW)
    }

    /// ERP toward `bearing_deg`. The gain table applies only with exactly
    /// [`GAIN_TABLE_LEN`] entries; the result is floored at [`MIN_ERP_KW`].
    pub fn erp_toward(&self, bearing_deg: f64) -> f64 {
        let nominal = self.nominal_erp_kw();
        let erp = match &self.gain_pattern_db {
            Some(gains) if gains.len() == GAIN_TABLE_LEN => {
                let idx = (normalize_bearing(bearing_deg) / GAIN_TABLE_STEP_DEG).floor() as usize % GAIN_TABLE_LEN;
                let gain_db = if gains[idx].is_finite() { gains[idx] } else { 0.0 };
                nominal * 10f64.powf(gain_db / 10.0)
            }
            _ => nominal,
        };
        if erp.is_nan() {
            erp
        } else {
            erp.max(MIN_ERP_KW)
        }
    }

    /// HNMT when positive, otherwise [`DEFAULT_HEIGHT_M`]
    pub fn fallback_height_m(&self) -> f64 {
        self.hnmt_m.filter(|h| h.is_finite() && *h > 0.0).unwrap_or(DEFAULT_HEIGHT_M)
    }

    pub fn frequency_or_default(&self) -> f64 {
        self.frequency_mhz
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or_else(|| self.service.default_frequency_mhz())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
