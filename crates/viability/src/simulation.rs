//! Simulation (job) records

use chrono::{DateTime, Utc};
use coverage::Service;
use propagation::PathType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Storage limit of a simulation status message (characters)
pub const MAX_MESSAGE_CHARS: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Queued,
    Done,
    Failed,
}

impl SimulationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SimulationStatus::Queued)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Class limits, interference and protected contour
    Viability,
    /// Protected contour only
    Contour,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Viability => write!(f, "viability"),
            AnalysisKind::Contour => write!(f, "contour"),
        }
    }
}

/// Kind of contour stored with a coverage result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourTag {
    FmProtectedViability,
    FmProtected,
    TvProtectedViability,
    TvProtected,
    RadcomService,
}

impl ContourTag {
    pub fn for_job(service: Service, kind: AnalysisKind) -> Self {
        match (service, kind) {
            (Service::RadCom, _) => ContourTag::RadcomService,
            (s, AnalysisKind::Viability) if s.is_tv() => ContourTag::TvProtectedViability,
            (s, AnalysisKind::Contour) if s.is_tv() => ContourTag::TvProtected,
            (_, AnalysisKind::Viability) => ContourTag::FmProtectedViability,
            (_, AnalysisKind::Contour) => ContourTag::FmProtected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContourTag::FmProtectedViability => "fm_protected_viability",
            ContourTag::FmProtected => "fm_protected",
            ContourTag::TvProtectedViability => "tv_protected_viability",
            ContourTag::TvProtected => "tv_protected",
            ContourTag::RadcomService => "radcom_service",
        }
    }
}

/// Work item handed to a dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub simulation_id: Uuid,
    pub kind: AnalysisKind,
    pub station_id: String,
    pub time_percent: Option<f64>,
    pub path: Option<PathType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub station_id: String,
    pub time_percent: Option<f64>,
    pub path: Option<PathType>,
    pub status: SimulationStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Simulation {
    pub fn queued(kind: AnalysisKind, station_id: impl Into<String>, time_percent: Option<f64>, path: Option<PathType>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            station_id: station_id.into(),
            time_percent,
            path,
            status: SimulationStatus::Queued,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job(&self) -> Job {
        Job {
            simulation_id: self.id,
            kind: self.kind,
            station_id: self.station_id.clone(),
            time_percent: self.time_percent,
            path: self.path,
        }
    }
}

/// Cut `message` to at most `max_chars` characters on a char boundary
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let msg = "Δf".repeat(200);
        let cut = truncate_message(&msg, MAX_MESSAGE_CHARS);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS);
        assert!(cut.starts_with("ΔfΔf"));

        assert_eq!(truncate_message("short", MAX_MESSAGE_CHARS), "short");
        assert_eq!(truncate_message("µµµ", 2), "µµ");
    }

    #[test]
    fn test_contour_tags() {
        assert_eq!(
            ContourTag::for_job(Service::Fm, AnalysisKind::Viability).as_str(),
            "fm_protected_viability"
        );
        assert_eq!(ContourTag::for_job(Service::Rtr, AnalysisKind::Contour).as_str(), "fm_protected");
        assert_eq!(
            ContourTag::for_job(Service::Rtv, AnalysisKind::Viability).as_str(),
            "tv_protected_viability"
        );
        assert_eq!(ContourTag::for_job(Service::Tv, AnalysisKind::Contour).as_str(), "tv_protected");
        assert_eq!(
            ContourTag::for_job(Service::RadCom, AnalysisKind::Viability).as_str(),
            "radcom_service"
        );
        assert_eq!(serde_json::to_string(&ContourTag::TvProtected).unwrap(), "\"tv_protected\"");
    }

    #[test]
    fn test_new_simulation_is_queued() {
        let sim = Simulation::queued(AnalysisKind::Contour, "FM-1", None, Some(PathType::Sea));
        assert_eq!(sim.status, SimulationStatus::Queued);
        assert!(!sim.status.is_terminal());
        assert_eq!(sim.job().station_id, "FM-1");
        assert_eq!(sim.job().simulation_id, sim.id);
    }
}
