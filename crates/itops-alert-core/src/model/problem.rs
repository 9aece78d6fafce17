// ── Problem domain types ──

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::severity::Severity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProblemStatus {
    #[default]
    #[serde(rename = "0")]
    Open,
    #[serde(rename = "1")]
    Closed,
    #[serde(rename = "2")]
    Expired,
    #[serde(rename = "3")]
    Merged,
}

impl ProblemStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "0",
            Self::Closed => "1",
            Self::Expired => "2",
            Self::Merged => "3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CloseType {
    #[serde(rename = "1")]
    System,
    #[serde(rename = "2")]
    Manual,
}

/// Lifecycle of the external root-cause analysis for a problem.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(try_from = "u8", into = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum RcaStatus {
    #[default]
    Pending = 1,
    Running = 2,
    Success = 3,
    Failed = 4,
    Cancelled = 5,
}

impl From<RcaStatus> for u8 {
    fn from(value: RcaStatus) -> Self {
        match value {
            RcaStatus::Pending => 1,
            RcaStatus::Running => 2,
            RcaStatus::Success => 3,
            RcaStatus::Failed => 4,
            RcaStatus::Cancelled => 5,
        }
    }
}

impl TryFrom<u8> for RcaStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Pending),
            2 => Ok(Self::Running),
            3 => Ok(Self::Success),
            4 => Ok(Self::Failed),
            5 => Ok(Self::Cancelled),
            other => Err(format!("rca_status must be 1..=5, got {other}")),
        }
    }
}

/// A correlated group of fault points treated as one incident.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Problem {
    pub problem_id: u64,
    pub problem_name: String,
    pub problem_create_timestamp: DateTime<Utc>,
    pub problem_update_time: DateTime<Utc>,
    pub problem_occur_time: DateTime<Utc>,
    pub problem_latest_time: DateTime<Utc>,
    /// Seconds.
    pub problem_duration: u64,
    pub problem_description: String,
    pub problem_status: ProblemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_close_type: Option<CloseType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub problem_close_notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub problem_closed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_close_time: Option<DateTime<Utc>>,
    pub problem_level: Severity,
    pub affected_entity_ids: IndexSet<String>,
    pub relation_fp_ids: IndexSet<u64>,
    pub relation_event_ids: IndexSet<u64>,
    pub root_cause_object_id: String,
    pub root_cause_fault_id: u64,
    /// Opaque JSON document produced by the analyzer.
    pub rca_results: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca_end_time: Option<DateTime<Utc>>,
    pub rca_status: RcaStatus,
}

impl Problem {
    pub fn is_open(&self) -> bool {
        self.problem_status == ProblemStatus::Open
    }

    /// Whole seconds between occurrence and `end`, floored at zero.
    pub fn duration_until(&self, end: DateTime<Utc>) -> u64 {
        u64::try_from((end - self.problem_occur_time).num_seconds()).unwrap_or(0)
    }
}

/// Parameters of a close transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub close_type: CloseType,
    pub state: ProblemStatus,
    pub notes: String,
    pub closed_by: String,
}

impl CloseRequest {
    pub fn system(state: ProblemStatus, notes: impl Into<String>) -> Self {
        Self {
            close_type: CloseType::System,
            state,
            notes: notes.into(),
            closed_by: "system".into(),
        }
    }

    pub fn manual(notes: impl Into<String>, closed_by: impl Into<String>) -> Self {
        Self {
            close_type: CloseType::Manual,
            state: ProblemStatus::Closed,
            notes: notes.into(),
            closed_by: closed_by.into(),
        }
    }
}
