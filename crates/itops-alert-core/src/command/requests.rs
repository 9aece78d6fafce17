// ── Typed request bodies for operator commands ──

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::CloseRequest;

/// Body of a manual close.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseProblemRequest {
    pub notes: String,
    pub closed_by: String,
}

impl CloseProblemRequest {
    /// Validate and turn into a manual close transition.
    pub fn into_close(self) -> Result<CloseRequest, CoreError> {
        if self.closed_by.trim().is_empty() {
            return Err(CoreError::precondition("closed_by must not be empty"));
        }
        Ok(CloseRequest::manual(self.notes, self.closed_by))
    }
}

/// Body of a manual root-cause override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetRootCauseRequest {
    pub root_cause_object_id: String,
    pub root_cause_fault_id: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{CloseType, ProblemStatus};

    #[test]
    fn manual_close_requires_author() {
        let close = CloseProblemRequest {
            notes: "handled by on-call".into(),
            closed_by: "alice".into(),
        }
        .into_close()
        .unwrap();
        assert_eq!(close.close_type, CloseType::Manual);
        assert_eq!(close.state, ProblemStatus::Closed);

        let err = CloseProblemRequest {
            notes: String::new(),
            closed_by: "  ".into(),
        }
        .into_close()
        .unwrap_err();
        assert!(matches!(err, CoreError::PreconditionViolated { .. }));
    }
}
