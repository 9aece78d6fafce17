// ── Severity scale shared by events, fault points and problems ──

use serde::{Deserialize, Serialize};

/// Five-level severity. `1` is the most severe; ordering follows the code,
/// so `min()` picks the worst.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(try_from = "u8", into = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Emergency = 1,
    Critical = 2,
    Major = 3,
    Warning = 4,
    #[default]
    Normal = 5,
}

impl Severity {
    pub fn code(self) -> u8 {
        u8::from(self)
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Emergency => 1,
            Severity::Critical => 2,
            Severity::Major => 3,
            Severity::Warning => 4,
            Severity::Normal => 5,
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Emergency),
            2 => Ok(Self::Critical),
            3 => Ok(Self::Major),
            4 => Ok(Self::Warning),
            5 => Ok(Self::Normal),
            other => Err(format!("severity must be 1..=5, got {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_integer_code() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "2");
        let parsed: Severity = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Severity::Warning);
        assert!(serde_json::from_str::<Severity>("9").is_err());
    }

    #[test]
    fn lower_code_is_more_severe() {
        let worst = [Severity::Warning, Severity::Emergency, Severity::Major]
            .into_iter()
            .min()
            .unwrap();
        assert_eq!(worst, Severity::Emergency);
    }
}
