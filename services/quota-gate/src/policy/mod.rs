pub mod resolver;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use resolver::{ResolvedTier, TierCeilings, TierPolicy, TierPolicyResolver};

pub const DEFAULT_FREE_DAILY_LIMIT: u32 = 3;
pub const DEFAULT_PRIVILEGED_DAILY_LIMIT: u32 = 50;

/// Kind of paid generation work behind the gate. Every class draws on the
/// same per-account daily allotment; classes only differ in ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Report,
    CvPolish,
    CoverLetter,
}

impl OperationClass {
    pub const ALL: [OperationClass; 3] = [
        OperationClass::Report,
        OperationClass::CvPolish,
        OperationClass::CoverLetter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Report => "report",
            OperationClass::CvPolish => "cv_polish",
            OperationClass::CoverLetter => "cover_letter",
        }
    }

    /// Prefix of the per-class environment overrides, e.g. `CV_POLISH_FREE_DAILY_LIMIT`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            OperationClass::Report => "REPORT",
            OperationClass::CvPolish => "CV_POLISH",
            OperationClass::CoverLetter => "COVER_LETTER",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "report" => Ok(OperationClass::Report),
            "cv_polish" => Ok(OperationClass::CvPolish),
            "cover_letter" => Ok(OperationClass::CoverLetter),
            other => Err(format!("unknown operation class: {other}")),
        }
    }
}
