use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProgressError;

/// One of the ten security-topic modules, in their fixed learning order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleId {
    A01,
    A02,
    A03,
    A04,
    A05,
    A06,
    A07,
    A08,
    A09,
    A10,
}

impl ModuleId {
    /// Every module in learning order.
    pub const ALL: [ModuleId; 10] = [
        ModuleId::A01,
        ModuleId::A02,
        ModuleId::A03,
        ModuleId::A04,
        ModuleId::A05,
        ModuleId::A06,
        ModuleId::A07,
        ModuleId::A08,
        ModuleId::A09,
        ModuleId::A10,
    ];

    pub const FIRST: ModuleId = ModuleId::A01;

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::A01 => "A01",
            ModuleId::A02 => "A02",
            ModuleId::A03 => "A03",
            ModuleId::A04 => "A04",
            ModuleId::A05 => "A05",
            ModuleId::A06 => "A06",
            ModuleId::A07 => "A07",
            ModuleId::A08 => "A08",
            ModuleId::A09 => "A09",
            ModuleId::A10 => "A10",
        }
    }

    /// Zero-based position in the learning order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<ModuleId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<ModuleId> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn title(self) -> &'static str {
        self.info().title
    }

    pub fn info(self) -> &'static ModuleInfo {
        &MODULE_CATALOG[self.index()]
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = ProgressError;

    /// Accepts `A01`..`A10`, case-insensitive (lab routes use both `/labs/A01` and `/labs/a01`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ModuleId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| ProgressError::UnknownModule(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Static description of a module.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub title: &'static str,
    pub difficulty: Difficulty,
}

pub const MODULE_CATALOG: [ModuleInfo; 10] = [
    ModuleInfo { id: ModuleId::A01, title: "Broken Access Control", difficulty: Difficulty::Medium },
    ModuleInfo { id: ModuleId::A02, title: "Cryptographic Failures", difficulty: Difficulty::Hard },
    ModuleInfo { id: ModuleId::A03, title: "Injection", difficulty: Difficulty::Hard },
    ModuleInfo { id: ModuleId::A04, title: "Insecure Design", difficulty: Difficulty::Medium },
    ModuleInfo { id: ModuleId::A05, title: "Security Misconfiguration", difficulty: Difficulty::Easy },
    ModuleInfo { id: ModuleId::A06, title: "Vulnerable & Outdated Components", difficulty: Difficulty::Medium },
    ModuleInfo { id: ModuleId::A07, title: "Identification & Authentication Failures", difficulty: Difficulty::Medium },
    ModuleInfo { id: ModuleId::A08, title: "Software & Data Integrity Failures", difficulty: Difficulty::Hard },
    ModuleInfo { id: ModuleId::A09, title: "Security Logging & Monitoring Failures", difficulty: Difficulty::Easy },
    ModuleInfo { id: ModuleId::A10, title: "Server-Side Request Forgery (SSRF)", difficulty: Difficulty::Hard },
];

/// One of the four learning steps inside a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Documentation,
    Animation,
    Lab,
    #[serde(alias = "assessment")]
    Quiz,
}

impl ActivityType {
    /// Nominal order within a module.
    pub const ALL: [ActivityType; 4] = [
        ActivityType::Documentation,
        ActivityType::Animation,
        ActivityType::Lab,
        ActivityType::Quiz,
    ];

    /// The activity that must be completed before this one can start.
    ///
    /// The quiz is gated on the lab explicitly rather than on "the previous list
    /// entry"; with the current activity order both readings agree.
    pub fn prerequisite(self) -> Option<ActivityType> {
        match self {
            ActivityType::Documentation => None,
            ActivityType::Animation => Some(ActivityType::Documentation),
            ActivityType::Lab => Some(ActivityType::Animation),
            ActivityType::Quiz => Some(ActivityType::Lab),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Documentation => "documentation",
            ActivityType::Animation => "animation",
            ActivityType::Lab => "lab",
            ActivityType::Quiz => "quiz",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "documentation" => Ok(ActivityType::Documentation),
            "animation" => Ok(ActivityType::Animation),
            "lab" => Ok(ActivityType::Lab),
            "quiz" | "assessment" => Ok(ActivityType::Quiz),
            _ => Err(ProgressError::UnknownActivity(s.to_string())),
        }
    }
}
