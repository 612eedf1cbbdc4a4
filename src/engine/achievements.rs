//! Achievement catalog and evaluation.
//!
//! Conditions are plain data evaluated against a snapshot. They never read the
//! clock: streak conditions look at the already-computed streak fields.

use serde::Serialize;

use crate::model::{ActivityType, ModuleId, ProgressDocument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Condition {
    /// Completed activities of any type.
    ActivityCount { min: u32 },
    TotalXp { min: u64 },
    #[serde(rename_all = "camelCase")]
    ActivityTypeCount { activity: ActivityType, min: u32 },
    ModuleCompleted { module: ModuleId },
    ModuleCount { min: usize },
    PerfectScores { min: u32 },
    LongestStreak { min: u32 },
    Level { min: u32 },
}

impl Condition {
    pub fn holds(&self, doc: &ProgressDocument) -> bool {
        let profile = &doc.user_profile;
        match *self {
            Condition::ActivityCount { min } => profile.stats.total_activities() >= min,
            Condition::TotalXp { min } => profile.total_xp >= min,
            Condition::ActivityTypeCount { activity, min } => profile.stats.count(activity) >= min,
            Condition::ModuleCompleted { module } => doc.is_module_completed(module),
            Condition::ModuleCount { min } => doc.completed_module_ids.len() >= min,
            Condition::PerfectScores { min } => profile.stats.perfect_scores >= min,
            Condition::LongestStreak { min } => {
                profile.longest_streak.max(profile.streak_days) >= min
            }
            Condition::Level { min } => profile.level >= min,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Progress,
    Learning,
    Mastery,
    Performance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub category: Category,
    pub xp_reward: u64,
    pub condition: Condition,
}

/// Every achievement, in evaluation (and award) order.
pub const CATALOG: &[Achievement] = &[
    Achievement {
        id: "first-steps",
        name: "First Steps",
        description: "Complete your first activity",
        icon: "🎯",
        category: Category::Progress,
        xp_reward: 50,
        condition: Condition::ActivityCount { min: 1 },
    },
    Achievement {
        id: "xp-collector",
        name: "XP Collector",
        description: "Earn 1000 total XP",
        icon: "💎",
        category: Category::Progress,
        xp_reward: 100,
        condition: Condition::TotalXp { min: 1000 },
    },
    Achievement {
        id: "xp-master",
        name: "XP Master",
        description: "Earn 5000 total XP",
        icon: "👑",
        category: Category::Progress,
        xp_reward: 200,
        condition: Condition::TotalXp { min: 5000 },
    },
    Achievement {
        id: "bookworm",
        name: "Bookworm",
        description: "Read 5 documentation sections",
        icon: "📚",
        category: Category::Learning,
        xp_reward: 75,
        condition: Condition::ActivityTypeCount { activity: ActivityType::Documentation, min: 5 },
    },
    Achievement {
        id: "visual-learner",
        name: "Visual Learner",
        description: "Watch 5 animations",
        icon: "🎬",
        category: Category::Learning,
        xp_reward: 75,
        condition: Condition::ActivityTypeCount { activity: ActivityType::Animation, min: 5 },
    },
    Achievement {
        id: "hands-on-learner",
        name: "Hands-On Learner",
        description: "Complete 3 labs",
        icon: "🧪",
        category: Category::Learning,
        xp_reward: 100,
        condition: Condition::ActivityTypeCount { activity: ActivityType::Lab, min: 3 },
    },
    Achievement {
        id: "access-control-expert",
        name: "Access Control Expert",
        description: "Master A01 - Broken Access Control",
        icon: "🔐",
        category: Category::Mastery,
        xp_reward: 150,
        condition: Condition::ModuleCompleted { module: ModuleId::A01 },
    },
    Achievement {
        id: "owasp-champion",
        name: "OWASP Champion",
        description: "Complete 5 OWASP modules",
        icon: "🏆",
        category: Category::Mastery,
        xp_reward: 300,
        condition: Condition::ModuleCount { min: 5 },
    },
    Achievement {
        id: "security-master",
        name: "Security Master",
        description: "Complete all 10 OWASP modules",
        icon: "👑",
        category: Category::Mastery,
        xp_reward: 500,
        condition: Condition::ModuleCount { min: 10 },
    },
    Achievement {
        id: "perfectionist",
        name: "Perfectionist",
        description: "Score 100% on an assessment",
        icon: "💯",
        category: Category::Performance,
        xp_reward: 100,
        condition: Condition::PerfectScores { min: 1 },
    },
    Achievement {
        id: "consistent-learner",
        name: "Consistent Learner",
        description: "Maintain a 7-day streak",
        icon: "🔥",
        category: Category::Performance,
        xp_reward: 150,
        condition: Condition::LongestStreak { min: 7 },
    },
    Achievement {
        id: "rising-star",
        name: "Rising Star",
        description: "Reach level 5",
        icon: "⭐",
        category: Category::Progress,
        xp_reward: 100,
        condition: Condition::Level { min: 5 },
    },
];

pub fn find(id: &str) -> Option<&'static Achievement> {
    CATALOG.iter().find(|a| a.id == id)
}

/// Achievements whose condition holds and that are not yet earned, in catalog order.
pub fn evaluate(doc: &ProgressDocument) -> Vec<&'static Achievement> {
    CATALOG
        .iter()
        .filter(|a| !doc.achievements_earned.contains(a.id))
        .filter(|a| a.condition.holds(doc))
        .collect()
}
