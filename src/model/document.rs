use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{ActivityType, ModuleId};
pub const DEFAULT_USER_NAME: &str = "Learner";

/// XP needed to leave level 1.
pub const FIRST_LEVEL_XP: u64 = 1000;

/// Completion counters per activity type plus aggregate performance stats.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityStats {
    pub documentation: u32,
    pub animation: u32,
    pub lab: u32,
    pub quiz: u32,
    pub perfect_scores: u32,
    pub speed_completions: u32,
    pub total_time_spent_seconds: u64,
}

impl ActivityStats {
    pub fn count(&self, activity: ActivityType) -> u32 {
        match activity {
            ActivityType::Documentation => self.documentation,
            ActivityType::Animation => self.animation,
            ActivityType::Lab => self.lab,
            ActivityType::Quiz => self.quiz,
        }
    }

    pub fn count_mut(&mut self, activity: ActivityType) -> &mut u32 {
        match activity {
            ActivityType::Documentation => &mut self.documentation,
            ActivityType::Animation => &mut self.animation,
            ActivityType::Lab => &mut self.lab,
            ActivityType::Quiz => &mut self.quiz,
        }
    }

    /// Total completed activities across all types.
    pub fn total_activities(&self) -> u32 {
        self.documentation + self.animation + self.lab + self.quiz
    }
}

/// Missing fields deserialize to their fresh-profile values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub level: u32,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    /// XP earned toward the next level; always below `next_level_xp`.
    #[serde(rename = "currentXP")]
    pub current_xp: u64,
    #[serde(rename = "nextLevelXP")]
    pub next_level_xp: u64,
    pub streak_days: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    /// Achievement ids in the order they were earned.
    pub badges_earned: Vec<String>,
    pub stats: ActivityStats,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::new(DEFAULT_USER_NAME)
    }
}

impl UserProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            level: 1,
            total_xp: 0,
            current_xp: 0,
            next_level_xp: FIRST_LEVEL_XP,
            streak_days: 0,
            longest_streak: 0,
            last_activity_date: None,
            badges_earned: Vec::new(),
            stats: ActivityStats::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityRecord {
    pub completed: bool,
    #[serde(rename = "completedAtTimestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 0–100.
    pub score: u8,
    pub time_spent_seconds: u64,
}

pub type ModuleActivities = BTreeMap<ActivityType, ActivityRecord>;

/// The canonical in-memory progress state.
///
/// Only [`crate::engine::ProgressEngine`] mutates a live document; everyone else
/// receives `&ProgressDocument` snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    pub user_profile: UserProfile,
    pub unlocked_module_ids: BTreeSet<ModuleId>,
    pub completed_module_ids: BTreeSet<ModuleId>,
    pub per_module_activity_state: BTreeMap<ModuleId, ModuleActivities>,
    pub achievements_earned: BTreeSet<String>,
}

impl Default for ProgressDocument {
    fn default() -> Self {
        Self::new_default(DEFAULT_USER_NAME)
    }
}

impl ProgressDocument {
    /// Fresh document: first module unlocked, nothing completed, zero XP.
    pub fn new_default(name: &str) -> Self {
        Self {
            user_profile: UserProfile::new(name),
            unlocked_module_ids: BTreeSet::from([ModuleId::FIRST]),
            completed_module_ids: BTreeSet::new(),
            per_module_activity_state: BTreeMap::new(),
            achievements_earned: BTreeSet::new(),
        }
    }

    pub fn activity(&self, module: ModuleId, activity: ActivityType) -> Option<&ActivityRecord> {
        self.per_module_activity_state
            .get(&module)
            .and_then(|acts| acts.get(&activity))
    }

    pub fn is_activity_completed(&self, module: ModuleId, activity: ActivityType) -> bool {
        self.activity(module, activity).is_some_and(|r| r.completed)
    }

    pub fn is_module_unlocked(&self, module: ModuleId) -> bool {
        self.unlocked_module_ids.contains(&module)
    }

    pub fn is_module_completed(&self, module: ModuleId) -> bool {
        self.completed_module_ids.contains(&module)
    }

    /// Checks every data-model invariant, returning the first one broken.
    pub fn check_invariants(&self) -> Result<(), String> {
        let p = &self.user_profile;
        if p.level < 1 {
            return Err(format!("level {} is below 1", p.level));
        }
        if p.next_level_xp == 0 {
            return Err("nextLevelXP must be positive".into());
        }
        if p.current_xp >= p.next_level_xp {
            return Err(format!(
                "currentXP {} is not below nextLevelXP {}",
                p.current_xp, p.next_level_xp
            ));
        }
        if p.current_xp > p.total_xp {
            return Err(format!(
                "currentXP {} exceeds totalXP {}",
                p.current_xp, p.total_xp
            ));
        }

        if !self.completed_module_ids.is_subset(&self.unlocked_module_ids) {
            return Err("completed modules are not a subset of unlocked modules".into());
        }
        let expected = unlock_prefix(&self.completed_module_ids);
        if self.unlocked_module_ids != expected {
            return Err(format!(
                "unlocked modules {:?} are not the completion prefix {:?}",
                self.unlocked_module_ids, expected
            ));
        }

        for module in &self.completed_module_ids {
            if let Some(missing) = ActivityType::ALL
                .iter()
                .find(|a| !self.is_activity_completed(*module, **a))
            {
                return Err(format!("{module} is completed but {missing} is not"));
            }
        }

        for (module, activities) in &self.per_module_activity_state {
            for (activity, record) in activities {
                if !record.completed {
                    continue;
                }
                if !self.is_module_unlocked(*module) {
                    return Err(format!("{module} {activity} completed in a locked module"));
                }
                if let Some(pre) = activity.prerequisite() {
                    if !self.is_activity_completed(*module, pre) {
                        return Err(format!("{module} {activity} completed before {pre}"));
                    }
                }
                if record.score > 100 {
                    return Err(format!("{module} {activity} score {} above 100", record.score));
                }
            }
        }

        let badges: BTreeSet<String> = p.badges_earned.iter().cloned().collect();
        if badges.len() != p.badges_earned.len() {
            return Err("badgesEarned contains duplicates".into());
        }
        if badges != self.achievements_earned {
            return Err("badgesEarned does not match achievementsEarned".into());
        }

        Ok(())
    }
}

/// The unlocked set implied by a set of completed modules: the first module,
/// then each module whose predecessor is completed, stopping at the first gap.
pub fn unlock_prefix(completed: &BTreeSet<ModuleId>) -> BTreeSet<ModuleId> {
    let mut unlocked = BTreeSet::from([ModuleId::FIRST]);
    for module in ModuleId::ALL {
        if !completed.contains(&module) {
            break;
        }
        match module.next() {
            Some(next) => {
                unlocked.insert(next);
            }
            None => break,
        }
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_all(doc: &mut ProgressDocument, module: ModuleId) {
        let acts = doc.per_module_activity_state.entry(module).or_default();
        for a in ActivityType::ALL {
            acts.insert(
                a,
                ActivityRecord {
                    completed: true,
                    completed_at: None,
                    score: 80,
                    time_spent_seconds: 60,
                },
            );
        }
    }

    #[test]
    fn test_default_document_is_valid() {
        let doc = ProgressDocument::default();
        assert!(doc.check_invariants().is_ok());
        assert!(doc.is_module_unlocked(ModuleId::A01));
        assert!(!doc.is_module_unlocked(ModuleId::A02));
        assert_eq!(doc.user_profile.level, 1);
        assert_eq!(doc.user_profile.next_level_xp, 1000);
        assert_eq!(doc.user_profile.name, DEFAULT_USER_NAME);
    }

    #[test]
    fn test_unlock_prefix() {
        assert_eq!(unlock_prefix(&BTreeSet::new()), BTreeSet::from([ModuleId::A01]));
        let completed = BTreeSet::from([ModuleId::A01, ModuleId::A02]);
        assert_eq!(
            unlock_prefix(&completed),
            BTreeSet::from([ModuleId::A01, ModuleId::A02, ModuleId::A03])
        );
        // A gap stops the prefix
        let gapped = BTreeSet::from([ModuleId::A01, ModuleId::A03]);
        assert_eq!(unlock_prefix(&gapped), BTreeSet::from([ModuleId::A01, ModuleId::A02]));
        let all: BTreeSet<ModuleId> = ModuleId::ALL.into_iter().collect();
        assert_eq!(unlock_prefix(&all), all);
    }

    #[test]
    fn test_invariant_xp_overflow() {
        let mut doc = ProgressDocument::default();
        doc.user_profile.total_xp = 1000;
        doc.user_profile.current_xp = 1000;
        assert!(doc.check_invariants().unwrap_err().contains("currentXP"));
    }

    #[test]
    fn test_invariant_completed_without_activities() {
        let mut doc = ProgressDocument::default();
        doc.completed_module_ids.insert(ModuleId::A01);
        doc.unlocked_module_ids.insert(ModuleId::A02);
        assert!(doc.check_invariants().unwrap_err().contains("is completed but"));

        complete_all(&mut doc, ModuleId::A01);
        assert!(doc.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_unlock_gap() {
        let mut doc = ProgressDocument::default();
        doc.unlocked_module_ids.insert(ModuleId::A03);
        assert!(doc.check_invariants().is_err());
    }

    #[test]
    fn test_invariant_activity_order() {
        let mut doc = ProgressDocument::default();
        doc.per_module_activity_state
            .entry(ModuleId::A01)
            .or_default()
            .insert(
                ActivityType::Lab,
                ActivityRecord { completed: true, ..Default::default() },
            );
        assert!(doc.check_invariants().unwrap_err().contains("before"));
    }

    #[test]
    fn test_invariant_badges_match_achievements() {
        let mut doc = ProgressDocument::default();
        doc.achievements_earned.insert("first-steps".into());
        assert!(doc.check_invariants().is_err());
        doc.user_profile.badges_earned.push("first-steps".into());
        assert!(doc.check_invariants().is_ok());
    }
}
