//! XP reward table and level curve.

use serde::Serialize;

use crate::model::{ActivityType, UserProfile};

pub use crate::model::FIRST_LEVEL_XP;

/// One-time bonus when a module's four activities are all complete.
pub const MODULE_COMPLETION_XP: u64 = 150;

pub const FIRST_TIME_BONUS: u64 = 25;
pub const PERFECT_SCORE_BONUS: u64 = 50;
pub const SPEED_BONUS: u64 = 20;

/// Labs and quizzes finished within this many seconds count as speed completions.
pub const SPEED_COMPLETION_SECS: u64 = 300;

// (minimum streak days, multiplier in percent), highest first
const STREAK_MULTIPLIERS: [(u32, u64); 4] = [(30, 150), (14, 130), (7, 120), (3, 110)];

pub fn base_xp(activity: ActivityType) -> u64 {
    match activity {
        ActivityType::Documentation => 75,
        ActivityType::Animation => 50,
        ActivityType::Lab => 100,
        ActivityType::Quiz => 80,
    }
}

pub fn streak_multiplier_percent(streak_days: u32) -> u64 {
    STREAK_MULTIPLIERS
        .iter()
        .find(|(days, _)| streak_days >= *days)
        .map(|(_, pct)| *pct)
        .unwrap_or(100)
}

/// Threshold for the level after one whose threshold was `current` (×1.25).
pub fn next_threshold(current: u64) -> u64 {
    current + current / 4
}

pub fn is_perfect(score: u8) -> bool {
    score >= 100
}

pub fn is_speed_completion(activity: ActivityType, time_spent_seconds: u64) -> bool {
    matches!(activity, ActivityType::Lab | ActivityType::Quiz)
        && time_spent_seconds > 0
        && time_spent_seconds <= SPEED_COMPLETION_SECS
}

/// How the XP for one activity completion was put together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
    pub base: u64,
    pub first_time_bonus: u64,
    pub score_bonus: u64,
    pub speed_bonus: u64,
    pub multiplier_percent: u64,
    pub total: u64,
}

/// XP for completing `activity`, given the streak before today's activity.
pub fn activity_xp(
    activity: ActivityType,
    score: u8,
    time_spent_seconds: u64,
    first_time: bool,
    streak_days: u32,
) -> XpBreakdown {
    let base = base_xp(activity);
    let first_time_bonus = if first_time { FIRST_TIME_BONUS } else { 0 };
    let score_bonus = if is_perfect(score) {
        PERFECT_SCORE_BONUS
    } else if score >= 90 {
        PERFECT_SCORE_BONUS / 2
    } else {
        0
    };
    let speed_bonus = if is_speed_completion(activity, time_spent_seconds) {
        SPEED_BONUS
    } else {
        0
    };
    let multiplier_percent = streak_multiplier_percent(streak_days);
    let total = (base + first_time_bonus + score_bonus + speed_bonus) * multiplier_percent / 100;

    XpBreakdown {
        base,
        first_time_bonus,
        score_bonus,
        speed_bonus,
        multiplier_percent,
        total,
    }
}

/// Level transition caused by an XP award.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelChange {
    pub previous_level: u32,
    pub new_level: u32,
}

impl LevelChange {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.previous_level
    }

    pub fn levels_gained(&self) -> u32 {
        self.new_level.saturating_sub(self.previous_level)
    }
}

/// Adds `amount` to the profile and rolls `current_xp` over as many level
/// boundaries as it crosses.
pub fn apply_xp(profile: &mut UserProfile, amount: u64) -> LevelChange {
    let previous_level = profile.level;
    profile.total_xp = profile.total_xp.saturating_add(amount);
    profile.current_xp = profile.current_xp.saturating_add(amount);
    roll_levels(profile);
    LevelChange {
        previous_level,
        new_level: profile.level,
    }
}

/// Restores `current_xp < next_level_xp` by converting surplus XP into levels.
pub fn roll_levels(profile: &mut UserProfile) {
    if profile.next_level_xp == 0 {
        profile.next_level_xp = FIRST_LEVEL_XP;
    }
    while profile.current_xp >= profile.next_level_xp {
        profile.current_xp -= profile.next_level_xp;
        profile.level += 1;
        profile.next_level_xp = next_threshold(profile.next_level_xp);
    }
}

/// Rebuilds level, current XP and threshold from a total alone.
pub fn profile_levels_for_total(total_xp: u64) -> (u32, u64, u64) {
    let mut level = 1;
    let mut remaining = total_xp;
    let mut threshold = FIRST_LEVEL_XP;
    while remaining >= threshold {
        remaining -= threshold;
        level += 1;
        threshold = next_threshold(threshold);
    }
    (level, remaining, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_growth() {
        assert_eq!(next_threshold(1000), 1250);
        assert_eq!(next_threshold(1250), 1562);
        assert_eq!(next_threshold(1562), 1952);
    }

    #[test]
    fn test_multi_level_award() {
        let mut profile = UserProfile::new("t");
        let change = apply_xp(&mut profile, 2500);
        assert_eq!(change.previous_level, 1);
        assert_eq!(change.new_level, 3);
        assert_eq!(change.levels_gained(), 2);
        assert!(change.leveled_up());
        assert_eq!(profile.total_xp, 2500);
        assert_eq!(profile.current_xp, 250);
        assert_eq!(profile.next_level_xp, 1562);
    }

    #[test]
    fn test_exact_boundary_levels_up() {
        let mut profile = UserProfile::new("t");
        let change = apply_xp(&mut profile, 1000);
        assert_eq!(change.new_level, 2);
        assert_eq!(profile.current_xp, 0);
        assert_eq!(profile.next_level_xp, 1250);
    }

    #[test]
    fn test_invariant_holds_over_many_awards() {
        let mut profile = UserProfile::new("t");
        let mut sum = 0;
        for amount in [0, 1, 999, 75, 4000, 12, 250, 100_000, 3] {
            apply_xp(&mut profile, amount);
            sum += amount;
            assert!(profile.current_xp < profile.next_level_xp);
            assert_eq!(profile.total_xp, sum);
        }
        assert_eq!(
            profile_levels_for_total(sum),
            (profile.level, profile.current_xp, profile.next_level_xp)
        );
    }

    #[test]
    fn test_streak_multiplier() {
        assert_eq!(streak_multiplier_percent(0), 100);
        assert_eq!(streak_multiplier_percent(2), 100);
        assert_eq!(streak_multiplier_percent(3), 110);
        assert_eq!(streak_multiplier_percent(7), 120);
        assert_eq!(streak_multiplier_percent(13), 120);
        assert_eq!(streak_multiplier_percent(14), 130);
        assert_eq!(streak_multiplier_percent(45), 150);
    }

    #[test]
    fn test_activity_xp() {
        let first_doc = activity_xp(ActivityType::Documentation, 0, 600, true, 0);
        assert_eq!(first_doc.total, 100);

        let perfect_lab = activity_xp(ActivityType::Lab, 100, 200, false, 0);
        assert_eq!(perfect_lab.score_bonus, 50);
        assert_eq!(perfect_lab.speed_bonus, 20);
        assert_eq!(perfect_lab.total, 170);

        let good_quiz = activity_xp(ActivityType::Quiz, 95, 0, false, 3);
        assert_eq!(good_quiz.score_bonus, 25);
        assert_eq!(good_quiz.speed_bonus, 0);
        // (80 + 25) * 1.1 truncated
        assert_eq!(good_quiz.total, 115);
    }

    #[test]
    fn test_speed_only_for_lab_and_quiz() {
        assert!(!is_speed_completion(ActivityType::Documentation, 10));
        assert!(is_speed_completion(ActivityType::Quiz, 300));
        assert!(!is_speed_completion(ActivityType::Quiz, 301));
        assert!(!is_speed_completion(ActivityType::Lab, 0));
    }
}
