//! Startup merge of remote, locally persisted and default progress.
//!
//! Precedence is field by field: remote, then local, then the default
//! document. The result is normalised so every invariant holds.

use std::collections::BTreeSet;

use tracing::warn;

use super::rewards::{self, profile_levels_for_total};
use crate::model::{
    unlock_prefix, ActivityRecord, ActivityType, ModuleId, ProgressDocument,
};
use crate::sync::RemoteSnapshot;

fn parse_modules(ids: &[String], field: &str) -> BTreeSet<ModuleId> {
    ids.iter()
        .filter_map(|raw| match raw.parse::<ModuleId>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(module_id = %raw, field, "Ignoring unknown module id from remote");
                None
            }
        })
        .collect()
}

pub fn merge(
    remote: Option<&RemoteSnapshot>,
    local: Option<ProgressDocument>,
    default_name: &str,
) -> ProgressDocument {
    let mut doc = local.unwrap_or_else(|| ProgressDocument::new_default(default_name));
    if let Some(remote) = remote {
        apply_remote(&mut doc, remote);
    }
    normalize(&mut doc);

    if let Err(reason) = doc.check_invariants() {
        warn!(%reason, "Merged progress still invalid; starting from defaults");
        return ProgressDocument::new_default(default_name);
    }
    doc
}

fn apply_remote(doc: &mut ProgressDocument, remote: &RemoteSnapshot) {
    doc.completed_module_ids = parse_modules(&remote.completed_modules, "completed_modules");
    doc.unlocked_module_ids = parse_modules(&remote.unlocked_modules, "unlocked_modules");

    // Remote completions carry no activity detail; back-fill it
    for module in &doc.completed_module_ids {
        let activities = doc.per_module_activity_state.entry(*module).or_default();
        for activity in ActivityType::ALL {
            let record = activities.entry(activity).or_insert_with(ActivityRecord::default);
            record.completed = true;
        }
    }

    let profile = &mut doc.user_profile;
    if let Some(name) = remote.name.as_ref().filter(|n| !n.trim().is_empty()) {
        profile.name = name.clone();
    }
    if let Some(total) = remote.total_xp {
        profile.total_xp = total;
        match (remote.level, remote.current_xp, remote.next_level_xp) {
            (Some(level), Some(current), Some(next))
                if level >= 1 && next > 0 && current < next && current <= total =>
            {
                profile.level = level;
                profile.current_xp = current;
                profile.next_level_xp = next;
            }
            _ => {
                let (level, current, next) = profile_levels_for_total(total);
                profile.level = level;
                profile.current_xp = current;
                profile.next_level_xp = next;
            }
        }
    }
    if let Some(streak) = remote.streak_days {
        profile.streak_days = streak;
    }
    if let Some(longest) = remote.longest_streak {
        profile.longest_streak = longest;
    }
    if remote.last_activity_date.is_some() {
        profile.last_activity_date = remote.last_activity_date;
    }
    if let Some(achievements) = &remote.achievements {
        let remote_ids: BTreeSet<String> = achievements.iter().cloned().collect();
        profile.badges_earned.retain(|id| remote_ids.contains(id));
        doc.achievements_earned = remote_ids;
    }
}

/// Repairs a document in place so that it satisfies the data-model invariants.
pub fn normalize(doc: &mut ProgressDocument) {
    // Activities must form a prefix of the fixed order inside each module
    for (module, activities) in doc.per_module_activity_state.iter_mut() {
        let mut gap = false;
        for activity in ActivityType::ALL {
            if let Some(record) = activities.get_mut(&activity) {
                if gap && record.completed {
                    warn!(module_id = %module, %activity, "Dropping out-of-order completion");
                    record.completed = false;
                }
                record.score = record.score.min(100);
            }
            if !activities.get(&activity).is_some_and(|r| r.completed) {
                gap = true;
            }
        }
    }

    // A module counts as completed only with all four activities done
    let with_activities: BTreeSet<ModuleId> = doc
        .completed_module_ids
        .iter()
        .copied()
        .filter(|m| ActivityType::ALL.iter().all(|a| doc.is_activity_completed(*m, *a)))
        .collect();

    let reachable = unlock_prefix(&with_activities);
    let mut completed: BTreeSet<ModuleId> = with_activities
        .intersection(&reachable)
        .copied()
        .collect();

    // A lost completion push leaves the remote behind local activity state;
    // reachable modules with all four activities done count as completed
    loop {
        let promoted: Vec<ModuleId> = unlock_prefix(&completed)
            .into_iter()
            .filter(|m| !completed.contains(m))
            .filter(|m| ActivityType::ALL.iter().all(|a| doc.is_activity_completed(*m, *a)))
            .collect();
        if promoted.is_empty() {
            break;
        }
        for module in promoted {
            warn!(module_id = %module, "Promoting module with all activities completed");
            completed.insert(module);
        }
    }

    if completed.len() != doc.completed_module_ids.len() {
        warn!(
            before = doc.completed_module_ids.len(),
            after = completed.len(),
            "Completed modules reconciled with activity state"
        );
    }
    let unlocked = unlock_prefix(&completed);
    if unlocked != doc.unlocked_module_ids {
        warn!(
            stored = ?doc.unlocked_module_ids,
            derived = ?unlocked,
            "Unlocked modules recomputed from completions"
        );
    }
    doc.per_module_activity_state.retain(|m, _| unlocked.contains(m));
    doc.unlocked_module_ids = unlocked;
    doc.completed_module_ids = completed;

    let profile = &mut doc.user_profile;
    if profile.level == 0 || profile.current_xp > profile.total_xp {
        let (level, current, next) = profile_levels_for_total(profile.total_xp);
        profile.level = level;
        profile.current_xp = current;
        profile.next_level_xp = next;
    }
    rewards::roll_levels(profile);
    profile.longest_streak = profile.longest_streak.max(profile.streak_days);

    // badgesEarned keeps earn order; achievementsEarned is its set view
    let mut seen = BTreeSet::new();
    profile.badges_earned.retain(|id| seen.insert(id.clone()));
    for id in &doc.achievements_earned {
        if !seen.contains(id) {
            profile.badges_earned.push(id.clone());
        }
    }
    doc.achievements_earned = profile.badges_earned.iter().cloned().collect();
}
