//! Command surface for UI collaborators. Ids arrive as strings and are
//! validated here; every command goes through the shared engine handle.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::achievements::{self, Achievement};
use crate::engine::rewards::LevelChange;
use crate::engine::{ActivityOutcome, ActivityResult, ModuleSummary, ProgressEngine};
use crate::error::Result;
use crate::model::{ActivityType, ModuleId, ProgressDocument};

/// Managed state holding the session's engine.
#[derive(Clone)]
pub struct ProgressState {
    pub engine: Arc<Mutex<ProgressEngine>>,
}

impl ProgressState {
    pub fn new(engine: ProgressEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub earned: bool,
}

pub async fn get_progress(state: &ProgressState) -> Result<ProgressDocument> {
    Ok(state.engine.lock().await.snapshot().clone())
}

pub async fn get_module_summary(state: &ProgressState) -> Result<ModuleSummary> {
    Ok(state.engine.lock().await.module_summary())
}

pub async fn is_module_unlocked(module_id: String, state: &ProgressState) -> Result<bool> {
    let module: ModuleId = module_id.parse()?;
    Ok(state.engine.lock().await.is_module_unlocked(module))
}

pub async fn is_activity_unlocked(
    module_id: String,
    activity_type: String,
    state: &ProgressState,
) -> Result<bool> {
    let module: ModuleId = module_id.parse()?;
    let activity: ActivityType = activity_type.parse()?;
    Ok(state.engine.lock().await.is_activity_unlocked(module, activity))
}

/// Records a finished activity. Out-of-order requests come back as a
/// `SequenceViolation` error for the UI to show as "locked".
pub async fn record_activity(
    module_id: String,
    activity_type: String,
    result: ActivityResult,
    state: &ProgressState,
) -> Result<ActivityOutcome> {
    let module: ModuleId = module_id.parse()?;
    let activity: ActivityType = activity_type.parse()?;
    state
        .engine
        .lock()
        .await
        .record_activity(module, activity, result)
}

pub async fn unlock_module(module_id: String, state: &ProgressState) -> Result<bool> {
    let module: ModuleId = module_id.parse()?;
    state.engine.lock().await.unlock_module(module)
}

pub async fn award_xp(amount: u64, reason: String, state: &ProgressState) -> Result<LevelChange> {
    state.engine.lock().await.award_xp(amount, &reason)
}

pub async fn reset_progress(state: &ProgressState) -> Result<ProgressDocument> {
    Ok(state.engine.lock().await.reset().clone())
}

pub async fn list_achievements(state: &ProgressState) -> Result<Vec<AchievementStatus>> {
    let engine = state.engine.lock().await;
    let earned = &engine.snapshot().achievements_earned;
    Ok(achievements::CATALOG
        .iter()
        .map(|a| AchievementStatus {
            achievement: a.clone(),
            earned: earned.contains(a.id),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProgressError;
    use crate::store::{MemoryStore, ProgressStore};

    fn state() -> ProgressState {
        ProgressState::new(ProgressEngine::new(ProgressStore::new(
            MemoryStore::new(),
            "seclab.progress",
        )))
    }

    fn result(score: u8) -> ActivityResult {
        ActivityResult {
            score,
            time_spent_seconds: 120,
        }
    }

    #[tokio::test]
    async fn test_string_ids_are_validated() {
        let state = state();
        assert!(is_module_unlocked("a01".into(), &state).await.unwrap());
        assert!(matches!(
            is_module_unlocked("A11".into(), &state).await,
            Err(ProgressError::UnknownModule(_))
        ));
        assert!(matches!(
            is_activity_unlocked("A01".into(), "video".into(), &state).await,
            Err(ProgressError::UnknownActivity(_))
        ));
    }

    #[tokio::test]
    async fn test_record_through_commands() {
        let state = state();
        for activity in ["documentation", "animation", "lab", "assessment"] {
            record_activity("A01".into(), activity.into(), result(75), &state)
                .await
                .unwrap();
        }

        let summary = get_module_summary(&state).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert!(is_module_unlocked("A02".into(), &state).await.unwrap());
        assert!(is_activity_unlocked("A02".into(), "documentation".into(), &state)
            .await
            .unwrap());

        let list = list_achievements(&state).await.unwrap();
        let earned: Vec<&str> = list
            .iter()
            .filter(|s| s.earned)
            .map(|s| s.achievement.id)
            .collect();
        assert_eq!(earned, vec!["first-steps", "access-control-expert"]);
    }

    #[tokio::test]
    async fn test_locked_activity_error_is_serializable() {
        let state = state();
        let err = record_activity("A01".into(), "quiz".into(), result(100), &state)
            .await
            .unwrap_err();
        assert!(err.is_sequence_violation());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("is locked"));
    }

    #[tokio::test]
    async fn test_award_and_reset() {
        let state = state();
        let change = award_xp(1000, "bonus".into(), &state).await.unwrap();
        assert!(change.leveled_up());
        assert_eq!(get_progress(&state).await.unwrap().user_profile.level, 2);

        let doc = reset_progress(&state).await.unwrap();
        assert_eq!(doc.user_profile.total_xp, 0);
        assert!(!unlock_module("A02".into(), &state).await.unwrap_err().to_string().is_empty());
    }
}
