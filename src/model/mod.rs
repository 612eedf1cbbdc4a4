//! Progress data model: module/activity identifiers and the progress document.

mod document;
mod ids;

pub use document::{
    unlock_prefix, ActivityRecord, ActivityStats, ModuleActivities, ProgressDocument,
    UserProfile, DEFAULT_USER_NAME, FIRST_LEVEL_XP,
};
pub use ids::{ActivityType, Difficulty, ModuleId, ModuleInfo, MODULE_CATALOG};
