//! Ordering policy for modules and the activities inside them.
//!
//! Pure queries over a snapshot: nothing here mutates progress.

use crate::model::{ActivityType, ModuleId, ProgressDocument};

/// The activity that must be completed before `activity` can start.
pub fn prerequisite(activity: ActivityType) -> Option<ActivityType> {
    activity.prerequisite()
}

/// Why an activity is currently locked, or `None` if it may be started.
pub fn lock_reason(
    doc: &ProgressDocument,
    module: ModuleId,
    activity: ActivityType,
) -> Option<String> {
    if !doc.is_module_unlocked(module) {
        return Some(match module.previous() {
            Some(prev) => format!("module {module} is locked until {prev} is completed"),
            None => format!("module {module} is locked"),
        });
    }
    match prerequisite(activity) {
        Some(pre) if !doc.is_activity_completed(module, pre) => {
            Some(format!("complete the {pre} of {module} first"))
        }
        _ => None,
    }
}

pub fn is_activity_unlocked(doc: &ProgressDocument, module: ModuleId, activity: ActivityType) -> bool {
    lock_reason(doc, module, activity).is_none()
}

pub fn next_module_in_order(module: ModuleId) -> Option<ModuleId> {
    module.next()
}

pub fn all_activities_complete(module: ModuleId, doc: &ProgressDocument) -> bool {
    ActivityType::ALL
        .iter()
        .all(|a| doc.is_activity_completed(module, *a))
}

/// Whether `module` may be added to the unlocked set right now.
pub fn can_unlock_module(doc: &ProgressDocument, module: ModuleId) -> bool {
    match module.previous() {
        None => true,
        Some(prev) => doc.is_module_completed(prev),
    }
}

/// First activity of the module that is unlocked and not yet completed.
pub fn next_activity(doc: &ProgressDocument, module: ModuleId) -> Option<ActivityType> {
    ActivityType::ALL.iter().copied().find(|a| {
        !doc.is_activity_completed(module, *a) && is_activity_unlocked(doc, module, *a)
    })
}
