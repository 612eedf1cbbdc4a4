//! The progress state engine: sole owner and mutator of the progress document.
//!
//! Every command runs as a transaction over a working copy. The copy is
//! validated before it replaces the live document; a command that would break
//! an invariant is refused and the previous state stays in place. Committed
//! commands persist once, mirror to the remote service in the background, and
//! notify subscribers exactly once.

pub mod achievements;
pub mod bus;
pub mod merge;
pub mod rewards;
pub mod sequencer;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ProgressConfig;
use crate::error::{ProgressError, Result};
use crate::model::{ActivityRecord, ActivityType, ModuleId, ProgressDocument, DEFAULT_USER_NAME};
use crate::store::{FileStore, ProgressStore};
use crate::sync::{ActivityCompletion, HttpSyncClient, RemoteProgress, RemoteSnapshot, SyncConfig};

use self::bus::{NotificationBus, Subscription};
use self::rewards::{LevelChange, XpBreakdown};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(3000);

// ── Events & results ────────────────────────────────────────────────────────

/// Something a UI collaborator may want to celebrate, emitted by a command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    XpAwarded { amount: u64, reason: String },
    #[serde(rename_all = "camelCase")]
    LevelUp { level: u32 },
    #[serde(rename_all = "camelCase")]
    StreakUpdated { streak_days: u32, longest_streak: u32 },
    #[serde(rename_all = "camelCase")]
    AchievementUnlocked {
        id: String,
        name: String,
        xp_reward: u64,
    },
    #[serde(rename_all = "camelCase")]
    ModuleCompleted { module_id: ModuleId },
    #[serde(rename_all = "camelCase")]
    ModuleUnlocked { module_id: ModuleId },
}

/// Result reported by the UI when an activity is finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityResult {
    /// 0–100; larger values are clamped.
    pub score: u8,
    pub time_spent_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOutcome {
    pub module_id: ModuleId,
    pub activity: ActivityType,
    /// The activity had been completed before; nothing changed.
    pub already_completed: bool,
    pub xp: Option<XpBreakdown>,
    pub level_change: Option<LevelChange>,
    pub events: Vec<ProgressEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleStatus {
    Locked,
    Unlocked,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub title: &'static str,
    pub status: ModuleStatus,
    pub activities_completed: usize,
    pub next_activity: Option<ActivityType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub modules: Vec<ModuleProgress>,
    pub completed: usize,
    pub unlocked: usize,
    pub total: usize,
}

/// Remote writes queued by a command, sent only once it commits.
#[derive(Debug)]
enum RemoteOp {
    Activity(ActivityCompletion),
    Unlock(ModuleId),
}

// ── Engine ──────────────────────────────────────────────────────────────────

pub struct ProgressEngine {
    doc: ProgressDocument,
    store: ProgressStore,
    remote: Option<Arc<dyn RemoteProgress>>,
    clock: Arc<dyn Clock>,
    bus: NotificationBus,
    user_name: String,
    load_timeout: Duration,
    pending: Vec<RemoteOp>,
    /// Remote pushes still in flight.
    tasks: JoinSet<()>,
}

impl ProgressEngine {
    /// Offline engine over `store`, on the system clock, holding the default
    /// document until [`ProgressEngine::load`] runs.
    pub fn new(store: ProgressStore) -> Self {
        Self {
            doc: ProgressDocument::new_default(DEFAULT_USER_NAME),
            store,
            remote: None,
            clock: Arc::new(SystemClock),
            bus: NotificationBus::new(),
            user_name: DEFAULT_USER_NAME.to_string(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            pending: Vec::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteProgress>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = name.to_string();
        self.doc = ProgressDocument::new_default(name);
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// File-backed engine, with an HTTP remote when a base URL is configured.
    pub fn from_config(config: &ProgressConfig) -> Result<Self> {
        let store = ProgressStore::new(FileStore::new(config.data_dir()), &config.storage_key);
        let mut engine = Self::new(store)
            .with_user_name(&config.user_name)
            .with_load_timeout(Duration::from_millis(config.load_timeout_ms));

        if let Some(base_url) = config.remote_base_url.as_ref().filter(|u| !u.trim().is_empty()) {
            let client = HttpSyncClient::new(SyncConfig {
                base_url: base_url.clone(),
                auth_token: config.auth_token.clone(),
                timeout_secs: config.request_timeout_secs,
            })?;
            engine = engine.with_remote(Arc::new(client));
        }
        Ok(engine)
    }

    // ── Load ────────────────────────────────────────────────────────────────

    /// Builds the session document from remote, then local, then defaults.
    /// Never fails: every source problem is logged and skipped.
    pub async fn load(&mut self) -> ProgressDocument {
        let remote = self.fetch_remote().await;
        let local = self.load_local();
        info!(
            remote = remote.is_some(),
            local = local.is_some(),
            "Loading progress"
        );

        self.doc = merge::merge(remote.as_ref(), local, &self.user_name);
        self.pending.clear();
        self.persist();
        self.bus.notify(&self.doc);
        self.doc.clone()
    }

    async fn fetch_remote(&self) -> Option<RemoteSnapshot> {
        let remote = self.remote.as_ref()?;
        match tokio::time::timeout(self.load_timeout, remote.fetch_progress()).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                warn!(error = %e, "Remote progress unavailable; using local state");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.load_timeout.as_millis() as u64,
                    "Remote progress timed out; using local state"
                );
                None
            }
        }
    }

    fn load_local(&self) -> Option<ProgressDocument> {
        match self.store.load() {
            Ok(doc) => doc,
            Err(ProgressError::StorageCorruption(reason)) => {
                warn!(%reason, key = %self.store.key(), "Discarding corrupted progress");
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to remove corrupted progress");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored progress");
                None
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Read-only view of the live document.
    pub fn snapshot(&self) -> &ProgressDocument {
        &self.doc
    }

    pub fn is_module_unlocked(&self, module: ModuleId) -> bool {
        self.doc.is_module_unlocked(module)
    }

    pub fn is_module_completed(&self, module: ModuleId) -> bool {
        self.doc.is_module_completed(module)
    }

    pub fn is_activity_unlocked(&self, module: ModuleId, activity: ActivityType) -> bool {
        sequencer::is_activity_unlocked(&self.doc, module, activity)
    }

    pub fn next_activity(&self, module: ModuleId) -> Option<ActivityType> {
        sequencer::next_activity(&self.doc, module)
    }

    pub fn module_summary(&self) -> ModuleSummary {
        let modules: Vec<ModuleProgress> = ModuleId::ALL
            .into_iter()
            .map(|module| {
                let status = if self.doc.is_module_completed(module) {
                    ModuleStatus::Completed
                } else if self.doc.is_module_unlocked(module) {
                    ModuleStatus::Unlocked
                } else {
                    ModuleStatus::Locked
                };
                ModuleProgress {
                    module_id: module,
                    title: module.title(),
                    status,
                    activities_completed: ActivityType::ALL
                        .iter()
                        .filter(|a| self.doc.is_activity_completed(module, **a))
                        .count(),
                    next_activity: self.next_activity(module),
                }
            })
            .collect();

        ModuleSummary {
            completed: self.doc.completed_module_ids.len(),
            unlocked: self.doc.unlocked_module_ids.len(),
            total: modules.len(),
            modules,
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ProgressDocument) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Returns `false` when the module was already unlocked.
    pub fn unlock_module(&mut self, module: ModuleId) -> Result<bool> {
        if self.doc.is_module_unlocked(module) {
            return Ok(false);
        }
        self.transact("unlock_module", |engine| {
            let mut events = Vec::new();
            engine.apply_unlock(module, &mut events)
        })
    }

    /// Marks a module whose four activities are complete as completed, awards
    /// the completion bonus and unlocks the next module. No-op if already done.
    pub fn complete_module(&mut self, module: ModuleId) -> Result<Vec<ProgressEvent>> {
        if self.doc.is_module_completed(module) {
            return Ok(Vec::new());
        }
        self.transact("complete_module", |engine| {
            let mut events = Vec::new();
            engine.apply_complete_module(module, &mut events)?;
            engine.apply_achievements(&mut events);
            Ok(events)
        })
    }

    pub fn record_activity(
        &mut self,
        module: ModuleId,
        activity: ActivityType,
        result: ActivityResult,
    ) -> Result<ActivityOutcome> {
        if let Some(reason) = sequencer::lock_reason(&self.doc, module, activity) {
            debug!(module_id = %module, %activity, %reason, "Activity rejected");
            return Err(ProgressError::SequenceViolation {
                module,
                activity: Some(activity),
                reason,
            });
        }
        if self.doc.is_activity_completed(module, activity) {
            debug!(module_id = %module, %activity, "Activity already completed");
            return Ok(ActivityOutcome {
                module_id: module,
                activity,
                already_completed: true,
                xp: None,
                level_change: None,
                events: Vec::new(),
            });
        }

        let score = result.score.min(100);
        let time_spent = result.time_spent_seconds;

        self.transact("record_activity", |engine| {
            let mut events = Vec::new();
            let previous_level = engine.doc.user_profile.level;
            let today = engine.clock.today();
            let profile = &engine.doc.user_profile;
            let xp = rewards::activity_xp(
                activity,
                score,
                time_spent,
                profile.stats.count(activity) == 0,
                current_streak(profile.streak_days, profile.last_activity_date, today),
            );

            engine
                .doc
                .per_module_activity_state
                .entry(module)
                .or_default()
                .insert(
                    activity,
                    ActivityRecord {
                        completed: true,
                        completed_at: Some(engine.clock.now()),
                        score,
                        time_spent_seconds: time_spent,
                    },
                );

            let stats = &mut engine.doc.user_profile.stats;
            let count = stats.count_mut(activity);
            *count = count.saturating_add(1);
            stats.total_time_spent_seconds =
                stats.total_time_spent_seconds.saturating_add(time_spent);
            if rewards::is_perfect(score) {
                stats.perfect_scores = stats.perfect_scores.saturating_add(1);
            }
            if rewards::is_speed_completion(activity, time_spent) {
                stats.speed_completions = stats.speed_completions.saturating_add(1);
            }

            engine.apply_xp(xp.total, format!("{activity} in {module}"), &mut events);
            engine.apply_streak(&mut events);
            engine.pending.push(RemoteOp::Activity(ActivityCompletion {
                module_id: module,
                activity_type: activity,
                score,
                time_spent,
            }));

            if sequencer::all_activities_complete(module, &engine.doc) {
                engine.apply_complete_module(module, &mut events)?;
            }
            engine.apply_achievements(&mut events);

            info!(
                module_id = %module,
                %activity,
                score,
                xp = xp.total,
                level = engine.doc.user_profile.level,
                "Activity recorded"
            );
            Ok(ActivityOutcome {
                module_id: module,
                activity,
                already_completed: false,
                xp: Some(xp),
                level_change: Some(LevelChange {
                    previous_level,
                    new_level: engine.doc.user_profile.level,
                }),
                events,
            })
        })
    }

    /// Adds XP and rolls over as many levels as it crosses.
    pub fn award_xp(&mut self, amount: u64, reason: &str) -> Result<LevelChange> {
        self.transact("award_xp", |engine| {
            let mut events = Vec::new();
            Ok(engine.apply_xp(amount, reason.to_string(), &mut events))
        })
    }

    /// Counts today toward the streak. Returns the resulting streak length.
    pub fn update_streak(&mut self) -> Result<u32> {
        self.transact("update_streak", |engine| {
            let mut events = Vec::new();
            engine.apply_streak(&mut events);
            engine.apply_achievements(&mut events);
            Ok(engine.doc.user_profile.streak_days)
        })
    }

    /// Clears persisted progress and starts over from the default document.
    pub fn reset(&mut self) -> &ProgressDocument {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored progress");
        }
        self.doc = ProgressDocument::new_default(&self.user_name);
        self.pending.clear();
        info!("Progress reset");
        self.bus.notify(&self.doc);
        &self.doc
    }

    // ── Transaction plumbing ────────────────────────────────────────────────

    fn transact<T>(
        &mut self,
        command: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let before = self.doc.clone();
        let value = match op(self) {
            Ok(value) => value,
            Err(e) => {
                self.doc = before;
                self.pending.clear();
                return Err(e);
            }
        };

        if let Err(reason) = self.doc.check_invariants() {
            error!(command, %reason, "Refusing mutation that breaks an invariant");
            self.doc = before;
            self.pending.clear();
            return Err(ProgressError::InvariantViolation(reason));
        }

        self.persist();
        self.dispatch_remote();
        self.bus.notify(&self.doc);
        Ok(value)
    }

    /// Waits for every remote push spawned so far. Call before the runtime
    /// shuts down so queued writes are not dropped.
    pub async fn flush(&mut self) {
        let in_flight = self.tasks.len();
        if in_flight > 0 {
            debug!(in_flight, "Waiting for remote sync");
        }
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Remote sync task failed");
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.doc) {
            warn!(error = %e, "Failed to persist progress; keeping in-memory state");
        }
    }

    fn dispatch_remote(&mut self) {
        let ops = std::mem::take(&mut self.pending);
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if ops.is_empty() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!(ops = ops.len(), "No async runtime; skipping remote sync");
                return;
            }
        };

        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "Remote sync task failed");
            }
        }

        let push = async move {
            for op in ops {
                match op {
                    RemoteOp::Activity(completion) => {
                        if let Err(e) = remote.push_activity(&completion).await {
                            warn!(
                                module_id = %completion.module_id,
                                activity = %completion.activity_type,
                                error = %e,
                                "Remote activity sync failed"
                            );
                        }
                    }
                    RemoteOp::Unlock(module) => {
                        if let Err(e) = remote.push_unlock(module).await {
                            warn!(module_id = %module, error = %e, "Remote unlock sync failed");
                        }
                    }
                }
            }
        };
        self.tasks.spawn_on(push, &handle);
    }

    // ── Mutation steps (run inside a transaction) ───────────────────────────

    fn apply_xp(&mut self, amount: u64, reason: String, events: &mut Vec<ProgressEvent>) -> LevelChange {
        let change = rewards::apply_xp(&mut self.doc.user_profile, amount);
        debug!(xp = amount, %reason, total = self.doc.user_profile.total_xp, "XP awarded");
        events.push(ProgressEvent::XpAwarded { amount, reason });
        if change.leveled_up() {
            info!(
                from = change.previous_level,
                to = change.new_level,
                "Level up"
            );
            events.push(ProgressEvent::LevelUp {
                level: change.new_level,
            });
        }
        change
    }

    fn apply_streak(&mut self, events: &mut Vec<ProgressEvent>) {
        let today = self.clock.today();
        let profile = &mut self.doc.user_profile;
        let before = profile.streak_days;

        match profile.last_activity_date {
            Some(last) if last == today => {}
            Some(last) if last.succ_opt() == Some(today) => {
                profile.streak_days = profile.streak_days.saturating_add(1)
            }
            _ => profile.streak_days = 1,
        }
        profile.longest_streak = profile.longest_streak.max(profile.streak_days);
        profile.last_activity_date = Some(today);

        if profile.streak_days != before {
            events.push(ProgressEvent::StreakUpdated {
                streak_days: profile.streak_days,
                longest_streak: profile.longest_streak,
            });
        }
    }

    /// Grants every achievement that now holds. Bonus XP can satisfy further
    /// conditions, so evaluation repeats until nothing new is earned.
    fn apply_achievements(&mut self, events: &mut Vec<ProgressEvent>) {
        loop {
            let earned = achievements::evaluate(&self.doc);
            if earned.is_empty() {
                break;
            }
            for achievement in earned {
                self.doc.achievements_earned.insert(achievement.id.to_string());
                self.doc
                    .user_profile
                    .badges_earned
                    .push(achievement.id.to_string());
                info!(achievement = achievement.id, xp = achievement.xp_reward, "Achievement unlocked");
                events.push(ProgressEvent::AchievementUnlocked {
                    id: achievement.id.to_string(),
                    name: achievement.name.to_string(),
                    xp_reward: achievement.xp_reward,
                });
                self.apply_xp(
                    achievement.xp_reward,
                    format!("achievement {}", achievement.id),
                    events,
                );
            }
        }
    }

    fn apply_unlock(&mut self, module: ModuleId, events: &mut Vec<ProgressEvent>) -> Result<bool> {
        if self.doc.is_module_unlocked(module) {
            return Ok(false);
        }
        if !sequencer::can_unlock_module(&self.doc, module) {
            let reason = match module.previous() {
                Some(prev) => format!("{prev} is not completed"),
                None => "no predecessor".to_string(),
            };
            return Err(ProgressError::SequenceViolation {
                module,
                activity: None,
                reason,
            });
        }

        self.doc.unlocked_module_ids.insert(module);
        self.pending.push(RemoteOp::Unlock(module));
        events.push(ProgressEvent::ModuleUnlocked { module_id: module });
        info!(module_id = %module, "Module unlocked");
        Ok(true)
    }

    fn apply_complete_module(
        &mut self,
        module: ModuleId,
        events: &mut Vec<ProgressEvent>,
    ) -> Result<bool> {
        if self.doc.is_module_completed(module) {
            return Ok(false);
        }
        if !sequencer::all_activities_complete(module, &self.doc) {
            let missing: Vec<&str> = ActivityType::ALL
                .iter()
                .filter(|a| !self.doc.is_activity_completed(module, **a))
                .map(|a| a.as_str())
                .collect();
            return Err(ProgressError::InvariantViolation(format!(
                "cannot complete {module}: {} not completed",
                missing.join(", ")
            )));
        }
        if !self.doc.is_module_unlocked(module) {
            warn!(module_id = %module, "Completing a module that was never unlocked");
            self.apply_unlock(module, events)?;
        }

        self.doc.completed_module_ids.insert(module);
        events.push(ProgressEvent::ModuleCompleted { module_id: module });
        info!(module_id = %module, "Module completed");
        self.apply_xp(
            rewards::MODULE_COMPLETION_XP,
            format!("completed {module}"),
            events,
        );

        if let Some(next) = sequencer::next_module_in_order(module) {
            self.apply_unlock(next, events)?;
        }
        Ok(true)
    }
}

/// The streak that still counts today: a streak whose last day is neither
/// today nor yesterday has already lapsed.
fn current_streak(
    streak_days: u32,
    last_activity: Option<chrono::NaiveDate>,
    today: chrono::NaiveDate,
) -> u32 {
    match last_activity {
        Some(last) if last == today || last.succ_opt() == Some(today) => streak_days,
        _ => 0,
    }
}
