//! Remote progress service client.
//!
//! Best effort: every failure surfaces as [`ProgressError::RemoteUnavailable`]
//! and callers decide whether to log it or fall back.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ProgressError, Result};
use crate::model::{ActivityType, ModuleId};

/// Progress as reported by the remote service. Everything beyond the two
/// module lists is optional enrichment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteSnapshot {
    pub unlocked_modules: Vec<String>,
    pub completed_modules: Vec<String>,
    pub name: Option<String>,
    pub level: Option<u32>,
    pub total_xp: Option<u64>,
    pub current_xp: Option<u64>,
    pub next_level_xp: Option<u64>,
    #[serde(alias = "streak")]
    pub streak_days: Option<u32>,
    #[serde(alias = "max_streak")]
    pub longest_streak: Option<u32>,
    pub last_activity_date: Option<NaiveDate>,
    pub achievements: Option<Vec<String>>,
}

/// Body of the activity-completion write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActivityCompletion {
    pub module_id: ModuleId,
    pub activity_type: ActivityType,
    pub score: u8,
    pub time_spent: u64,
}

/// Response to an activity-completion write. The engine has already applied
/// the completion locally; collaborators may use `refresh_needed` to re-fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActivityAck {
    pub success: bool,
    pub module_completed: bool,
    pub refresh_needed: bool,
    pub next_module_unlocked: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct StartModuleRequest {
    module_id: ModuleId,
}

#[async_trait]
pub trait RemoteProgress: Send + Sync {
    async fn fetch_progress(&self) -> Result<RemoteSnapshot>;

    async fn push_activity(&self, completion: &ActivityCompletion) -> Result<ActivityAck>;

    async fn push_unlock(&self, module: ModuleId) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

/// JSON-over-HTTP implementation of [`RemoteProgress`].
pub struct HttpSyncClient {
    config: SyncConfig,
    client: Client,
}

impl HttpSyncClient {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("seclab-progress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProgressError::Custom(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ProgressError::RemoteUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProgressError::RemoteUnavailable(format!("status {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ProgressError::RemoteUnavailable(format!("body read failed: {e}")))
    }
}

/// Parses a progress response body: either `{"success": .., "data": {..}}` or
/// the bare snapshot. Both module lists must be present.
pub fn parse_snapshot(body: &str) -> Result<RemoteSnapshot> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProgressError::RemoteUnavailable(format!("malformed progress body: {e}")))?;
    if value.get("success").and_then(|v| v.as_bool()) == Some(false) {
        return Err(ProgressError::RemoteUnavailable(
            "service reported failure".into(),
        ));
    }

    let data = match value.get("data") {
        Some(data) => data.clone(),
        None => value,
    };
    if data.get("unlocked_modules").is_none() || data.get("completed_modules").is_none() {
        return Err(ProgressError::RemoteUnavailable(
            "progress body is missing module lists".into(),
        ));
    }
    serde_json::from_value(data)
        .map_err(|e| ProgressError::RemoteUnavailable(format!("malformed progress body: {e}")))
}

/// Parses an activity-completion response body.
pub fn parse_ack(body: &str) -> Result<ActivityAck> {
    let ack: ActivityAck = serde_json::from_str(body)
        .map_err(|e| ProgressError::RemoteUnavailable(format!("malformed ack body: {e}")))?;
    if !ack.success {
        let reason = ack.error.clone().unwrap_or_else(|| "rejected".into());
        return Err(ProgressError::RemoteUnavailable(reason));
    }
    Ok(ack)
}

#[async_trait]
impl RemoteProgress for HttpSyncClient {
    async fn fetch_progress(&self) -> Result<RemoteSnapshot> {
        let body = self
            .send(self.client.get(self.url("/api/user-progress")))
            .await?;
        let snapshot = parse_snapshot(&body)?;
        debug!(
            unlocked = snapshot.unlocked_modules.len(),
            completed = snapshot.completed_modules.len(),
            "Fetched remote progress"
        );
        Ok(snapshot)
    }

    async fn push_activity(&self, completion: &ActivityCompletion) -> Result<ActivityAck> {
        let body = self
            .send(self.client.post(self.url("/api/complete-activity")).json(completion))
            .await?;
        let ack = parse_ack(&body)?;
        if ack.refresh_needed {
            debug!(module_id = %completion.module_id, "Remote asked for a refresh");
        }
        Ok(ack)
    }

    async fn push_unlock(&self, module: ModuleId) -> Result<()> {
        let request = StartModuleRequest { module_id: module };
        let body = self
            .send(self.client.post(self.url("/api/start-module")).json(&request))
            .await?;
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            if value["success"].as_bool() == Some(false) {
                warn!(module_id = %module, "Remote refused module start");
                return Err(ProgressError::RemoteUnavailable("module start rejected".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_snapshot() {
        let body = r#"{"success": true, "data": {"completed_modules": ["A01"], "unlocked_modules": ["A01", "A02"], "user_id": 7}}"#;
        let snap = parse_snapshot(body).unwrap();
        assert_eq!(snap.completed_modules, vec!["A01"]);
        assert_eq!(snap.unlocked_modules, vec!["A01", "A02"]);
        assert_eq!(snap.level, None);
    }

    #[test]
    fn test_parse_flat_snapshot_with_profile() {
        let body = r#"{"unlocked_modules": ["A01"], "completed_modules": [], "level": 3, "total_xp": 2400, "streak": 4, "max_streak": 9, "last_activity_date": "2024-05-01"}"#;
        let snap = parse_snapshot(body).unwrap();
        assert_eq!(snap.level, Some(3));
        assert_eq!(snap.total_xp, Some(2400));
        assert_eq!(snap.streak_days, Some(4));
        assert_eq!(snap.longest_streak, Some(9));
        assert_eq!(snap.last_activity_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn test_parse_failure_bodies() {
        assert!(matches!(
            parse_snapshot(r#"{"success": false, "data": {}}"#),
            Err(ProgressError::RemoteUnavailable(_))
        ));
        assert!(matches!(parse_snapshot("<html>"), Err(ProgressError::RemoteUnavailable(_))));
        assert!(matches!(
            parse_snapshot(r#"{"error": "Not authenticated"}"#),
            Err(ProgressError::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn test_parse_ack() {
        let ack = parse_ack(r#"{"success": true, "module_completed": true, "refresh_needed": true, "next_module_unlocked": "A02"}"#).unwrap();
        assert!(ack.module_completed);
        assert!(ack.refresh_needed);
        assert_eq!(ack.next_module_unlocked.as_deref(), Some("A02"));

        let err = parse_ack(r#"{"success": false, "error": "Not logged in"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Remote progress service unavailable: Not logged in");
    }

    #[test]
    fn test_completion_body_shape() {
        let body = serde_json::to_value(ActivityCompletion {
            module_id: ModuleId::A03,
            activity_type: ActivityType::Quiz,
            score: 90,
            time_spent: 45,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"module_id": "A03", "activity_type": "quiz", "score": 90, "time_spent": 45})
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_remote_unavailable() {
        let client = HttpSyncClient::new(SyncConfig {
            base_url: "http://127.0.0.1:1".into(),
            auth_token: Some("token".into()),
            timeout_secs: 2,
        })
        .unwrap();
        let err = client.fetch_progress().await.unwrap_err();
        assert!(matches!(err, ProgressError::RemoteUnavailable(_)));
    }
}
