//! Per-user conversation context and its persistence hook.

use crate::dialogue::StateId;
use crate::reports::DraftReport;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where replies for this user go. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub chat_id: String,
}

/// What the user is working on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "draft", rename_all = "snake_case")]
pub enum SessionData {
    #[default]
    Idle,
    Drafting(DraftReport),
}

impl SessionData {
    pub fn draft(&self) -> Option<&DraftReport> {
        match self {
            Self::Idle => None,
            Self::Drafting(draft) => Some(draft),
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut DraftReport> {
        match self {
            Self::Idle => None,
            Self::Drafting(draft) => Some(draft),
        }
    }
}

/// Live session for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub user_id: String,
    pub username: Option<String>,
    pub state: StateId,
    pub data: SessionData,
    pub last_activity: DateTime<Utc>,
    pub transport: Option<TransportHandle>,
}

impl SessionContext {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: None,
            state: StateId::Idle,
            data: SessionData::Idle,
            last_activity: Utc::now(),
            transport: None,
        }
    }

    /// Drop any draft and go back to `Idle`, keeping identity and transport.
    pub fn reset(&mut self) {
        self.state = StateId::Idle;
        self.data = SessionData::Idle;
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Persisted form of a [`SessionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub state: String,
    #[serde(default)]
    pub data: SessionData,
    pub last_activity: DateTime<Utc>,
}

impl From<&SessionContext> for SessionSnapshot {
    fn from(context: &SessionContext) -> Self {
        Self {
            user_id: context.user_id.clone(),
            username: context.username.clone(),
            state: context.state.as_str().to_string(),
            data: context.data.clone(),
            last_activity: context.last_activity,
        }
    }
}

impl SessionSnapshot {
    /// Rebuild a live context. Unknown state names fall back to `Idle`.
    pub fn into_context(self) -> SessionContext {
        let state = StateId::parse(&self.state).unwrap_or_else(|| {
            tracing::warn!(
                user_id = %self.user_id,
                state = %self.state,
                "unknown state in stored session, resetting to idle"
            );
            StateId::Idle
        });
        SessionContext {
            user_id: self.user_id,
            username: self.username,
            state,
            data: self.data,
            last_activity: self.last_activity,
            transport: None,
        }
    }
}

/// Backing storage for session snapshots.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<SessionSnapshot>>;

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    async fn delete(&self, user_id: &str) -> Result<()>;

    /// The name of this persistence implementation.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn snapshot_omits_transport_handle() {
        let mut context = SessionContext::new("42");
        context.transport = Some(TransportHandle {
            chat_id: "chat-1".into(),
        });
        context.state = StateId::MarkingTasks;

        let snapshot = SessionSnapshot::from(&context);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("chat-1"));
        assert!(json.contains("\"marking_tasks\""));

        let restored = serde_json::from_str::<SessionSnapshot>(&json)
            .unwrap()
            .into_context();
        assert_eq!(restored.state, StateId::MarkingTasks);
        assert!(restored.transport.is_none());
    }

    #[test]
    fn unknown_state_loads_as_idle() {
        let snapshot = SessionSnapshot {
            user_id: "42".into(),
            username: None,
            state: "waiting_for_week_number".into(),
            data: SessionData::Idle,
            last_activity: Utc::now(),
        };
        assert_eq!(snapshot.into_context().state, StateId::Idle);
    }

    #[test]
    fn drafting_data_round_trips() {
        let draft = DraftReport::new(
            "42",
            Some("alice"),
            3,
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            vec!["plan".into()],
        );
        let data = SessionData::Drafting(draft.clone());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "drafting");
        let back: SessionData = serde_json::from_value(json).unwrap();
        assert_eq!(back.draft(), Some(&draft));
    }

    #[test]
    fn reset_keeps_identity() {
        let mut context = SessionContext::new("42");
        context.username = Some("alice".into());
        context.state = StateId::AddingTasks;
        context.reset();
        assert_eq!(context.state, StateId::Idle);
        assert_eq!(context.data, SessionData::Idle);
        assert_eq!(context.username.as_deref(), Some("alice"));
    }
}
