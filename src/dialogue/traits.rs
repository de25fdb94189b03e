//! Dialogue state machine contracts.

use super::command::Input;
use crate::config::DialogueConfig;
use crate::reports::{DraftReport, ReportStore};
use crate::retry::StoreError;
use crate::sessions::{SessionContext, SessionData, SessionManager};
use crate::transport::{SendOptions, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Every state a conversation can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateId {
    #[default]
    Idle,
    EnteringScore,
    MarkingTasks,
    AddingTasks,
    EnteringComment,
}

impl StateId {
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::EnteringScore,
        Self::MarkingTasks,
        Self::AddingTasks,
        Self::EnteringComment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::EnteringScore => "entering_score",
            Self::MarkingTasks => "marking_tasks",
            Self::AddingTasks => "adding_tasks",
            Self::EnteringComment => "entering_comment",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    /// States that only make sense with a draft present.
    pub fn needs_draft(self) -> bool {
        self != Self::Idle
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not for this state; the engine may route it elsewhere.
    NotHandled,
    Stay,
    Transition(StateId),
}

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("state {state} has no draft to work on")]
    MissingDraft { state: StateId },
    #[error("handling the update took longer than {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DialogueResult<T> = Result<T, DialogueError>;

/// Shared services every handler can reach. Built once at startup.
pub struct Services {
    pub store: Arc<dyn ReportStore>,
    pub transport: Arc<dyn Transport>,
    pub sessions: Arc<SessionManager>,
    pub limits: DialogueConfig,
}

/// Everything a handler sees while processing one update.
pub struct Turn<'a> {
    services: &'a Services,
    context: &'a mut SessionContext,
    chat_id: &'a str,
    entered: Option<StateId>,
    rerouted: Option<String>,
}

impl<'a> Turn<'a> {
    pub fn new(services: &'a Services, context: &'a mut SessionContext, chat_id: &'a str) -> Self {
        Self {
            services,
            context,
            chat_id,
            entered: None,
            rerouted: None,
        }
    }

    pub fn store(&self) -> &dyn ReportStore {
        self.services.store.as_ref()
    }

    pub fn limits(&self) -> &DialogueConfig {
        &self.services.limits
    }

    pub fn context(&self) -> &SessionContext {
        &*self.context
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }

    pub fn state(&self) -> StateId {
        self.context.state
    }

    pub(crate) fn set_state(&mut self, state: StateId) {
        self.context.state = state;
    }

    pub(crate) fn mark_entered(&mut self, state: StateId) {
        self.entered = Some(state);
    }

    pub(crate) fn set_rerouted_command(&mut self, name: &str) {
        self.rerouted = Some(name.to_string());
    }

    /// The slash command the engine is carrying into a new state, if the
    /// current transition happened because of one.
    pub fn rerouted_command(&self) -> Option<&str> {
        self.rerouted.as_deref()
    }

    /// True when the current state's `enter` already ran during this update.
    pub fn just_entered(&self) -> bool {
        self.entered == Some(self.context.state)
    }

    pub async fn reply(&self, text: &str) -> DialogueResult<()> {
        self.reply_with(text, SendOptions::default()).await
    }

    pub async fn reply_with(&self, text: &str, options: SendOptions) -> DialogueResult<()> {
        self.services
            .transport
            .send_message(self.chat_id, text, &options)
            .await?;
        Ok(())
    }

    pub fn draft(&self) -> DialogueResult<&DraftReport> {
        self.context.data.draft().ok_or(DialogueError::MissingDraft {
            state: self.context.state,
        })
    }

    pub fn draft_mut(&mut self) -> DialogueResult<&mut DraftReport> {
        let state = self.context.state;
        self.context
            .data
            .draft_mut()
            .ok_or(DialogueError::MissingDraft { state })
    }

    pub fn has_draft(&self) -> bool {
        self.context.data.draft().is_some()
    }

    pub fn start_draft(&mut self, draft: DraftReport) {
        self.context.data = SessionData::Drafting(draft);
    }

    /// Drop the draft. The caller still decides where to go next.
    pub fn discard_draft(&mut self) -> Option<DraftReport> {
        match std::mem::take(&mut self.context.data) {
            SessionData::Drafting(draft) => Some(draft),
            SessionData::Idle => None,
        }
    }

    /// Persist the context as it is now.
    pub async fn save(&self) {
        self.services.sessions.save_context(&*self.context).await;
    }
}

/// One node of the conversation graph.
#[async_trait]
pub trait State: Send + Sync {
    fn id(&self) -> StateId;

    /// Runs after the engine switched into this state and saved the session.
    async fn enter(&self, turn: &mut Turn<'_>) -> DialogueResult<()>;

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome>;

    async fn handle_callback_query(
        &self,
        _turn: &mut Turn<'_>,
        _payload: &str,
    ) -> DialogueResult<Outcome> {
        Ok(Outcome::Stay)
    }

    async fn exit(&self, _turn: &mut Turn<'_>) -> DialogueResult<()> {
        Ok(())
    }

    /// Whether this state owns the slash command `name` (without the slash).
    fn can_handle_command(&self, name: &str) -> bool;
}
