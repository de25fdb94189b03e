//! Routes inbound updates through the state machine.

use super::command::Input;
use super::states::default_states;
use super::traits::{DialogueError, DialogueResult, Outcome, Services, State, StateId, Turn};
use crate::sessions::TransportHandle;
use crate::transport::{AnswerOptions, InboundUpdate, SendOptions, UpdateKind};
use std::collections::HashMap;
use std::sync::Arc;

const STALE_BUTTON: &str = "This button is no longer active.";

/// Finite-state dialogue over [`State`] handlers.
///
/// Each update runs under the sender's lock and the dispatch timeout. Handler
/// failures never escape: the user gets a notice and the session keeps its
/// last saved form.
pub struct DialogueEngine {
    states: HashMap<StateId, Arc<dyn State>>,
    order: Vec<StateId>,
    services: Services,
}

impl DialogueEngine {
    pub fn new(services: Services) -> Self {
        Self::with_states(services, default_states())
    }

    /// Register `states` in command lookup order. Any state left out falls
    /// back to its default handler.
    pub fn with_states(services: Services, states: Vec<Arc<dyn State>>) -> Self {
        let mut registry: HashMap<StateId, Arc<dyn State>> = HashMap::new();
        let mut order = Vec::new();
        for state in states.into_iter().chain(default_states()) {
            let id = state.id();
            if !registry.contains_key(&id) {
                order.push(id);
                registry.insert(id, state);
            }
        }
        Self {
            states: registry,
            order,
            services,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    fn state(&self, id: StateId) -> DialogueResult<&Arc<dyn State>> {
        self.states
            .get(&id)
            .ok_or_else(|| DialogueError::Other(anyhow::anyhow!("no handler registered for {id}")))
    }

    /// First state other than `current` that owns `command`.
    fn command_owner(&self, current: StateId, command: &str) -> Option<StateId> {
        self.order
            .iter()
            .copied()
            .filter(|id| *id != current)
            .find(|id| {
                self.states
                    .get(id)
                    .is_some_and(|state| state.can_handle_command(command))
            })
    }

    /// Handle one update end to end. Never fails; problems become user notices.
    pub async fn handle_update(&self, update: InboundUpdate) {
        let user_id = update.sender.user_id.clone();
        let _guard = self.services.sessions.lock_user(&user_id).await;

        let limit = self.services.limits.dispatch_timeout();
        let answer = match tokio::time::timeout(limit, self.process(&update)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(error)) => {
                self.contain(&update, error).await;
                AnswerOptions::default()
            }
            Err(_) => {
                self.contain(&update, DialogueError::Timeout(limit)).await;
                AnswerOptions::default()
            }
        };

        if let UpdateKind::Callback { callback_id, .. } = &update.kind {
            if let Err(error) = self
                .services
                .transport
                .answer_callback(callback_id, &answer)
                .await
            {
                tracing::warn!(user_id = %user_id, %error, "failed to answer callback");
            }
        }
    }

    async fn process(&self, update: &InboundUpdate) -> DialogueResult<AnswerOptions> {
        let mut context = self
            .services
            .sessions
            .get_context(&update.sender.user_id)
            .await;
        if update.sender.username.is_some() {
            context.username.clone_from(&update.sender.username);
        }
        context.transport = Some(TransportHandle {
            chat_id: update.chat_id.clone(),
        });

        let mut turn = Turn::new(&self.services, &mut context, &update.chat_id);
        if turn.state().needs_draft() && !turn.has_draft() {
            return Err(DialogueError::MissingDraft {
                state: turn.state(),
            });
        }

        match &update.kind {
            UpdateKind::Message { text } => {
                let input = Input::parse(text);
                tracing::debug!(
                    user_id = %update.sender.user_id,
                    state = %turn.state(),
                    command = input.command_name().unwrap_or("-"),
                    "message received"
                );
                self.dispatch_message(&mut turn, &input).await?;
                Ok(AnswerOptions::default())
            }
            UpdateKind::Callback { payload, .. } => {
                tracing::debug!(
                    user_id = %update.sender.user_id,
                    state = %turn.state(),
                    payload = %payload,
                    "callback received"
                );
                self.dispatch_callback(&mut turn, payload).await
            }
        }
    }

    async fn dispatch_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<()> {
        let current = turn.state();
        let outcome = self.state(current)?.handle_message(turn, input).await?;
        if outcome != Outcome::NotHandled {
            return self.apply(turn, outcome).await;
        }

        let Some(name) = input.command_name() else {
            turn.reply("Sorry, I didn't get that. Send /help to see what I can do.")
                .await?;
            return Ok(());
        };

        let fallback = match self.command_owner(current, name) {
            Some(owner) if owner.needs_draft() && !turn.has_draft() => {
                turn.reply("There is no report in progress. Send \"start report\" first.")
                    .await?;
                return Ok(());
            }
            Some(owner) => Some(owner),
            None if current != StateId::Idle => Some(StateId::Idle),
            None => None,
        };

        if let Some(target) = fallback {
            tracing::debug!(
                user_id = %turn.user_id(),
                command = name,
                from = %current,
                to = %target,
                "rerouting command"
            );
            turn.set_rerouted_command(name);
            self.transition(turn, target).await?;
            let outcome = self.state(target)?.handle_message(turn, input).await?;
            if outcome != Outcome::NotHandled {
                return self.apply(turn, outcome).await;
            }
        }

        turn.reply(&format!("Unknown command /{name}. Send /help for the list."))
            .await?;
        Ok(())
    }

    async fn dispatch_callback(
        &self,
        turn: &mut Turn<'_>,
        payload: &str,
    ) -> DialogueResult<AnswerOptions> {
        let outcome = self
            .state(turn.state())?
            .handle_callback_query(turn, payload)
            .await?;
        if outcome == Outcome::NotHandled {
            return Ok(AnswerOptions {
                text: Some(STALE_BUTTON.to_string()),
                show_alert: false,
            });
        }
        self.apply(turn, outcome).await?;
        Ok(AnswerOptions::default())
    }

    async fn apply(&self, turn: &mut Turn<'_>, outcome: Outcome) -> DialogueResult<()> {
        if let Outcome::Transition(next) = outcome {
            self.transition(turn, next).await?;
        }
        Ok(())
    }

    /// exit → set → persist → enter. No-op when already in `next`.
    async fn transition(&self, turn: &mut Turn<'_>, next: StateId) -> DialogueResult<()> {
        let current = turn.state();
        if next == current {
            return Ok(());
        }

        self.state(current)?.exit(turn).await?;
        turn.set_state(next);
        turn.save().await;
        tracing::debug!(user_id = %turn.user_id(), from = %current, to = %next, "state transition");

        turn.mark_entered(next);
        self.state(next)?.enter(turn).await
    }

    async fn contain(&self, update: &InboundUpdate, error: DialogueError) {
        let user_id = update.sender.user_id.as_str();
        let notice = match &error {
            DialogueError::MissingDraft { state } => {
                tracing::warn!(user_id, state = %state, "session has no draft, resetting to idle");
                self.services.sessions.clear_context(user_id).await;
                "Your unfinished report was lost, so I started over. Send \"start report\" to begin again."
            }
            DialogueError::Store(store_error) => {
                tracing::error!(
                    user_id,
                    operation = %store_error.operation,
                    code = %store_error.code,
                    attempts = store_error.attempts,
                    error = %store_error.message,
                    "store operation failed"
                );
                "I couldn't reach the report spreadsheet. Please try again later."
            }
            DialogueError::Timeout(limit) => {
                tracing::error!(user_id, timeout = ?limit, "update handling timed out");
                "That took too long. Please try again later."
            }
            DialogueError::Other(other) => {
                tracing::error!(user_id, error = %other, "update handling failed");
                "Something went wrong. Please try again later."
            }
        };

        if let Err(send_error) = self
            .services
            .transport
            .send_message(&update.chat_id, notice, &SendOptions::default())
            .await
        {
            tracing::warn!(user_id, error = %send_error, "failed to deliver error notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::config::DialogueConfig;
    use crate::reports::SheetsReportStore;
    use crate::retry::RetryPolicy;
    use crate::sessions::{NoopPersistence, SessionManager};
    use crate::sheets::{InMemorySheets, SheetsBackend};
    use crate::transport::{RecordingTransport, Transport};
    use async_trait::async_trait;
    use std::time::Duration;

    fn engine_with(states: Vec<Arc<dyn State>>) -> (DialogueEngine, Arc<RecordingTransport>) {
        let sheets: Arc<dyn SheetsBackend> = Arc::new(InMemorySheets::new());
        let store = SheetsReportStore::new(
            sheets,
            Arc::new(TtlCache::new()),
            RetryPolicy::none(),
            Duration::from_secs(60),
            "Reports",
            None,
        );
        let transport = Arc::new(RecordingTransport::new());
        let services = Services {
            store: Arc::new(store),
            transport: Arc::clone(&transport) as Arc<dyn Transport>,
            sessions: Arc::new(SessionManager::new(Arc::new(NoopPersistence))),
            limits: DialogueConfig {
                dispatch_timeout_secs: 1,
                ..DialogueConfig::default()
            },
        };
        (DialogueEngine::with_states(services, states), transport)
    }

    fn message(text: &str) -> InboundUpdate {
        InboundUpdate::message("7", "chat-7", text)
    }

    /// Idle replacement that never finishes.
    struct StuckIdle;

    #[async_trait]
    impl State for StuckIdle {
        fn id(&self) -> StateId {
            StateId::Idle
        }

        async fn enter(&self, _turn: &mut Turn<'_>) -> DialogueResult<()> {
            Ok(())
        }

        async fn handle_message(&self, _turn: &mut Turn<'_>, _input: &Input) -> DialogueResult<Outcome> {
            std::future::pending::<()>().await;
            Ok(Outcome::Stay)
        }

        fn can_handle_command(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn custom_states_take_precedence_over_defaults() {
        let (engine, _) = engine_with(vec![Arc::new(StuckIdle)]);
        assert_eq!(engine.order.len(), StateId::ALL.len());
        assert_eq!(engine.order[0], StateId::Idle);
        assert!(!engine.states[&StateId::Idle].can_handle_command("help"));
        assert_eq!(engine.command_owner(StateId::Idle, "score"), Some(StateId::EnteringScore));
        assert_eq!(engine.command_owner(StateId::Idle, "help"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_is_cut_off_with_a_notice() {
        let (engine, transport) = engine_with(vec![Arc::new(StuckIdle)]);
        engine.handle_update(message("hello")).await;
        assert_eq!(
            transport.last_text().as_deref(),
            Some("That took too long. Please try again later.")
        );
    }

    #[tokio::test]
    async fn unknown_command_while_idle_is_reported() {
        let (engine, transport) = engine_with(Vec::new());
        engine.handle_update(message("/frobnicate")).await;
        assert_eq!(
            transport.last_text().as_deref(),
            Some("Unknown command /frobnicate. Send /help for the list.")
        );
    }

    #[tokio::test]
    async fn step_command_without_draft_is_refused() {
        let (engine, transport) = engine_with(Vec::new());
        engine.handle_update(message("/plans")).await;
        assert!(transport.last_text().unwrap().contains("no report in progress"));
        let context = engine.services().sessions.get_context("7").await;
        assert_eq!(context.state, StateId::Idle);
    }

    #[tokio::test]
    async fn stale_button_gets_an_answer() {
        let (engine, transport) = engine_with(Vec::new());
        engine
            .handle_update(InboundUpdate::callback("7", "chat-7", "cb-1", "mark:0"))
            .await;
        let answered = transport.answered();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].callback_id, "cb-1");
        assert_eq!(answered[0].options.text.as_deref(), Some(STALE_BUTTON));
    }

    #[tokio::test]
    async fn state_without_draft_resets_to_idle() {
        let (engine, transport) = engine_with(Vec::new());
        let sessions = &engine.services().sessions;
        let mut broken = sessions.get_context("7").await;
        broken.state = StateId::MarkingTasks;
        sessions.save_context(&broken).await;

        engine.handle_update(message("fixed the build")).await;

        assert!(transport.last_text().unwrap().contains("started over"));
        assert_eq!(sessions.get_context("7").await.state, StateId::Idle);
    }

    #[tokio::test]
    async fn failed_notice_delivery_does_not_panic() {
        let (engine, transport) = engine_with(Vec::new());
        transport.fail_sends(true);
        engine.handle_update(message("/help")).await;
        assert!(transport.sent().is_empty());
    }
}
