//! No report in progress: menu, help, stats, history and starting a report.

use super::{menu_keyboard, next_state};
use crate::dialogue::command::{Input, Keyword};
use crate::dialogue::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::reports::format::{render_history, render_stats};
use crate::reports::DraftReport;
use async_trait::async_trait;
use chrono::Utc;

const COMMANDS: &[&str] = &["start", "menu", "help", "stats", "history", "cancel", "report"];

const HELP: &str = "I help you put together a weekly status report.\n\n\
    /report or \"start report\" - start or resume this week's report\n\
    /stats - your statistics\n\
    /history - your recent reports\n\
    /cancel - discard an unfinished report\n\n\
    While writing a report send one task per message, \"done\" to move on, \
    \"skip\" to leave a section empty and \"cancel\" to stop. \
    /remove N and /rename N text fix a task you already sent.";

pub struct IdleState;

impl IdleState {
    async fn welcome(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let mut text = String::from("Hi! I'll help you write your weekly report.");
        if let Ok(draft) = turn.draft() {
            text.push_str(&format!(
                "\n\nYou have an unfinished report for week {}. Send \"start report\" to \
                 continue or /cancel to discard it.",
                draft.week_number
            ));
        } else {
            text.push_str("\n\nPress \"start report\" to begin.");
        }
        turn.reply_with(&text, menu_keyboard()).await?;
        Ok(Outcome::Stay)
    }

    async fn start_or_resume(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        if turn.has_draft() {
            let week = turn.draft()?.week_number;
            turn.reply(&format!("Resuming your report for week {week}."))
                .await?;
            return Ok(Outcome::Transition(next_state(turn)?));
        }

        let user_id = turn.user_id().to_string();
        let week = turn.store().get_next_week_number().await?;
        let previous = turn
            .store()
            .get_user_previous_week_plans(&user_id, week)
            .await?;

        let username = turn.context().username.clone();
        let draft = DraftReport::new(
            &user_id,
            username.as_deref(),
            week,
            Utc::now().date_naive(),
            previous,
        );
        tracing::info!(
            user_id = %user_id,
            week,
            previous_plans = draft.previous_plans.len(),
            "draft started"
        );
        turn.start_draft(draft);
        turn.save().await;

        turn.reply(&format!("📝 Report for week {week}.")).await?;
        Ok(Outcome::Transition(StateId::EnteringScore))
    }

    async fn stats(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let user_id = turn.user_id().to_string();
        let stats = turn.store().get_user_stats(&user_id).await?;
        turn.reply(&render_stats(&stats)).await?;
        Ok(Outcome::Stay)
    }

    async fn history(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let user_id = turn.user_id().to_string();
        let limit = turn.limits().history_limit;
        let records = turn.store().get_reports(&user_id, limit).await?;
        turn.reply(&render_history(&records)).await?;
        Ok(Outcome::Stay)
    }

    async fn cancel(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        match turn.discard_draft() {
            Some(draft) => {
                turn.save().await;
                tracing::info!(user_id = %turn.user_id(), week = draft.week_number, "draft discarded");
                turn.reply_with("Report discarded. Nothing was saved.", menu_keyboard())
                    .await?;
            }
            None => turn.reply("There is nothing to cancel.").await?,
        }
        Ok(Outcome::Stay)
    }
}

#[async_trait]
impl State for IdleState {
    fn id(&self) -> StateId {
        StateId::Idle
    }

    /// Silent: whoever moves the session here attaches the menu to its own reply.
    async fn enter(&self, _turn: &mut Turn<'_>) -> DialogueResult<()> {
        Ok(())
    }

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome> {
        if let Some(command) = &input.command {
            return match command.name.as_str() {
                "start" | "menu" => Self::welcome(turn).await,
                "help" => {
                    turn.reply(HELP).await?;
                    Ok(Outcome::Stay)
                }
                "stats" => Self::stats(turn).await,
                "history" => Self::history(turn).await,
                "cancel" => Self::cancel(turn).await,
                "report" => Self::start_or_resume(turn).await,
                _ => Ok(Outcome::NotHandled),
            };
        }

        if input.keyword == Some(Keyword::Cancel) {
            return Self::cancel(turn).await;
        }

        match input.text.to_lowercase().as_str() {
            "start report" | "report" | "start" => Self::start_or_resume(turn).await,
            "stats" => Self::stats(turn).await,
            "history" => Self::history(turn).await,
            "help" => {
                turn.reply(HELP).await?;
                Ok(Outcome::Stay)
            }
            _ => {
                turn.reply_with(
                    "Send \"start report\" to write your weekly report, or /help.",
                    menu_keyboard(),
                )
                .await?;
                Ok(Outcome::Stay)
            }
        }
    }

    async fn handle_callback_query(
        &self,
        turn: &mut Turn<'_>,
        payload: &str,
    ) -> DialogueResult<Outcome> {
        match payload {
            "report" => Self::start_or_resume(turn).await,
            "stats" => Self::stats(turn).await,
            _ => Ok(Outcome::NotHandled),
        }
    }

    fn can_handle_command(&self, name: &str) -> bool {
        COMMANDS.contains(&name)
    }
}
