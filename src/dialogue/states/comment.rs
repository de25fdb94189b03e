//! Optional comment, preview and submission.

use super::{cancel_button, cancel_draft, menu_keyboard, next_state, EDIT_HELP};
use crate::dialogue::command::{Input, Keyword};
use crate::dialogue::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::reports::format::render_draft;
use crate::transport::{Button, Keyboard, SendOptions};
use crate::util::truncate_with_ellipsis;
use async_trait::async_trait;

pub struct EnteringCommentState;

fn preview_keyboard() -> SendOptions {
    SendOptions::keyboard(
        Keyboard::new()
            .row(vec![
                Button::callback("✅ Submit", "submit"),
                Button::callback("✏️ Edit", "edit"),
            ])
            .row(vec![cancel_button()]),
    )
}

fn comment_keyboard() -> SendOptions {
    SendOptions::keyboard(
        Keyboard::new().row(vec![Button::callback("⏭ Skip", "skip"), cancel_button()]),
    )
}

impl EnteringCommentState {
    async fn ask(turn: &Turn<'_>) -> DialogueResult<()> {
        let text = match turn.draft()?.comment.as_deref() {
            Some(current) if !current.trim().is_empty() => format!(
                "Your comment now reads:\n\n{current}\n\nSend a new one, \"skip\" to leave it \
                 empty or \"done\" to keep it."
            ),
            _ => "Anything else to add? Send a comment, or \"skip\".".to_string(),
        };
        turn.reply_with(&text, comment_keyboard()).await
    }

    async fn preview(turn: &Turn<'_>) -> DialogueResult<()> {
        let text = format!(
            "Here is your report:\n\n{}\n\nSend \"submit\" to save it or \"edit\" to change something.",
            render_draft(turn.draft()?)
        );
        turn.reply_with(&text, preview_keyboard()).await
    }

    async fn set_comment(turn: &mut Turn<'_>, comment: &str) -> DialogueResult<Outcome> {
        let max = turn.limits().max_comment_chars;
        let length = comment.chars().count();
        if length > max {
            turn.reply(&format!(
                "That comment is {length} characters long; the limit is {max}. Please shorten it."
            ))
            .await?;
            return Ok(Outcome::Stay);
        }
        turn.draft_mut()?.comment = Some(comment.to_string());
        turn.save().await;
        Self::preview(turn).await?;
        Ok(Outcome::Stay)
    }

    async fn submit(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let draft = turn.draft_mut()?;
        if draft.comment.is_none() {
            draft.comment = Some(String::new());
        }
        if !draft.is_submittable() {
            turn.reply("The report is not complete yet.").await?;
            return Ok(Outcome::Transition(next_state(turn)?));
        }

        let draft = turn.draft()?.clone();
        let user_id = turn.user_id().to_string();
        match turn
            .store()
            .has_report_for_week(&user_id, draft.week_number)
            .await
        {
            Ok(true) => {
                turn.reply(&format!(
                    "You already submitted a report for week {}. Send \"cancel\" to discard \
                     this draft.",
                    draft.week_number
                ))
                .await?;
                return Ok(Outcome::Stay);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(user_id = %user_id, %error, "duplicate check failed, submitting anyway");
            }
        }

        match turn.store().save_report(&draft).await {
            Ok(record) => {
                // Saved: from here on the session must end up in Idle even
                // when the confirmation cannot be delivered.
                turn.discard_draft();
                if let Err(error) = turn
                    .reply_with(
                        &format!("✅ Report saved!\n\n{}", render_draft(&draft)),
                        menu_keyboard(),
                    )
                    .await
                {
                    tracing::warn!(
                        user_id = %user_id,
                        report = %record.id(),
                        %error,
                        "report saved but the confirmation was not delivered"
                    );
                }
                Ok(Outcome::Transition(StateId::Idle))
            }
            Err(error) => {
                tracing::error!(
                    user_id = %user_id,
                    week = draft.week_number,
                    code = %error.code,
                    attempts = error.attempts,
                    "report submission failed"
                );
                let hint = if error.is_retryable() {
                    "The spreadsheet is not reachable right now."
                } else {
                    "The spreadsheet rejected the report."
                };
                turn.reply(&format!(
                    "❌ Could not save the report. {hint} Your draft is kept; send \"submit\" \
                     to try again. ({})",
                    truncate_with_ellipsis(&error.message, 120)
                ))
                .await?;
                Ok(Outcome::Stay)
            }
        }
    }
}

#[async_trait]
impl State for EnteringCommentState {
    fn id(&self) -> StateId {
        StateId::EnteringComment
    }

    async fn enter(&self, turn: &mut Turn<'_>) -> DialogueResult<()> {
        // `/comment` answers for itself in `handle_message`.
        if turn.rerouted_command() == Some("comment") {
            return Ok(());
        }
        if turn.draft()?.comment.is_some() {
            Self::preview(turn).await
        } else {
            Self::ask(turn).await
        }
    }

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome> {
        match input.keyword {
            Some(Keyword::Cancel) => return cancel_draft(turn).await,
            Some(Keyword::Submit) => return Self::submit(turn).await,
            Some(Keyword::Edit) => {
                turn.reply(EDIT_HELP).await?;
                return Ok(Outcome::Stay);
            }
            Some(Keyword::Skip) => return Self::set_comment(turn, "").await,
            Some(Keyword::Done) => {
                if turn.draft()?.comment.is_none() {
                    return Self::set_comment(turn, "").await;
                }
                Self::preview(turn).await?;
                return Ok(Outcome::Stay);
            }
            None => {}
        }
        if let Some(command) = &input.command {
            if !command.is("comment") {
                return Ok(Outcome::NotHandled);
            }
            if command.has_args() {
                return Self::set_comment(turn, &command.args).await;
            }
            Self::ask(turn).await?;
            return Ok(Outcome::Stay);
        }
        Self::set_comment(turn, &input.text).await
    }

    async fn handle_callback_query(
        &self,
        turn: &mut Turn<'_>,
        payload: &str,
    ) -> DialogueResult<Outcome> {
        match Keyword::from_payload(payload) {
            Some(Keyword::Cancel) => cancel_draft(turn).await,
            Some(Keyword::Submit) => Self::submit(turn).await,
            Some(Keyword::Skip) => Self::set_comment(turn, "").await,
            Some(Keyword::Edit) => {
                turn.reply(EDIT_HELP).await?;
                Ok(Outcome::Stay)
            }
            Some(Keyword::Done) | None => Ok(Outcome::NotHandled),
        }
    }

    fn can_handle_command(&self, name: &str) -> bool {
        name == "comment"
    }
}
