//! What got done this week: last week's plans toggled by button, anything
//! else typed one task per message.

use super::{
    add_task, cancel_button, cancel_draft, done_button, edit_task, is_edit_command, next_state,
    numbered, EDIT_TASKS_HINT,
};
use crate::dialogue::command::{indexed_payload, Input, Keyword};
use crate::dialogue::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::reports::DraftReport;
use crate::transport::{Button, Keyboard, SendOptions};
use async_trait::async_trait;

pub struct MarkingTasksState;

fn marking_keyboard(draft: &DraftReport) -> SendOptions {
    let mut keyboard = Keyboard::new();
    for (index, plan) in draft.previous_plans.iter().enumerate() {
        let mark = if draft.completed.contains(plan) { "✅" } else { "⬜" };
        keyboard = keyboard.row(vec![Button::callback(
            format!("{mark} {plan}"),
            format!("mark:{index}"),
        )]);
    }
    SendOptions::keyboard(keyboard.row(vec![done_button(), cancel_button()]))
}

impl MarkingTasksState {
    async fn prompt(turn: &Turn<'_>) -> DialogueResult<()> {
        let draft = turn.draft()?;
        let mut text = if draft.previous_plans.is_empty() {
            "What did you get done this week? Send one task per message.".to_string()
        } else {
            "Which of last week's plans did you finish? Tap to mark them, and send \
             anything else you did as one task per message."
                .to_string()
        };
        if !draft.completed.is_empty() {
            text.push_str(&format!(
                "\n\nSo far:\n{}\n{EDIT_TASKS_HINT}",
                numbered(draft.completed.items())
            ));
        }
        text.push_str("\nSend \"done\" when finished.");
        turn.reply_with(&text, marking_keyboard(draft)).await
    }

    async fn finish(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let draft = turn.draft_mut()?;
        draft.completed.close();
        let count = draft.completed.len();
        turn.save().await;
        turn.reply(&format!("Done tasks recorded: {count}.")).await?;
        Ok(Outcome::Transition(next_state(turn)?))
    }

    async fn toggle(turn: &mut Turn<'_>, index: usize) -> DialogueResult<Outcome> {
        let max_tasks = turn.limits().max_tasks;
        let draft = turn.draft()?;
        let Some(plan) = draft.previous_plans.get(index).cloned() else {
            return Ok(Outcome::NotHandled);
        };
        if !draft.completed.contains(&plan) && draft.completed.len() >= max_tasks {
            turn.reply(&format!("The list already has {max_tasks} tasks."))
                .await?;
            return Ok(Outcome::Stay);
        }
        let now_done = turn.draft_mut()?.completed.toggle(&plan);
        turn.save().await;

        let text = if now_done {
            format!("✅ {plan}")
        } else {
            format!("⬜ {plan} (not done)")
        };
        turn.reply_with(&text, marking_keyboard(turn.draft()?)).await?;
        Ok(Outcome::Stay)
    }
}

#[async_trait]
impl State for MarkingTasksState {
    fn id(&self) -> StateId {
        StateId::MarkingTasks
    }

    async fn enter(&self, turn: &mut Turn<'_>) -> DialogueResult<()> {
        turn.draft_mut()?.completed.reopen();
        turn.save().await;
        Self::prompt(turn).await
    }

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome> {
        match input.keyword {
            Some(Keyword::Done | Keyword::Skip) => return Self::finish(turn).await,
            Some(Keyword::Cancel) => return cancel_draft(turn).await,
            _ => {}
        }
        if let Some(command) = &input.command {
            if is_edit_command(command) {
                let limits = turn.limits().clone();
                let draft = turn.draft_mut()?;
                match edit_task(&mut draft.completed, command, &limits) {
                    Ok(edit) => {
                        let text = edit.message(&draft.completed);
                        turn.save().await;
                        turn.reply_with(&text, marking_keyboard(turn.draft()?)).await?;
                    }
                    Err(rejection) => turn.reply(&rejection.message()).await?,
                }
                return Ok(Outcome::Stay);
            }
            if !command.is("completed") {
                return Ok(Outcome::NotHandled);
            }
            if !turn.just_entered() {
                Self::prompt(turn).await?;
            }
            return Ok(Outcome::Stay);
        }

        let limits = turn.limits().clone();
        let result = add_task(&mut turn.draft_mut()?.completed, &input.text, &limits);
        match result {
            Ok(task) => {
                turn.save().await;
                let count = turn.draft()?.completed.len();
                turn.reply(&format!(
                    "Added: {task} ({count} so far). Send another one or \"done\"."
                ))
                .await?;
            }
            Err(rejection) => turn.reply(&rejection.message()).await?,
        }
        Ok(Outcome::Stay)
    }

    async fn handle_callback_query(
        &self,
        turn: &mut Turn<'_>,
        payload: &str,
    ) -> DialogueResult<Outcome> {
        match Keyword::from_payload(payload) {
            Some(Keyword::Done | Keyword::Skip) => return Self::finish(turn).await,
            Some(Keyword::Cancel) => return cancel_draft(turn).await,
            _ => {}
        }
        match indexed_payload(payload, "mark") {
            Some(index) => Self::toggle(turn, index).await,
            None => Ok(Outcome::NotHandled),
        }
    }

    fn can_handle_command(&self, name: &str) -> bool {
        name == "completed"
    }
}
