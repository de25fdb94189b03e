//! Plans for next week.
//!
//! Runs in two phases: first unfinished plans from last week may be carried
//! over, then new plans are typed one per message. The carry-over phase is
//! skipped when nothing is left unfinished. Any plan can be marked as the
//! week's priority from the plan buttons.

use super::{
    add_task, cancel_button, cancel_draft, done_button, edit_task, is_edit_command, next_state,
    numbered, TaskEdit, EDIT_TASKS_HINT,
};
use crate::dialogue::command::{indexed_payload, Command, Input, Keyword};
use crate::dialogue::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::reports::{DraftReport, PlanningPhase};
use crate::transport::{Button, Keyboard, SendOptions};
use async_trait::async_trait;

pub struct AddingTasksState;

/// Indices into `previous_plans` of plans not marked done.
fn unfinished(draft: &DraftReport) -> Vec<usize> {
    draft
        .previous_plans
        .iter()
        .enumerate()
        .filter(|(_, plan)| !draft.completed.contains(plan))
        .map(|(index, _)| index)
        .collect()
}

fn carry_keyboard(draft: &DraftReport) -> SendOptions {
    let mut keyboard = Keyboard::new();
    for index in unfinished(draft) {
        let plan = &draft.previous_plans[index];
        let mark = if draft.planned.contains(plan) { "☑️" } else { "⬜" };
        keyboard = keyboard.row(vec![Button::callback(
            format!("{mark} {plan}"),
            format!("carry:{index}"),
        )]);
    }
    SendOptions::keyboard(
        keyboard
            .row(vec![Button::callback("⏩ Carry over all", "carry:all")])
            .row(vec![done_button(), cancel_button()]),
    )
}

/// One toggle per plan for the priority, then done/cancel.
fn plans_keyboard(draft: &DraftReport) -> SendOptions {
    let mut keyboard = Keyboard::new();
    for (index, plan) in draft.planned.items().iter().enumerate() {
        let mark = if draft.priority.as_deref() == Some(plan.as_str()) {
            "✶"
        } else {
            "☆"
        };
        keyboard = keyboard.row(vec![Button::callback(
            format!("{mark} {plan}"),
            format!("prio:{index}"),
        )]);
    }
    SendOptions::keyboard(keyboard.row(vec![done_button(), cancel_button()]))
}

impl AddingTasksState {
    async fn prompt(turn: &Turn<'_>) -> DialogueResult<()> {
        let draft = turn.draft()?;
        match draft.planning_phase {
            PlanningPhase::CarryOver => {
                turn.reply_with(
                    "These plans from last week are not done yet. Tap the ones to carry \
                     over to next week, then \"done\".",
                    carry_keyboard(draft),
                )
                .await
            }
            PlanningPhase::NextWeek => {
                let mut text =
                    "What do you plan for next week? Send one task per message.".to_string();
                if !draft.planned.is_empty() {
                    text.push_str(&format!(
                        "\n\nSo far:\n{}\n{EDIT_TASKS_HINT}\nTap a plan to make it the priority.",
                        numbered(draft.planned.items())
                    ));
                }
                text.push_str("\nSend \"done\" when finished.");
                turn.reply_with(&text, plans_keyboard(draft)).await
            }
        }
    }

    async fn advance(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let draft = turn.draft_mut()?;
        match draft.planning_phase {
            PlanningPhase::CarryOver => {
                draft.planning_phase = PlanningPhase::NextWeek;
                turn.save().await;
                Self::prompt(turn).await?;
                Ok(Outcome::Stay)
            }
            PlanningPhase::NextWeek => {
                draft.planned.close();
                let count = draft.planned.len();
                turn.save().await;
                turn.reply(&format!("Plans recorded: {count}.")).await?;
                Ok(Outcome::Transition(next_state(turn)?))
            }
        }
    }

    async fn carry(turn: &mut Turn<'_>, index: usize) -> DialogueResult<Outcome> {
        let max_tasks = turn.limits().max_tasks;
        let draft = turn.draft_mut()?;
        if !unfinished(draft).contains(&index) {
            return Ok(Outcome::NotHandled);
        }
        let plan = draft.previous_plans[index].clone();
        if !draft.planned.contains(&plan) && draft.planned.len() >= max_tasks {
            turn.reply(&format!("The list already has {max_tasks} tasks."))
                .await?;
            return Ok(Outcome::Stay);
        }
        let carried = draft.planned.toggle(&plan);
        draft.retain_priority();
        turn.save().await;

        let text = if carried {
            format!("☑️ {plan} carried over")
        } else {
            format!("⬜ {plan} dropped")
        };
        turn.reply_with(&text, carry_keyboard(turn.draft()?)).await?;
        Ok(Outcome::Stay)
    }

    async fn carry_all(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
        let max_tasks = turn.limits().max_tasks;
        let draft = turn.draft_mut()?;
        let mut carried = 0;
        for index in unfinished(draft) {
            let plan = draft.previous_plans[index].clone();
            if draft.planned.len() >= max_tasks {
                break;
            }
            if !draft.planned.contains(&plan) {
                draft.planned.push(plan);
                carried += 1;
            }
        }
        draft.planning_phase = PlanningPhase::NextWeek;
        turn.save().await;

        turn.reply(&format!("Carried over {carried} plan(s).")).await?;
        Self::prompt(turn).await?;
        Ok(Outcome::Stay)
    }

    async fn toggle_priority(turn: &mut Turn<'_>, index: usize) -> DialogueResult<Outcome> {
        let draft = turn.draft_mut()?;
        let Some(plan) = draft.planned.items().get(index).cloned() else {
            return Ok(Outcome::NotHandled);
        };
        let text = if draft.priority.as_deref() == Some(plan.as_str()) {
            draft.priority = None;
            format!("{plan} is no longer the priority.")
        } else {
            draft.priority = Some(plan.clone());
            format!("✶ {plan} is the priority for next week.")
        };
        turn.save().await;
        turn.reply_with(&text, plans_keyboard(turn.draft()?)).await?;
        Ok(Outcome::Stay)
    }

    async fn edit(turn: &mut Turn<'_>, command: &Command) -> DialogueResult<Outcome> {
        let limits = turn.limits().clone();
        let draft = turn.draft_mut()?;
        match edit_task(&mut draft.planned, command, &limits) {
            Ok(edit) => {
                if let TaskEdit::Renamed { from, to } = &edit {
                    if draft.priority.as_deref() == Some(from.as_str()) {
                        draft.priority = Some(to.clone());
                    }
                }
                draft.retain_priority();
                let text = edit.message(&draft.planned);
                turn.save().await;
                turn.reply_with(&text, plans_keyboard(turn.draft()?)).await?;
            }
            Err(rejection) => turn.reply(&rejection.message()).await?,
        }
        Ok(Outcome::Stay)
    }
}

#[async_trait]
impl State for AddingTasksState {
    fn id(&self) -> StateId {
        StateId::AddingTasks
    }

    async fn enter(&self, turn: &mut Turn<'_>) -> DialogueResult<()> {
        let draft = turn.draft_mut()?;
        draft.planned.reopen();
        draft.planning_phase = if unfinished(draft).is_empty() {
            PlanningPhase::NextWeek
        } else {
            PlanningPhase::CarryOver
        };
        turn.save().await;
        Self::prompt(turn).await
    }

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome> {
        match input.keyword {
            Some(Keyword::Done | Keyword::Skip) => return Self::advance(turn).await,
            Some(Keyword::Cancel) => return cancel_draft(turn).await,
            _ => {}
        }
        if let Some(command) = &input.command {
            if is_edit_command(command) {
                return Self::edit(turn, command).await;
            }
            if !command.is("plans") {
                return Ok(Outcome::NotHandled);
            }
            if !turn.just_entered() {
                Self::prompt(turn).await?;
            }
            return Ok(Outcome::Stay);
        }

        let limits = turn.limits().clone();
        let result = add_task(&mut turn.draft_mut()?.planned, &input.text, &limits);
        match result {
            Ok(task) => {
                turn.save().await;
                let draft = turn.draft()?;
                turn.reply_with(
                    &format!(
                        "Planned: {task} ({} so far). Send another one or \"done\".",
                        draft.planned.len()
                    ),
                    plans_keyboard(draft),
                )
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
            Some(Keyword::Done | Keyword::Skip) => return Self::advance(turn).await,
            Some(Keyword::Cancel) => return cancel_draft(turn).await,
            _ => {}
        }
        if payload == "carry:all" {
            return Self::carry_all(turn).await;
        }
        if let Some(index) = indexed_payload(payload, "prio") {
            return Self::toggle_priority(turn, index).await;
        }
        match indexed_payload(payload, "carry") {
            Some(index) => Self::carry(turn, index).await,
            None => Ok(Outcome::NotHandled),
        }
    }

    fn can_handle_command(&self, name: &str) -> bool {
        name == "plans"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn unfinished_skips_plans_marked_done() {
        let mut draft = DraftReport::new(
            "1",
            None,
            2,
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            vec!["a".into(), "b".into(), "c".into()],
        );
        draft.completed.toggle("b");
        assert_eq!(unfinished(&draft), vec![0, 2]);
    }
}
