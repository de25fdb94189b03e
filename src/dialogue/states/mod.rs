//! The five conversation states and helpers they share.

pub mod adding;
pub mod comment;
pub mod idle;
pub mod marking;
pub mod score;

pub use adding::AddingTasksState;
pub use comment::EnteringCommentState;
pub use idle::IdleState;
pub use marking::MarkingTasksState;
pub use score::EnteringScoreState;

use super::command::Command;
use super::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::config::DialogueConfig;
use crate::reports::{normalize_task, DraftStep, TaskList};
use crate::transport::{Button, Keyboard, SendOptions};
use std::sync::Arc;

/// Every state, in command-ownership lookup order.
pub fn default_states() -> Vec<Arc<dyn State>> {
    vec![
        Arc::new(IdleState),
        Arc::new(EnteringScoreState),
        Arc::new(MarkingTasksState),
        Arc::new(AddingTasksState),
        Arc::new(EnteringCommentState),
    ]
}

/// The state that fills in `step`.
pub fn state_for_step(step: DraftStep) -> StateId {
    match step {
        DraftStep::Score => StateId::EnteringScore,
        DraftStep::Completed => StateId::MarkingTasks,
        DraftStep::Planned => StateId::AddingTasks,
        DraftStep::Comment => StateId::EnteringComment,
    }
}

/// Where the draft should go next.
pub(crate) fn next_state(turn: &Turn<'_>) -> DialogueResult<StateId> {
    Ok(state_for_step(turn.draft()?.next_step()))
}

/// Discard the draft and head back to `Idle`.
pub(crate) async fn cancel_draft(turn: &mut Turn<'_>) -> DialogueResult<Outcome> {
    let week = turn.discard_draft().map(|d| d.week_number);
    tracing::info!(user_id = %turn.user_id(), week, "draft discarded");
    turn.reply_with("Report discarded. Nothing was saved.", menu_keyboard())
        .await?;
    Ok(Outcome::Transition(StateId::Idle))
}

/// Why a task line was not added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskRejection {
    Empty,
    TooLong { max: usize },
    ListFull { max: usize },
    Duplicate(String),
    NoSuchTask { count: usize },
}

impl TaskRejection {
    pub(crate) fn message(&self) -> String {
        match self {
            Self::Empty => "That task is empty. Send a short description.".to_string(),
            Self::TooLong { max } => {
                format!("That task is too long. Keep it under {max} characters.")
            }
            Self::ListFull { max } => {
                format!("The list already has {max} tasks. Send \"done\" to continue.")
            }
            Self::Duplicate(task) => format!("\"{task}\" is already on the list."),
            Self::NoSuchTask { count: 0 } => "The list is empty.".to_string(),
            Self::NoSuchTask { count } => format!(
                "Pick a task by its number from 1 to {count}, e.g. /remove 1 or /rename 1 new text."
            ),
        }
    }
}

/// Validate and append one task line.
pub(crate) fn add_task(
    list: &mut TaskList,
    raw: &str,
    limits: &DialogueConfig,
) -> Result<String, TaskRejection> {
    let task = normalize_task(raw).ok_or(TaskRejection::Empty)?;
    if task.chars().count() > limits.max_task_chars {
        return Err(TaskRejection::TooLong {
            max: limits.max_task_chars,
        });
    }
    if list.contains(&task) {
        return Err(TaskRejection::Duplicate(task));
    }
    if list.len() >= limits.max_tasks {
        return Err(TaskRejection::ListFull {
            max: limits.max_tasks,
        });
    }
    list.push(task.clone());
    Ok(task)
}

/// Commands that fix an entry of the list being collected.
pub(crate) fn is_edit_command(command: &Command) -> bool {
    command.is("remove") || command.is("rename")
}

/// Result of `/remove N` or `/rename N text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskEdit {
    Removed(String),
    Renamed { from: String, to: String },
}

impl TaskEdit {
    pub(crate) fn message(&self, list: &TaskList) -> String {
        let head = match self {
            Self::Removed(task) => format!("Removed: {task}."),
            Self::Renamed { from, to } => format!("Changed \"{from}\" to \"{to}\"."),
        };
        if list.is_empty() {
            format!("{head} The list is empty now.")
        } else {
            format!("{head}\n\n{}", numbered(list.items()))
        }
    }
}

/// Apply `/remove N` or `/rename N text`. Tasks are numbered from 1.
pub(crate) fn edit_task(
    list: &mut TaskList,
    command: &Command,
    limits: &DialogueConfig,
) -> Result<TaskEdit, TaskRejection> {
    let (number, rest) = command
        .args
        .split_once(char::is_whitespace)
        .map_or((command.args.as_str(), ""), |(n, rest)| (n, rest.trim()));
    let count = list.len();
    let index = number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .filter(|index| *index < count)
        .ok_or(TaskRejection::NoSuchTask { count })?;

    if command.is("remove") {
        return list
            .remove_at(index)
            .map(TaskEdit::Removed)
            .ok_or(TaskRejection::NoSuchTask { count });
    }

    let task = normalize_task(rest).ok_or(TaskRejection::Empty)?;
    if task.chars().count() > limits.max_task_chars {
        return Err(TaskRejection::TooLong {
            max: limits.max_task_chars,
        });
    }
    let taken = list
        .items()
        .iter()
        .enumerate()
        .any(|(i, existing)| i != index && *existing == task);
    if taken {
        return Err(TaskRejection::Duplicate(task));
    }
    let from = list
        .replace_at(index, task.clone())
        .ok_or(TaskRejection::NoSuchTask { count })?;
    Ok(TaskEdit::Renamed { from, to: task })
}

/// `1. first` / `2. second`, one per line.
pub(crate) fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, task)| format!("{}. {task}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) const EDIT_TASKS_HINT: &str = "Send /remove N or /rename N new text to fix an entry.";

pub(crate) fn done_button() -> Button {
    Button::callback("➡️ Done", "done")
}

pub(crate) fn cancel_button() -> Button {
    Button::callback("✖️ Cancel", "cancel")
}

/// Main menu shown while idle. Buttons send their label as text.
pub(crate) fn menu_keyboard() -> SendOptions {
    SendOptions::keyboard(
        Keyboard::new()
            .row(vec![Button::text("start report")])
            .row(vec![
                Button::text("stats"),
                Button::text("history"),
                Button::text("help"),
            ]),
    )
}

pub(crate) const EDIT_HELP: &str = "Edit a section with:\n\
    /score - well-being score\n\
    /completed - what you got done\n\
    /plans - plans for next week\n\
    /comment - the comment\n\
    or send \"cancel\" to discard the report.";

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DialogueConfig {
        DialogueConfig {
            max_task_chars: 10,
            max_tasks: 2,
            ..DialogueConfig::default()
        }
    }

    #[test]
    fn add_task_validates_lines() {
        let mut list = TaskList::default();
        assert_eq!(add_task(&mut list, "  fix \n bug ", &limits()), Ok("fix bug".into()));
        assert_eq!(add_task(&mut list, "   ", &limits()), Err(TaskRejection::Empty));
        assert_eq!(
            add_task(&mut list, "a very long task", &limits()),
            Err(TaskRejection::TooLong { max: 10 })
        );
        assert_eq!(
            add_task(&mut list, "fix bug", &limits()),
            Err(TaskRejection::Duplicate("fix bug".into()))
        );
        assert!(add_task(&mut list, "docs", &limits()).is_ok());
        assert_eq!(
            add_task(&mut list, "more", &limits()),
            Err(TaskRejection::ListFull { max: 2 })
        );
        assert_eq!(list.len(), 2);
    }

    fn command(text: &str) -> Command {
        crate::dialogue::command::Input::parse(text).command.unwrap()
    }

    #[test]
    fn edit_task_removes_and_renames_by_number() {
        let mut list = TaskList::Open(vec!["fix bug".into(), "dosc".into()]);

        assert_eq!(
            edit_task(&mut list, &command("/rename 2 docs"), &limits()),
            Ok(TaskEdit::Renamed {
                from: "dosc".into(),
                to: "docs".into()
            })
        );
        assert_eq!(
            edit_task(&mut list, &command("/remove 1"), &limits()),
            Ok(TaskEdit::Removed("fix bug".into()))
        );
        assert_eq!(list.items(), ["docs".to_string()]);
    }

    #[test]
    fn edit_task_rejects_bad_numbers_and_text() {
        let mut list = TaskList::Open(vec!["a".into(), "b".into()]);
        assert_eq!(
            edit_task(&mut list, &command("/remove 3"), &limits()),
            Err(TaskRejection::NoSuchTask { count: 2 })
        );
        assert_eq!(
            edit_task(&mut list, &command("/remove"), &limits()),
            Err(TaskRejection::NoSuchTask { count: 2 })
        );
        assert_eq!(
            edit_task(&mut list, &command("/rename 0 x"), &limits()),
            Err(TaskRejection::NoSuchTask { count: 2 })
        );
        assert_eq!(
            edit_task(&mut list, &command("/rename 1"), &limits()),
            Err(TaskRejection::Empty)
        );
        assert_eq!(
            edit_task(&mut list, &command("/rename 1 b"), &limits()),
            Err(TaskRejection::Duplicate("b".into()))
        );
        assert_eq!(
            edit_task(&mut list, &command("/rename 1 far too long"), &limits()),
            Err(TaskRejection::TooLong { max: 10 })
        );
        assert_eq!(list.items(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn edit_message_lists_what_is_left() {
        let list = TaskList::Open(vec!["docs".into()]);
        let text = TaskEdit::Removed("bug".into()).message(&list);
        assert_eq!(text, "Removed: bug.\n\n1. docs");
        let empty = TaskList::default();
        assert!(TaskEdit::Removed("docs".into())
            .message(&empty)
            .ends_with("The list is empty now."));
    }

    #[test]
    fn steps_map_to_states() {
        assert_eq!(state_for_step(DraftStep::Score), StateId::EnteringScore);
        assert_eq!(state_for_step(DraftStep::Comment), StateId::EnteringComment);
    }

    #[test]
    fn registry_covers_every_state_once() {
        let states = default_states();
        let ids: Vec<StateId> = states.iter().map(|s| s.id()).collect();
        assert_eq!(ids, StateId::ALL.to_vec());
    }
}
