//! Report domain types: score, task lists, drafts, persisted records, stats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Score ─────────────────────────────────────────────────────────

/// Self-assessed well-being for the week, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("'{0}' is not a whole number")]
    NotANumber(String),
    #[error("{0} is outside {min}..={max}", min = Score::MIN, max = Score::MAX)]
    OutOfRange(i64),
}

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(value: i64) -> Result<Self, ScoreError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreError::OutOfRange(value))
        }
    }

    /// Parse user input such as `" 7 "`.
    pub fn parse(input: &str) -> Result<Self, ScoreError> {
        let trimmed = input.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| ScoreError::NotANumber(trimmed.to_string()))?;
        Self::new(value)
    }

    /// Clamp into range. Only for values read back from storage.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamped(value: i64) -> Self {
        let bounded = value.clamp(i64::from(Self::MIN), i64::from(Self::MAX));
        Self(bounded as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = ScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

// ── Task lists ────────────────────────────────────────────────────

/// An ordered task list that is either still being collected or explicitly
/// finished by the user (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "items", rename_all = "snake_case")]
pub enum TaskList {
    Open(Vec<String>),
    Closed(Vec<String>),
}

impl TaskList {
    pub fn items(&self) -> &[String] {
        match self {
            Self::Open(items) | Self::Closed(items) => items,
        }
    }

    fn items_mut(&mut self) -> &mut Vec<String> {
        match self {
            Self::Open(items) | Self::Closed(items) => items,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.items().iter().any(|t| t == task)
    }

    pub fn push(&mut self, task: String) {
        self.items_mut().push(task);
    }

    /// Add `task` if absent, remove it if present. Returns whether it is now present.
    pub fn toggle(&mut self, task: &str) -> bool {
        let items = self.items_mut();
        if let Some(pos) = items.iter().position(|t| t == task) {
            items.remove(pos);
            false
        } else {
            items.push(task.to_string());
            true
        }
    }

    /// Remove the task at `index` (0-based).
    pub fn remove_at(&mut self, index: usize) -> Option<String> {
        let items = self.items_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    /// Replace the task at `index` (0-based), returning the old text.
    pub fn replace_at(&mut self, index: usize, task: String) -> Option<String> {
        self.items_mut()
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, task))
    }

    pub fn close(&mut self) {
        if let Self::Open(items) = self {
            *self = Self::Closed(std::mem::take(items));
        }
    }

    pub fn reopen(&mut self) {
        if let Self::Closed(items) = self {
            *self = Self::Open(std::mem::take(items));
        }
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::Open(Vec::new())
    }
}

/// Collapse whitespace (newlines included) into single spaces.
///
/// Task lists are stored newline-delimited, so a task must never contain one.
pub fn normalize_task(input: &str) -> Option<String> {
    let task = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if task.is_empty() {
        None
    } else {
        Some(task)
    }
}

// ── Draft ─────────────────────────────────────────────────────────

/// Sub-phase of next-week planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningPhase {
    /// Choosing which unfinished plans from last week move forward.
    CarryOver,
    /// Typing new plans for next week.
    #[default]
    NextWeek,
}

/// The first part of a draft the user still has to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStep {
    Score,
    Completed,
    Planned,
    Comment,
}

/// A report being assembled through the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReport {
    pub week_number: u32,
    pub date: NaiveDate,
    pub user_id: String,
    pub username: Option<String>,
    pub score: Option<Score>,
    pub completed: TaskList,
    pub planned: TaskList,
    #[serde(default)]
    pub planning_phase: PlanningPhase,
    /// Plans recorded for the previous week, offered for marking and carry-over.
    #[serde(default)]
    pub previous_plans: Vec<String>,
    /// The planned task marked as most important, if any.
    #[serde(default)]
    pub priority: Option<String>,
    /// `None` until answered; `Some("")` when skipped.
    pub comment: Option<String>,
}

impl DraftReport {
    pub fn new(
        user_id: &str,
        username: Option<&str>,
        week_number: u32,
        date: NaiveDate,
        previous_plans: Vec<String>,
    ) -> Self {
        Self {
            week_number,
            date,
            user_id: user_id.to_string(),
            username: username.map(str::to_string),
            score: None,
            completed: TaskList::default(),
            planned: TaskList::default(),
            planning_phase: PlanningPhase::default(),
            previous_plans,
            priority: None,
            comment: None,
        }
    }

    pub fn is_submittable(&self) -> bool {
        self.score.is_some() && self.completed.is_closed() && self.planned.is_closed()
    }

    pub fn next_step(&self) -> DraftStep {
        if self.score.is_none() {
            DraftStep::Score
        } else if !self.completed.is_closed() {
            DraftStep::Completed
        } else if !self.planned.is_closed() {
            DraftStep::Planned
        } else {
            DraftStep::Comment
        }
    }

    /// Last week's plans that were not marked done this week.
    pub fn unfinished_previous_plans(&self) -> Vec<&str> {
        self.previous_plans
            .iter()
            .filter(|plan| !self.completed.contains(plan))
            .map(String::as_str)
            .collect()
    }

    /// Planned tasks done this week, in the order they were marked.
    pub fn planned_completed(&self) -> Vec<&str> {
        self.completed
            .items()
            .iter()
            .filter(|task| self.previous_plans.contains(task))
            .map(String::as_str)
            .collect()
    }

    /// Keep the priority pointing at a task that is still planned.
    pub fn retain_priority(&mut self) {
        if self
            .priority
            .as_deref()
            .is_some_and(|task| !self.planned.contains(task))
        {
            self.priority = None;
        }
    }

    /// Completed tasks that were not on last week's plan.
    pub fn unplanned_completed(&self) -> Vec<&str> {
        self.completed
            .items()
            .iter()
            .filter(|task| !self.previous_plans.contains(task))
            .map(String::as_str)
            .collect()
    }
}

// ── Persisted record ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DraftIncomplete {
    #[error("the draft has no score yet")]
    MissingScore,
    #[error("completed tasks are still being collected")]
    CompletedOpen,
    #[error("planned tasks are still being collected")]
    PlannedOpen,
}

/// One submitted report, as stored in the reports sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub week_number: u32,
    pub date: NaiveDate,
    pub user_id: String,
    pub username: String,
    pub score: Score,
    pub completed_tasks: Vec<String>,
    pub planned_tasks: Vec<String>,
    pub comment: String,
}

impl ReportRecord {
    /// Stable id derived from user and week.
    pub fn id(&self) -> String {
        format!("{}-w{}", self.user_id, self.week_number)
    }

    pub fn from_draft(draft: &DraftReport) -> Result<Self, DraftIncomplete> {
        let score = draft.score.ok_or(DraftIncomplete::MissingScore)?;
        if !draft.completed.is_closed() {
            return Err(DraftIncomplete::CompletedOpen);
        }
        if !draft.planned.is_closed() {
            return Err(DraftIncomplete::PlannedOpen);
        }
        Ok(Self {
            week_number: draft.week_number,
            date: draft.date,
            user_id: draft.user_id.clone(),
            username: draft.username.clone().unwrap_or_default(),
            score,
            completed_tasks: draft.completed.items().to_vec(),
            planned_tasks: draft.planned.items().to_vec(),
            comment: draft.comment.clone().unwrap_or_default(),
        })
    }
}

// ── Stats ─────────────────────────────────────────────────────────

/// Aggregates over one user's reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_reports: usize,
    pub average_score: f64,
    pub completed_tasks: usize,
    pub planned_tasks: usize,
    /// `completed / (completed + planned) * 100`, rounded; 0 with no tasks.
    pub completion_rate: u32,
    pub last_week: Option<u32>,
    pub best_score: Option<Score>,
    pub worst_score: Option<Score>,
}

impl UserStats {
    pub fn from_records<'a>(
        user_id: &str,
        records: impl IntoIterator<Item = &'a ReportRecord>,
    ) -> Self {
        let mut stats = Self {
            user_id: user_id.to_string(),
            total_reports: 0,
            average_score: 0.0,
            completed_tasks: 0,
            planned_tasks: 0,
            completion_rate: 0,
            last_week: None,
            best_score: None,
            worst_score: None,
        };
        let mut score_sum = 0u64;

        for record in records {
            stats.total_reports += 1;
            score_sum += u64::from(record.score.value());
            stats.completed_tasks += record.completed_tasks.len();
            stats.planned_tasks += record.planned_tasks.len();
            stats.last_week = stats.last_week.max(Some(record.week_number));
            stats.best_score = stats.best_score.max(Some(record.score));
            stats.worst_score =
                Some(stats.worst_score.map_or(record.score, |w| w.min(record.score)));
        }

        if stats.total_reports > 0 {
            stats.average_score = score_sum as f64 / stats.total_reports as f64;
        }
        let tasks = stats.completed_tasks + stats.planned_tasks;
        if tasks > 0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rate = (stats.completed_tasks as f64 / tasks as f64 * 100.0).round() as u32;
            stats.completion_rate = rate;
        }
        stats
    }
}
