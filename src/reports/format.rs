//! Human-readable summaries sent back to the user.

use super::model::{DraftReport, ReportRecord, UserStats};
use std::fmt::Write;

const NOTHING: &str = "  (nothing)";

/// Marks the priority task wherever it is listed.
const PRIORITY_MARK: &str = "✶";

struct Summary<'a> {
    week: u32,
    score: Option<String>,
    done: Vec<(char, &'a str)>,
    plans: Vec<&'a str>,
    priority: Option<&'a str>,
    comment: Option<&'a str>,
}

fn render(summary: &Summary<'_>) -> String {
    let is_priority = |task: &str| summary.priority == Some(task);
    let line = |mark: char, task: &str| {
        if is_priority(task) {
            format!("  {mark} {PRIORITY_MARK} {task}")
        } else {
            format!("  {mark} {task}")
        }
    };

    let mut out = String::new();
    let _ = writeln!(out, "Week {}", summary.week);
    let _ = writeln!(
        out,
        "\n1. Well-being: {}",
        summary.score.as_deref().unwrap_or("not set")
    );

    out.push_str("\n2. Done:\n");
    if summary.done.is_empty() {
        let _ = writeln!(out, "{NOTHING}");
    }
    let mut done = summary.done.clone();
    done.sort_by_key(|(_, task)| !is_priority(*task));
    for (mark, task) in done {
        let _ = writeln!(out, "{}", line(mark, task));
    }

    out.push_str("\n3. Plans for next week:\n");
    if summary.plans.is_empty() {
        let _ = writeln!(out, "{NOTHING}");
    }
    let mut plans = summary.plans.clone();
    plans.sort_by_key(|task| !is_priority(*task));
    for plan in plans {
        let _ = writeln!(out, "{}", line('☐', plan));
    }

    match summary.comment {
        Some(comment) if !comment.trim().is_empty() => {
            let _ = write!(out, "\n4. Comment: {}", comment.trim());
        }
        _ => out.push_str("\n4. Comment: -"),
    }
    out
}

/// Report text for a draft: planned-and-done (✓), unplanned (+), planned but
/// not done (−), then next week's plans (☐). The priority task comes first in
/// its section and carries ✶.
pub fn render_draft(draft: &DraftReport) -> String {
    let done = draft
        .planned_completed()
        .into_iter()
        .map(|task| ('✓', task))
        .chain(draft.unplanned_completed().into_iter().map(|task| ('+', task)))
        .chain(
            draft
                .unfinished_previous_plans()
                .into_iter()
                .map(|task| ('−', task)),
        )
        .collect();

    render(&Summary {
        week: draft.week_number,
        score: draft.score.map(|s| s.to_string()),
        done,
        plans: draft.planned.items().iter().map(String::as_str).collect(),
        priority: draft.priority.as_deref(),
        comment: draft.comment.as_deref(),
    })
}

pub fn render_stats(stats: &UserStats) -> String {
    if stats.total_reports == 0 {
        return "No reports yet. Send \"start report\" to write your first one.".to_string();
    }

    let mut out = String::from("📊 Your statistics\n\n");
    let _ = writeln!(out, "Reports: {}", stats.total_reports);
    let _ = writeln!(out, "Average well-being: {:.1}/10", stats.average_score);
    if let (Some(best), Some(worst)) = (stats.best_score, stats.worst_score) {
        let _ = writeln!(out, "Best / worst: {} / {}", best, worst);
    }
    let _ = writeln!(out, "Tasks done: {}", stats.completed_tasks);
    let _ = writeln!(out, "Tasks planned: {}", stats.planned_tasks);
    let _ = write!(out, "Completion rate: {}%", stats.completion_rate);
    if let Some(week) = stats.last_week {
        let _ = write!(out, "\nLast report: week {week}");
    }
    out
}

pub fn render_history(records: &[ReportRecord]) -> String {
    if records.is_empty() {
        return "No reports yet.".to_string();
    }
    let mut out = String::from("🗂 Recent reports\n");
    for record in records {
        let _ = write!(
            out,
            "\nWeek {} ({}): {}, {} done, {} planned",
            record.week_number,
            record.date.format("%Y-%m-%d"),
            record.score,
            record.completed_tasks.len(),
            record.planned_tasks.len()
        );
    }
    out
}
