//! Row layout of the reports and users sheets.
//!
//! Column order is part of the stored format; changing it needs a migration
//! of existing rows.

use super::model::{ReportRecord, Score, UserStats};
use crate::sheets::{Cell, Row};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

pub const REPORT_HEADER: [&str; 8] = [
    "week",
    "date",
    "user_id",
    "username",
    "score",
    "completed_tasks",
    "planned_tasks",
    "comment",
];

pub const USER_HEADER: [&str; 6] = [
    "user_id",
    "username",
    "reports",
    "last_week",
    "average_score",
    "updated_at",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TASK_SEPARATOR: char = '\n';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column {column}: {reason}")]
pub struct DecodeError {
    pub column: &'static str,
    pub reason: String,
}

impl DecodeError {
    fn new(column: &'static str, reason: impl Into<String>) -> Self {
        Self {
            column,
            reason: reason.into(),
        }
    }
}

pub fn header_row(columns: &[&str]) -> Row {
    columns.iter().map(|c| Cell::text(*c)).collect()
}

/// Compare a stored header with the expected one, ignoring case and padding.
pub fn header_matches(expected: &[&str], actual: &[Cell]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| a.to_string().trim().eq_ignore_ascii_case(e))
}

pub fn encode_tasks(tasks: &[String]) -> String {
    tasks.join("\n")
}

pub fn decode_tasks(cell: &str) -> Vec<String> {
    cell.split(TASK_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn encode_report(record: &ReportRecord) -> Row {
    vec![
        Cell::from(record.week_number),
        Cell::text(record.date.format(DATE_FORMAT).to_string()),
        Cell::text(record.user_id.as_str()),
        Cell::text(record.username.as_str()),
        Cell::from(u32::from(record.score.value())),
        Cell::text(encode_tasks(&record.completed_tasks)),
        Cell::text(encode_tasks(&record.planned_tasks)),
        Cell::text(record.comment.as_str()),
    ]
}

/// Decode one data row. Missing trailing cells read as empty, matching how
/// the Sheets API omits them.
pub fn decode_report(row: &[Cell]) -> Result<ReportRecord, DecodeError> {
    let text = |idx: usize| row.get(idx).map(ToString::to_string).unwrap_or_default();

    let week_number = row
        .first()
        .and_then(Cell::as_i64)
        .and_then(|w| u32::try_from(w).ok())
        .filter(|w| *w > 0)
        .ok_or_else(|| DecodeError::new("week", format!("expected a positive integer, got '{}'", text(0))))?;

    let date = row
        .get(1)
        .and_then(decode_date)
        .ok_or_else(|| DecodeError::new("date", format!("unrecognised date '{}'", text(1))))?;

    let user_id = text(2).trim().to_string();
    if user_id.is_empty() {
        return Err(DecodeError::new("user_id", "missing"));
    }

    let score = row
        .get(4)
        .and_then(Cell::as_i64)
        .map(Score::clamped)
        .ok_or_else(|| DecodeError::new("score", format!("expected an integer, got '{}'", text(4))))?;

    Ok(ReportRecord {
        week_number,
        date,
        user_id,
        username: text(3).trim().to_string(),
        score,
        completed_tasks: decode_tasks(&text(5)),
        planned_tasks: decode_tasks(&text(6)),
        comment: text(7),
    })
}

/// Accepts `YYYY-MM-DD`, a leading date in a datetime string, or a
/// spreadsheet serial day number.
fn decode_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Text(s) => {
            let s = s.trim();
            let head = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
        }
        Cell::Number(_) => {
            let serial = cell.as_i64()?;
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_signed(Duration::try_days(serial)?)
        }
        Cell::Bool(_) => None,
    }
}

/// One row of the users sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub reports: usize,
    pub last_week: Option<u32>,
    pub average_score: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserSummary {
    pub fn from_stats(stats: &UserStats, username: &str, updated_at: DateTime<Utc>) -> Self {
        Self {
            user_id: stats.user_id.clone(),
            username: username.to_string(),
            reports: stats.total_reports,
            last_week: stats.last_week,
            average_score: (stats.average_score * 10.0).round() / 10.0,
            updated_at,
        }
    }
}

pub fn encode_user(summary: &UserSummary) -> Row {
    vec![
        Cell::text(summary.user_id.as_str()),
        Cell::text(summary.username.as_str()),
        Cell::Number(summary.reports as f64),
        summary
            .last_week
            .map_or_else(Cell::empty, Cell::from),
        Cell::Number(summary.average_score),
        Cell::text(summary.updated_at.to_rfc3339()),
    ]
}

/// User id in the first column of a users-sheet row, if any.
pub fn user_row_id(row: &[Cell]) -> Option<String> {
    let id = row.first()?.to_string();
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReportRecord {
        ReportRecord {
            week_number: 12,
            date: NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
            user_id: "1001".into(),
            username: "alice".into(),
            score: Score::new(7).unwrap(),
            completed_tasks: vec!["ship release".into(), "review PR".into()],
            planned_tasks: vec!["write docs".into()],
            comment: "good week".into(),
        }
    }

    #[test]
    fn report_row_has_fixed_column_order() {
        let row = encode_report(&sample());
        assert_eq!(row.len(), REPORT_HEADER.len());
        assert_eq!(row[0], Cell::Number(12.0));
        assert_eq!(row[1], Cell::text("2024-03-18"));
        assert_eq!(row[2], Cell::text("1001"));
        assert_eq!(row[4], Cell::Number(7.0));
        assert_eq!(row[5], Cell::text("ship release\nreview PR"));
        assert_eq!(decode_report(&row).unwrap(), sample());
    }

    #[test]
    fn decodes_text_cells_and_short_rows() {
        let row = vec![
            Cell::text("3"),
            Cell::text("2024-01-15 09:30:00"),
            Cell::text("77"),
            Cell::text("bob"),
            Cell::text("12"),
            Cell::text(" a \n\n b "),
        ];
        let record = decode_report(&row).unwrap();
        assert_eq!(record.week_number, 3);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(record.score.value(), 10, "out-of-range stored score is clamped");
        assert_eq!(record.completed_tasks, vec!["a", "b"]);
        assert!(record.planned_tasks.is_empty());
        assert_eq!(record.comment, "");
    }

    #[test]
    fn decodes_serial_dates() {
        let mut row = encode_report(&sample());
        row[1] = Cell::Number(45369.0);
        assert_eq!(
            decode_report(&row).unwrap().date,
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap()
        );
    }

    #[test]
    fn rejects_rows_without_week_or_user() {
        let mut row = encode_report(&sample());
        row[0] = Cell::text("week");
        assert_eq!(decode_report(&row).unwrap_err().column, "week");

        let mut row = encode_report(&sample());
        row[2] = Cell::empty();
        assert_eq!(decode_report(&row).unwrap_err().column, "user_id");

        let mut row = encode_report(&sample());
        row[0] = Cell::Number(0.0);
        assert_eq!(decode_report(&row).unwrap_err().column, "week");
    }

    #[test]
    fn header_comparison_is_case_insensitive() {
        let stored = header_row(&["Week", "DATE", "user_id", "username", "score", "completed_tasks", "planned_tasks", "comment"]);
        assert!(header_matches(&REPORT_HEADER, &stored));
        assert!(!header_matches(&REPORT_HEADER, &stored[..7]));
        assert!(!header_matches(&USER_HEADER, &stored));
    }

    #[test]
    fn user_summary_row() {
        let stats = UserStats::from_records("1001", [&sample()]);
        let summary = UserSummary::from_stats(&stats, "alice", Utc::now());
        let row = encode_user(&summary);
        assert_eq!(row.len(), USER_HEADER.len());
        assert_eq!(row[2], Cell::Number(1.0));
        assert_eq!(row[3], Cell::Number(12.0));
        assert_eq!(user_row_id(&row).as_deref(), Some("1001"));
    }
}
