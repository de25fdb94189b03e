//! A1-notation ranges and an in-process grid that applies them.
//!
//! The grid backs the in-memory and local-file backends, so both behave like
//! the hosted service for the read/update/append calls the report store makes.

use super::traits::{Cell, Row};
use crate::retry::{ErrorCode, RemoteError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed `Sheet!A1:H9` reference. Rows are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub sheet: String,
    pub start_col: usize,
    pub start_row: usize,
    pub end_col: Option<usize>,
    pub end_row: Option<usize>,
}

impl RangeRef {
    pub fn parse(range: &str) -> Result<Self, RemoteError> {
        let invalid = || {
            RemoteError::new(
                ErrorCode::InvalidArgument,
                format!("unable to parse range: {range}"),
            )
        };

        let (sheet, cells) = match range.rsplit_once('!') {
            Some((sheet, cells)) => (sheet, Some(cells)),
            None => (range, None),
        };
        let sheet = sheet.trim().trim_matches('\'').to_string();
        if sheet.is_empty() {
            return Err(invalid());
        }

        let Some(cells) = cells else {
            return Ok(Self {
                sheet,
                start_col: 0,
                start_row: 1,
                end_col: None,
                end_row: None,
            });
        };

        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };
        let (start_col, start_row) = parse_cell(start).ok_or_else(invalid)?;
        let start_col = start_col.ok_or_else(invalid)?;

        let (end_col, end_row) = match end {
            Some(end) => {
                let (col, row) = parse_cell(end).ok_or_else(invalid)?;
                (Some(col.ok_or_else(invalid)?), row)
            }
            None => (Some(start_col), start_row),
        };

        if end_col.is_some_and(|end| end < start_col) {
            return Err(invalid());
        }

        Ok(Self {
            sheet,
            start_col,
            start_row: start_row.unwrap_or(1),
            end_col,
            end_row,
        })
    }

    fn column_span(&self, row_len: usize) -> std::ops::Range<usize> {
        let end = self.end_col.map_or(row_len, |c| (c + 1).min(row_len));
        self.start_col.min(end)..end
    }
}

/// Column letters to a 0-based index: `A` → 0, `Z` → 25, `AA` → 26.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// 0-based index to column letters.
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn parse_cell(cell: &str) -> Option<(Option<usize>, Option<usize>)> {
    let cell = cell.trim().replace('$', "");
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<usize>().ok()? {
            0 => return None,
            n => Some(n),
        }
    };
    if col.is_none() && row.is_none() {
        return None;
    }
    Some((col, row))
}

/// Named sheets of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    sheets: BTreeMap<String, Vec<Row>>,
}

impl Grid {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    /// All rows of a sheet as stored, for assertions and tooling.
    pub fn rows(&self, sheet: &str) -> &[Row] {
        self.sheets.get(sheet).map_or(&[], Vec::as_slice)
    }

    pub fn read(&self, range: &RangeRef) -> Vec<Row> {
        let Some(data) = self.sheets.get(&range.sheet) else {
            return Vec::new();
        };

        let first = range.start_row - 1;
        let last = range.end_row.map_or(data.len(), |end| end.min(data.len()));
        if first >= last {
            return Vec::new();
        }

        let mut rows: Vec<Row> = data[first..last]
            .iter()
            .map(|row| {
                let mut cells = row[range.column_span(row.len())].to_vec();
                while cells.last().is_some_and(Cell::is_blank) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }
        rows
    }

    pub fn write(&mut self, range: &RangeRef, rows: Vec<Row>) {
        let data = self.sheets.entry(range.sheet.clone()).or_default();
        place(data, range.start_row - 1, range.start_col, rows);
    }

    pub fn append(&mut self, range: &RangeRef, rows: Vec<Row>) {
        let data = self.sheets.entry(range.sheet.clone()).or_default();
        let next = data
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_blank()))
            .map_or(0, |last| last + 1)
            .max(range.start_row - 1);
        place(data, next, range.start_col, rows);
    }
}

fn place(data: &mut Vec<Row>, first_row: usize, first_col: usize, rows: Vec<Row>) {
    for (offset, row) in rows.into_iter().enumerate() {
        let index = first_row + offset;
        if data.len() <= index {
            data.resize_with(index + 1, Vec::new);
        }
        let target = &mut data[index];
        let needed = first_col + row.len();
        if target.len() < needed {
            target.resize_with(needed, Cell::empty);
        }
        for (col, cell) in row.into_iter().enumerate() {
            target[first_col + col] = cell;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Row {
        values.iter().map(|v| Cell::text(*v)).collect()
    }

    #[test]
    fn parses_common_ranges() {
        let r = RangeRef::parse("Reports!A2:H").unwrap();
        assert_eq!(r.sheet, "Reports");
        assert_eq!((r.start_col, r.start_row), (0, 2));
        assert_eq!((r.end_col, r.end_row), (Some(7), None));

        let r = RangeRef::parse("'Weekly Users'!B5:F5").unwrap();
        assert_eq!(r.sheet, "Weekly Users");
        assert_eq!((r.start_col, r.start_row, r.end_col, r.end_row), (1, 5, Some(5), Some(5)));

        let r = RangeRef::parse("Reports").unwrap();
        assert_eq!((r.start_col, r.start_row, r.end_col), (0, 1, None));

        let r = RangeRef::parse("Reports!A:H").unwrap();
        assert_eq!((r.start_row, r.end_row), (1, None));
    }

    #[test]
    fn rejects_malformed_ranges() {
        for bad in ["!A1", "Reports!", "Reports!H1:A1", "Reports!A0", "Reports!1a"] {
            let err = RangeRef::parse(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidArgument, "{bad}");
        }
    }

    #[test]
    fn column_letters_round_trip_edges() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("h"), Some(7));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
    }

    #[test]
    fn write_then_read_window() {
        let mut grid = Grid::default();
        grid.write(&RangeRef::parse("S!A1:C1").unwrap(), vec![row(&["a", "b", "c"])]);
        grid.write(&RangeRef::parse("S!B3").unwrap(), vec![row(&["x"])]);

        let all = grid.read(&RangeRef::parse("S").unwrap());
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], Vec::<Cell>::new());
        assert_eq!(all[2], row(&["", "x"]));

        let window = grid.read(&RangeRef::parse("S!B1:B1").unwrap());
        assert_eq!(window, vec![row(&["b"])]);
    }

    #[test]
    fn append_goes_after_last_non_empty_row() {
        let mut grid = Grid::default();
        let range = RangeRef::parse("S!A:C").unwrap();
        grid.write(&RangeRef::parse("S!A1").unwrap(), vec![row(&["header"])]);
        grid.append(&range, vec![row(&["one"])]);
        grid.append(&range, vec![row(&["two"]), row(&["three"])]);

        let rows = grid.read(&RangeRef::parse("S!A2:C").unwrap());
        assert_eq!(rows, vec![row(&["one"]), row(&["two"]), row(&["three"])]);
    }

    #[test]
    fn read_of_unknown_sheet_is_empty() {
        let grid = Grid::default();
        assert!(grid.read(&RangeRef::parse("Nope!A1:B2").unwrap()).is_empty());
    }
}
