//! Workbook reader.
//!
//! Cells are read with calamine and assembled column by column. A sheet whose
//! first row is blank gets its header repaired: the first non-blank row below
//! it becomes the header, and a sheet with no usable header row gets
//! positional names (`column_0`, `column_1`, ...).

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::Value;
use tracing::debug;

use crate::error::{CleaningError, Result};
use crate::utils::{datetimes_to_series, is_blank, is_placeholder_header, json_to_series};

/// Day zero of the 1900 date system, after Excel's leap-year quirk.
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Value(Value),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Header name of this cell; placeholder names left by an earlier export
    /// count as empty.
    fn header_text(&self) -> Option<String> {
        let text = match self {
            Cell::Empty => return None,
            Cell::Value(Value::String(s)) => s.trim().to_string(),
            Cell::Value(other) => other.to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d").to_string(),
        };
        (!is_placeholder_header(&text)).then_some(text)
    }
}

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let (y, m, d) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}

fn convert(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) if is_blank(s) => Cell::Empty,
        Data::String(s) => Cell::Value(Value::String(s.clone())),
        Data::Int(i) => Cell::Value(Value::from(*i)),
        // Workbooks store every number as a double.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
            Cell::Value(Value::from(*f as i64))
        }
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(|n| Cell::Value(Value::Number(n)))
            .unwrap_or(Cell::Empty),
        Data::Bool(b) => Cell::Value(Value::Bool(*b)),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Value(Value::String(s.clone())),
    }
}

/// Names of every sheet in a workbook, in workbook order.
pub fn sheet_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path.as_ref()).map_err(CleaningError::from)?;
    Ok(workbook.sheet_names())
}

pub(super) fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    if !path.exists() {
        return Err(CleaningError::Import(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(name) if names.iter().any(|n| n == name) => name.to_string(),
        Some(name) => {
            return Err(CleaningError::Import(format!(
                "sheet '{name}' not found; available: {}",
                names.join(", ")
            )));
        }
        None => names
            .first()
            .cloned()
            .ok_or_else(|| CleaningError::Import("workbook has no sheets".to_string()))?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    debug!("Reading sheet '{}' ({} x {})", sheet_name, range.height(), range.width());

    let rows: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(convert).collect())
        .collect();

    build_frame(rows)
}

/// Assemble a table from cell rows, repairing the header as needed.
fn build_frame(mut rows: Vec<Vec<Cell>>) -> Result<DataFrame> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if rows.is_empty() || width == 0 {
        return Err(CleaningError::Import("sheet is empty".to_string()));
    }
    for row in rows.iter_mut() {
        row.resize(width, Cell::Empty);
    }

    let blank_header = |row: &Vec<Cell>| row.iter().all(|cell| cell.header_text().is_none());

    let (names, body) = match rows.iter().position(|row| !blank_header(row)) {
        Some(header_idx) => {
            if header_idx > 0 {
                debug!("Header row was blank; using row {header_idx} as header");
            }
            let names = rows[header_idx]
                .iter()
                .enumerate()
                .map(|(i, cell)| cell.header_text().unwrap_or_else(|| format!("Unnamed: {i}")))
                .collect::<Vec<_>>();
            (names, rows.split_off(header_idx + 1))
        }
        None => {
            let names = (0..width).map(|i| format!("column_{i}")).collect();
            (names, rows)
        }
    };

    let mut columns = Vec::with_capacity(width);
    for (idx, name) in names.iter().enumerate() {
        let cells: Vec<&Cell> = body.iter().map(|row| &row[idx]).collect();
        columns.push(Column::from(column_series(name, &cells)?));
    }

    DataFrame::new(columns).map_err(|e| CleaningError::Schema(e.to_string()))
}

/// All-datetime columns become `Datetime`; anything else goes through the
/// JSON value rules.
fn column_series(name: &str, cells: &[&Cell]) -> Result<Series> {
    let mut non_empty = cells.iter().filter(|c| !c.is_empty()).peekable();
    let all_datetime =
        non_empty.peek().is_some() && non_empty.all(|c| matches!(c, Cell::DateTime(_)));

    if all_datetime {
        let values: Vec<Option<NaiveDateTime>> = cells
            .iter()
            .map(|c| match c {
                Cell::DateTime(dt) => Some(*dt),
                _ => None,
            })
            .collect();
        return Ok(datetimes_to_series(name, &values)?);
    }

    let values: Vec<Value> = cells
        .iter()
        .map(|c| match c {
            Cell::Empty => Value::Null,
            Cell::Value(v) => v.clone(),
            Cell::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        })
        .collect();
    Ok(json_to_series(name, &values))
}
