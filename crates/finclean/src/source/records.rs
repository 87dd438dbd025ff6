use polars::prelude::*;
use serde_json::Value;

use crate::error::{CleaningError, Result};
use crate::types::Record;
use crate::utils::json_to_series;

/// Parse JSON text in records orient (`[{..}, ..]`) or columns orient
/// (`{"col": [..], ..}`).
pub(super) fn read_json(text: &str) -> Result<DataFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CleaningError::Import(format!("invalid JSON: {e}")))?;

    match value {
        Value::Array(items) => {
            let mut rows = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => rows.push(map),
                    other => {
                        return Err(CleaningError::Import(format!(
                            "record {idx} is not an object: {other}"
                        )));
                    }
                }
            }
            from_records(&rows)
        }
        Value::Object(map) => {
            let mut columns = Vec::with_capacity(map.len());
            for (name, values) in map {
                match values {
                    Value::Array(values) => columns.push((name, values)),
                    _ => {
                        return Err(CleaningError::Import(format!(
                            "column '{name}' is not an array"
                        )));
                    }
                }
            }
            from_columns(columns)
        }
        _ => Err(CleaningError::Import(
            "JSON must be an array of records or an object of columns".to_string(),
        )),
    }
}

/// Build a table from records. Column order follows first appearance; keys
/// missing from a record are null.
pub(super) fn from_records(rows: &[Record]) -> Result<DataFrame> {
    let mut names: Vec<&String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.contains(&key) {
                names.push(key);
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values: Vec<Value> = rows
                .iter()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            Column::from(json_to_series(name, &values))
        })
        .collect::<Vec<_>>();

    Ok(DataFrame::new(columns)?)
}

/// Build a table from a column dictionary.
pub(super) fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<DataFrame> {
    if let Some((first, values)) = columns.first() {
        let expected = values.len();
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != expected) {
            return Err(CleaningError::Schema(format!(
                "column '{name}' has {} values but '{first}' has {expected}",
                values.len()
            )));
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut built = Vec::with_capacity(columns.len());
    for (name, values) in &columns {
        if !seen.insert(name.as_str()) {
            return Err(CleaningError::Schema(format!("duplicate column '{name}'")));
        }
        built.push(Column::from(json_to_series(name, values)));
    }

    Ok(DataFrame::new(built)?)
}
