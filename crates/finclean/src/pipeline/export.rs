//! Rendering a table in the export formats.

use polars::prelude::*;

use crate::error::{CleaningError, Result};
use crate::types::{ExportFormat, ExportOutput, Record};
use crate::utils::series_to_json;

/// Render `df` in the requested format.
pub fn export_table(df: &DataFrame, format: ExportFormat, separator: u8) -> Result<ExportOutput> {
    Ok(match format {
        ExportFormat::Table => ExportOutput::Table(df.clone()),
        ExportFormat::CsvText => ExportOutput::CsvText(to_csv_text(df, separator)?),
        ExportFormat::JsonText => ExportOutput::JsonText(to_json_text(df)?),
        ExportFormat::RecordList => ExportOutput::RecordList(to_records(df)?),
    })
}

/// Delimited text with a header row; nulls are written as empty fields.
pub fn to_csv_text(df: &DataFrame, separator: u8) -> Result<String> {
    let mut df = df.clone();
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(separator)
        .with_quote_char(b'"')
        .with_null_value(String::new())
        .finish(&mut df)?;

    String::from_utf8(buf).map_err(|e| {
        CleaningError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// One JSON object per row, keys in column order.
pub fn to_records(df: &DataFrame) -> Result<Vec<Record>> {
    let mut columns = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        let values = series_to_json(col.as_materialized_series())?;
        columns.push((col.name().to_string(), values));
    }

    let records = (0..df.height())
        .map(|row| {
            columns
                .iter()
                .map(|(name, values)| (name.clone(), values[row].clone()))
                .collect()
        })
        .collect();
    Ok(records)
}

/// Records-orient JSON text.
pub fn to_json_text(df: &DataFrame) -> Result<String> {
    Ok(serde_json::to_string(&to_records(df)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::utils::dates_to_series;

    fn sample() -> DataFrame {
        let mut df = df!(
            "id" => &[1i64, 2],
            "amount" => &[Some(10.5f64), None],
            "memo" => &["rent, office", "fees"],
        )
        .unwrap();
        let dates = dates_to_series(
            "date",
            &[NaiveDate::from_ymd_opt(2024, 1, 31), None],
        )
        .unwrap();
        df.with_column(dates).unwrap();
        df
    }

    #[test]
    fn test_csv_text() {
        let text = to_csv_text(&sample(), b',').unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,amount,memo,date");
        assert_eq!(lines[1], "1,10.5,\"rent, office\",2024-01-31");
        assert_eq!(lines[2], "2,,fees,");
    }

    #[test]
    fn test_records_keep_column_order_and_nulls() {
        let records = to_records(&sample()).unwrap();
        assert_eq!(records.len(), 2);

        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["id", "amount", "memo", "date"]);
        assert_eq!(records[0]["date"], json!("2024-01-31"));
        assert_eq!(records[1]["amount"], json!(null));
    }

    #[test]
    fn test_json_text_is_records_orient() {
        let text = to_json_text(&sample()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], json!(1));
        assert_eq!(parsed[1]["memo"], json!("fees"));
    }
}
