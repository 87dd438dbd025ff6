use std::io::Cursor;

use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;

use super::{CsvInput, ImportOptions};
use crate::error::{CleaningError, Result};

fn read_options(options: &ImportOptions) -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(options.infer_schema_length))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(options.csv_separator)
                .with_quote_char(Some(b'"')),
        )
}

/// Read delimited text with a header row.
pub(super) fn read_csv(input: &CsvInput, options: &ImportOptions) -> Result<DataFrame> {
    let df = match input {
        CsvInput::Path(path) => {
            if !path.exists() {
                return Err(CleaningError::Import(format!(
                    "file not found: {}",
                    path.display()
                )));
            }
            read_options(options)
                .try_into_reader_with_file_path(Some(path.clone()))?
                .finish()?
        }
        CsvInput::Text(text) => {
            if text.trim().is_empty() {
                return Err(CleaningError::Import("CSV text is empty".to_string()));
            }
            read_options(options)
                .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
                .finish()?
        }
    };
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::column_names;
    use std::io::Write;

    #[test]
    fn test_read_csv_text() {
        let df = read_csv(
            &CsvInput::Text("a,b\n1,x\n2,y\n".to_string()),
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_read_csv_custom_separator() {
        let options = ImportOptions {
            csv_separator: b';',
            ..ImportOptions::default()
        };
        let df = read_csv(&CsvInput::Text("a;b\n1;2\n".to_string()), &options).unwrap();
        assert_eq!(column_names(&df), vec!["a", "b"]);
    }

    #[test]
    fn test_read_csv_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,amount").unwrap();
        writeln!(file, "1,10.5").unwrap();
        let df = read_csv(
            &CsvInput::Path(file.path().to_path_buf()),
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(df.shape(), (1, 2));
    }

    #[test]
    fn test_missing_file() {
        let err = read_csv(
            &CsvInput::Path("/definitely/not/here.csv".into()),
            &ImportOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_ERROR");
    }
}
