//! Loader stage: delimited file to [`Table`]

use crate::error::{ErrorCode, PipelineError, Result};
use crate::table::{infer_column_type, parse_cell, ColumnType, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Options controlling how a delimited file is parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter, must be a single ASCII character
    pub delimiter: char,
    /// Cell contents read as null
    pub null_values: Vec<String>,
    /// Infer integer/float/bool columns; when off every cell is a string
    pub infer_types: bool,
    /// Trim surrounding whitespace from headers and fields
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            null_values: default_null_values(),
            infer_types: true,
            trim: false,
        }
    }
}

fn default_null_values() -> Vec<String> {
    [
        "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A",
        "<NA>",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl CsvOptions {
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii())
            .ok_or_else(|| {
                PipelineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!(
                        "delimiter must be a single ASCII character, got {:?}",
                        self.delimiter
                    ),
                )
            })
    }
}

fn csv_error(path: &Path, err: csv::Error) -> PipelineError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => PipelineError::source_unavailable(path, io_err),
        csv::ErrorKind::Utf8 { pos, err } => PipelineError::malformed(
            ErrorCode::SOURCE_INVALID_UTF8,
            path,
            pos.map(|p| p.line()),
            err.to_string(),
        ),
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => PipelineError::malformed(
            ErrorCode::SOURCE_RAGGED_RECORD,
            path,
            pos.map(|p| p.line()),
            format!("expected {} fields, found {}", expected_len, len),
        ),
        _ => PipelineError::malformed(ErrorCode::SOURCE_MALFORMED, path, None, message),
    }
}

fn non_null<'r>(record: &'r csv::StringRecord, i: usize, nulls: &HashSet<&str>) -> Option<&'r str> {
    record.get(i).filter(|raw| !nulls.contains(raw))
}

/// Read a delimited file with a header row into a table.
///
/// Column types are inferred per column (see [`infer_column_type`]) unless
/// `options.infer_types` is off.
pub fn load_table(path: &Path, options: &CsvOptions) -> Result<Table> {
    let delimiter = options.delimiter_byte()?;
    let file = File::open(path).map_err(|e| PipelineError::source_unavailable(path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(file);

    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
    if headers.is_empty() {
        return Err(PipelineError::malformed(
            ErrorCode::SOURCE_EMPTY,
            path,
            None,
            "no header row",
        ));
    }

    let mut seen = HashSet::new();
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(PipelineError::malformed(
                ErrorCode::SOURCE_DUPLICATE_HEADER,
                path,
                Some(1),
                format!("duplicate column '{}'", name),
            ));
        }
    }

    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| csv_error(path, e))?;

    let nulls: HashSet<&str> = options.null_values.iter().map(String::as_str).collect();
    let column_types: Vec<ColumnType> = (0..headers.len())
        .map(|i| {
            if options.infer_types {
                infer_column_type(records.iter().map(|r| non_null(r, i, &nulls)))
            } else {
                ColumnType::String
            }
        })
        .collect();

    let mut table = Table::new(headers.iter().map(String::from).collect());
    for record in &records {
        let row = column_types
            .iter()
            .enumerate()
            .map(|(i, ty)| parse_cell(non_null(record, i, &nulls), *ty))
            .collect();
        table.push_row(row);
    }

    debug!(
        "Loaded {} rows x {} columns from {} ({:?})",
        table.len(),
        table.columns().len(),
        path.display(),
        column_types
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_infers_column_types() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "file1.csv",
            "id,name,value1\n1,Alice,100\n2,Bob,200.5\n3,,\n",
        );

        let table = load_table(&path, &CsvOptions::default()).unwrap();

        assert_eq!(table.columns(), ["id", "name", "value1"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0, "id"), Some(&Value::Integer(1)));
        assert_eq!(table.get(1, "value1"), Some(&Value::Float(200.5)));
        assert_eq!(table.get(2, "name"), Some(&Value::Null));
        assert_eq!(table.get(2, "value1"), Some(&Value::Null));
    }

    #[test]
    fn test_load_without_inference_keeps_strings() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "codes.csv", "id,code\n1,007\nNA,010\n");
        let options = CsvOptions {
            infer_types: false,
            ..Default::default()
        };

        let table = load_table(&path, &options).unwrap();

        assert_eq!(table.get(0, "id"), Some(&Value::String("1".into())));
        assert_eq!(table.get(0, "code"), Some(&Value::String("007".into())));
        assert_eq!(table.get(1, "id"), Some(&Value::Null));
    }

    #[test]
    fn test_load_custom_delimiter_and_trim() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "semi.csv", "id ; name\n 1 ; Alice \n");
        let options = CsvOptions {
            delimiter: ';',
            trim: true,
            ..Default::default()
        };

        let table = load_table(&path, &options).unwrap();

        assert_eq!(table.columns(), ["id", "name"]);
        assert_eq!(table.get(0, "name"), Some(&Value::String("Alice".into())));
        assert_eq!(table.get(0, "id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_header_only_file_is_an_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty_rows.csv", "id,name\n");

        let table = load_table(&path, &CsvOptions::default()).unwrap();

        assert!(table.is_empty());
        assert_eq!(table.columns(), ["id", "name"]);
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.csv");

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();

        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn test_empty_file_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.csv", "");

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();

        assert_eq!(err.code(), ErrorCode::SOURCE_EMPTY);
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn test_ragged_record_is_malformed_with_line() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ragged.csv", "id,name\n1,Alice\n2\n");

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();

        match err {
            PipelineError::MalformedInput { code, line, .. } => {
                assert_eq!(code, ErrorCode::SOURCE_RAGGED_RECORD);
                assert_eq!(line, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.csv");
        fs::write(&path, b"id,name\n1,Jos\xe9\n").unwrap();

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();

        assert_eq!(err.code(), ErrorCode::SOURCE_INVALID_UTF8);
    }

    #[test]
    fn test_duplicate_header_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "dup.csv", "id,name,name\n1,a,b\n");

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();

        assert_eq!(err.code(), ErrorCode::SOURCE_DUPLICATE_HEADER);
    }

    #[test]
    fn test_other_csv_errors_keep_readable_message() {
        let err = csv::Reader::from_reader("id\nabc\n".as_bytes())
            .deserialize::<(i64,)>()
            .next()
            .unwrap()
            .unwrap_err();

        let err = csv_error(Path::new("file1.csv"), err);

        match &err {
            PipelineError::MalformedInput { code, message, .. } => {
                assert_eq!(*code, ErrorCode::SOURCE_MALFORMED);
                assert!(message.starts_with("CSV deserialize error"), "{message}");
                assert!(!message.contains("Deserialize {"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = write(&dir, "file1.csv", "id,name\n1,Alice\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores file modes
        if File::open(&path).is_ok() {
            return;
        }

        let err = load_table(&path, &CsvOptions::default()).unwrap_err();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(err.code(), ErrorCode::SOURCE_PERMISSION_DENIED);
        assert_eq!(err.kind(), "source_unavailable");
        assert!(err.is_retryable());
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let options = CsvOptions {
            delimiter: '→',
            ..Default::default()
        };
        let err = options.delimiter_byte().unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
    }
}
