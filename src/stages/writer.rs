//! Writer stage: [`Table`] to a pretty-printed JSON records file

use crate::error::{ErrorCode, ErrorExt, PipelineError, Result};
use crate::table::{Table, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const INDENT: &[u8] = b"    ";

fn destination_io(path: &Path, err: io::Error) -> PipelineError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorCode::DEST_PERMISSION_DENIED,
        _ => ErrorCode::DEST_UNWRITABLE,
    };
    PipelineError::destination_unwritable(code, path).with_source(err)
}

/// Render a table as a JSON array of row objects.
///
/// Objects list their fields alphabetically, so equal tables always
/// render to identical bytes.
pub fn records_to_string(table: &Table) -> Result<String> {
    let records: Vec<BTreeMap<&str, serde_json::Value>> = table
        .rows()
        .map(|row| {
            table
                .columns()
                .iter()
                .zip(row)
                .map(|(column, value)| (column.as_str(), value.to_json()))
                .collect()
        })
        .collect();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut serializer)
        .to_workflow_error(ErrorCode::WORKFLOW_GENERIC, "failed to render JSON records", None)?;
    buf.push(b'\n');

    String::from_utf8(buf).to_workflow_error(
        ErrorCode::WORKFLOW_GENERIC,
        "rendered JSON records are not UTF-8",
        None,
    )
}

/// Write a table to `path` as JSON records, replacing any existing file.
///
/// The content goes to a temporary file in the destination directory first
/// and is renamed into place, so readers never observe a partial file.
pub fn write_records(table: &Table, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(PipelineError::destination_unwritable(
            ErrorCode::DEST_PARENT_MISSING,
            path,
        ));
    }

    let contents = records_to_string(table)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| destination_io(path, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| destination_io(path, e))?;
    set_output_permissions(tmp.as_file(), path).map_err(|e| destination_io(path, e))?;
    tmp.persist(path).map_err(|e| destination_io(path, e.error))?;

    debug!("Wrote {} records to {}", table.len(), path.display());
    Ok(())
}

/// Keep the mode of a file being replaced; new files get 0644 instead of
/// the temporary file's 0600.
#[cfg(unix)]
fn set_output_permissions(file: &fs::File, path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(_) => fs::Permissions::from_mode(0o644),
    };
    file.set_permissions(permissions)
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &fs::File, _path: &Path) -> io::Result<()> {
    Ok(())
}

/// Read a JSON records file back into a table.
///
/// Columns are the union of object keys in first-seen order; fields an
/// object lacks are null.
pub fn read_records(path: &Path) -> Result<Table> {
    let contents = fs::read_to_string(path).map_err(|e| PipelineError::source_unavailable(path, e))?;
    let parsed: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
        PipelineError::malformed(ErrorCode::SOURCE_INVALID_JSON, path, None, e.to_string())
    })?;

    let not_records = |message: String| {
        PipelineError::malformed(ErrorCode::SOURCE_INVALID_JSON, path, None, message)
    };
    let serde_json::Value::Array(items) = parsed else {
        return Err(not_records("top-level value is not an array".to_string()));
    };

    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let serde_json::Value::Object(object) = item else {
            return Err(not_records(format!("record {} is not an object", i)));
        };
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(object);
    }

    let mut table = Table::new(columns.clone());
    for (i, object) in objects.into_iter().enumerate() {
        let row = columns
            .iter()
            .map(|column| match object.get(column) {
                None => Ok(Value::Null),
                Some(v) => Value::from_json(v).ok_or_else(|| {
                    not_records(format!("record {} field '{}' is not a scalar", i, column))
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        table.push_row(row);
    }
    Ok(table)
}
