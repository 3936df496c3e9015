use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::discovery::classifier::{ContentClass, classify_file};
use crate::error::RecoveryError;
use crate::models::RawValue;

/// Opens a source database without any chance of writing to it.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    let class = classify_file(path)?;
    if class != ContentClass::Sqlite {
        return Err(RecoveryError::source_unreadable(
            path,
            format!("expected a sqlite database, content looks like {}", class.as_str()),
        )
        .into());
    }

    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|error| RecoveryError::source_unreadable(path, error.to_string()))?;
    connection
        .execute_batch("PRAGMA query_only = ON;")
        .with_context(|| format!("failed to set query_only on {}", path.display()))?;
    Ok(connection)
}

/// Column names of `table`, empty when the table does not exist.
pub fn table_columns(connection: &Connection, table: &str) -> Result<Vec<String>> {
    let mut statement = connection
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .context("failed to prepare table_info query")?;
    let columns = statement
        .query_map([table], |row| row.get::<_, String>(0))
        .with_context(|| format!("failed to read columns of `{table}`"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to decode columns of `{table}`"))?;
    Ok(columns)
}

/// Fails with `SourceUnreadable` unless `table` exists with every column in
/// `required`.
pub fn ensure_table(
    connection: &Connection,
    path: &Path,
    table: &str,
    required: &[&str],
) -> Result<Vec<String>> {
    let columns = table_columns(connection, table)
        .map_err(|error| RecoveryError::source_unreadable(path, format!("{error:#}")))?;
    if columns.is_empty() {
        let reason = format!("missing table `{table}`");
        return Err(RecoveryError::source_unreadable(path, reason).into());
    }

    let missing = required
        .iter()
        .filter(|column| !columns.iter().any(|existing| existing.as_str() == **column))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(RecoveryError::source_unreadable(
            path,
            format!("table `{table}` lacks columns: {}", missing.join(", ")),
        )
        .into());
    }

    Ok(columns)
}

/// Streams every row of `table` as a column-name → value map.
pub fn for_each_table_row<F>(connection: &Connection, table: &str, mut visit: F) -> Result<usize>
where
    F: FnMut(BTreeMap<String, RawValue>) -> Result<()>,
{
    let sql = format!("SELECT * FROM {}", quote_identifier(table));
    let mut statement = connection
        .prepare(&sql)
        .with_context(|| format!("failed to prepare scan of `{table}`"))?;
    let column_names = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = statement
        .query([])
        .with_context(|| format!("failed to scan `{table}`"))?;
    let mut count = 0usize;
    while let Some(row) = rows
        .next()
        .with_context(|| format!("failed to step `{table}` at row {count}"))?
    {
        let mut values = BTreeMap::new();
        for (index, name) in column_names.iter().enumerate() {
            let value = row
                .get_ref(index)
                .with_context(|| format!("failed to read `{table}`.`{name}`"))?;
            values.insert(name.clone(), raw_value_from_ref(value));
        }
        visit(values)?;
        count += 1;
    }

    Ok(count)
}

#[must_use]
pub fn raw_value_from_ref(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(number) => RawValue::Integer(number),
        ValueRef::Real(number) => RawValue::Real(number),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => RawValue::Text(text.to_string()),
            Err(_) => RawValue::Bytes(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => RawValue::Bytes(bytes.to_vec()),
    }
}

#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
