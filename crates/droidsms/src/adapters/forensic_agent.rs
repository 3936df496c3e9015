//! Forensic acquisition agent copy of the live messaging database
//! (`agent_mmssms.db`). Message rows live in `mmssms`; attachment blobs live
//! in `data`, keyed by the owning message `_id`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use super::sqlite_source::{ensure_table, for_each_table_row, open_read_only, table_columns};
use super::{CanonicalField, ExtractionReport, FORENSIC_AGENT_SCHEMA, PartsTable};
use crate::models::{PartPayload, RawPart, RawRow, RawValue, SourceKind};

pub fn for_each_row<F>(path: &Path, mut visit: F) -> Result<ExtractionReport>
where
    F: FnMut(RawRow) -> Result<()>,
{
    let schema = &FORENSIC_AGENT_SCHEMA;
    let connection = open_read_only(path)?;
    ensure_table(
        &connection,
        path,
        schema.primary_table,
        schema.required_columns,
    )?;

    let mut report = ExtractionReport::default();
    let mut parts_by_message = match schema.parts_table {
        Some(parts_table) => load_parts(&connection, parts_table, &mut report)?,
        None => BTreeMap::new(),
    };
    let id_column = schema
        .columns(CanonicalField::RowId)
        .next()
        .unwrap_or("_id");

    let mut row_index = 0u64;
    report.rows_read = for_each_table_row(&connection, schema.primary_table, |values| {
        let mut row = RawRow::new(SourceKind::ForensicAgent, path, row_index);
        row_index += 1;
        if let Some(message_id) = values.get(id_column).and_then(RawValue::as_i64)
            && let Some(parts) = parts_by_message.remove(&message_id)
        {
            row.joined_parts = parts;
        }
        row.values = values;
        visit(row)
    })?;

    for (message_id, parts) in parts_by_message {
        report.warnings.push(format!(
            "{} attachment part(s) reference missing message {message_id}",
            parts.len()
        ));
    }

    Ok(report)
}

fn load_parts(
    connection: &Connection,
    parts_table: PartsTable,
    report: &mut ExtractionReport,
) -> Result<BTreeMap<i64, Vec<RawPart>>> {
    let columns = table_columns(connection, parts_table.table)?;
    let has = |column: &str| columns.iter().any(|existing| existing == column);
    if columns.is_empty() {
        return Ok(BTreeMap::new());
    }
    if !has(parts_table.message_id_column) || !has(parts_table.data_column) {
        report.warnings.push(format!(
            "parts table `{}` lacks `{}`/`{}`; attachments skipped",
            parts_table.table, parts_table.message_id_column, parts_table.data_column
        ));
        return Ok(BTreeMap::new());
    }

    let mut parts_by_message = BTreeMap::<i64, Vec<RawPart>>::new();
    let mut unkeyed = 0usize;
    for_each_table_row(connection, parts_table.table, |values| {
        let Some(message_id) = values
            .get(parts_table.message_id_column)
            .and_then(RawValue::as_i64)
        else {
            unkeyed += 1;
            return Ok(());
        };

        let declared_mime = values
            .get(parts_table.mime_column)
            .and_then(RawValue::as_text)
            .map(|mime| mime.trim().to_string())
            .filter(|mime| !mime.is_empty());
        let payload = match values.get(parts_table.data_column) {
            Some(RawValue::Bytes(bytes)) => PartPayload::Inline(bytes.clone()),
            Some(RawValue::Text(text)) => PartPayload::Inline(text.as_bytes().to_vec()),
            _ => PartPayload::Missing,
        };

        let parts = parts_by_message.entry(message_id).or_default();
        let index = parts.len();
        parts.push(RawPart {
            index,
            declared_mime,
            payload,
        });
        Ok(())
    })?;

    if unkeyed > 0 {
        report.warnings.push(format!(
            "{unkeyed} attachment part(s) without a message id were ignored"
        ));
    }
    Ok(parts_by_message)
}
