//! Vendor `logs.db` snippet store (`logs` table). The table mixes call and
//! message entries; rows are copied verbatim and the normalizer decides which
//! ones are messages.

use std::path::Path;

use anyhow::Result;

use super::sqlite_source::{ensure_table, for_each_table_row, open_read_only};
use super::{ExtractionReport, VENDOR_LOG_SCHEMA};
use crate::models::{RawRow, SourceKind};

pub fn for_each_row<F>(path: &Path, mut visit: F) -> Result<ExtractionReport>
where
    F: FnMut(RawRow) -> Result<()>,
{
    let schema = &VENDOR_LOG_SCHEMA;
    let connection = open_read_only(path)?;
    ensure_table(
        &connection,
        path,
        schema.primary_table,
        schema.required_columns,
    )?;

    let mut row_index = 0u64;
    let rows_read = for_each_table_row(&connection, schema.primary_table, |values| {
        let mut row = RawRow::new(SourceKind::VendorLog, path, row_index);
        row.values = values;
        row_index += 1;
        visit(row)
    })?;

    Ok(ExtractionReport {
        rows_read,
        ..ExtractionReport::default()
    })
}
