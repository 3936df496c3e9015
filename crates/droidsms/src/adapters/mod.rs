pub mod backup_agent;
pub mod forensic_agent;
pub mod sqlite_source;
pub mod vendor_log;

use std::path::Path;

use anyhow::Result;

use crate::models::{RawRow, SourceKind};
use crate::utils::time::EpochUnit;

/// Canonical fields a source column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    RowId,
    Peer,
    Timestamp,
    DateSent,
    Body,
    MmsBody,
    Direction,
    MmsDirection,
    Recipients,
    MmsAddresses,
    ContactName,
    Location,
    RowKind,
}

/// Companion table holding MMS parts joined to the primary table by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartsTable {
    pub table: &'static str,
    pub message_id_column: &'static str,
    pub mime_column: &'static str,
    pub data_column: &'static str,
}

/// Static description of one source format: where rows live and which
/// native column feeds each canonical field. Several entries for one field
/// are tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSchema {
    pub kind: SourceKind,
    pub primary_table: &'static str,
    pub required_columns: &'static [&'static str],
    pub parts_table: Option<PartsTable>,
    pub fields: &'static [(CanonicalField, &'static str)],
    pub sms_timestamp_unit: EpochUnit,
    pub mms_timestamp_unit: EpochUnit,
    /// `RowKind` values that denote SMS and MMS rows.
    pub sms_row_kinds: &'static [i64],
    pub mms_row_kinds: &'static [i64],
}

impl SourceSchema {
    pub fn columns(&self, field: CanonicalField) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(move |(candidate, _)| *candidate == field)
            .map(|(_, column)| *column)
    }
}

pub const BACKUP_AGENT_SCHEMA: SourceSchema = SourceSchema {
    kind: SourceKind::BackupAgent,
    primary_table: "",
    required_columns: &[],
    parts_table: None,
    fields: &[
        (CanonicalField::RowId, "_id"),
        (CanonicalField::RowId, "id"),
        (CanonicalField::RowId, "row_id"),
        (CanonicalField::Peer, "address"),
        (CanonicalField::Timestamp, "date"),
        (CanonicalField::DateSent, "date_sent"),
        (CanonicalField::Body, "body"),
        (CanonicalField::MmsBody, "mms_body"),
        (CanonicalField::Direction, "type"),
        (CanonicalField::MmsDirection, "msg_box"),
        (CanonicalField::Recipients, "recipients"),
        (CanonicalField::MmsAddresses, "mms_addresses"),
    ],
    sms_timestamp_unit: EpochUnit::Millis,
    mms_timestamp_unit: EpochUnit::Seconds,
    sms_row_kinds: &[],
    mms_row_kinds: &[],
};

pub const VENDOR_LOG_SCHEMA: SourceSchema = SourceSchema {
    kind: SourceKind::VendorLog,
    primary_table: "logs",
    required_columns: &["number", "date", "type"],
    parts_table: None,
    fields: &[
        (CanonicalField::RowId, "_id"),
        (CanonicalField::Peer, "number"),
        (CanonicalField::Timestamp, "date"),
        (CanonicalField::Body, "m_content"),
        (CanonicalField::Direction, "type"),
        (CanonicalField::ContactName, "name"),
        (CanonicalField::Location, "geocoded_location"),
        (CanonicalField::RowKind, "logtype"),
    ],
    sms_timestamp_unit: EpochUnit::Millis,
    mms_timestamp_unit: EpochUnit::Millis,
    sms_row_kinds: &[300],
    mms_row_kinds: &[200],
};

pub const FORENSIC_AGENT_SCHEMA: SourceSchema = SourceSchema {
    kind: SourceKind::ForensicAgent,
    primary_table: "mmssms",
    required_columns: &["_id", "address", "date", "type"],
    parts_table: Some(PartsTable {
        table: "data",
        message_id_column: "_id",
        mime_column: "attachment_type",
        data_column: "attachment_data",
    }),
    fields: &[
        (CanonicalField::RowId, "_id"),
        (CanonicalField::Peer, "address"),
        (CanonicalField::Timestamp, "date"),
        (CanonicalField::DateSent, "date_sent"),
        (CanonicalField::Body, "body"),
        (CanonicalField::Direction, "type"),
    ],
    sms_timestamp_unit: EpochUnit::Millis,
    mms_timestamp_unit: EpochUnit::Millis,
    sms_row_kinds: &[],
    mms_row_kinds: &[],
};

#[must_use]
pub const fn schema_for(kind: SourceKind) -> &'static SourceSchema {
    match kind {
        SourceKind::BackupAgent => &BACKUP_AGENT_SCHEMA,
        SourceKind::VendorLog => &VENDOR_LOG_SCHEMA,
        SourceKind::ForensicAgent => &FORENSIC_AGENT_SCHEMA,
    }
}

/// What one source file yielded besides its rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub rows_read: usize,
    pub corrupt_rows: usize,
    pub warnings: Vec<String>,
}

/// Streams every row of `path` into `visit`, in file order.
///
/// A file that cannot be read as the expected format fails with
/// [`crate::error::RecoveryError::SourceUnreadable`]; errors returned by
/// `visit` abort the file and are passed through unchanged.
pub fn for_each_row<F>(path: &Path, kind: SourceKind, visit: F) -> Result<ExtractionReport>
where
    F: FnMut(RawRow) -> Result<()>,
{
    match kind {
        SourceKind::BackupAgent => for_each_backup_row(path, visit),
        SourceKind::VendorLog => vendor_log::for_each_row(path, visit),
        SourceKind::ForensicAgent => forensic_agent::for_each_row(path, visit),
    }
}

fn for_each_backup_row<F>(path: &Path, mut visit: F) -> Result<ExtractionReport>
where
    F: FnMut(RawRow) -> Result<()>,
{
    let file = backup_agent::BackupAgentFile::open(path)?;
    let mut report = ExtractionReport::default();

    match file.encoding() {
        backup_agent::BackupEncoding::EntityStream => {
            let mut decoder = file.entity_rows();
            for row in decoder.by_ref() {
                report.rows_read += 1;
                visit(row)?;
            }
            let stats = decoder.stats();
            report.corrupt_rows = stats.corrupt_rows;
            report
                .warnings
                .extend(decoder.corruptions().iter().map(ToString::to_string));
            if stats.orphan_entities > 0 {
                report.warnings.push(format!(
                    "{} entities outside any row were ignored",
                    stats.orphan_entities
                ));
            }
        }
        backup_agent::BackupEncoding::CompressedJson => {
            let parsed = file.json_rows()?;
            report.corrupt_rows = parsed.skipped.len();
            for position in &parsed.skipped {
                report
                    .warnings
                    .push(format!("json record {position} is not an object; skipped"));
            }
            for row in parsed.rows {
                report.rows_read += 1;
                visit(row)?;
            }
        }
    }

    Ok(report)
}
