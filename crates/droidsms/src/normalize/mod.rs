//! Raw rows to canonical messages.
//!
//! Everything here is a pure function of the row: no clock, no randomness,
//! no I/O. Source differences come from the static [`SourceSchema`] tables.

use serde_json::Value;

use crate::adapters::{CanonicalField, SourceSchema, schema_for};
use crate::attachments::collect_parts;
use crate::error::RowRejection;
use crate::models::{
    Attachment, CanonicalMessage, Direction, MessageType, RawPart, RawRow, RawValue, SourceKind,
};
use crate::utils::hash::short_hex_digest;
use crate::utils::phone::{PEER_UNNORMALIZED_FLAG, normalize_phone_number, split_addresses};
use crate::utils::time::{EpochUnit, epoch_to_unix_ms, round_to_nearest_second};

/// Leading body characters that take part in the identity key. Snippet
/// stores truncate bodies at arbitrary lengths, so only the first character
/// is comparable across sources.
pub const IDENTITY_BODY_PREFIX_CHARS: usize = 1;
const TRUNCATION_MARKERS: &[&str] = &["\u{2026}", "..."];
const MMS_FILE_MARKER: &str = "_mms_backup";

/// A normalized row whose MMS parts still have to be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub direction: Direction,
    pub peer: String,
    pub timestamp_unix_ms: u64,
    pub date_sent_unix_ms: Option<u64>,
    pub body: String,
    pub message_type: MessageType,
    pub recipients: Vec<String>,
    pub contact_name: Option<String>,
    pub location: Option<String>,
    pub flags: Vec<String>,
    pub source_kind: SourceKind,
    pub source_file: String,
    pub source_row: u64,
    pub identity_key: String,
    pub parts: Vec<RawPart>,
}

impl NormalizedRow {
    #[must_use]
    pub fn into_message(self, attachments: Vec<Attachment>) -> CanonicalMessage {
        CanonicalMessage {
            direction: self.direction,
            peer: self.peer,
            timestamp_unix_ms: self.timestamp_unix_ms,
            date_sent_unix_ms: self.date_sent_unix_ms,
            body: self.body,
            message_type: self.message_type,
            attachments,
            recipients: self.recipients,
            contact_name: self.contact_name,
            location: self.location,
            flags: self.flags,
            source_kind: self.source_kind,
            source_file: self.source_file,
            source_row: self.source_row,
            identity_key: self.identity_key,
        }
    }
}

pub fn normalize_row(row: &RawRow) -> Result<NormalizedRow, RowRejection> {
    let schema = schema_for(row.source_kind);
    let parts = collect_parts(row);
    let message_type = infer_message_type(row, schema, !parts.is_empty())?;

    let timestamp_unit = match message_type {
        MessageType::Sms => schema.sms_timestamp_unit,
        MessageType::Mms => schema.mms_timestamp_unit,
    };
    let timestamp_unix_ms = required_timestamp(row, schema, timestamp_unit)?;
    let date_sent_unix_ms = first_value(row, schema, CanonicalField::DateSent)
        .and_then(|(_, value)| value.as_i64())
        .and_then(|raw| epoch_to_unix_ms(raw, timestamp_unit).ok());

    let direction = infer_direction(row, schema, message_type);
    let body = join_body(
        first_text(row, schema, CanonicalField::Body),
        first_text(row, schema, CanonicalField::MmsBody),
    );

    let mut flags = Vec::new();
    let mut addresses = first_text(row, schema, CanonicalField::Peer)
        .map(|raw| {
            split_addresses(&raw)
                .into_iter()
                .map(normalize_phone_number)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter();
    let peer = match addresses.next() {
        Some(address) => {
            if !address.normalized {
                flags.push(PEER_UNNORMALIZED_FLAG.to_string());
            }
            address.value
        }
        None => String::new(),
    };

    let mut recipients = Vec::new();
    let extra_addresses = addresses.map(|address| address.value);
    let listed = [CanonicalField::Recipients, CanonicalField::MmsAddresses]
        .into_iter()
        .filter_map(|field| first_text(row, schema, field))
        .flat_map(|raw| parse_address_list(&raw))
        .map(|raw| normalize_phone_number(&raw).value);
    for address in extra_addresses.chain(listed) {
        if !address.is_empty() && address != peer && !recipients.contains(&address) {
            recipients.push(address);
        }
    }

    let identity_key = identity_key(&peer, timestamp_unix_ms, message_type, &body);
    Ok(NormalizedRow {
        direction,
        peer,
        timestamp_unix_ms,
        date_sent_unix_ms,
        body,
        message_type,
        recipients,
        contact_name: first_text(row, schema, CanonicalField::ContactName)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        location: first_text(row, schema, CanonicalField::Location)
            .map(|location| location.trim().to_string())
            .filter(|location| !location.is_empty()),
        flags,
        source_kind: row.source_kind,
        source_file: row.source_file.to_string_lossy().into_owned(),
        source_row: row.row_index,
        identity_key,
        parts,
    })
}

/// Fingerprint shared by records that describe the same physical message.
#[must_use]
pub fn identity_key(
    peer: &str,
    timestamp_unix_ms: u64,
    message_type: MessageType,
    body: &str,
) -> String {
    let second = round_to_nearest_second(timestamp_unix_ms).to_string();
    let fingerprint = body_fingerprint(body);
    short_hex_digest(&[
        peer.as_bytes(),
        second.as_bytes(),
        message_type.as_str().as_bytes(),
        fingerprint.as_bytes(),
    ])
}

#[must_use]
pub fn body_fingerprint(body: &str) -> String {
    let mut trimmed = body.trim();
    while let Some(stripped) = TRUNCATION_MARKERS
        .iter()
        .find_map(|marker| trimmed.strip_suffix(marker))
    {
        trimmed = stripped.trim_end();
    }
    trimmed.chars().take(IDENTITY_BODY_PREFIX_CHARS).collect()
}

#[must_use]
pub const fn direction_from_flag(flag: i64) -> Direction {
    match flag {
        1 => Direction::Inbound,
        2 => Direction::Outbound,
        _ => Direction::Unknown,
    }
}

fn infer_message_type(
    row: &RawRow,
    schema: &SourceSchema,
    has_parts: bool,
) -> Result<MessageType, RowRejection> {
    if let Some((column, value)) = first_value(row, schema, CanonicalField::RowKind) {
        let kind = value.as_i64();
        return match kind {
            Some(kind) if schema.mms_row_kinds.contains(&kind) => Ok(MessageType::Mms),
            Some(kind) if schema.sms_row_kinds.contains(&kind) => Ok(if has_parts {
                MessageType::Mms
            } else {
                MessageType::Sms
            }),
            _ => Err(RowRejection::NotAMessage {
                reason: format!("{column} {}", display_raw(value)),
            }),
        };
    }

    if has_parts || row.source_file_name().contains(MMS_FILE_MARKER) {
        Ok(MessageType::Mms)
    } else {
        Ok(MessageType::Sms)
    }
}

fn infer_direction(row: &RawRow, schema: &SourceSchema, message_type: MessageType) -> Direction {
    let preferred = match message_type {
        MessageType::Mms => [CanonicalField::MmsDirection, CanonicalField::Direction],
        MessageType::Sms => [CanonicalField::Direction, CanonicalField::MmsDirection],
    };
    preferred
        .into_iter()
        .find_map(|field| first_value(row, schema, field))
        .and_then(|(_, value)| value.as_i64())
        .map_or(Direction::Unknown, direction_from_flag)
}

fn required_timestamp(
    row: &RawRow,
    schema: &SourceSchema,
    unit: EpochUnit,
) -> Result<u64, RowRejection> {
    let Some((column, value)) = first_value(row, schema, CanonicalField::Timestamp) else {
        let column = schema
            .columns(CanonicalField::Timestamp)
            .next()
            .unwrap_or("date");
        return Err(RowRejection::UnparseableTimestamp {
            column: column.to_string(),
            raw: String::new(),
        });
    };

    value
        .as_i64()
        .and_then(|raw| epoch_to_unix_ms(raw, unit).ok())
        .ok_or_else(|| RowRejection::UnparseableTimestamp {
            column: column.to_string(),
            raw: display_raw(value),
        })
}

fn first_value<'r>(
    row: &'r RawRow,
    schema: &SourceSchema,
    field: CanonicalField,
) -> Option<(&'static str, &'r RawValue)> {
    schema
        .columns(field)
        .find_map(|column| row.get(column).map(|value| (column, value)))
}

fn first_text(row: &RawRow, schema: &SourceSchema, field: CanonicalField) -> Option<String> {
    first_value(row, schema, field).map(|(_, value)| text_lossy(value))
}

fn text_lossy(value: &RawValue) -> String {
    match value {
        RawValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.as_text().unwrap_or_default(),
    }
}

fn display_raw(value: &RawValue) -> String {
    let text = text_lossy(value);
    if text.chars().count() > 32 {
        format!("{}...", text.chars().take(32).collect::<String>())
    } else {
        text
    }
}

fn join_body(body: Option<String>, mms_body: Option<String>) -> String {
    let body = body.unwrap_or_default();
    let mms_body = mms_body.unwrap_or_default();
    match (body.is_empty(), mms_body.is_empty()) {
        (false, false) => format!("{body}; {mms_body}"),
        (true, _) => mms_body,
        (false, true) => body,
    }
}

/// Reads a JSON array (strings or `{ "address": ... }` objects) or a plain
/// comma separated list.
fn parse_address_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[')
        && let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed)
    {
        return items
            .iter()
            .filter_map(|item| match item {
                Value::String(address) => Some(address.clone()),
                Value::Object(object) => object
                    .get("address")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect();
    }

    split_addresses(trimmed)
        .into_iter()
        .map(str::to_string)
        .collect()
}
