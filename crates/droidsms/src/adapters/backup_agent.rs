//! Telephony backup-agent containers.
//!
//! A container is a flat run of entities. Each entity is laid out as
//!
//! ```text
//! "Data" | key_len: i32 LE | data_size: i32 LE | key | NUL | pad4 | data | pad4
//! ```
//!
//! and a `"Foot"` chunk (or EOF) ends the stream. A data size of `-1` deletes
//! the key. Entities carry no row structure of their own: a row starts at a
//! header key (`_id`, `id`, `row_id`) and ends when a header key reappears
//! after a data key, at the explicit `__eor__` marker, or at the end of the
//! stream.
//!
//! Older agents instead write a zlib stream holding a JSON array of row
//! objects; [`BackupAgentFile`] accepts both.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::ZlibDecoder;
use serde_json::Value;

use crate::discovery::classifier::{ContentClass, classify_bytes};
use crate::error::RecoveryError;
use crate::models::{RawEntity, RawRow, RawValue, SourceKind};

pub const ENTITY_MAGIC: [u8; 4] = *b"Data";
pub const FOOTER_MAGIC: [u8; 4] = *b"Foot";
pub const DELETED_DATA_SIZE: i32 = -1;
pub const HEADER_KEYS: &[&str] = &["_id", "id", "row_id"];
pub const END_OF_ROW_KEY: &str = "__eor__";

const ENTITY_HEADER_LEN: usize = 12;
const ALIGNMENT: usize = 4;
const MAX_KEY_LEN: usize = 4 * 1024;
const MAX_INFLATED_BYTES: u64 = 256 * 1024 * 1024;

#[must_use]
pub fn is_header_key(key: &str) -> bool {
    HEADER_KEYS.contains(&key)
}

/// One step of the entity scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Entity(RawEntity),
    Deleted { key: String },
    Corrupt { offset: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntityHeader {
    key: String,
    data_size: i32,
    data_start: usize,
}

/// Pull-based reader over the raw entity framing.
#[derive(Debug, Clone)]
pub struct EntityScanner<'a> {
    bytes: &'a [u8],
    offset: usize,
    finished: bool,
}

impl<'a> EntityScanner<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            finished: false,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    fn read_header(&self, offset: usize) -> std::result::Result<EntityHeader, String> {
        let remaining = self.bytes.len().saturating_sub(offset);
        if remaining < ENTITY_HEADER_LEN {
            return Err(format!("truncated entity header ({remaining} bytes remain)"));
        }

        let magic = &self.bytes[offset..offset + 4];
        if magic != ENTITY_MAGIC {
            return Err(format!("unknown chunk magic {magic:02x?}"));
        }

        let key_len = read_i32_le(self.bytes, offset + 4);
        let data_size = read_i32_le(self.bytes, offset + 8);
        let key_len = usize::try_from(key_len)
            .ok()
            .filter(|len| (1..=MAX_KEY_LEN).contains(len))
            .ok_or_else(|| format!("invalid key length {key_len}"))?;

        let key_start = offset + ENTITY_HEADER_LEN;
        let key_end = key_start + key_len;
        if key_end >= self.bytes.len() {
            return Err(format!(
                "key length {key_len} exceeds remaining {} bytes",
                self.bytes.len() - key_start
            ));
        }
        if self.bytes[key_end] != 0 {
            return Err("key is not NUL terminated".to_string());
        }
        let key = std::str::from_utf8(&self.bytes[key_start..key_end])
            .map_err(|_| "key is not valid UTF-8".to_string())?
            .to_string();

        let data_start = align_up(key_end + 1).min(self.bytes.len());
        if data_size < DELETED_DATA_SIZE {
            return Err(format!("negative data size {data_size} for key `{key}`"));
        }
        if data_size > 0 && data_size as usize > self.bytes.len() - data_start {
            return Err(format!(
                "data size {data_size} for key `{key}` exceeds remaining {} bytes",
                self.bytes.len() - data_start
            ));
        }

        Ok(EntityHeader {
            key,
            data_size,
            data_start,
        })
    }

    /// Moves to the next aligned offset after `from` that starts a valid
    /// entity carrying a header key, or to EOF.
    fn resync(&mut self, from: usize) {
        let mut candidate = align_up(from + 1);
        while candidate + ENTITY_HEADER_LEN <= self.bytes.len() {
            if let Ok(header) = self.read_header(candidate)
                && is_header_key(&header.key)
            {
                self.offset = candidate;
                return;
            }
            candidate += ALIGNMENT;
        }
        self.offset = self.bytes.len();
    }
}

impl Iterator for EntityScanner<'_> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.offset >= self.bytes.len() {
            return None;
        }

        let offset = self.offset;
        if self.bytes[offset..].starts_with(&FOOTER_MAGIC) {
            self.finished = true;
            return None;
        }

        match self.read_header(offset) {
            Ok(header) if header.data_size == DELETED_DATA_SIZE => {
                self.offset = header.data_start;
                Some(ScanItem::Deleted { key: header.key })
            }
            Ok(header) => {
                let data_end = header.data_start + header.data_size as usize;
                let value = self.bytes[header.data_start..data_end].to_vec();
                self.offset = align_up(data_end).min(self.bytes.len());
                Some(ScanItem::Entity(RawEntity::new(header.key, value)))
            }
            Err(reason) => {
                self.resync(offset);
                Some(ScanItem::Corrupt { offset, reason })
            }
        }
    }
}

/// Counters kept while grouping entities into rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub entities: usize,
    pub rows_emitted: usize,
    pub corrupt_rows: usize,
    pub deleted_keys: usize,
    pub orphan_entities: usize,
}

#[derive(Debug)]
enum RowState {
    AwaitingHeader,
    InRow(BTreeMap<String, RawValue>),
}

/// Groups scanned entities into rows.
///
/// `AwaitingHeader` drops entities until a header key arrives; `InRow`
/// accumulates keys until a header key follows a data key (or repeats), the
/// end-of-row marker or the end of the stream. A corrupt entity discards the
/// pending row.
#[derive(Debug)]
pub struct BackupRowDecoder<'a> {
    scanner: EntityScanner<'a>,
    state: RowState,
    source_file: &'a Path,
    stats: DecodeStats,
    corruptions: Vec<RecoveryError>,
}

impl<'a> BackupRowDecoder<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8], source_file: &'a Path) -> Self {
        Self {
            scanner: EntityScanner::new(bytes),
            state: RowState::AwaitingHeader,
            source_file,
            stats: DecodeStats::default(),
            corruptions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// One `CorruptRow` per discarded row, in file order.
    #[must_use]
    pub fn corruptions(&self) -> &[RecoveryError] {
        &self.corruptions
    }

    /// A header key joins the pending row while that row holds only other
    /// header keys; a repeated header or any data key before it closes the row.
    fn extends_pending_row(&self, key: &str) -> bool {
        match &self.state {
            RowState::InRow(values) => {
                !values.contains_key(key) && values.keys().all(|existing| is_header_key(existing))
            }
            RowState::AwaitingHeader => false,
        }
    }

    fn finish_row(&mut self, values: BTreeMap<String, RawValue>) -> RawRow {
        let mut row = RawRow::new(
            SourceKind::BackupAgent,
            self.source_file,
            self.stats.rows_emitted as u64,
        );
        row.values = values;
        self.stats.rows_emitted += 1;
        row
    }
}

impl Iterator for BackupRowDecoder<'_> {
    type Item = RawRow;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(item) = self.scanner.next() else {
                return match std::mem::replace(&mut self.state, RowState::AwaitingHeader) {
                    RowState::InRow(values) => Some(self.finish_row(values)),
                    RowState::AwaitingHeader => None,
                };
            };

            match item {
                ScanItem::Corrupt { offset, reason } => {
                    self.state = RowState::AwaitingHeader;
                    self.stats.corrupt_rows += 1;
                    self.corruptions.push(RecoveryError::CorruptRow { offset, reason });
                }
                ScanItem::Deleted { key } => {
                    self.stats.deleted_keys += 1;
                    if let RowState::InRow(values) = &mut self.state {
                        values.remove(&key);
                    }
                }
                ScanItem::Entity(entity) => {
                    self.stats.entities += 1;
                    if entity.key == END_OF_ROW_KEY {
                        if let RowState::InRow(values) =
                            std::mem::replace(&mut self.state, RowState::AwaitingHeader)
                        {
                            return Some(self.finish_row(values));
                        }
                        continue;
                    }

                    if is_header_key(&entity.key) && !self.extends_pending_row(&entity.key) {
                        let mut next_values = BTreeMap::new();
                        next_values.insert(entity.key, RawValue::Bytes(entity.value));
                        let previous =
                            std::mem::replace(&mut self.state, RowState::InRow(next_values));
                        if let RowState::InRow(values) = previous {
                            return Some(self.finish_row(values));
                        }
                        continue;
                    }

                    match &mut self.state {
                        RowState::InRow(values) => {
                            values.insert(entity.key, RawValue::Bytes(entity.value));
                        }
                        RowState::AwaitingHeader => self.stats.orphan_entities += 1,
                    }
                }
            }
        }
    }
}

/// Encoding used by one backup-agent file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupEncoding {
    EntityStream,
    CompressedJson,
}

/// An opened backup-agent file. Rows can be decoded any number of times.
#[derive(Debug, Clone)]
pub struct BackupAgentFile {
    path: PathBuf,
    bytes: Vec<u8>,
    encoding: BackupEncoding,
}

impl BackupAgentFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read backup-agent file: {}", path.display()))?;
        Self::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        let encoding = match classify_bytes(&bytes) {
            ContentClass::EntityStream | ContentClass::Empty => BackupEncoding::EntityStream,
            ContentClass::ZlibStream => BackupEncoding::CompressedJson,
            ContentClass::Unknown if has_recoverable_entity(&bytes) => {
                BackupEncoding::EntityStream
            }
            other => {
                let reason = format!(
                    "not a backup-agent container (content looks like {})",
                    other.as_str()
                );
                return Err(RecoveryError::source_unreadable(path, reason).into());
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            encoding,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn encoding(&self) -> BackupEncoding {
        self.encoding
    }

    /// Lazily decodes the entity framing. Only meaningful for
    /// [`BackupEncoding::EntityStream`] files.
    #[must_use]
    pub fn entity_rows(&self) -> BackupRowDecoder<'_> {
        BackupRowDecoder::new(&self.bytes, &self.path)
    }

    /// Inflates and parses a [`BackupEncoding::CompressedJson`] file.
    pub fn json_rows(&self) -> Result<JsonRows> {
        let mut inflated = Vec::new();
        ZlibDecoder::new(self.bytes.as_slice())
            .take(MAX_INFLATED_BYTES + 1)
            .read_to_end(&mut inflated)
            .map_err(|error| {
                RecoveryError::source_unreadable(&self.path, format!("zlib: {error}"))
            })?;
        if inflated.len() as u64 > MAX_INFLATED_BYTES {
            return Err(RecoveryError::source_unreadable(
                &self.path,
                format!("inflated payload exceeds {MAX_INFLATED_BYTES} bytes"),
            )
            .into());
        }

        let document = serde_json::from_slice::<Value>(&inflated).map_err(|error| {
            RecoveryError::source_unreadable(&self.path, format!("json: {error}"))
        })?;
        let Value::Array(records) = document else {
            return Err(RecoveryError::source_unreadable(
                &self.path,
                "json backup root must be an array",
            )
            .into());
        };

        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();
        for (position, record) in records.into_iter().enumerate() {
            let Value::Object(object) = record else {
                skipped.push(position);
                continue;
            };
            let mut row = RawRow::new(SourceKind::BackupAgent, &self.path, rows.len() as u64);
            row.values = object
                .into_iter()
                .map(|(key, value)| (key, json_to_raw_value(value)))
                .collect();
            rows.push(row);
        }

        Ok(JsonRows { rows, skipped })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRows {
    pub rows: Vec<RawRow>,
    /// Array positions that were not objects.
    pub skipped: Vec<usize>,
}

/// Whether an aligned entity carrying a header key follows a damaged start.
/// The decoder then reports the leading bytes as one corrupt row.
fn has_recoverable_entity(bytes: &[u8]) -> bool {
    let mut scanner = EntityScanner::new(bytes);
    scanner.resync(0);
    scanner.offset < bytes.len()
}

fn json_to_raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(flag) => RawValue::Integer(i64::from(flag)),
        Value::Number(number) => number
            .as_i64()
            .map(RawValue::Integer)
            .or_else(|| number.as_f64().map(RawValue::Real))
            .unwrap_or(RawValue::Null),
        Value::String(text) => RawValue::Text(text),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

/// Serializes entities with the container framing. Used to build fixtures and
/// to re-encode decoded rows.
#[must_use]
pub fn encode_entities<'a>(
    entities: impl IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in entities {
        out.extend_from_slice(&ENTITY_MAGIC);
        out.extend_from_slice(&(key.len() as i32).to_le_bytes());
        let data_size = value.map_or(DELETED_DATA_SIZE, |bytes| bytes.len() as i32);
        out.extend_from_slice(&data_size.to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        pad_to_alignment(&mut out);
        if let Some(bytes) = value {
            out.extend_from_slice(bytes);
            pad_to_alignment(&mut out);
        }
    }
    out
}

#[must_use]
pub fn encode_footer() -> Vec<u8> {
    FOOTER_MAGIC.to_vec()
}

fn pad_to_alignment(out: &mut Vec<u8>) {
    out.resize(align_up(out.len()), 0);
}

const fn align_up(offset: usize) -> usize {
    offset.div_ceil(ALIGNMENT) * ALIGNMENT
}

fn read_i32_le(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
