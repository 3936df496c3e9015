use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::SourceKind;

/// One key/value pair decoded from a backup-agent container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntity {
    pub key: String,
    pub value: Vec<u8>,
    pub length: usize,
}

impl RawEntity {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        let length = value.len();
        Self {
            key: key.into(),
            value,
            length,
        }
    }
}

/// A source-native value copied verbatim from a container or database cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Textual view of the value. Byte values must be valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(value.to_string()),
            Self::Real(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.clone()),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Real(_) | Self::Null => None,
            Self::Text(_) | Self::Bytes(_) => self
                .as_text()
                .and_then(|text| text.trim().parse::<i64>().ok()),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Where the bytes of one MMS part live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartPayload {
    Inline(Vec<u8>),
    Referenced(PathBuf),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    pub index: usize,
    pub declared_mime: Option<String>,
    pub payload: PartPayload,
}

/// One logical source row keyed by the source's own column names.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub source_kind: SourceKind,
    pub source_file: PathBuf,
    /// Zero-based position of the row within its source file.
    pub row_index: u64,
    pub values: BTreeMap<String, RawValue>,
    /// Parts joined from a companion table, in part order.
    pub joined_parts: Vec<RawPart>,
}

impl RawRow {
    #[must_use]
    pub fn new(source_kind: SourceKind, source_file: &Path, row_index: u64) -> Self {
        Self {
            source_kind,
            source_file: source_file.to_path_buf(),
            row_index,
            values: BTreeMap::new(),
            joined_parts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, column: &str, value: RawValue) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.values.get(column).filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn source_file_name(&self) -> &str {
        self.source_file
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or_default()
    }
}
