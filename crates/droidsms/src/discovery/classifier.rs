use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const ENTITY_MAGIC: &[u8; 4] = b"Data";
const FOOTER_MAGIC: &[u8; 4] = b"Foot";
const MAX_CLASSIFY_BYTES: u64 = 64;

/// Container layout recognized from the leading bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Sqlite,
    ZlibStream,
    EntityStream,
    Empty,
    Unknown,
}

impl ContentClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::ZlibStream => "zlib",
            Self::EntityStream => "entity_stream",
            Self::Empty => "empty",
            Self::Unknown => "unknown",
        }
    }
}

#[must_use]
pub fn classify_bytes(sample: &[u8]) -> ContentClass {
    if sample.is_empty() {
        return ContentClass::Empty;
    }
    if sample.starts_with(SQLITE_HEADER) {
        return ContentClass::Sqlite;
    }
    if sample.starts_with(ENTITY_MAGIC) || sample.starts_with(FOOTER_MAGIC) {
        return ContentClass::EntityStream;
    }
    if looks_like_zlib_header(sample) {
        return ContentClass::ZlibStream;
    }
    ContentClass::Unknown
}

pub fn classify_file(path: &Path) -> Result<ContentClass> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open source file for classification: {path:?}"))?;
    let mut sample = Vec::new();
    file.take(MAX_CLASSIFY_BYTES)
        .read_to_end(&mut sample)
        .with_context(|| format!("failed to read source file for classification: {path:?}"))?;
    Ok(classify_bytes(&sample))
}

// RFC 1950: CM=8 deflate, CINFO<=7, and the first two bytes are a multiple of 31.
fn looks_like_zlib_header(sample: &[u8]) -> bool {
    let [cmf, flg, ..] = sample else {
        return false;
    };
    cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
}
