//! MMS part extraction into `<output-dir>/mms-attachments/`.
//!
//! Files are named `<identity_key>-<part_index>.<ext>`. An existing file with
//! identical bytes is reused; one with different bytes gets a numeric suffix
//! (`-1`, `-2`, ...). Parts whose bytes cannot be obtained become placeholder
//! attachments instead of failing their message. Failing to create the
//! directory or write a file ends the run. Files written for records that
//! later lose deduplication are removed again by
//! [`AttachmentResolver::prune_unreferenced`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::error::RecoveryError;
use crate::models::{Attachment, PartPayload, RawPart, RawRow};

pub const ATTACHMENTS_DIR_NAME: &str = "mms-attachments";
pub const DEFAULT_MIME: &str = "application/octet-stream";
const INLINE_PART_PREFIX: &str = "part_";

const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/bmp", "bmp"),
    ("image/heic", "heic"),
    ("image/*", "jpg"),
    ("video/mp4", "mp4"),
    ("video/3gpp", "3gp"),
    ("video/*", "mp4"),
    ("audio/amr", "amr"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/ogg", "ogg"),
    ("text/plain", "txt"),
    ("text/x-vcard", "vcf"),
    ("text/vcard", "vcf"),
    ("application/smil", "smil"),
    ("application/pdf", "pdf"),
    ("application/octet-stream", "bin"),
];

/// Gathers the parts of a row: parts joined from a companion table first,
/// then inline `part_<n>_data` / `part_<n>_ct` / `part_<n>_path` keys.
#[must_use]
pub fn collect_parts(row: &RawRow) -> Vec<RawPart> {
    let mut parts = row.joined_parts.clone();

    let mut inline = BTreeMap::<usize, InlinePart>::new();
    for (key, value) in &row.values {
        let Some((index, attribute)) = parse_inline_part_key(key) else {
            continue;
        };
        let entry = inline.entry(index).or_default();
        match attribute {
            "data" => entry.data = value.as_bytes().map(<[u8]>::to_vec),
            "ct" => entry.mime = value.as_text(),
            "path" => entry.path = value.as_text().map(PathBuf::from),
            _ => {}
        }
    }

    let base = parts.len();
    for (offset, part) in inline.into_values().enumerate() {
        let payload = match (part.data, part.path) {
            (Some(bytes), _) => PartPayload::Inline(bytes),
            (None, Some(path)) => PartPayload::Referenced(path),
            (None, None) => PartPayload::Missing,
        };
        parts.push(RawPart {
            index: base + offset,
            declared_mime: part.mime.filter(|mime| !mime.trim().is_empty()),
            payload,
        });
    }

    parts
}

#[derive(Debug, Default)]
struct InlinePart {
    data: Option<Vec<u8>>,
    mime: Option<String>,
    path: Option<PathBuf>,
}

fn parse_inline_part_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix(INLINE_PART_PREFIX)?;
    let (index, attribute) = rest.split_once('_')?;
    Some((index.parse().ok()?, attribute))
}

/// Identifies common MMS payloads by their leading bytes.
#[must_use]
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
        Some("image/webp")
    } else if bytes.get(4..8) == Some(b"ftyp".as_slice()) {
        if bytes.get(8..11) == Some(b"3gp".as_slice()) {
            Some("video/3gpp")
        } else {
            Some("video/mp4")
        }
    } else if bytes.starts_with(b"#!AMR") {
        Some("audio/amr")
    } else if bytes.starts_with(b"ID3") {
        Some("audio/mpeg")
    } else if bytes.starts_with(b"OggS") {
        Some("audio/ogg")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(b"BEGIN:VCARD") {
        Some("text/x-vcard")
    } else if bytes.starts_with(b"<smil") {
        Some("application/smil")
    } else {
        None
    }
}

/// File extension for a MIME type; unknown types fall back to their
/// alphanumeric subtype, then to `bin`.
#[must_use]
pub fn extension_for_mime(mime: &str) -> String {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if let Some((_, extension)) = EXTENSIONS.iter().find(|(known, _)| *known == essence) {
        return (*extension).to_string();
    }

    let subtype = essence
        .split_once('/')
        .map_or(essence.as_str(), |(_, subtype)| subtype)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>();
    if subtype.is_empty() {
        "bin".to_string()
    } else {
        subtype
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub written: usize,
    pub reused: usize,
    pub renamed: usize,
    pub placeholders: usize,
    pub pruned: usize,
}

#[derive(Debug)]
pub struct ResolvedParts {
    pub attachments: Vec<Attachment>,
    /// One `AttachmentExtractionFailed` per placeholder.
    pub failures: Vec<RecoveryError>,
}

/// Single writer for the attachments directory.
#[derive(Debug)]
pub struct AttachmentResolver {
    attachments_dir: PathBuf,
    dir_ready: bool,
    created: Vec<String>,
    stats: ResolverStats,
}

impl AttachmentResolver {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            attachments_dir: output_dir.join(ATTACHMENTS_DIR_NAME),
            dir_ready: false,
            created: Vec::new(),
            stats: ResolverStats::default(),
        }
    }

    #[must_use]
    pub fn attachments_dir(&self) -> &Path {
        &self.attachments_dir
    }

    #[must_use]
    pub const fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Persists each part and returns its provenance, in part order.
    /// Referenced payload paths are resolved against `source_dir`.
    pub fn resolve(
        &mut self,
        identity_key: &str,
        source_dir: &Path,
        parts: Vec<RawPart>,
    ) -> Result<ResolvedParts> {
        let mut attachments = Vec::with_capacity(parts.len());
        let mut failures = Vec::new();

        for part in parts {
            let bytes = match load_payload(&part, source_dir) {
                Ok(bytes) => bytes,
                Err(reason) => {
                    self.stats.placeholders += 1;
                    failures.push(RecoveryError::AttachmentExtractionFailed {
                        part_index: part.index,
                        reason,
                    });
                    attachments.push(Attachment::placeholder());
                    continue;
                }
            };

            let mime_type = part
                .declared_mime
                .clone()
                .or_else(|| sniff_mime(&bytes).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_MIME.to_string());
            let file_name = self.persist(identity_key, part.index, &mime_type, &bytes)?;
            attachments.push(Attachment {
                mime_type,
                relative_path: Some(format!("{ATTACHMENTS_DIR_NAME}/{file_name}")),
            });
        }

        Ok(ResolvedParts {
            attachments,
            failures,
        })
    }

    /// Deletes files written by this resolver that no kept attachment points
    /// to. Files that already existed before the run are left alone.
    pub fn prune_unreferenced<'a>(
        &mut self,
        kept: impl IntoIterator<Item = &'a Attachment>,
    ) -> Result<()> {
        let referenced = kept
            .into_iter()
            .filter_map(|attachment| attachment.relative_path.as_deref())
            .filter_map(|path| path.strip_prefix(ATTACHMENTS_DIR_NAME)?.strip_prefix('/'))
            .collect::<BTreeSet<_>>();

        for file_name in std::mem::take(&mut self.created) {
            if referenced.contains(file_name.as_str()) {
                continue;
            }
            let target = self.attachments_dir.join(&file_name);
            std::fs::remove_file(&target)
                .map_err(|error| RecoveryError::output_write_failed(&target, error))?;
            self.stats.pruned += 1;
        }
        Ok(())
    }

    fn persist(
        &mut self,
        identity_key: &str,
        part_index: usize,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String> {
        self.ensure_dir()?;
        let extension = extension_for_mime(mime_type);

        let mut suffix = 0usize;
        loop {
            let file_name = if suffix == 0 {
                format!("{identity_key}-{part_index}.{extension}")
            } else {
                format!("{identity_key}-{part_index}-{suffix}.{extension}")
            };
            let target = self.attachments_dir.join(&file_name);

            if !target.exists() {
                std::fs::write(&target, bytes)
                    .map_err(|error| RecoveryError::output_write_failed(&target, error))?;
                self.stats.written += 1;
                self.created.push(file_name.clone());
                if suffix > 0 {
                    self.stats.renamed += 1;
                }
                return Ok(file_name);
            }

            let existing = std::fs::read(&target)
                .map_err(|error| RecoveryError::output_write_failed(&target, error))?;
            if existing == bytes {
                self.stats.reused += 1;
                return Ok(file_name);
            }
            suffix += 1;
        }
    }

    fn ensure_dir(&mut self) -> Result<()> {
        if self.dir_ready {
            return Ok(());
        }
        std::fs::create_dir_all(&self.attachments_dir)
            .map_err(|error| RecoveryError::output_write_failed(&self.attachments_dir, error))?;
        self.dir_ready = true;
        Ok(())
    }
}

fn load_payload(part: &RawPart, source_dir: &Path) -> std::result::Result<Vec<u8>, String> {
    let bytes = match &part.payload {
        PartPayload::Inline(bytes) => bytes.clone(),
        PartPayload::Referenced(path) => {
            let resolved = if path.is_absolute() {
                path.clone()
            } else {
                source_dir.join(path)
            };
            std::fs::read(&resolved)
                .map_err(|error| format!("cannot read `{}`: {error}", resolved.display()))?
        }
        PartPayload::Missing => return Err("part has no payload".to_string()),
    };

    if bytes.is_empty() {
        return Err("part payload is empty".to_string());
    }
    Ok(bytes)
}
