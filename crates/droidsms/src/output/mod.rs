//! CSV and JSON artifacts of a run.
//!
//! The CSV uses Excel conventions: comma separated, fields quoted only when
//! they contain a comma, a quote or a line break, rows ending in `\r\n`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ArtifactLayout;
use crate::error::RecoveryError;
use crate::models::{Attachment, CanonicalMessage, json_schema};
use crate::pipeline::RunSummary;
use crate::utils::time::format_unix_ms;

pub const CSV_COLUMNS: [&str; 12] = [
    "direction",
    "peer",
    "timestamp",
    "body",
    "messageType",
    "attachmentPaths",
    "sourceKind",
    "sourceFile",
    "dateSent",
    "recipients",
    "contactName",
    "location",
];

const LINE_ENDING: &str = "\r\n";
const LIST_SEPARATOR: &str = ";";

#[must_use]
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Semicolon-joined attachment paths; unresolved parts show as
/// [`Attachment::PLACEHOLDER_MARKER`].
#[must_use]
pub fn attachment_paths(message: &CanonicalMessage) -> String {
    message
        .attachments
        .iter()
        .map(|attachment| {
            attachment
                .relative_path
                .as_deref()
                .unwrap_or(Attachment::PLACEHOLDER_MARKER)
        })
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

pub fn csv_record(message: &CanonicalMessage) -> Result<Vec<String>> {
    let timestamp = format_unix_ms(message.timestamp_unix_ms)
        .with_context(|| format!("failed to format timestamp of {}", message.identity_key))?;
    let date_sent = message
        .date_sent_unix_ms
        .map(format_unix_ms)
        .transpose()
        .with_context(|| format!("failed to format date_sent of {}", message.identity_key))?
        .unwrap_or_default();

    Ok(vec![
        message.direction.as_str().to_string(),
        message.peer.clone(),
        timestamp,
        message.body.clone(),
        message.message_type.as_str().to_string(),
        attachment_paths(message),
        message.source_kind.as_str().to_string(),
        message.source_file.clone(),
        date_sent,
        message.recipients.join(LIST_SEPARATOR),
        message.contact_name.clone().unwrap_or_default(),
        message.location.clone().unwrap_or_default(),
    ])
}

fn push_line<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line = fields
        .iter()
        .map(|field| escape_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str(LINE_ENDING);
}

pub fn render_csv(messages: &[CanonicalMessage]) -> Result<String> {
    let mut out = String::new();
    push_line(&mut out, &CSV_COLUMNS);
    for message in messages {
        push_line(&mut out, &csv_record(message)?);
    }
    Ok(out)
}

/// Writes the CSV through a temporary sibling so a failed run never leaves a
/// truncated file behind.
pub fn write_csv_atomic(path: &Path, messages: &[CanonicalMessage]) -> Result<()> {
    let rendered = render_csv(messages)?;
    write_atomic(path, rendered.as_bytes())
}

pub fn write_summary_artifact(path: &Path, summary: &RunSummary) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(summary).context("failed to encode run summary")?;
    write_atomic(path, &encoded)
}

pub fn write_schema_artifact(path: &Path) -> Result<()> {
    let encoded =
        serde_json::to_vec_pretty(&json_schema()).context("failed to encode message schema")?;
    write_atomic(path, &encoded)
}

pub fn write_run_artifacts(
    layout: &ArtifactLayout,
    messages: &[CanonicalMessage],
    summary: &RunSummary,
) -> Result<()> {
    write_csv_atomic(&layout.csv, messages)?;
    write_summary_artifact(&layout.summary_json, summary)?;
    write_schema_artifact(&layout.schema_json)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|error| RecoveryError::output_write_failed(parent, error))?;
    }

    let staging = staging_path(path);
    let written = std::fs::File::create(&staging).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(error) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(RecoveryError::output_write_failed(path, error).into());
    }

    if let Err(error) = std::fs::rename(&staging, path) {
        let _ = std::fs::remove_file(&staging);
        return Err(RecoveryError::output_write_failed(path, error).into());
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.partial", std::process::id()))
}
