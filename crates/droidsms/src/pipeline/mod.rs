//! Run orchestration: discovered files in, merged messages and a run summary
//! out. Nothing here prints; the command layer reports the summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters;
use crate::attachments::{AttachmentResolver, ResolverStats};
use crate::discovery::{DetectedUnsupported, DiscoveredSource};
use crate::error::{RecoveryError, RowRejection};
use crate::merge::merge_messages;
use crate::models::{CanonicalMessage, SCHEMA_VERSION, SourceKind, all_source_kinds};
use crate::normalize::normalize_row;

/// Rows rejected for a bad timestamp are listed individually up to this
/// many per file, then only counted.
const MAX_ROW_DIAGNOSTICS_PER_FILE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Directory that receives `mms-attachments/`.
    pub output_dir: PathBuf,
    /// Abort on the first unreadable source instead of skipping it.
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHealthStatus {
    Success,
    PartialFailure,
    Failed,
    Skipped,
}

impl SourceHealthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHealthReport {
    pub status: SourceHealthStatus,
    pub reason: Option<String>,
    pub files_considered: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub rows_read: usize,
    pub messages_normalized: usize,
    pub messages_kept: usize,
    pub corrupt_rows: usize,
    pub unparseable_timestamps: usize,
    pub non_message_rows: usize,
    pub attachment_failures: usize,
    pub duplicates_discarded: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SourceHealthReport {
    /// Rows read but not turned into messages.
    #[must_use]
    pub const fn rows_skipped(&self) -> usize {
        self.corrupt_rows + self.unparseable_timestamps + self.non_message_rows
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct SourceHealthAccumulator {
    files_considered: usize,
    files_processed: usize,
    files_failed: usize,
    rows_read: usize,
    messages_normalized: usize,
    corrupt_rows: usize,
    unparseable_timestamps: usize,
    non_message_rows: usize,
    attachment_failures: usize,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl SourceHealthAccumulator {
    fn finalize(self, messages_kept: usize, duplicates_discarded: usize) -> SourceHealthReport {
        let (status, reason) = if self.files_considered == 0 {
            (
                SourceHealthStatus::Skipped,
                Some("no_discovered_sources".to_string()),
            )
        } else if self.files_failed == 0 {
            (SourceHealthStatus::Success, None)
        } else if self.messages_normalized > 0 {
            (
                SourceHealthStatus::PartialFailure,
                Some("source_emitted_partial_results".to_string()),
            )
        } else {
            (
                SourceHealthStatus::Failed,
                Some("source_failed_without_emitting_messages".to_string()),
            )
        };

        SourceHealthReport {
            status,
            reason,
            files_considered: self.files_considered,
            files_processed: self.files_processed,
            files_failed: self.files_failed,
            rows_read: self.rows_read,
            messages_normalized: self.messages_normalized,
            messages_kept,
            corrupt_rows: self.corrupt_rows,
            unparseable_timestamps: self.unparseable_timestamps,
            non_message_rows: self.non_message_rows,
            attachment_failures: self.attachment_failures,
            duplicates_discarded,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub total_messages: usize,
    pub input_records: usize,
    pub duplicates_discarded: usize,
    pub rows_skipped: usize,
    pub sources: BTreeMap<SourceKind, SourceHealthReport>,
    pub unsupported: Vec<DetectedUnsupported>,
    pub attachments: ResolverStats,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    pub messages: Vec<CanonicalMessage>,
    pub summary: RunSummary,
}

/// Per-file tallies gathered while rows stream through the visitor.
#[derive(Debug, Default)]
struct FileTally {
    rows_seen: usize,
    unparseable_timestamps: usize,
    non_message_rows: usize,
    attachment_failures: usize,
    warnings: Vec<String>,
}

/// Extracts, normalizes and merges every discovered source.
///
/// Files that cannot be read are recorded and skipped unless
/// `options.fail_fast` is set. Messages normalized before a file failed are
/// kept. Only `OutputWriteFailed` (attachments directory) always aborts.
pub fn recover(
    sources: &[DiscoveredSource],
    unsupported: &[DetectedUnsupported],
    options: &RecoveryOptions,
) -> Result<RecoveryOutcome> {
    let mut resolver = AttachmentResolver::new(&options.output_dir);
    let mut health = all_source_kinds()
        .into_iter()
        .map(|kind| (kind, SourceHealthAccumulator::default()))
        .collect::<BTreeMap<_, _>>();
    let mut warnings = Vec::new();
    let mut messages = Vec::new();

    for source in sources {
        let accumulator = health.entry(source.kind).or_default();
        accumulator.files_considered += 1;

        let source_dir = source.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tally = FileTally::default();
        let mut file_messages = Vec::new();
        let result = adapters::for_each_row(&source.path, source.kind, |row| {
            tally.rows_seen += 1;
            let mut normalized = match normalize_row(&row) {
                Ok(normalized) => normalized,
                Err(RowRejection::UnparseableTimestamp { column, raw }) => {
                    tally.unparseable_timestamps += 1;
                    if tally.unparseable_timestamps <= MAX_ROW_DIAGNOSTICS_PER_FILE {
                        let error = RecoveryError::UnparseableTimestamp { column, raw };
                        tally.warnings.push(format!(
                            "{} row {}: {error}",
                            source.path.display(),
                            row.row_index
                        ));
                    }
                    return Ok(());
                }
                Err(RowRejection::NotAMessage { .. }) => {
                    tally.non_message_rows += 1;
                    return Ok(());
                }
            };

            let parts = std::mem::take(&mut normalized.parts);
            let resolved = resolver.resolve(&normalized.identity_key, source_dir, parts)?;
            tally.attachment_failures += resolved.failures.len();
            for failure in resolved.failures {
                tally.warnings.push(format!(
                    "{} row {}: {failure}",
                    source.path.display(),
                    row.row_index
                ));
            }
            file_messages.push(normalized.into_message(resolved.attachments));
            Ok(())
        });

        accumulator.rows_read += tally.rows_seen;
        accumulator.messages_normalized += file_messages.len();
        accumulator.unparseable_timestamps += tally.unparseable_timestamps;
        accumulator.non_message_rows += tally.non_message_rows;
        accumulator.attachment_failures += tally.attachment_failures;
        if tally.unparseable_timestamps > MAX_ROW_DIAGNOSTICS_PER_FILE {
            accumulator.warnings.push(format!(
                "{}: dropped {} rows with unparseable timestamps",
                source.path.display(),
                tally.unparseable_timestamps
            ));
        }
        accumulator.warnings.append(&mut tally.warnings);
        messages.append(&mut file_messages);

        match result {
            Ok(report) => {
                accumulator.files_processed += 1;
                accumulator.corrupt_rows += report.corrupt_rows;
                accumulator.warnings.extend(
                    report
                        .warnings
                        .into_iter()
                        .map(|warning| format!("{}: {warning}", source.path.display())),
                );
            }
            Err(error) if is_fatal(&error) => return Err(error),
            Err(error) if options.fail_fast => {
                return Err(error).with_context(|| {
                    format!(
                        "failed to extract {} source `{}`",
                        source.kind.as_str(),
                        source.path.display()
                    )
                });
            }
            Err(error) => {
                let diagnostic = format!(
                    "{} source skipped `{}`: {error:#}",
                    source.kind.as_str(),
                    source.path.display()
                );
                accumulator.files_failed += 1;
                accumulator.errors.push(diagnostic.clone());
                warnings.push(diagnostic);
            }
        }
    }

    for item in unsupported {
        warnings.push(format!(
            "unsupported {} detected at `{}`: {}",
            item.format_name,
            item.path.display(),
            item.hint
        ));
    }

    let (messages, merge_stats) = merge_messages(messages);
    resolver.prune_unreferenced(
        messages
            .iter()
            .flat_map(|message| message.attachments.iter()),
    )?;
    let mut kept_by_source = BTreeMap::<SourceKind, usize>::new();
    for message in &messages {
        *kept_by_source.entry(message.source_kind).or_insert(0) += 1;
    }

    let sources = health
        .into_iter()
        .map(|(kind, accumulator)| {
            let kept = kept_by_source.get(&kind).copied().unwrap_or(0);
            let discarded = merge_stats
                .discarded_by_source
                .get(&kind)
                .copied()
                .unwrap_or(0);
            (kind, accumulator.finalize(kept, discarded))
        })
        .collect::<BTreeMap<_, _>>();

    let summary = RunSummary {
        schema_version: SCHEMA_VERSION.to_string(),
        total_messages: messages.len(),
        input_records: merge_stats.input_records,
        duplicates_discarded: merge_stats.duplicates_discarded,
        rows_skipped: sources.values().map(SourceHealthReport::rows_skipped).sum(),
        sources,
        unsupported: unsupported.to_vec(),
        attachments: resolver.stats(),
        warnings,
    };

    Ok(RecoveryOutcome { messages, summary })
}

/// Whether an extraction error must end the run rather than skip the file.
#[must_use]
pub fn is_fatal(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<RecoveryError>(),
        Some(RecoveryError::OutputWriteFailed { .. })
    )
}
