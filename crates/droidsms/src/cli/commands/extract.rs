use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{DEFAULT_FOLDER, DEFAULT_OUTPUT, RuntimePaths, resolve_run_paths};
use crate::pipeline::{RecoveryOptions, recover};

#[derive(Debug, Clone, Args)]
pub struct ExtractArgs {
    /// Folder holding the unpacked backup.
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_FOLDER)]
    pub folder: PathBuf,

    /// CSV file to write; attachments and reports land next to it.
    #[arg(short, long, value_name = "CSV", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,
}

pub fn run(args: &ExtractArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let paths = resolve_run_paths(
        &runtime_paths.home_dir,
        &runtime_paths.cwd,
        &args.folder,
        &args.output,
    )?;
    let layout = &paths.layout;
    println!(
        "extract: start fail_fast={} folder={} output={}",
        args.fail_fast,
        paths.folder.display(),
        layout.csv.display()
    );

    println!("extract: stage discover");
    let discovery = crate::discovery::discover(&paths.folder)?;
    println!(
        "extract: checkpoint discover_complete files_seen={} sources={} unsupported={}",
        discovery.files_seen,
        discovery.sources.len(),
        discovery.unsupported.len()
    );
    for warning in &discovery.location_warnings {
        println!("extract: discovery_detail level=warning detail={warning}");
    }

    println!("extract: stage recover");
    let options = RecoveryOptions {
        output_dir: layout.output_dir.clone(),
        fail_fast: args.fail_fast,
    };
    let outcome = recover(&discovery.sources, &discovery.unsupported, &options)?;
    let summary = &outcome.summary;
    println!(
        "extract: checkpoint recover_complete messages={} input_records={} duplicates_discarded={}",
        summary.total_messages, summary.input_records, summary.duplicates_discarded
    );
    for (kind, report) in &summary.sources {
        println!(
            "extract: source_health kind={} status={} reason={} files_considered={} files_processed={} files_failed={} rows_read={} messages_normalized={} messages_kept={} corrupt_rows={} unparseable_timestamps={} non_message_rows={} attachment_failures={} duplicates_discarded={}",
            kind.as_str(),
            report.status.as_str(),
            report.reason.as_deref().unwrap_or("none"),
            report.files_considered,
            report.files_processed,
            report.files_failed,
            report.rows_read,
            report.messages_normalized,
            report.messages_kept,
            report.corrupt_rows,
            report.unparseable_timestamps,
            report.non_message_rows,
            report.attachment_failures,
            report.duplicates_discarded
        );
        for warning in &report.warnings {
            println!(
                "extract: source_health_detail kind={} level=warning detail={}",
                kind.as_str(),
                warning
            );
        }
        for error in &report.errors {
            println!(
                "extract: source_health_detail kind={} level=error detail={}",
                kind.as_str(),
                error
            );
        }
    }
    for item in &summary.unsupported {
        println!(
            "extract: unsupported format={} path={} hint={}",
            item.format_name,
            item.path.display(),
            item.hint
        );
    }

    println!("extract: stage write_artifacts");
    crate::output::write_csv_atomic(&layout.csv, &outcome.messages)?;
    println!("extract: checkpoint csv_written {}", layout.csv.display());
    crate::output::write_summary_artifact(&layout.summary_json, summary)?;
    println!(
        "extract: checkpoint summary_written {}",
        layout.summary_json.display()
    );
    crate::output::write_schema_artifact(&layout.schema_json)?;
    println!(
        "extract: checkpoint schema_written {}",
        layout.schema_json.display()
    );

    println!(
        "extract: complete messages={} rows_skipped={} duplicates_discarded={} unsupported={} attachments_written={} attachments_reused={} attachments_pruned={} attachment_placeholders={}",
        summary.total_messages,
        summary.rows_skipped,
        summary.duplicates_discarded,
        summary.unsupported.len(),
        summary.attachments.written,
        summary.attachments.reused,
        summary.attachments.pruned,
        summary.attachments.placeholders
    );
    if summary.attachments.written > 0 || summary.attachments.reused > 0 {
        println!(
            "extract: artifacts csv={} attachments={} summary={} schema={}",
            layout.csv.display(),
            layout.attachments_dir.display(),
            layout.summary_json.display(),
            layout.schema_json.display()
        );
    } else {
        println!(
            "extract: artifacts csv={} summary={} schema={}",
            layout.csv.display(),
            layout.summary_json.display(),
            layout.schema_json.display()
        );
    }

    Ok(())
}
