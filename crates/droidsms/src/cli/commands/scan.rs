use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{DEFAULT_FOLDER, RuntimePaths, resolve_user_path};
use crate::discovery::{FormatSupport, KNOWN_FORMATS, discover};

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Folder holding the unpacked backup.
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_FOLDER)]
    pub folder: PathBuf,
}

pub fn run(args: &ScanArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let folder = resolve_user_path(&args.folder, runtime_paths)?;
    println!("scan: start folder={}", folder.display());

    println!("scan: stage discover");
    let report = discover(&folder)?;
    let counts = report.format_counts();
    for format in &KNOWN_FORMATS {
        let count = counts.get(format.name).copied().unwrap_or(0);
        let support = match format.support {
            FormatSupport::Supported(kind) => kind.as_str(),
            FormatSupport::Unsupported { .. } => "unsupported",
        };
        println!(
            "scan: format name={} status={} count={} support={} description={}",
            format.name,
            if count > 0 { "found" } else { "not_found" },
            count,
            support,
            format.description
        );
    }

    for source in &report.sources {
        println!(
            "scan: source kind={} path={}",
            source.kind.as_str(),
            source.path.display()
        );
    }
    for item in &report.unsupported {
        println!(
            "scan: unsupported format={} path={} hint={}",
            item.format_name,
            item.path.display(),
            item.hint
        );
    }
    for location in &report.notable_locations {
        println!("scan: notable_location path={}", location.display());
    }
    for warning in &report.location_warnings {
        println!("scan: location_warning detail={warning}");
    }

    println!(
        "scan: complete files_seen={} sources={} unsupported={}",
        report.files_seen,
        report.sources.len(),
        report.unsupported.len()
    );
    Ok(())
}
