use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;

pub mod classifier;

use crate::models::SourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSupport {
    Supported(SourceKind),
    /// Detected and reported, never decoded.
    Unsupported { hint: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFormat {
    pub name: &'static str,
    pub pattern: &'static str,
    pub description: &'static str,
    /// Package directory the file normally lives under.
    pub expected_location: Option<&'static str>,
    pub support: FormatSupport,
}

pub const KNOWN_FORMATS: [KnownFormat; 8] = [
    KnownFormat {
        name: "telephony_backup",
        pattern: r"^\d+_(sms|mms)_backup$",
        description: "telephony provider backup-agent chunk file",
        expected_location: Some("com.android.providers.telephony"),
        support: FormatSupport::Supported(SourceKind::BackupAgent),
    },
    KnownFormat {
        name: "vendor_logs_db",
        pattern: r"^logs\.db$",
        description: "vendor log provider snippet database",
        expected_location: Some("com.sec.android.provider.logsprovider"),
        support: FormatSupport::Supported(SourceKind::VendorLog),
    },
    KnownFormat {
        name: "forensic_agent_db",
        pattern: r"^agent_mmssms\.db$",
        description: "forensic agent copy of the live sms/mms database",
        expected_location: None,
        support: FormatSupport::Supported(SourceKind::ForensicAgent),
    },
    KnownFormat {
        name: "mmssms_db",
        pattern: r"^mmssms\.db$",
        description: "main sms database",
        expected_location: Some("com.android.providers.telephony"),
        support: FormatSupport::Unsupported {
            hint: "not decoded yet; copy it out with a forensic agent as agent_mmssms.db",
        },
    },
    KnownFormat {
        name: "bugle_db",
        pattern: r"^bugle_db$",
        description: "new generation messaging database",
        expected_location: Some("com.google.android.apps.messaging"),
        support: FormatSupport::Unsupported {
            hint: "not decoded yet",
        },
    },
    KnownFormat {
        name: "calllog_db",
        pattern: r"^calllog\.db$",
        description: "call log database",
        expected_location: Some("com.android.providers.contacts"),
        support: FormatSupport::Unsupported {
            hint: "call history is not a message source",
        },
    },
    KnownFormat {
        name: "android_ab_backup",
        pattern: r"(?i)\.ab$",
        description: "Android AB backup archive",
        expected_location: None,
        support: FormatSupport::Unsupported {
            hint: "unpack it first with Andriller or a similar tool",
        },
    },
    KnownFormat {
        name: "tar_archive",
        pattern: r"(?i)\.tar$",
        description: "TAR archive",
        expected_location: None,
        support: FormatSupport::Unsupported {
            hint: "unpack it first with 7-Zip or a similar tool",
        },
    },
];

/// Both spellings of the vendor log provider appear on devices.
pub const NOTABLE_PACKAGES: [&str; 6] = [
    "com.android.providers.telephony",
    "com.sec.android.provider.logsprovider",
    "com.sec.android.providers.logsprovider",
    "com.google.android.apps.messaging",
    "com.android.messaging",
    "com.android.mms",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredSource {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub format_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedUnsupported {
    pub path: PathBuf,
    pub format_name: &'static str,
    pub hint: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DiscoveryReport {
    pub sources: Vec<DiscoveredSource>,
    pub unsupported: Vec<DetectedUnsupported>,
    pub location_warnings: Vec<String>,
    pub notable_locations: Vec<PathBuf>,
    pub files_seen: usize,
}

impl DiscoveryReport {
    /// Matches per registered format name, zero included.
    #[must_use]
    pub fn format_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = KNOWN_FORMATS
            .iter()
            .map(|format| (format.name, 0usize))
            .collect::<BTreeMap<_, _>>();
        let names = self
            .sources
            .iter()
            .map(|source| source.format_name)
            .chain(self.unsupported.iter().map(|item| item.format_name));
        for name in names {
            *counts.entry(name).or_insert(0) += 1;
        }
        counts
    }
}

fn compiled_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        KNOWN_FORMATS
            .iter()
            .map(|format| Regex::new(format.pattern).expect("valid known format regex"))
            .collect()
    })
}

#[must_use]
pub fn match_format(file_name: &str) -> Option<&'static KnownFormat> {
    compiled_patterns()
        .iter()
        .position(|pattern| pattern.is_match(file_name))
        .map(|index| &KNOWN_FORMATS[index])
}

/// Walks `root` in sorted order and sorts every file into a supported
/// source, a detected-but-unsupported format, or nothing.
pub fn discover(root: &Path) -> Result<DiscoveryReport> {
    if !root.is_dir() {
        bail!("backup folder does not exist: {}", root.display());
    }

    let mut files = Vec::new();
    let mut notable_locations = Vec::new();
    collect_dir_files(root, &mut files, &mut notable_locations)?;

    let mut report = DiscoveryReport {
        notable_locations,
        files_seen: files.len(),
        ..DiscoveryReport::default()
    };
    for path in files {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(format) = match_format(file_name) else {
            continue;
        };

        if let Some(expected) = format.expected_location
            && !is_under_package(root, &path, expected)
        {
            report.location_warnings.push(format!(
                "{} found outside {expected}: {}",
                format.name,
                path.display()
            ));
        }

        match format.support {
            FormatSupport::Supported(kind) => report.sources.push(DiscoveredSource {
                path,
                kind,
                format_name: format.name,
            }),
            FormatSupport::Unsupported { hint } => {
                report.unsupported.push(DetectedUnsupported {
                    path,
                    format_name: format.name,
                    hint,
                });
            }
        }
    }

    Ok(report)
}

fn is_under_package(root: &Path, path: &Path, package: &str) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .parent()
        .is_some_and(|parent| {
            parent
                .components()
                .any(|component| component.as_os_str() == package)
        })
}

fn collect_dir_files(
    dir: &Path,
    out: &mut Vec<PathBuf>,
    notable: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read backup directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to enumerate backup directory: {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if file_type.is_file() {
            out.push(path);
        } else if file_type.is_dir() {
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| NOTABLE_PACKAGES.contains(&name))
            {
                notable.push(path.clone());
            }
            collect_dir_files(&path, out, notable)?;
        }
    }

    Ok(())
}
