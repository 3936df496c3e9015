use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

use crate::attachments::ATTACHMENTS_DIR_NAME;

pub const DEFAULT_FOLDER: &str = ".";
pub const DEFAULT_OUTPUT: &str = "sms_backup.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
}

/// Files written next to the output CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub csv: PathBuf,
    pub output_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub summary_json: PathBuf,
    pub schema_json: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub runtime: RuntimePaths,
    pub folder: PathBuf,
    pub layout: ArtifactLayout,
}

pub fn resolve_runtime_paths(home_dir: &Path, cwd: &Path) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    Ok(RuntimePaths {
        home_dir: normalize_lexical(home_dir),
        cwd: normalize_lexical(cwd),
    })
}

pub fn resolve_run_paths(
    home_dir: &Path,
    cwd: &Path,
    folder: &Path,
    output: &Path,
) -> Result<RunPaths> {
    let runtime = resolve_runtime_paths(home_dir, cwd)?;
    let folder = resolve_user_path(folder, &runtime)?;
    let csv = resolve_user_path(output, &runtime)?;
    if csv.file_name().is_none() || output.as_os_str().is_empty() {
        bail!("output must name a file: {}", output.display());
    }

    Ok(RunPaths {
        layout: build_artifact_layout(&csv),
        runtime,
        folder,
    })
}

#[must_use]
pub fn build_artifact_layout(csv: &Path) -> ArtifactLayout {
    let output_dir = csv
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let stem = csv
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("sms_backup");

    ArtifactLayout {
        csv: csv.to_path_buf(),
        attachments_dir: output_dir.join(ATTACHMENTS_DIR_NAME),
        summary_json: output_dir.join(format!("{stem}.summary.json")),
        schema_json: output_dir.join(format!("{stem}.schema.json")),
        output_dir,
    }
}

pub fn resolve_user_path(path: &Path, runtime: &RuntimePaths) -> Result<PathBuf> {
    let expanded = expand_tilde(path, &runtime.home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        runtime.cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
