use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{extract::ExtractArgs, scan::ScanArgs};

#[derive(Debug, Parser)]
#[command(
    name = "droidsms",
    version,
    about = "Recover SMS and MMS history from unpacked Android backups"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Recover messages into a CSV file.
    Extract(ExtractArgs),
    /// List recognized and unsupported files without decoding them.
    Scan(ScanArgs),
}
