#![forbid(unsafe_code)]

pub mod adapters;
pub mod attachments;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod utils;

pub use cli::app::{Cli, Command};
pub use error::{RecoveryError, RowRejection};
