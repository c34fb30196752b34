//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sectioner", version, about = "Serial-sectioning experiment runner")]
pub struct Cli {
    /// Path to the experiment TOML
    #[arg(long, value_name = "FILE", default_value = "etc/experiment.toml")]
    pub config: PathBuf,

    /// Slice to start (or resume) on, 1-indexed
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub start_slice: u32,

    /// Step to start (or resume) on within the first slice, 1-indexed
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub start_step: u32,

    /// Append stage positions to this file (tab-separated, keyed by step/tag)
    #[arg(long, value_name = "FILE")]
    pub position_log: Option<PathBuf>,

    /// Mirror console logs into this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log as JSON lines instead of pretty, and emit a JSON outcome
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}
