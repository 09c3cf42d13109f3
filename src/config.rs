use chrono::FixedOffset;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Backup snapshot sidecar: newline-delimited JSON requests on stdin,
/// one JSON response per line on stdout, logs on stderr.
#[derive(Debug, Clone, Parser)]
#[command(name = "snapshotd", version)]
pub struct Config {
    /// Workspace directory holding the backup store; can also be chosen
    /// later with `workspace.select`.
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// UTC offset, in minutes, used to turn a filter date into a day window.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub day_offset_minutes: i32,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn day_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.day_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!(
                "day offset out of range: {} minutes",
                self.day_offset_minutes
            )
        })
    }
}
