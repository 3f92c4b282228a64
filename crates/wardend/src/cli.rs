use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wardend", version, about = "Supervise services described by unit files")]
pub struct Cli {
    /// Daemon configuration file (TOML).
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding installed unit files and their target links.
    #[arg(long, global = true, env = "WARDEN_UNIT_DIR")]
    pub unit_dir: Option<PathBuf>,

    /// text, json or journald.
    #[arg(long, global = true, env = "WARDEN_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Filter directives, e.g. `info` or `warn,warden::unit=info`.
    #[arg(long, global = true, env = "WARDEN_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse and validate a unit file, then print it as JSON.
    Check { unit: PathBuf },
    /// Print the canonical text of a unit file.
    Render { unit: PathBuf },
    /// Supervise one unit in the foreground until SIGINT/SIGTERM.
    Run { unit: String },
    /// Copy a unit file into the unit directory.
    Install { unit: PathBuf },
    /// Link an installed unit into the targets named by its [Install] section.
    Enable { unit: String },
    /// Remove every target link of a unit.
    Disable { unit: String },
    /// Show whether a unit is installed and enabled.
    Status { unit: String },
    /// Start every unit enabled for a target and supervise them.
    Boot {
        #[arg(long)]
        target: Option<String>,
    },
}
