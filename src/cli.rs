use clap::Parser;

use crate::install::fetch;

/// Installs the SteamCMD command line tool on a CI runner.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tool cache root. Defaults to the RUNNER_TOOL_CACHE environment variable.
    #[arg(long)]
    pub tool_cache_dir: Option<String>,

    /// Working directory for downloads. Defaults to the RUNNER_TEMP environment variable.
    #[arg(long)]
    pub temp_dir: Option<String>,

    /// Base URL the archives are fetched from. Override to use a mirror.
    #[arg(long, default_value = fetch::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Enable verbose logging. Use -v for info, -vv for debug.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
