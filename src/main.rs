mod cli;
mod error;
mod install;
mod platform;
mod workflow;

use crate::{
    cli::Cli,
    error::{AppResult, UserError},
    install::{InstallContext, deps::PackageManager, toolcache::ToolCache},
};
use anyhow::Context;
use clap::Parser;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Using eprintln to ensure the error message is visible even if the UI is active.
        eprintln!("\n{} {}", style("Error:").red().bold(), e);
        // Also surface it as the workflow run's failure reason.
        workflow::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    // Conditionally initialize the tracing subscriber based on the verbose flag.
    if cli.verbose > 0 {
        let filter = match cli.verbose {
            1 => "info",
            2 => "info,setup_steamcmd=debug",
            3 => "debug,setup_steamcmd=trace",
            _ => "trace",
        };
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_ansi(console::user_attended())
            .with_writer(std::io::stderr)
            .init();
    }

    // Platform classification happens before any filesystem or network
    // activity; an unsupported host fails here and nowhere else.
    let platform = platform::detect()?;
    tracing::info!(%platform, "Detected host platform");

    let temp_dir = resolve_dir(cli.temp_dir, "RUNNER_TEMP")?;
    let cache_root = resolve_dir(cli.tool_cache_dir, "RUNNER_TOOL_CACHE")?;

    let client = reqwest::Client::builder()
        .user_agent("setup-steamcmd")
        .build()
        .context("Failed to build reqwest client")?;

    let draw_target = if console::user_attended() {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let mp = MultiProgress::with_draw_target(draw_target);
    let spinner_style =
        ProgressStyle::with_template("{spinner:.green} {msg}")?.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏-");

    mp.println(format!(
        "{} Setting up {} (tool cache: {})",
        style("✓").green(),
        style("SteamCMD").bold(),
        style(cache_root.display()).cyan()
    ))?;

    let pb = mp.add(ProgressBar::new_spinner());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(spinner_style.clone());
    pb.set_message(format!("Looking up {}...", style("steamcmd").bold()));

    let ctx = InstallContext {
        platform,
        client,
        cache: ToolCache::new(cache_root),
        temp_dir,
        base_url: cli.base_url,
        package_manager: PackageManager::discover(),
    };

    let info = install::install_if_needed(&ctx, &pb, &spinner_style).await?;

    // Outputs are only published once the entire pipeline has completed.
    workflow::set_output("directory", &info.directory)?;
    workflow::set_output("executable", &info.executable)?;
    workflow::add_path(&info.bin_directory)?;

    mp.println(format!(
        "\n{} SteamCMD ready at {}",
        style("✓").green(),
        style(&info.executable).cyan()
    ))?;

    Ok(())
}

/// Resolve a working directory from a command-line override or a runner
/// environment variable, expanding a leading tilde. Neither being set is
/// fatal: the action cannot pick safe locations on its own.
fn resolve_dir(flag: Option<String>, env_name: &'static str) -> AppResult<PathBuf> {
    let raw = flag
        .or_else(|| std::env::var(env_name).ok().filter(|v| !v.is_empty()))
        .ok_or(UserError::MissingEnv {
            name: env_name.to_string(),
        })?;
    Ok(PathBuf::from(shellexpand::tilde(&raw).to_string()))
}
