//! The install pipeline: cache lookup, download, extraction, cache
//! registration, dependency provisioning, launcher shim creation and the
//! mandatory first-run self-update.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::{AppResult, UserError};
use crate::platform::Platform;

pub mod deps;
pub mod fetch;
pub mod toolcache;

use deps::PackageManager;
use toolcache::ToolCache;

/// Tool cache key. The CDN only publishes a rolling "latest" build, and the
/// binary is 32-bit everywhere.
pub const TOOL_NAME: &str = "steamcmd";
pub const TOOL_VERSION: &str = "latest";
pub const TOOL_ARCH: &str = "i386";

const BIN_DIR_NAME: &str = "bin";

/// Shared, read-only inputs for one install run.
pub struct InstallContext {
    pub platform: Platform,
    pub client: reqwest::Client,
    pub cache: ToolCache,
    pub temp_dir: PathBuf,
    pub base_url: String,
    pub package_manager: PackageManager,
}

/// The public-facing result of a run, published to the calling workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallInfo {
    pub directory: String,
    pub executable: String,
    pub bin_directory: String,
}

/// Outcome of the first-run self-update, inspected by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Clean,
    /// SteamCMD exits with code 7 on its very first Windows run even when the
    /// update succeeded.
    FirstRunQuirk,
}

/// Return install info for a cached copy, or run the full install pipeline.
/// This is the single branch point of the whole action.
#[tracing::instrument(skip(ctx, pb, spinner_style), fields(platform = %ctx.platform))]
pub async fn install_if_needed(
    ctx: &InstallContext,
    pb: &ProgressBar,
    spinner_style: &ProgressStyle,
) -> AppResult<InstallInfo> {
    if let Some(install_dir) = ctx.cache.find(TOOL_NAME, TOOL_VERSION, TOOL_ARCH) {
        tracing::info!(path = %install_dir.display(), "Found in cache");
        pb.finish_with_message(format!(
            "{} Found {} in the tool cache",
            style("✓").green(),
            style(TOOL_NAME).bold()
        ));
        return Ok(resolve_info(&install_dir, ctx.platform));
    }

    install(ctx, pb, spinner_style).await
}

async fn install(
    ctx: &InstallContext,
    pb: &ProgressBar,
    spinner_style: &ProgressStyle,
) -> AppResult<InstallInfo> {
    let (url, archive_name) = fetch::download_url(&ctx.base_url, ctx.platform);
    let archive_path = ctx.temp_dir.join(archive_name);
    fetch::download(&ctx.client, &url, &archive_path, pb).await?;

    pb.set_style(spinner_style.clone());
    pb.set_message(format!("Extracting {}...", style(archive_name).bold()));
    let extract_dir = ctx.temp_dir.join(TOOL_NAME);
    fetch::extract(&archive_path, &extract_dir, ctx.platform)?;

    pb.set_message("Adding to the tool cache...".to_string());
    let install_dir = ctx
        .cache
        .register(&extract_dir, TOOL_NAME, TOOL_VERSION, TOOL_ARCH)?;

    pb.set_message("Installing required dependencies...".to_string());
    deps::install_dependencies(ctx.platform, &ctx.package_manager)?;

    setup_bin(&install_dir, ctx.platform)?;

    pb.set_message(format!(
        "Running the {} first-time self-update...",
        style(TOOL_NAME).bold()
    ));
    if bootstrap_update(&install_dir, ctx.platform)? == UpdateOutcome::FirstRunQuirk {
        tracing::info!("Self-update exited with code 7; expected on the first Windows run");
    }

    pb.finish_with_message(format!(
        "{} {} installed",
        style("✓").green(),
        style(TOOL_NAME).bold()
    ));
    Ok(resolve_info(&install_dir, ctx.platform))
}

/// Create the `bin` directory and the extension-less launcher shim inside it,
/// so callers get one stable command name on every platform.
///
/// The directory must not already exist: a leftover `bin` means a corrupted
/// or partially initialized install and is reported rather than papered over.
#[tracing::instrument(fields(install_dir = %install_dir.display()))]
pub fn setup_bin(install_dir: &Path, platform: Platform) -> AppResult<()> {
    let bin_dir = install_dir.join(BIN_DIR_NAME);
    fs::create_dir(&bin_dir).with_context(|| {
        format!(
            "Failed to create {}; the install tree may be corrupted",
            bin_dir.display()
        )
    })?;

    let shim_path = bin_dir.join(platform.shim_file_name());
    fs::write(&shim_path, platform.shim_contents())
        .with_context(|| format!("Failed to write launcher shim {}", shim_path.display()))?;

    #[cfg(unix)]
    if platform != Platform::Windows {
        fs::set_permissions(&shim_path, fs::Permissions::from_mode(0o755))?;
    }

    tracing::debug!(path = %shim_path.display(), "Created launcher shim");
    Ok(())
}

/// Run the native launcher once with a quit directive so SteamCMD performs
/// its mandatory self-update.
///
/// The exit status is inspected as a value: code 7 on windows is a documented
/// benign first-run outcome; any other nonzero exit, on any platform, is
/// fatal.
#[tracing::instrument(fields(install_dir = %install_dir.display()))]
pub fn bootstrap_update(install_dir: &Path, platform: Platform) -> AppResult<UpdateOutcome> {
    let launcher = install_dir.join(platform.launcher_name());
    tracing::info!(launcher = %launcher.display(), "Running the first-time self-update");

    let status = Command::new(&launcher)
        .arg("+quit")
        .status()
        .map_err(|source| UserError::CommandFailed {
            command: format!("{} +quit", launcher.display()),
            source,
        })?;

    match status.code() {
        Some(0) => Ok(UpdateOutcome::Clean),
        Some(7) if platform == Platform::Windows => Ok(UpdateOutcome::FirstRunQuirk),
        _ => Err(UserError::UpdateFailed { status }.into()),
    }
}

/// Compute the publishable paths for an install root. Pure and idempotent.
pub fn resolve_info(install_dir: &Path, platform: Platform) -> InstallInfo {
    InstallInfo {
        directory: platform.normalize_path(install_dir),
        executable: platform.normalize_path(&install_dir.join(platform.launcher_name())),
        bin_directory: platform.normalize_path(&install_dir.join(BIN_DIR_NAME)),
    }
}
