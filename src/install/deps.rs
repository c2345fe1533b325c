//! Linux dependency provisioning.
//!
//! The 32-bit SteamCMD binary needs a 32-bit C runtime that stock runner
//! images do not always carry. Hosted runners can refresh the package index
//! and install it; rootless or locked-down runners often cannot, but
//! frequently have the package baked into the base image already. Failing
//! outright in that second case would be a false negative, hence the
//! two-tier ladder: refresh + install when possible, otherwise verify the
//! packages are already present.

use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use regex::Regex;

use crate::error::{AppResult, UserError};
use crate::platform::Platform;

/// OS packages SteamCMD needs at runtime, Linux only.
pub const REQUIRED_PACKAGES: &[&str] = &["lib32gcc1"];

/// The package-manager commands the installer shells out to. The program
/// paths are plain names in production (resolved via PATH) and stub scripts
/// in tests.
pub struct PackageManager {
    pub apt_get: PathBuf,
    pub dpkg_query: PathBuf,
    pub sudo: Option<PathBuf>,
}

impl PackageManager {
    pub fn discover() -> Self {
        Self {
            apt_get: PathBuf::from("apt-get"),
            dpkg_query: PathBuf::from("dpkg-query"),
            sudo: which::which("sudo").ok(),
        }
    }

    /// `apt-get update --yes`, privileged when sudo is available.
    fn refresh_index(&self) -> AppResult<ExitStatus> {
        run_status(self.privileged(&["update", "--yes"]))
    }

    /// `apt-get install --yes <packages>`, privileged when sudo is available.
    fn install(&self, packages: &[&str]) -> AppResult<ExitStatus> {
        let mut args = vec!["install", "--yes"];
        args.extend_from_slice(packages);
        run_status(self.privileged(&args))
    }

    /// Query the installed version of a package. `Ok(None)` means the package
    /// is not installed; the query runs unprivileged since it only reads the
    /// dpkg database.
    fn installed_version(&self, package: &str) -> AppResult<Option<String>> {
        let command = format!("{} -W {}", self.dpkg_query.display(), package);
        tracing::debug!(command = %command, "Querying package status");

        let output = Command::new(&self.dpkg_query)
            .args(["-W", package])
            .output()
            .map_err(|source| UserError::CommandFailed { command, source })?;

        if !output.status.success() {
            return Ok(None);
        }

        // `dpkg-query -W` prints "<name>\t<version>"; pull the version out of
        // the first line.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let re = Regex::new(r"^\S+\s+(\S+)")?;
        let version = stdout
            .lines()
            .next()
            .and_then(|line| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Some(version))
    }

    fn privileged(&self, args: &[&str]) -> Command {
        match &self.sudo {
            Some(sudo) => {
                let mut cmd = Command::new(sudo);
                cmd.arg(&self.apt_get);
                cmd.args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.apt_get);
                cmd.args(args);
                cmd
            }
        }
    }
}

/// Ensure the required OS packages are present. No-op on darwin and windows.
#[tracing::instrument(skip(pm))]
pub fn install_dependencies(platform: Platform, pm: &PackageManager) -> AppResult<()> {
    if platform != Platform::Linux {
        tracing::debug!(%platform, "No extra dependencies required");
        return Ok(());
    }

    let refresh = pm.refresh_index()?;
    if refresh.success() {
        let install = pm.install(REQUIRED_PACKAGES)?;
        if !install.success() {
            tracing::error!(status = %install, "Package installation failed");
            return Err(UserError::DependencyInstall {
                package: REQUIRED_PACKAGES.join(", "),
            }
            .into());
        }
        return Ok(());
    }

    // Rootless runners cannot refresh the index; fall back to checking for a
    // preinstalled copy of each package.
    tracing::warn!(status = %refresh, "Package index refresh failed; checking for preinstalled packages");
    for package in REQUIRED_PACKAGES.iter().copied() {
        match pm.installed_version(package)? {
            Some(version) => {
                tracing::warn!(
                    package,
                    %version,
                    "Package index could not be refreshed; relying on the preinstalled version"
                );
            }
            None => {
                return Err(UserError::DependencyInstall {
                    package: package.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn run_status(mut cmd: Command) -> AppResult<ExitStatus> {
    let rendered = render(&cmd);
    tracing::debug!(command = %rendered, "Running package manager command");
    cmd.status().map_err(|source| {
        UserError::CommandFailed {
            command: rendered,
            source,
        }
        .into()
    })
}

fn render(cmd: &Command) -> String {
    let mut rendered = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
