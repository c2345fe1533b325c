//! Minimal sink for GitHub Actions workflow commands.
//!
//! Outputs and PATH entries are appended to the files named by
//! `GITHUB_OUTPUT` and `GITHUB_PATH` when the runner provides them; outside
//! a runner the legacy stdout commands are emitted instead so the values are
//! still visible.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

use crate::error::AppResult;

/// Publish a named output to the calling workflow.
pub fn set_output(name: &str, value: &str) -> AppResult<()> {
    tracing::debug!(name, value, "Publishing output");
    match env::var_os("GITHUB_OUTPUT") {
        Some(path) => append_line(Path::new(&path), &format!("{name}={value}")),
        None => {
            println!("::set-output name={name}::{value}");
            Ok(())
        }
    }
}

/// Prepend a directory to the PATH of subsequent workflow steps.
pub fn add_path(dir: &str) -> AppResult<()> {
    tracing::debug!(dir, "Registering PATH entry");
    match env::var_os("GITHUB_PATH") {
        Some(path) => append_line(Path::new(&path), dir),
        None => {
            println!("::add-path::{dir}");
            Ok(())
        }
    }
}

/// Emit an error annotation for the workflow log.
pub fn error(message: &str) {
    println!("::error::{message}");
}

fn append_line(path: &Path, line: &str) -> AppResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open workflow command file {}", path.display()))?;
    writeln!(file, "{line}")
        .with_context(|| format!("Failed to write to workflow command file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn append_line_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("output");

        append_line(&file, "directory=/opt/cache/steamcmd").unwrap();
        append_line(&file, "executable=/opt/cache/steamcmd/steamcmd.sh").unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert_eq!(
            contents,
            "directory=/opt/cache/steamcmd\nexecutable=/opt/cache/steamcmd/steamcmd.sh\n"
        );
    }
}
