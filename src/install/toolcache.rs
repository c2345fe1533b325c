//! Keyed tool-cache storage shared between pipeline runs.
//!
//! An entry is addressed by `(name, version, arch)` and lives at
//! `<root>/<name>/<version>/<arch>/`. A sibling `<arch>.complete` marker file
//! distinguishes a finished registration from a directory left behind by an
//! interrupted run; lookups only report entries that carry the marker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::AppResult;

pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Look up a previously registered install. A miss is a normal outcome,
    /// never an error.
    pub fn find(&self, name: &str, version: &str, arch: &str) -> Option<PathBuf> {
        let entry = self.entry_dir(name, version, arch);
        let marker = self.marker_file(name, version, arch);

        if entry.is_dir() && marker.is_file() {
            tracing::debug!(path = %entry.display(), "Tool cache hit");
            Some(entry)
        } else {
            tracing::debug!(path = %entry.display(), "Tool cache miss");
            None
        }
    }

    /// Copy a freshly extracted tree into the cache and mark it complete.
    /// Returns the canonical install root used by all later steps and by
    /// future lookups.
    #[tracing::instrument(skip(self, extracted_dir), fields(source = %extracted_dir.display()))]
    pub fn register(
        &self,
        extracted_dir: &Path,
        name: &str,
        version: &str,
        arch: &str,
    ) -> AppResult<PathBuf> {
        let entry = self.entry_dir(name, version, arch);
        fs::create_dir_all(&entry)
            .with_context(|| format!("Failed to create cache entry {}", entry.display()))?;

        copy_dir_all(extracted_dir, &entry).with_context(|| {
            format!(
                "Failed to copy {} into the tool cache",
                extracted_dir.display()
            )
        })?;

        // The marker is written last; its presence implies the copy above
        // finished.
        let marker = self.marker_file(name, version, arch);
        fs::write(&marker, "")
            .with_context(|| format!("Failed to write cache marker {}", marker.display()))?;

        tracing::info!(path = %entry.display(), "Registered in the tool cache");
        Ok(entry)
    }

    fn entry_dir(&self, name: &str, version: &str, arch: &str) -> PathBuf {
        self.root.join(name).join(version).join(arch)
    }

    fn marker_file(&self, name: &str, version: &str, arch: &str) -> PathBuf {
        self.root
            .join(name)
            .join(version)
            .join(format!("{arch}.complete"))
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_dir_all(&entry.path(), &target)?;
        } else {
            // fs::copy carries permission bits, so launcher scripts stay
            // executable.
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
