use std::fmt;
use std::path::Path;

use crate::error::UserError;

/// The host operating systems SteamCMD is published for.
///
/// Detected once at process start and passed explicitly to every step that
/// needs it. All platform-specific constants live in the tables below so no
/// other module matches on OS strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

/// Classify the host OS, before any network or filesystem activity happens.
pub fn detect() -> Result<Platform, UserError> {
    match std::env::consts::OS {
        "linux" => Ok(Platform::Linux),
        "macos" => Ok(Platform::Darwin),
        "windows" => Ok(Platform::Windows),
        os => Err(UserError::UnsupportedPlatform { os: os.to_string() }),
    }
}

impl Platform {
    /// File name of the archive Valve publishes for this platform.
    pub fn archive_name(self) -> &'static str {
        match self {
            Platform::Linux => "steamcmd_linux.tar.gz",
            Platform::Darwin => "steamcmd_osx.tar.gz",
            Platform::Windows => "steamcmd.zip",
        }
    }

    /// The native launcher shipped inside the archive.
    pub fn launcher_name(self) -> &'static str {
        match self {
            Platform::Windows => "steamcmd.exe",
            Platform::Linux | Platform::Darwin => "steamcmd.sh",
        }
    }

    /// File name of the generated launcher shim inside the `bin` directory.
    pub fn shim_file_name(self) -> &'static str {
        match self {
            Platform::Windows => "steamcmd.bat",
            Platform::Linux | Platform::Darwin => "steamcmd",
        }
    }

    /// Contents of the launcher shim.
    ///
    /// Both shims resolve the launcher relative to their own location, so the
    /// install tree can move without rewriting them.
    pub fn shim_contents(self) -> &'static str {
        match self {
            Platform::Windows => "@echo off\r\n\"%~dp0\\..\\steamcmd.exe\" %*\r\n",
            Platform::Linux | Platform::Darwin => {
                "#!/bin/bash\nexec \"$(dirname \"$BASH_SOURCE\")/../steamcmd.sh\" \"$@\"\n"
            }
        }
    }

    /// Render a path for publishing. Windows paths are normalized to forward
    /// slashes; other platforms are left native.
    pub fn normalize_path(self, path: &Path) -> String {
        let rendered = path.to_string_lossy().into_owned();
        match self {
            Platform::Windows => rendered.replace('\\', "/"),
            Platform::Linux | Platform::Darwin => rendered,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Windows => "windows",
        };
        f.write_str(name)
    }
}
