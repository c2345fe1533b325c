use thiserror::Error;

/// A type alias for `Result<T, anyhow::Error>` to be used throughout the application.
pub type AppResult<T> = anyhow::Result<T>;

/// Errors that are intended to be displayed directly to the user.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Unsupported platform '{os}'. SteamCMD is only published for linux, macos and windows.")]
    UnsupportedPlatform { os: String },

    #[error("The '{name}' environment variable is not set and no override was given on the command line.")]
    MissingEnv { name: String },

    #[error("Failed to download from '{url}'. Please check your network connection.\n  Reason: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("The downloaded archive is corrupted or in an unexpected format.")]
    ArchiveExtractionFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("Required dependency '{package}' could not be installed.")]
    DependencyInstall { package: String },

    #[error("The SteamCMD first-run self-update failed ({status}).")]
    UpdateFailed { status: std::process::ExitStatus },

    #[error("The external command '{command}' failed to execute.\n  Reason: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
