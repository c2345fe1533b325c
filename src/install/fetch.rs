//! Archive download and extraction.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use console::style;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tar::Archive;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use zip::ZipArchive;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::{AppResult, UserError};
use crate::platform::Platform;

/// The Steam CDN the installer archives are published under.
pub const DEFAULT_BASE_URL: &str = "https://steamcdn-a.akamaihd.net/client/installer";

/// Resolve the download URL and archive file name for a platform.
///
/// Pure table lookup; the base URL is a parameter so tests can point it at a
/// local server.
pub fn download_url(base_url: &str, platform: Platform) -> (String, &'static str) {
    let archive_name = platform.archive_name();
    let url = format!("{}/{}", base_url.trim_end_matches('/'), archive_name);
    (url, archive_name)
}

/// Stream the archive at `url` to `dest`, retrying transient failures.
///
/// `dest` is a stable path derived from the runner temp directory and the
/// archive name, so repeated runs overwrite the same file instead of
/// scattering downloads.
#[tracing::instrument(skip(client, pb), fields(dest = %dest.display()))]
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    pb: &ProgressBar,
) -> AppResult<()> {
    let retry_strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);

    let result = Retry::spawn(retry_strategy, || async {
        // Reset progress bar on each attempt
        pb.set_position(0);

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let total_size = response.content_length().unwrap_or(0);

        let download_style = ProgressStyle::with_template(
            "{spinner:.green} {msg}\n{wide_bar:.cyan/blue} {bytes}/{total_bytes} ({eta})",
        )
        .map_err(|e| e.to_string())?
        .progress_chars("#>-");

        pb.set_style(download_style);
        pb.set_length(total_size);
        pb.set_message(format!(
            "Downloading {}",
            style(dest.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()).cyan()
        ));

        let mut file = File::create(dest).map_err(|e| e.to_string())?;
        let mut stream = response.bytes_stream();

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| format!("Failed to read download chunk: {}", e))?;
            file.write_all(&chunk).map_err(|e| e.to_string())?;
            pb.inc(chunk.len() as u64);
        }

        Ok(())
    })
    .await;

    result.map_err(|reason: String| {
        UserError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
        .into()
    })
}

/// Unpack the downloaded archive into `dest`, dispatching on the platform's
/// archive format: zip on windows, gzipped tar otherwise.
#[tracing::instrument(fields(archive = %archive.display(), dest = %dest.display()))]
pub fn extract(archive: &Path, dest: &Path, platform: Platform) -> AppResult<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extraction directory {}", dest.display()))?;
    let file = File::open(archive)
        .with_context(|| format!("Failed to open downloaded archive {}", archive.display()))?;

    match platform {
        Platform::Windows => extract_zip(file, dest),
        Platform::Linux | Platform::Darwin => extract_tar_gz(file, dest),
    }
}

// The SteamCMD archives are flat (launcher script plus a `linux32/` tree at
// the root), so entries unpack at their recorded paths with no prefix
// stripping.
fn extract_tar_gz<R: io::Read>(reader: R, dest: &Path) -> AppResult<()> {
    let tar = GzDecoder::new(reader);
    let mut archive = Archive::new(tar);

    for entry_result in archive.entries().map_err(extraction_error)? {
        let mut entry = entry_result.map_err(extraction_error)?;
        let path = entry.path().map_err(extraction_error)?.to_path_buf();
        tracing::trace!(entry_path = ?path, "Unpacking archive entry");

        let outpath = dest.join(&path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&outpath).map_err(extraction_error)?;
        } else {
            if let Some(p) = outpath.parent() {
                if !p.exists() {
                    fs::create_dir_all(p).map_err(extraction_error)?;
                }
            }
            entry.unpack(&outpath).map_err(extraction_error)?;
        }
    }
    Ok(())
}

fn extract_zip<R: io::Read + io::Seek>(reader: R, dest: &Path) -> AppResult<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| extraction_error(io::Error::other(e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| extraction_error(io::Error::other(e)))?;
        let Some(enclosed_name) = file.enclosed_name() else {
            continue;
        };
        tracing::trace!(entry_path = ?enclosed_name, "Unpacking archive entry");

        let outpath = dest.join(&enclosed_name);
        if file.name().ends_with('/') {
            fs::create_dir_all(&outpath).map_err(extraction_error)?;
        } else {
            if let Some(p) = outpath.parent() {
                if !p.exists() {
                    fs::create_dir_all(p).map_err(extraction_error)?;
                }
            }
            let mut outfile = File::create(&outpath).map_err(extraction_error)?;
            io::copy(&mut file, &mut outfile).map_err(extraction_error)?;
        }
        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))
                .map_err(extraction_error)?;
        }
    }
    Ok(())
}

fn extraction_error(source: io::Error) -> anyhow::Error {
    UserError::ArchiveExtractionFailed { source }.into()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn steamcmd_tarball(launcher_body: &str) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let script = launcher_body.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "steamcmd.sh", script).unwrap();

        let payload: &[u8] = b"\x7fELF";
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "linux32/steamcmd", payload)
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap()
    }

    fn steamcmd_zip() -> Vec<u8> {
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("steamcmd.exe", options).unwrap();
        writer.write_all(b"MZ").unwrap();
        writer.start_file("package/steamcmd_bin.zip.vz", options).unwrap();
        writer.write_all(b"VZ").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn url_table_has_one_fixed_archive_per_platform() {
        let (url, name) = download_url(DEFAULT_BASE_URL, Platform::Linux);
        assert_eq!(name, "steamcmd_linux.tar.gz");
        assert_eq!(
            url,
            "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz"
        );

        let (url, _) = download_url(DEFAULT_BASE_URL, Platform::Darwin);
        assert!(url.ends_with("/steamcmd_osx.tar.gz"));

        let (url, _) = download_url(DEFAULT_BASE_URL, Platform::Windows);
        assert!(url.ends_with("/steamcmd.zip"));
    }

    #[test]
    fn trailing_slash_in_the_base_url_is_tolerated() {
        let (url, _) = download_url("http://localhost:9999/", Platform::Linux);
        assert_eq!(url, "http://localhost:9999/steamcmd_linux.tar.gz");
    }

    #[tokio::test]
    async fn download_writes_the_archive_to_the_given_destination() {
        let server = MockServer::start().await;
        let body = steamcmd_tarball("#!/bin/sh\nexit 0\n");
        Mock::given(method("GET"))
            .and(url_path("/steamcmd_linux.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let (url, archive_name) = download_url(&server.uri(), Platform::Linux);
        let dest = temp.path().join(archive_name);

        let client = reqwest::Client::new();
        download(&client, &url, &dest, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn http_failure_surfaces_as_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let (url, archive_name) = download_url(&server.uri(), Platform::Linux);
        let dest = temp.path().join(archive_name);

        let client = reqwest::Client::new();
        let err = download(&client, &url, &dest, &ProgressBar::hidden())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<UserError>(),
            Some(UserError::DownloadFailed { .. })
        ));
    }

    #[test]
    fn tar_extraction_preserves_layout_and_modes() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("steamcmd_linux.tar.gz");
        fs::write(&archive_path, steamcmd_tarball("#!/bin/sh\nexit 0\n")).unwrap();

        let dest = temp.path().join("steamcmd");
        extract(&archive_path, &dest, Platform::Linux).unwrap();

        assert!(dest.join("steamcmd.sh").is_file());
        assert!(dest.join("linux32/steamcmd").is_file());

        #[cfg(unix)]
        {
            let mode = fs::metadata(dest.join("steamcmd.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn zip_extraction_preserves_layout() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("steamcmd.zip");
        fs::write(&archive_path, steamcmd_zip()).unwrap();

        let dest = temp.path().join("steamcmd");
        extract(&archive_path, &dest, Platform::Windows).unwrap();

        assert!(dest.join("steamcmd.exe").is_file());
        assert!(dest.join("package/steamcmd_bin.zip.vz").is_file());
    }

    #[test]
    fn a_corrupt_archive_is_an_extraction_error() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("steamcmd_linux.tar.gz");
        fs::write(&archive_path, b"this is not a tarball").unwrap();

        let err = extract(&archive_path, &temp.path().join("out"), Platform::Linux).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UserError>(),
            Some(UserError::ArchiveExtractionFailed { .. })
        ));
    }
}
