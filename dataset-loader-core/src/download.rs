use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::contract::{DownloadedArchive, Downloader};

/// File name the archive is stored under inside the working directory.
pub const ARCHIVE_FILE_NAME: &str = "data.zip";
/// Directory the archive is extracted into inside the working directory.
pub const DATA_DIR_NAME: &str = "data";

/// Download configuration - which archive to fetch and where to put it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DownloadConfig {
    /// `http(s)://` URL, `file://` URL or plain local path of a zip archive.
    pub source: String,
    pub work_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("archive is not a readable zip: {0}")]
    Archive(String),
    #[error("archive entry {0:?} would escape the extraction directory")]
    UnsafeEntryPath(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Downloads the configured archive into `<work_dir>/data.zip` and extracts it
/// into `<work_dir>/data`.
pub struct ArchiveDownloader {
    config: DownloadConfig,
    client: reqwest::Client,
}

impl ArchiveDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Downloader for ArchiveDownloader {
    async fn download_all(&self) -> Result<DownloadedArchive, DownloadError> {
        let work_dir = &self.config.work_dir;
        if !work_dir.exists() {
            fs::create_dir_all(work_dir).map_err(|e| {
                error!(error = ?e, path = %work_dir.display(), "Failed to create working directory");
                e
            })?;
            debug!(path = %work_dir.display(), "Created working directory");
        }

        let archive_path = work_dir.join(ARCHIVE_FILE_NAME);
        fetch_archive(&self.client, &self.config.source, &archive_path).await?;

        let data_dir = work_dir.join(DATA_DIR_NAME);
        // zip extraction is blocking; keep it off the async workers
        let (zip_path, target) = (archive_path.clone(), data_dir.clone());
        tokio::task::spawn_blocking(move || extract_archive(&zip_path, &target))
            .await
            .map_err(|e| DownloadError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        Ok(DownloadedArchive {
            archive_path,
            data_dir,
        })
    }
}

/// Fetch `source` into `dest`. Remote URLs are streamed to disk; `file://` URLs and
/// bare paths are copied.
pub async fn fetch_archive(
    client: &reqwest::Client,
    source: &str,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let url = match classify_source(source)? {
        ArchiveSource::Remote(url) => url,
        ArchiveSource::Local(local) => {
            info!(source = %local.display(), dest = %dest.display(), "Copying local archive");
            let copied = tokio::fs::copy(&local, dest).await.map_err(|e| {
                error!(error = ?e, source = %local.display(), "Failed to copy local archive");
                e
            })?;
            return Ok(copied);
        }
    };
    let source = url.as_str();

    info!(url = %source, dest = %dest.display(), "Downloading dataset archive");
    let response = client.get(source).send().await.map_err(|e| {
        error!(error = ?e, url = %source, "Failed to request dataset archive");
        DownloadError::Request {
            url: source.to_string(),
            reason: e.to_string(),
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(status = %status, url = %source, "Archive download returned error status");
        return Err(DownloadError::Http {
            url: source.to_string(),
            status: status.as_u16(),
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            error!(error = ?e, url = %source, "Archive download interrupted");
            DownloadError::Request {
                url: source.to_string(),
                reason: e.to_string(),
            }
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    info!(url = %source, bytes = written, "Downloaded dataset archive");
    Ok(written)
}

#[derive(Debug, PartialEq, Eq)]
enum ArchiveSource {
    Remote(String),
    Local(PathBuf),
}

/// Schemes are matched case-insensitively; a string without `://` is a local path.
fn classify_source(source: &str) -> Result<ArchiveSource, DownloadError> {
    let Some((scheme, rest)) = source.split_once("://") else {
        return Ok(ArchiveSource::Local(PathBuf::from(source)));
    };
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(ArchiveSource::Remote(source.to_string())),
        "file" => Ok(ArchiveSource::Local(PathBuf::from(rest))),
        other => {
            error!(url = %source, scheme = other, "Unsupported archive source scheme");
            Err(DownloadError::Request {
                url: source.to_string(),
                reason: format!("unsupported scheme {other:?}"),
            })
        }
    }
}

/// Extract every entry of the zip at `archive` into `target`, creating it if needed.
/// Returns the number of files written.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<usize, DownloadError> {
    let file = File::open(archive).map_err(|e| {
        error!(error = ?e, path = %archive.display(), "Failed to open archive");
        e
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        error!(error = ?e, path = %archive.display(), "Failed to read zip archive");
        DownloadError::Archive(e.to_string())
    })?;

    fs::create_dir_all(target)?;
    let mut files = 0usize;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| DownloadError::Archive(e.to_string()))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                error!(entry = entry.name(), "Rejecting archive entry with unsafe path");
                return Err(DownloadError::UnsafeEntryPath(entry.name().to_string()));
            }
        };
        let out_path = target.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path).map_err(|e| {
            error!(error = ?e, path = %out_path.display(), "Failed to create extracted file");
            e
        })?;
        io::copy(&mut entry, &mut out)?;
        debug!(path = %relative.display(), size = entry.size(), "Extracted archive entry");
        files += 1;
    }

    info!(
        archive = %archive.display(),
        target = %target.display(),
        files,
        "Extracted dataset archive"
    );
    Ok(files)
}
