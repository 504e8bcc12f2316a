use std::{
    io,
    net::IpAddr,
    path::{Path, PathBuf},
};

use axum::http::HeaderValue;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// The one file this process serves.
#[derive(Debug, Clone)]
pub struct SharedFile {
    path: PathBuf,
    name: String,
    len: u64,
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("path has no file name: {}", .0.display())]
    NoFileName(PathBuf),
    #[error("failed to inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot build a download URL for host {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },
}

impl SharedFile {
    /// Checks that `path` names a readable regular file and captures its name.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ShareError> {
        let path = path.as_ref();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ShareError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ShareError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if !metadata.is_file() {
            return Err(ShareError::NotAFile(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ShareError::NoFileName(path.to_path_buf()))?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `attachment` disposition carrying the file name. Names outside printable
    /// ASCII get an ASCII fallback plus an RFC 5987 `filename*` parameter.
    pub fn content_disposition(&self) -> HeaderValue {
        let fallback: String = self
            .name
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii() && !c.is_ascii_control() => c,
                _ => '_',
            })
            .collect();

        let value = if fallback == self.name {
            format!("attachment; filename=\"{fallback}\"")
        } else {
            format!(
                "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
                utf8_percent_encode(&self.name, NON_ALPHANUMERIC)
            )
        };
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
    }

    /// URL other devices use to download the file, e.g.
    /// `http://192.168.1.20:3000/holiday%20photos.zip`.
    pub fn download_url(&self, host: &str, port: u16) -> Result<Url, ShareError> {
        let authority = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]:{port}"),
            _ => format!("{host}:{port}"),
        };
        let mut url =
            Url::parse(&format!("http://{authority}/")).map_err(|source| ShareError::InvalidHost {
                host: host.to_string(),
                source,
            })?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().push(&self.name);
        }
        Ok(url)
    }

    /// Whether a percent-decoded request path segment names this file.
    pub fn matches(&self, requested: &str) -> bool {
        requested == self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(name: &str) -> SharedFile {
        SharedFile {
            path: PathBuf::from("/tmp").join(name),
            name: name.to_string(),
            len: 3,
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn open_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(matches!(
            SharedFile::open(&missing).await,
            Err(ShareError::NotFound(_))
        ));
        assert!(matches!(
            SharedFile::open(dir.path()).await,
            Err(ShareError::NotAFile(_))
        ));
    }

    #[test_timeout::tokio_timeout_test]
    async fn open_captures_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report final.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let file = SharedFile::open(&path).await.unwrap();
        assert_eq!(file.name(), "report final.pdf");
        assert_eq!(file.len(), 8);
        assert_eq!(file.path(), path.as_path());
    }

    #[test_timeout::timeout]
    fn download_url_percent_encodes_name() {
        let url = shared("holiday photos #1.zip")
            .download_url("192.168.1.20", 3000)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://192.168.1.20:3000/holiday%20photos%20%231.zip"
        );
    }

    #[test_timeout::timeout]
    fn download_url_brackets_ipv6() {
        let url = shared("a.txt").download_url("fd00::1", 8080).unwrap();
        assert_eq!(url.as_str(), "http://[fd00::1]:8080/a.txt");
    }

    #[test_timeout::timeout]
    fn download_url_rejects_garbage_host() {
        assert!(matches!(
            shared("a.txt").download_url("bad host", 80),
            Err(ShareError::InvalidHost { .. })
        ));
    }

    #[test_timeout::timeout]
    fn disposition_for_plain_names() {
        assert_eq!(
            shared("notes.txt").content_disposition(),
            "attachment; filename=\"notes.txt\""
        );
    }

    #[test_timeout::timeout]
    fn disposition_for_unicode_and_quotes() {
        let value = shared("résumé \"v2\".pdf").content_disposition();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("attachment; filename=\"r_sum_ _v2_.pdf\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22%2Epdf"));
    }
}
