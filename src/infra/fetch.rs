//! Dependency retrieval.
//!
//! Remote stores are external collaborators; the pipeline only needs a
//! `fetch(uri) -> local path` capability. [`LocalFetcher`] covers `file://`
//! URIs and plain filesystem paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while retrieving a file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URI scheme is not handled by this fetcher.
    #[error("unsupported uri scheme: {0}")]
    UnsupportedScheme(String),
    /// The URI has no usable file name.
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    /// Underlying I/O failure.
    #[error("failed to fetch {uri}: {source}")]
    Io {
        /// Location being fetched.
        uri: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
}

/// Retrieves a file into a local directory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Copy the file at `uri` into `dest_dir`, keeping its file name, and return
    /// the local path. `dest_dir` is created if missing.
    async fn fetch(&self, uri: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Fetcher for `file://` URIs and bare local paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn resolve(uri: &str) -> Result<PathBuf, FetchError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        match uri.split_once("://") {
            Some((scheme, _)) => Err(FetchError::UnsupportedScheme(scheme.to_string())),
            None => Ok(PathBuf::from(uri)),
        }
    }
}

/// File name a fetched `uri` lands under.
pub fn file_name(uri: &str) -> Result<String, FetchError> {
    uri.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| FetchError::InvalidUri(uri.to_string()))
}

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, uri: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let source = Self::resolve(uri)?;
        let name = file_name(uri)?;
        let io_err = |source| FetchError::Io {
            uri: uri.to_string(),
            source,
        };
        tokio::fs::create_dir_all(dest_dir).await.map_err(io_err)?;
        let dest = dest_dir.join(name);
        tokio::fs::copy(&source, &dest).await.map_err(io_err)?;
        tracing::debug!(uri, dest = %dest.display(), "fetched file");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("file:///tmp/a/b.jar").unwrap(), "b.jar");
        assert_eq!(file_name("conf.xml").unwrap(), "conf.xml");
        assert!(file_name("s3://bucket/dir/").is_err());
    }

    #[test]
    fn test_resolve_rejects_remote_schemes() {
        assert!(matches!(
            LocalFetcher::resolve("s3://bucket/key"),
            Err(FetchError::UnsupportedScheme(s)) if s == "s3"
        ));
        assert_eq!(
            LocalFetcher::resolve("file:///etc/hosts").unwrap(),
            PathBuf::from("/etc/hosts")
        );
    }

    #[tokio::test]
    async fn test_fetch_copies_into_dest() {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("setup.sh");
        std::fs::write(&src, "export A=1\n").unwrap();

        let uri = format!("file://{}", src.display());
        let out = LocalFetcher
            .fetch(&uri, &dest_dir.path().join("nested"))
            .await
            .unwrap();
        assert_eq!(out, dest_dir.path().join("nested").join("setup.sh"));
        assert_eq!(std::fs::read_to_string(out).unwrap(), "export A=1\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let dest_dir = tempfile::tempdir().unwrap();
        let err = LocalFetcher
            .fetch("/definitely/not/here.txt", dest_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
