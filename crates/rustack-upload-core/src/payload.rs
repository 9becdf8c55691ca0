//! Payload sources.
//!
//! A [`PayloadSource`] is a sized, randomly addressable byte source. Parts
//! read their own range, so concurrent workers never share a cursor.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::InitError;

/// A sized byte source that can be read by range.
#[async_trait]
pub trait PayloadSource: Send + Sync + fmt::Debug {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Whether the payload is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File name used to sniff the content type, if known.
    fn file_name(&self) -> Option<&str> {
        None
    }

    /// Read exactly `length` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Bytes>;
}

#[async_trait]
impl PayloadSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Bytes> {
        let start = usize::try_from(offset).map_err(io::Error::other)?;
        let end = start
            .checked_add(usize::try_from(length).map_err(io::Error::other)?)
            .filter(|end| *end <= Bytes::len(self))
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "range past end of payload"))?;
        Ok(self.slice(start..end))
    }
}

/// A regular file on the local filesystem.
///
/// The length is captured when the payload is opened; each range read opens
/// its own handle.
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
    len: u64,
    file_name: Option<String>,
}

impl FilePayload {
    /// Open `path` as a payload.
    ///
    /// # Errors
    ///
    /// - [`InitError::MissingParams`] if the path cannot be inspected
    /// - [`InitError::UnsupportedPayloadType`] if it is not a regular file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, InitError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| InitError::MissingParams {
                message: format!("cannot read {}: {e}", path.display()),
            })?;

        if !metadata.is_file() {
            return Err(InitError::UnsupportedPayloadType {
                message: format!("{} is not a regular file", path.display()),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
            file_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(ToOwned::to_owned),
        })
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PayloadSource for FilePayload {
    fn len(&self) -> u64 {
        self.len
    }

    fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; usize::try_from(length).map_err(io::Error::other)?];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
