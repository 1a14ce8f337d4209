use std::io;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

/// One immediate child of a remote directory, as handed to scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    /// Seconds since the Unix epoch.
    pub mod_time: i64,
}

/// An authenticated SSH transport that a file session is layered on.
#[async_trait]
pub trait SecureTransport: Send + Sync + Sized {
    async fn disconnect(self) -> io::Result<()>;
}

/// A file-protocol session multiplexed over a [`SecureTransport`].
#[async_trait]
pub trait FileProtocol: Send + Sync + Sized {
    type File: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens `path` for writing, creating or truncating it.
    async fn create(&self, path: &str) -> io::Result<Self::File>;

    /// Opens `path` for reading.
    async fn open(&self, path: &str) -> io::Result<Self::File>;

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileEntry>>;

    async fn close(self) -> io::Result<()>;
}
