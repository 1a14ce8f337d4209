use std::io;

use async_trait::async_trait;
use russh_sftp::{
    client::fs::{DirEntry, File},
    protocol::OpenFlags,
};

use super::RusshSftp;
use crate::session::{FileEntry, FileProtocol};

#[async_trait]
impl FileProtocol for RusshSftp {
    type File = File;

    async fn create(&self, path: &str) -> io::Result<File> {
        wrap_res(
            self.sftp_session
                .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
                .await,
        )
    }

    async fn open(&self, path: &str) -> io::Result<File> {
        wrap_res(self.sftp_session.open_with_flags(path, OpenFlags::READ).await)
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileEntry>> {
        let entries = wrap_res(self.sftp_session.read_dir(path).await)?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(to_file_entry)
            .collect())
    }

    async fn close(self) -> io::Result<()> {
        wrap_res(self.sftp_session.close().await)
    }
}

fn to_file_entry(entry: DirEntry) -> FileEntry {
    let metadata = entry.metadata();
    FileEntry {
        name: entry.file_name(),
        size: metadata.size.unwrap_or(0),
        is_dir: metadata.is_dir(),
        mod_time: metadata.mtime.map(i64::from).unwrap_or(0),
    }
}

fn wrap_res<T>(result: Result<T, russh_sftp::client::error::Error>) -> io::Result<T> {
    result.map_err(io::Error::other)
}
