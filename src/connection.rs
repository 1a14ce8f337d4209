use std::{io, path::Path};

use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, info, warn};

use crate::{
    error::{CloseError, Direction, SftpError},
    session::{FileEntry, FileProtocol, SecureTransport},
    ssh_russh::{RusshSftp, RusshTransport},
};

/// One SSH transport plus the SFTP session layered on it, owned by a single caller.
///
/// Both slots are filled by [`connect_with_options`](crate::connect_with_options) and
/// cleared together by [`Connection::close`]. Transfers borrow the connection
/// immutably and never touch the slots, so the only mutation a caller can race
/// with is `close`, which the borrow checker already forbids. Calling transfers
/// concurrently through a shared reference is not supported.
pub struct Connection<T = RusshTransport, F = RusshSftp> {
    endpoint: Option<String>,
    transport: Option<T>,
    file_session: Option<F>,
}

impl<T, F> Default for Connection<T, F> {
    fn default() -> Self {
        Connection {
            endpoint: None,
            transport: None,
            file_session: None,
        }
    }
}

impl<T, F> Connection<T, F>
where
    T: SecureTransport,
    F: FileProtocol,
{
    /// Assembles an open connection from an established transport and its file session.
    pub fn new(endpoint: impl Into<String>, transport: T, file_session: F) -> Connection<T, F> {
        Connection {
            endpoint: Some(endpoint.into()),
            transport: Some(transport),
            file_session: Some(file_session),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some() && self.file_session.is_some()
    }

    /// `host:port` this connection was established to.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Writes `data` to `remote_path`, replacing any existing content.
    pub async fn upload(&self, data: &[u8], remote_path: &str) -> Result<(), SftpError> {
        let file_session = self.file_session()?;
        debug!(path = remote_path, bytes = data.len(), "uploading");

        let mut file = file_session
            .create(remote_path)
            .await
            .map_err(|err| SftpError::transfer(Direction::Upload, remote_path, err))?;
        let written = file.write_all(data).await;
        // shutdown releases the remote handle and must run even when the write failed
        let released = file.shutdown().await;

        written
            .and(released)
            .map_err(|err| SftpError::transfer(Direction::Upload, remote_path, err))
    }

    /// Streams `remote_path` into `local_path`, creating or truncating the local file.
    ///
    /// A failure after the local file was created leaves the partial file in place.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<(), SftpError> {
        let file_session = self.file_session()?;
        let local_path = local_path.as_ref();
        let fail = |err| SftpError::transfer(Direction::Download, remote_path, err);
        debug!(path = remote_path, local = %local_path.display(), "downloading");

        let mut remote = file_session.open(remote_path).await.map_err(fail)?;
        let local = match fs::File::create(local_path).await {
            Ok(local) => local,
            Err(err) => {
                if let Err(release_err) = remote.shutdown().await {
                    debug!(
                        path = remote_path,
                        error = %release_err,
                        "releasing remote file after local create failed"
                    );
                }
                return Err(fail(io::Error::new(
                    err.kind(),
                    format!("creating {}: {err}", local_path.display()),
                )));
            }
        };

        let mut local = BufWriter::new(local);
        let copied = tokio::io::copy(&mut remote, &mut local).await;
        let flushed = local.shutdown().await;
        let released = remote.shutdown().await;

        let bytes = copied.map_err(fail)?;
        flushed.and(released).map_err(fail)?;
        debug!(path = remote_path, bytes, "downloaded");
        Ok(())
    }

    /// Lists the immediate entries of the remote directory `path`, in server order.
    pub async fn ls(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let file_session = self.file_session()?;
        file_session.read_dir(path).await.map_err(|source| SftpError::List {
            path: path.into(),
            source,
        })
    }

    /// Releases the file session, then the transport.
    ///
    /// Both releases are always attempted and both slots end up cleared, whatever
    /// either release reports. Closing a closed connection is a no-op.
    pub async fn close(&mut self) -> Result<(), SftpError> {
        let file_session = self.file_session.take();
        let transport = self.transport.take();
        if file_session.is_none() && transport.is_none() {
            return Ok(());
        }

        let file_session_result = match file_session {
            Some(file_session) => file_session.close().await,
            None => Ok(()),
        };
        let transport_result = match transport {
            Some(transport) => transport.disconnect().await,
            None => Ok(()),
        };

        let endpoint = self.endpoint.as_deref().unwrap_or("-");
        match CloseError::from_results(file_session_result, transport_result) {
            None => {
                info!(endpoint, "connection closed");
                Ok(())
            }
            Some(err) => {
                warn!(endpoint, error = %err, "connection closed with errors");
                Err(err.into())
            }
        }
    }

    fn file_session(&self) -> Result<&F, SftpError> {
        match (&self.transport, &self.file_session) {
            (Some(_), Some(file_session)) => Ok(file_session),
            _ => Err(SftpError::NotConnected),
        }
    }
}

impl<T, F> Drop for Connection<T, F> {
    fn drop(&mut self) {
        if self.transport.is_some() || self.file_session.is_some() {
            warn!(
                endpoint = self.endpoint.as_deref().unwrap_or("-"),
                "connection dropped without close"
            );
        }
    }
}
