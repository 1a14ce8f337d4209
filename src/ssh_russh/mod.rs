mod connection;
mod filesystem;
mod stream;

use std::io;

use async_trait::async_trait;
use russh::{client, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::sync::Mutex;

use crate::session::SecureTransport;

pub use connection::{connect, TrustingHandler};

/// Authenticated russh client session.
pub struct RusshTransport {
    handle: Mutex<client::Handle<TrustingHandler>>,
}

impl RusshTransport {
    fn new(handle: client::Handle<TrustingHandler>) -> RusshTransport {
        RusshTransport {
            handle: Mutex::new(handle),
        }
    }
}

#[async_trait]
impl SecureTransport for RusshTransport {
    async fn disconnect(self) -> io::Result<()> {
        let handle = self.handle.into_inner();
        handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(io::Error::other)
    }
}

/// SFTP subsystem session running on a channel of a [`RusshTransport`].
pub struct RusshSftp {
    sftp_session: SftpSession,
}
