use std::{io, time::Duration};

use async_trait::async_trait;
use dashmap::DashSet;
use once_cell::sync::Lazy;
use russh::{client, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::{net::TcpStream, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{stream::CancellableStream, RusshSftp, RusshTransport};
use crate::{
    connection::Connection,
    error::{ConnectStage, SftpError},
    options::ConnectOptions,
    session::SecureTransport,
};

/// Dials, authenticates and opens the SFTP subsystem.
///
/// Either returns a fully open [`Connection`] or an error naming the stage that
/// failed. Whatever was opened by earlier stages is released before the error
/// is returned.
pub async fn connect(options: ConnectOptions) -> Result<Connection, SftpError> {
    options.validate()?;
    let endpoint = options.endpoint();

    let stream = dial(&options)
        .await
        .map_err(|err| SftpError::connection(ConnectStage::TransportDial, &endpoint, err))?;
    debug!(%endpoint, "tcp stream open");

    let transport = handshake(stream, &options)
        .await
        .map_err(|err| SftpError::connection(ConnectStage::Handshake, &endpoint, err))?;
    debug!(%endpoint, user = %options.username, "authenticated");

    let file_session = match open_sftp(&transport).await {
        Ok(file_session) => file_session,
        Err(err) => {
            if let Err(disconnect_err) = transport.disconnect().await {
                debug!(%endpoint, error = %disconnect_err, "disconnect after failed sftp init");
            }
            return Err(SftpError::connection(ConnectStage::ProtocolInit, &endpoint, err));
        }
    };

    info!(%endpoint, user = %options.username, "sftp connection established");
    Ok(Connection::new(endpoint, transport, file_session))
}

async fn dial(options: &ConnectOptions) -> io::Result<TcpStream> {
    match timeout(
        options.dial_timeout,
        TcpStream::connect((options.host.as_str(), options.port)),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(timed_out("dial", options.dial_timeout)),
    }
}

/// Runs key exchange and password authentication over `stream`.
///
/// russh moves the stream into a session task of its own. Until the attempt
/// succeeds, a drop guard keeps the right to cancel that stream, so a timed out,
/// failed or abandoned attempt always closes the socket. A session that got as far
/// as authentication is also disconnected explicitly.
async fn handshake(stream: TcpStream, options: &ConnectOptions) -> io::Result<RusshTransport> {
    let handler = TrustingHandler::new(options.endpoint());
    let cancel = CancellationToken::new();
    let abandon = cancel.clone().drop_guard();
    let stream = CancellableStream::new(stream, cancel);

    let attempt = async {
        let mut handle = client::connect_stream(options.config.clone(), stream, handler)
            .await
            .map_err(io::Error::other)?;

        let rejection = match handle
            .authenticate_password(options.username.as_str(), options.password.as_str())
            .await
        {
            Ok(true) => return Ok(handle),
            Ok(false) => io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("password authentication rejected for user {}", options.username),
            ),
            Err(err) => io::Error::other(err),
        };
        if let Err(err) = handle.disconnect(Disconnect::ByApplication, "", "English").await {
            debug!(error = %err, "disconnect after failed authentication");
        }
        Err(rejection)
    };

    let handle = match timeout(options.handshake_timeout, attempt).await {
        Ok(result) => result?,
        Err(_) => return Err(timed_out("handshake", options.handshake_timeout)),
    };
    abandon.disarm();
    Ok(RusshTransport::new(handle))
}

async fn open_sftp(transport: &RusshTransport) -> io::Result<RusshSftp> {
    let mut channel = {
        let handle = transport.handle.lock().await;
        handle.channel_open_session().await.map_err(io::Error::other)?
    };
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(io::Error::other)?;
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => break,
            Some(ChannelMsg::Failure) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "server refused the sftp subsystem",
                ))
            }
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "channel closed before the sftp subsystem started",
                ))
            }
            Some(_) => {}
        }
    }
    let sftp_session = SftpSession::new(channel.into_stream())
        .await
        .map_err(io::Error::other)?;

    Ok(RusshSftp { sftp_session })
}

fn timed_out(stage: &str, limit: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{stage} timed out after {}ms", limit.as_millis()),
    )
}

/// Endpoints whose unverified host key has already been reported at `warn`.
static WARNED_ENDPOINTS: Lazy<DashSet<String>> = Lazy::new(DashSet::new);

/// Accepts any host key. Host keys are not verified; the first key accepted for an
/// endpoint is logged at `warn`, later ones at `debug`.
#[derive(Debug)]
pub struct TrustingHandler {
    endpoint: String,
}

impl TrustingHandler {
    pub fn new(endpoint: impl Into<String>) -> TrustingHandler {
        TrustingHandler {
            endpoint: endpoint.into(),
        }
    }

    fn first_acceptance(&self) -> bool {
        WARNED_ENDPOINTS.insert(self.endpoint.clone())
    }
}

#[async_trait]
impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if self.first_acceptance() {
            warn!(endpoint = %self.endpoint, %fingerprint, "accepting unverified host key");
        } else {
            debug!(endpoint = %self.endpoint, %fingerprint, "accepting unverified host key");
        }
        Ok(true)
    }
}
