use std::{fmt, io};

use thiserror::Error;

/// Stage of connection establishment that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    TransportDial,
    Handshake,
    ProtocolInit,
}

impl ConnectStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectStage::TransportDial => "transport-dial",
            ConnectStage::Handshake => "handshake",
            ConnectStage::ProtocolInit => "protocol-init",
        }
    }
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SftpError {
    #[error("not connected")]
    NotConnected,

    #[error("connecting to {endpoint} failed at {stage}: {source}")]
    Connection {
        stage: ConnectStage,
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("{direction} of {path} failed: {source}")]
    Transfer {
        direction: Direction,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("listing {path} failed: {source}")]
    List {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Close(#[from] CloseError),
}

impl SftpError {
    pub(crate) fn connection(
        stage: ConnectStage,
        endpoint: impl Into<String>,
        source: io::Error,
    ) -> SftpError {
        SftpError::Connection {
            stage,
            endpoint: endpoint.into(),
            source,
        }
    }

    pub(crate) fn transfer(
        direction: Direction,
        path: impl Into<String>,
        source: io::Error,
    ) -> SftpError {
        SftpError::Transfer {
            direction,
            path: path.into(),
            source,
        }
    }

    /// The establishment stage, for `Connection` errors.
    pub fn stage(&self) -> Option<ConnectStage> {
        match self {
            SftpError::Connection { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Failures while releasing the two halves of a connection.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("closing sftp session failed: {0}")]
    FileSession(#[source] io::Error),

    #[error("closing ssh transport failed: {0}")]
    Transport(#[source] io::Error),

    #[error(
        "closing sftp session failed: {file_session}; closing ssh transport failed: {transport}"
    )]
    Both {
        #[source]
        file_session: io::Error,
        transport: io::Error,
    },
}

impl CloseError {
    /// Joins the outcomes of both release steps, `None` when both succeeded.
    pub fn from_results(
        file_session: io::Result<()>,
        transport: io::Result<()>,
    ) -> Option<CloseError> {
        match (file_session, transport) {
            (Ok(()), Ok(())) => None,
            (Err(err), Ok(())) => Some(CloseError::FileSession(err)),
            (Ok(()), Err(err)) => Some(CloseError::Transport(err)),
            (Err(file_session), Err(transport)) => Some(CloseError::Both {
                file_session,
                transport,
            }),
        }
    }
}
