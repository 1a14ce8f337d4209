use std::{fmt, io, sync::Arc, time::Duration};

use russh::client;

use crate::error::{ConnectStage, SftpError};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to establish one [`Connection`](crate::Connection).
#[derive(Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Bound on opening the TCP stream.
    pub dial_timeout: Duration,
    /// Bound on key exchange plus authentication, measured after the dial.
    pub handshake_timeout: Duration,
    pub config: Arc<client::Config>,
}

impl ConnectOptions {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        port: u16,
    ) -> ConnectOptions {
        ConnectOptions {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            config: Arc::new(client::Config::default()),
        }
    }

    /// Builds options from script-supplied values, where the port arrives as a plain integer.
    pub fn from_script(
        host: &str,
        username: &str,
        password: &str,
        port: i64,
    ) -> Result<ConnectOptions, SftpError> {
        let endpoint = format!("{host}:{port}");
        let port = u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| invalid_input(&endpoint, format!("port {port} is outside 1-65535")))?;
        let options = ConnectOptions::new(host, username, password, port);
        options.validate()?;
        Ok(options)
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> ConnectOptions {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> ConnectOptions {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_config(mut self, config: client::Config) -> ConnectOptions {
        self.config = Arc::new(config);
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn validate(&self) -> Result<(), SftpError> {
        if self.host.trim().is_empty() {
            return Err(invalid_input(&self.endpoint(), "host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(invalid_input(&self.endpoint(), "port 0 is outside 1-65535".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("dial_timeout", &self.dial_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

fn invalid_input(endpoint: &str, message: String) -> SftpError {
    SftpError::connection(
        ConnectStage::TransportDial,
        endpoint,
        io::Error::new(io::ErrorKind::InvalidInput, message),
    )
}
