#![allow(dead_code)]

use std::{env, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use russh::{
    server::{self, Auth, Msg, Session},
    Channel, ChannelId,
};
use russh_keys::key::KeyPair;
use sftp_vu::ConnectOptions;
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const USER: &str = "user";
pub const PASSWORD: &str = "pass";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn gen_remote_name() -> String {
    format!("{}.txt", Uuid::new_v4())
}

/// A port that was free a moment ago and has nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Could not bind");
    listener.local_addr().expect("Could not get local addr").port()
}

/// Accepts connections and closes them before sending an SSH identification.
pub async fn closing_listener() -> u16 {
    spawn_listener(|socket| async move { drop(socket) }).await
}

/// Accepts connections, answers with something that is not SSH and closes.
pub async fn garbage_listener() -> u16 {
    spawn_listener(|mut socket| async move {
        let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
    })
    .await
}

/// Accepts connections and never says a word.
pub async fn silent_listener() -> u16 {
    spawn_listener(|socket| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    })
    .await
}

/// Sends an SSH identification line, then never answers key exchange.
///
/// Every accepted socket reports on the returned channel once the client side
/// has closed it.
pub async fn stalling_listener() -> (u16, mpsc::UnboundedReceiver<()>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let port = spawn_listener(move |mut socket| {
        let closed_tx = closed_tx.clone();
        async move {
            if socket.write_all(b"SSH-2.0-OpenSSH_9.0\r\n").await.is_err() {
                return;
            }
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        }
    })
    .await;
    (port, closed_rx)
}

/// Accepts any password and refuses every subsystem request.
struct SubsystemRefuser {
    channels: Vec<Channel<Msg>>,
}

#[async_trait]
impl server::Handler for SubsystemRefuser {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.push(channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        _name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_failure(channel);
        session.close(channel);
        Ok(())
    }
}

/// An in-process SSH server on which authentication succeeds and `sftp` is refused.
///
/// Each finished SSH session reports on the returned channel.
pub async fn sftp_refusing_server() -> (u16, mpsc::UnboundedReceiver<()>) {
    let config = Arc::new(server::Config {
        keys: vec![KeyPair::generate_ed25519().expect("Could not generate host key")],
        auth_rejection_time: Duration::from_millis(10),
        ..Default::default()
    });
    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let port = spawn_listener(move |socket| {
        let config = config.clone();
        let ended_tx = ended_tx.clone();
        async move {
            let handler = SubsystemRefuser {
                channels: Vec::new(),
            };
            if let Ok(session) = server::run_stream(config, socket, handler).await {
                let _ = session.await;
            }
            let _ = ended_tx.send(());
        }
    })
    .await;
    (port, ended_rx)
}

async fn spawn_listener<F, Fut>(on_accept: F) -> u16
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Could not bind");
    let port = listener.local_addr().expect("Could not get local addr").port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(on_accept(socket));
        }
    });
    port
}

#[cfg(target_os = "linux")]
pub fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .expect("Could not read /proc/self/fd")
        .count()
}

/// An SFTP server with `/upload` writable by the test user.
///
/// Uses the server named by `SFTP_TEST_HOST` (with optional `SFTP_TEST_PORT`,
/// `SFTP_TEST_USER`, `SFTP_TEST_PASS`) when set, otherwise starts an
/// `atmoz/sftp` container.
pub struct SftpServer {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    _container: Option<ContainerAsync<GenericImage>>,
}

impl SftpServer {
    pub async fn start() -> SftpServer {
        init_tracing();
        if let Ok(host) = env::var("SFTP_TEST_HOST") {
            return SftpServer {
                host,
                port: env::var("SFTP_TEST_PORT")
                    .ok()
                    .and_then(|port| port.parse().ok())
                    .unwrap_or(22),
                user: env::var("SFTP_TEST_USER").unwrap_or_else(|_| USER.into()),
                password: env::var("SFTP_TEST_PASS").unwrap_or_else(|_| PASSWORD.into()),
                _container: None,
            };
        }

        let container = GenericImage::new("atmoz/sftp", "alpine")
            .with_exposed_port(ContainerPort::Tcp(22))
            .with_wait_for(WaitFor::message_on_stderr("Server listening on"))
            .with_cmd([format!("{USER}:{PASSWORD}:::upload")])
            .start()
            .await
            .expect("Could not start SFTP container");
        let ports = container.ports().await.expect("Could not get SFTP container ports");
        let port = ports
            .map_to_host_port_ipv4(ContainerPort::Tcp(22))
            .expect("Could not get SFTP container port corresponding to 22");
        tokio::time::sleep(Duration::from_millis(100)).await;

        SftpServer {
            host: "127.0.0.1".into(),
            port,
            user: USER.into(),
            password: PASSWORD.into(),
            _container: Some(container),
        }
    }

    pub fn options(&self) -> ConnectOptions {
        ConnectOptions::new(&self.host, &self.user, &self.password, self.port)
    }
}
