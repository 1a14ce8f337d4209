pub mod client;
pub mod connection;
pub mod error;
pub mod modules;
pub mod options;
pub mod session;
pub mod ssh_russh;

pub use client::{register, SftpClient, SftpModule, MODULE_NAME};
pub use connection::Connection;
pub use error::{CloseError, ConnectStage, Direction, SftpError};
pub use options::ConnectOptions;
pub use session::FileEntry;
pub use ssh_russh::connect as connect_with_options;
