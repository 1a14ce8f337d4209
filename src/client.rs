use std::sync::{Arc, Once};

use futures_util::{future::BoxFuture, FutureExt};
use tracing::{debug, debug_span, Instrument};

use crate::{
    connection::Connection,
    error::SftpError,
    modules::{self, Export, Exports, ModuleFactory, ModuleInstance, VuContext},
    options::ConnectOptions,
    ssh_russh,
};

/// Name scripts import this module under.
pub const MODULE_NAME: &str = "k6/x/sftp";

static REGISTER: Once = Once::new();

/// Registers [`SftpModule`] with the host's module registry. Later calls do nothing.
pub fn register() {
    REGISTER.call_once(|| {
        modules::register_module(MODULE_NAME, Arc::new(SftpModule));
    });
}

/// Process-wide factory handing out one [`SftpClient`] per virtual user.
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpModule;

impl SftpModule {
    pub fn new_client(&self, vu: VuContext) -> SftpClient {
        debug!(vu = vu.id, "sftp client created");
        SftpClient { vu }
    }
}

impl ModuleFactory for SftpModule {
    fn new_module_instance(&self, vu: VuContext) -> Box<dyn ModuleInstance> {
        Box::new(self.new_client(vu))
    }
}

/// Per-VU entry point. Holds nothing but the VU identity, so clients never share state.
#[derive(Debug, Clone, Copy)]
pub struct SftpClient {
    vu: VuContext,
}

impl SftpClient {
    pub fn vu(&self) -> VuContext {
        self.vu
    }

    /// Same as the exported `connect`, with logs tagged by this client's VU.
    pub async fn connect(
        &self,
        host: &str,
        username: &str,
        password: &str,
        port: i64,
    ) -> Result<Connection, SftpError> {
        let options = ConnectOptions::from_script(host, username, password, port)?;
        self.connect_with(options).await
    }

    pub async fn connect_with(&self, options: ConnectOptions) -> Result<Connection, SftpError> {
        ssh_russh::connect(options)
            .instrument(debug_span!("sftp", vu = self.vu.id))
            .await
    }
}

impl ModuleInstance for SftpClient {
    fn exports(&self) -> Exports {
        let mut exports = Exports::default();
        exports.named.insert("connect", Export::Connect(connect));
        exports
    }
}

/// Script-facing `connect`, exported under the name `connect`.
pub fn connect(
    host: String,
    username: String,
    password: String,
    port: i64,
) -> BoxFuture<'static, Result<Connection, SftpError>> {
    async move {
        let options = ConnectOptions::from_script(&host, &username, &password, port)?;
        ssh_russh::connect(options).await
    }
    .boxed()
}
