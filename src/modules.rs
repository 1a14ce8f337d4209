//! The host runtime's module registry.
//!
//! A load-testing host discovers extensions by name at startup and asks each
//! registered [`ModuleFactory`] for one [`ModuleInstance`] per virtual user.

use std::{collections::HashMap, fmt, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::{connection::Connection, error::SftpError};

static REGISTRY: Lazy<DashMap<&'static str, Arc<dyn ModuleFactory>>> = Lazy::new(DashMap::new);

/// Opaque identity of one virtual user, handed to every instance it owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VuContext {
    pub id: u64,
}

impl VuContext {
    pub fn new(id: u64) -> VuContext {
        VuContext { id }
    }
}

pub trait ModuleFactory: Send + Sync {
    fn new_module_instance(&self, vu: VuContext) -> Box<dyn ModuleInstance>;
}

pub trait ModuleInstance: Send {
    fn exports(&self) -> Exports;
}

/// Script-facing `connect(host, username, password, port)`.
pub type ConnectFn =
    fn(String, String, String, i64) -> BoxFuture<'static, Result<Connection, SftpError>>;

#[derive(Clone, Copy)]
pub enum Export {
    Connect(ConnectFn),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Connect(_) => f.write_str("Export::Connect"),
        }
    }
}

/// Operations an instance exposes to scripts.
#[derive(Debug, Clone, Default)]
pub struct Exports {
    pub default: Option<Export>,
    pub named: HashMap<&'static str, Export>,
}

/// Registers `factory` under `name`. Returns `false` if the name was already taken,
/// in which case the existing factory is kept.
pub fn register_module(name: &'static str, factory: Arc<dyn ModuleFactory>) -> bool {
    match REGISTRY.entry(name) {
        Entry::Occupied(_) => false,
        Entry::Vacant(vacant) => {
            vacant.insert(factory);
            debug!(module = name, "module registered");
            true
        }
    }
}

pub fn lookup(name: &str) -> Option<Arc<dyn ModuleFactory>> {
    REGISTRY.get(name).map(|factory| factory.value().clone())
}
