pub mod api;
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod history;
pub mod pattern;
pub mod preset;
pub mod preset_store;
pub mod provisioning;
pub mod restore;
pub mod schedule;
pub mod session;

pub use error::{BackendError, ClientError, ErrorKind, Result};
