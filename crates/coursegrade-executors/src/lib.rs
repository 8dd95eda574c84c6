//! coursegrade-executors: Remote execution clients.
//!
//! Implements the `CodeExecutor` trait over HTTP interpreter services for
//! JavaScript and PHP, with a bounded wait on every call.

pub mod client;
pub mod config;
pub mod error;
pub mod javascript;
pub mod mock;
pub mod php;
pub mod registry;

pub use client::{RemoteInterpreter, DEFAULT_TIMEOUT};
pub use config::{build_registry, load_config, load_config_from, GraderConfig, ServiceConfig};
pub use error::ExecutionError;
pub use registry::ExecutorRegistry;
