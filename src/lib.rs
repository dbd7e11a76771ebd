//! Shader Farm - compile-farm coordination server
//!
//! This crate implements the shader farm coordinator, a TCP server that
//! accepts versioned XML compile requests from game clients, dispatches
//! them to per-platform compiler toolchains, and serves repeat requests
//! from a crash-tolerant result cache.

pub mod config;
pub mod errorlog;
pub mod housekeeping;
pub mod job;
pub mod mock;
pub mod server;
pub mod shaderlist;
pub mod state;
pub mod transport;

pub use shaderfarm_cache as cache;
pub use shaderfarm_protocol as protocol;

pub use config::{ConfigError, ServerEnvironment};
pub use errorlog::{ErrorLog, ErrorRecord, MailNotifier};
pub use job::{CompileBackend, CompileFailure, CompileInvocation};
pub use server::{Server, ServerContext, ServerError};
pub use shaderlist::ShaderListBookkeeping;
pub use state::ServerState;
pub use transport::{Connection, Listener};
