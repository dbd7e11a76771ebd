//! Server assembly and lifecycle.
//!
//! `Server::bind` wires the collaborators into a [`ServerContext`], creates
//! the working directories, and claims the listen socket; `Server::run`
//! starts the cache load and housekeeping threads and drives the accept loop
//! until shutdown is requested.

pub mod acceptor;
pub mod admission;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;

use shaderfarm_cache::CacheStore;
use tracing::info;

use crate::config::{ConfigError, ServerEnvironment};
use crate::errorlog::{ErrorLog, LogNotifier, MailNotifier};
use crate::housekeeping;
use crate::job::{CompileBackend, ProcessBackend};
use crate::shaderlist::{FileShaderList, ShaderListBookkeeping};
use crate::state::ServerState;
use crate::transport::{Listener, TcpAcceptor};

pub use admission::{AdmissionControl, AdmissionPermit};

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Immutable wiring shared by every server thread.
pub struct ServerContext {
    pub env: ServerEnvironment,
    pub state: ServerState,
    /// `None` when caching is disabled in the environment.
    pub cache: Option<Arc<CacheStore>>,
    pub errors: ErrorLog,
    pub backend: Arc<dyn CompileBackend>,
    pub shader_lists: Arc<dyn ShaderListBookkeeping>,
}

impl ServerContext {
    /// Assemble a context from an environment and explicit collaborators.
    /// Creates the working directories as a side effect.
    pub fn new(
        env: ServerEnvironment,
        backend: Arc<dyn CompileBackend>,
        shader_lists: Arc<dyn ShaderListBookkeeping>,
        notifier: Box<dyn MailNotifier>,
    ) -> Result<Self, ServerError> {
        env.ensure_directories()?;
        let cache = env
            .caching
            .then(|| Arc::new(CacheStore::new(env.cache_dir.clone())));
        let errors = ErrorLog::new(
            env.error_dir.clone(),
            env.dedupe_window,
            env.mail.interval,
            notifier,
        );
        Ok(Self {
            state: ServerState::new(),
            cache,
            errors,
            backend,
            shader_lists,
            env,
        })
    }
}

pub struct Server {
    ctx: Arc<ServerContext>,
    listener: Box<dyn Listener>,
    admission: Arc<AdmissionControl>,
}

impl Server {
    /// Bind with the production collaborators derived from the environment.
    pub fn bind(env: ServerEnvironment) -> Result<Self, ServerError> {
        let backend = Arc::new(ProcessBackend::new(&env.compiler_dir));
        let shader_lists = Arc::new(FileShaderList::new(env.shader_dir.clone()));
        Self::bind_with(env, backend, shader_lists, Box::new(LogNotifier))
    }

    /// Bind with explicit collaborators. Integration tests use this to swap
    /// in mocks while keeping the real listener and threading.
    pub fn bind_with(
        env: ServerEnvironment,
        backend: Arc<dyn CompileBackend>,
        shader_lists: Arc<dyn ShaderListBookkeeping>,
        notifier: Box<dyn MailNotifier>,
    ) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), env.port);
        let listener = TcpAcceptor::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let admission = Arc::new(AdmissionControl::new(env.max_connections));
        let ctx = Arc::new(ServerContext::new(env, backend, shader_lists, notifier)?);
        Ok(Self {
            ctx,
            listener: Box::new(listener),
            admission,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    /// Run until shutdown is requested on the context state.
    ///
    /// The cache loads on its own thread so the server accepts connections
    /// immediately; lookups miss until the load finalizes. Worker threads
    /// are detached, so jobs in flight at shutdown finish on their own.
    pub fn run(mut self) -> Result<(), ServerError> {
        if let Some(cache) = &self.ctx.cache {
            let cache = Arc::clone(cache);
            thread::Builder::new()
                .name("cache-load".into())
                .spawn(move || {
                    cache.load();
                    cache.finalize();
                })?;
        }

        let keeper = housekeeping::spawn(Arc::clone(&self.ctx))?;

        info!(addr = %self.local_addr()?, "accepting connections");
        acceptor::run_accept_loop(&self.ctx, self.listener.as_mut(), &self.admission);

        keeper.join().map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "housekeeping thread panicked")
        })?;
        info!("server stopped");
        Ok(())
    }
}
