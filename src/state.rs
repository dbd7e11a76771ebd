//! Shared server counters and status reporting.
//!
//! The open-connection, active-compile, and exception counters are the only
//! process-wide mutable state besides the cache. All are atomics; decrements
//! are tied to guard objects so they happen exactly once on every exit path.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Process-wide mutable state, shared via `Arc` through the server context.
#[derive(Debug, Default)]
pub struct ServerState {
    open_connections: AtomicUsize,
    active_compiles: AtomicUsize,
    exceptions: AtomicUsize,
    connection_seq: AtomicU64,
    status: Mutex<String>,
    shutdown: AtomicBool,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection: bumps the open count and returns the
    /// monotonic connection number used for diagnostics.
    pub fn connection_opened(&self) -> u64 {
        self.open_connections.fetch_add(1, Ordering::AcqRel);
        self.connection_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Guard whose drop closes the connection accounting. Created by the
    /// worker thread right after it takes ownership of the connection.
    pub fn connection_guard(&self) -> ConnectionGuard<'_> {
        ConnectionGuard { state: self }
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    /// Track one in-flight compile for status reporting.
    pub fn compile_started(&self) -> CompileGuard<'_> {
        self.active_compiles.fetch_add(1, Ordering::AcqRel);
        CompileGuard { state: self }
    }

    pub fn active_compiles(&self) -> usize {
        self.active_compiles.load(Ordering::Acquire)
    }

    pub fn exception_recorded(&self) {
        self.exceptions.fetch_add(1, Ordering::AcqRel);
    }

    pub fn exceptions(&self) -> usize {
        self.exceptions.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Replace the human-readable status line (observability only).
    pub fn set_status(&self, line: String) {
        *self.status.lock().expect("status lock poisoned") = line;
    }

    pub fn status(&self) -> String {
        self.status.lock().expect("status lock poisoned").clone()
    }
}

/// Decrements the open-connection counter exactly once when dropped,
/// regardless of how the job terminated.
pub struct ConnectionGuard<'a> {
    state: &'a ServerState,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.state.connection_closed();
    }
}

/// Decrements the active-compile counter when the backend call finishes.
pub struct CompileGuard<'a> {
    state: &'a ServerState,
}

impl Drop for CompileGuard<'_> {
    fn drop(&mut self) {
        self.state.active_compiles.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_accounting() {
        let state = ServerState::new();
        let first = state.connection_opened();
        let second = state.connection_opened();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(state.open_connections(), 2);

        {
            let _g1 = state.connection_guard();
            let _g2 = state.connection_guard();
        }
        assert_eq!(state.open_connections(), 0);
    }

    #[test]
    fn test_guard_decrements_on_panic_path() {
        let state = ServerState::new();
        state.connection_opened();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.connection_guard();
            panic!("job blew up");
        }));
        assert!(result.is_err());
        assert_eq!(state.open_connections(), 0);
    }

    #[test]
    fn test_compile_guard() {
        let state = ServerState::new();
        {
            let _g = state.compile_started();
            assert_eq!(state.active_compiles(), 1);
        }
        assert_eq!(state.active_compiles(), 0);
    }

    #[test]
    fn test_shutdown_flag() {
        let state = ServerState::new();
        assert!(!state.is_shutdown());
        state.request_shutdown();
        assert!(state.is_shutdown());
    }
}
