//! Mock collaborators for tests.
//!
//! `MockConnection` feeds scripted frames through the job processor and
//! records what the server sends back; `MockBackend` stands in for the
//! compiler toolchains; `RecordingShaderList` captures request-line
//! registrations. All are also available to integration tests.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use shaderfarm_protocol::ProtocolError;

use crate::job::{CompileBackend, CompileFailure, CompileInvocation};
use crate::shaderlist::ShaderListBookkeeping;
use crate::transport::Connection;

/// Scripted compile backend.
pub struct MockBackend {
    result: Result<Vec<u8>, CompileFailure>,
    /// Artificial latency per compile, for concurrency tests.
    delay: Duration,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn succeeding(output: Vec<u8>) -> Self {
        Self {
            result: Ok(output),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: &str, detail: &str) -> Self {
        Self {
            result: Err(CompileFailure::new(kind, detail)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

impl CompileBackend for MockBackend {
    fn compile(&self, _invocation: &CompileInvocation<'_>) -> Result<Vec<u8>, CompileFailure> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.result.clone()
    }
}

/// In-memory connection with scripted incoming frames.
pub struct MockConnection {
    incoming: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    peer: IpAddr,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            sent: Vec::new(),
            peer: "127.0.0.1".parse().expect("loopback address"),
        }
    }

    pub fn from_peer(peer: IpAddr) -> Self {
        Self {
            peer,
            ..Self::new()
        }
    }

    /// Queue a request frame.
    pub fn push_request(&mut self, xml: &str) {
        self.incoming.push_back(xml.as_bytes().to_vec());
    }

    /// Queue the V2.1+ ready token the client sends before dispatch.
    pub fn push_ready_token(&mut self) {
        self.incoming.push_back(b"ready".to_vec());
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for MockConnection {
    fn recv_message(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        Ok(self.incoming.pop_front())
    }

    fn send_message(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn peer_ip(&self) -> IpAddr {
        self.peer
    }
}

/// Captures request-line registrations instead of writing list files.
#[derive(Default)]
pub struct RecordingShaderList {
    lines: Mutex<Vec<(String, String)>>,
    ticks: AtomicUsize,
}

impl RecordingShaderList {
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().expect("mock lock poisoned").clone()
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::Acquire)
    }
}

impl ShaderListBookkeeping for RecordingShaderList {
    fn add_request_line(&self, platform: &str, _peer_ip: IpAddr, line: &str) {
        self.lines
            .lock()
            .expect("mock lock poisoned")
            .push((platform.to_string(), line.to_string()));
    }

    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}
