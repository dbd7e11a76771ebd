//! Server integration tests
//!
//! Runs the full server (real TCP listener, worker threads, housekeeping)
//! against mock compile backends and talks to it over a socket the way a
//! game client would.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shaderfarm::errorlog::LogNotifier;
use shaderfarm::mock::{MockBackend, RecordingShaderList};
use shaderfarm::protocol::{read_frame, write_frame, JobState};
use shaderfarm::{CompileBackend, Server, ServerEnvironment, ShaderListBookkeeping};
use tempfile::TempDir;

/// Bind a server on an ephemeral port with the given backend.
fn start_server(
    dir: &TempDir,
    max_connections: usize,
    backend: Arc<MockBackend>,
) -> (
    Arc<shaderfarm::ServerContext>,
    std::net::SocketAddr,
    thread::JoinHandle<()>,
) {
    let mut env = ServerEnvironment::for_root(dir.path());
    env.port = 0;
    env.max_connections = max_connections;
    env.accept_poll = Duration::from_millis(5);

    let server = Server::bind_with(
        env,
        backend as Arc<dyn CompileBackend>,
        Arc::new(RecordingShaderList::default()) as Arc<dyn ShaderListBookkeeping>,
        Box::new(LogNotifier),
    )
    .unwrap();
    let ctx = server.context();
    // The listener binds the wildcard address; clients dial loopback.
    let port = server.local_addr().unwrap().port();
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let handle = thread::spawn(move || server.run().unwrap());
    (ctx, addr, handle)
}

/// One client round trip: send the request XML, return the raw response body.
fn roundtrip(addr: std::net::SocketAddr, xml: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    write_frame(&mut stream, xml.as_bytes()).unwrap();
    read_frame(&mut stream).unwrap().unwrap()
}

#[test]
fn test_end_to_end_compile() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::succeeding(b"compiled".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, Arc::clone(&backend));

    let body = roundtrip(addr, r#"<Job Version="2.0" Platform="DX11" JobType="Compile"/>"#);
    assert_eq!(body[0], JobState::Completed.code());
    assert_eq!(&body[1..], b"compiled");
    assert_eq!(backend.calls(), 1);

    ctx.state.request_shutdown();
    handle.join().unwrap();
}

#[test]
fn test_legacy_client_round_trip() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::succeeding(b"legacy blob".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, Arc::clone(&backend));

    // No Version attribute: the response is the bare payload.
    let body = roundtrip(addr, r#"<Compile Platform="GL4"/>"#);
    assert_eq!(body, b"legacy blob");

    ctx.state.request_shutdown();
    handle.join().unwrap();
}

#[test]
fn test_ready_handshake_over_tcp() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::succeeding(b"spv".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, backend);

    let mut stream = TcpStream::connect(addr).unwrap();
    write_frame(
        &mut stream,
        br#"<Job Version="2.1" Platform="VULKAN" JobType="Compile"/>"#,
    )
    .unwrap();
    write_frame(&mut stream, b"ready").unwrap();
    let body = read_frame(&mut stream).unwrap().unwrap();
    assert_eq!(body[0], JobState::Completed.code());
    assert_eq!(&body[1..], b"spv");

    ctx.state.request_shutdown();
    handle.join().unwrap();
}

#[test]
fn test_admission_serializes_beyond_the_ceiling() {
    let dir = TempDir::new().unwrap();
    let delay = Duration::from_millis(150);
    let backend = Arc::new(MockBackend::succeeding(b"out".to_vec()).with_delay(delay));
    let (ctx, addr, handle) = start_server(&dir, 1, Arc::clone(&backend));

    let started = Instant::now();
    let clients: Vec<_> = (0..2)
        .map(|_| {
            thread::spawn(move || {
                roundtrip(addr, r#"<Job Version="2.0" Platform="DX11" JobType="Compile"/>"#)
            })
        })
        .collect();
    for client in clients {
        let body = client.join().unwrap();
        assert_eq!(body[0], JobState::Completed.code());
    }

    // Both jobs compiled, one after the other.
    assert_eq!(backend.calls(), 2);
    assert!(started.elapsed() >= delay * 2);

    ctx.state.request_shutdown();
    handle.join().unwrap();
}

#[test]
fn test_counters_return_to_zero() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::succeeding(b"out".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, backend);

    for _ in 0..3 {
        roundtrip(addr, r#"<Job Version="2.0" Platform="DX11" JobType="Compile"/>"#);
    }

    // Workers are detached; give their guards a moment to drop.
    let deadline = Instant::now() + Duration::from_secs(2);
    while ctx.state.open_connections() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(ctx.state.open_connections(), 0);
    assert_eq!(ctx.state.active_compiles(), 0);

    ctx.state.request_shutdown();
    handle.join().unwrap();
}

#[test]
fn test_cached_result_survives_restart() {
    let dir = TempDir::new().unwrap();
    let xml = r#"<Job Version="2.0" Platform="DX11" JobType="Compile">body</Job>"#;

    let backend = Arc::new(MockBackend::succeeding(b"first run".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, Arc::clone(&backend));
    let body = roundtrip(addr, xml);
    assert_eq!(&body[1..], b"first run");

    // Housekeeping persists the insert before shutdown completes.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !dir.path().join("Cache").join("Cache.dat").exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    ctx.state.request_shutdown();
    handle.join().unwrap();

    // Second server instance, different backend output: the cache wins.
    let backend = Arc::new(MockBackend::succeeding(b"second run".to_vec()));
    let (ctx, addr, handle) = start_server(&dir, 4, Arc::clone(&backend));
    let deadline = Instant::now() + Duration::from_secs(2);
    while !ctx.cache.as_ref().unwrap().is_ready() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let body = roundtrip(addr, xml);
    assert_eq!(&body[1..], b"first run");
    assert_eq!(backend.calls(), 0);

    ctx.state.request_shutdown();
    handle.join().unwrap();
}
