//! Connection and listener seams.
//!
//! Abstracts the socket layer for testability: a `Connection` moves whole
//! frames, a `Listener` hands out connections without blocking the accept
//! loop. Production uses TCP; tests use the in-memory mock in `crate::mock`.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};

use shaderfarm_protocol::{read_frame, write_frame, ProtocolError};

/// One accepted client connection, one request/response cycle.
pub trait Connection: Send {
    /// Receive one frame. `Ok(None)` is a benign disconnect before a request.
    fn recv_message(&mut self) -> Result<Option<Vec<u8>>, ProtocolError>;

    /// Send one frame.
    fn send_message(&mut self, payload: &[u8]) -> Result<(), ProtocolError>;

    /// V2.1+ handshake: consume the client's ready token before dispatch.
    /// The token content is ignored; its arrival is the signal.
    fn recv_ready_token(&mut self) -> Result<(), ProtocolError> {
        match self.recv_message()? {
            Some(_) => Ok(()),
            None => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during ready handshake",
            ))),
        }
    }

    fn peer_ip(&self) -> IpAddr;
}

/// Accept source for the server loop.
pub trait Listener: Send {
    /// Try to accept one connection. `Ok(None)` means nothing pending;
    /// the caller sleeps its poll interval and retries.
    fn poll_accept(&mut self) -> io::Result<Option<Box<dyn Connection>>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// TCP-backed connection.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }
}

impl Connection for TcpConnection {
    fn recv_message(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        read_frame(&mut self.stream)
    }

    fn send_message(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        write_frame(&mut self.stream, payload)
    }

    fn peer_ip(&self) -> IpAddr {
        self.peer.ip()
    }
}

/// Non-blocking TCP acceptor. The listener socket stays non-blocking so the
/// accept loop can interleave admission control and shutdown checks; accepted
/// streams are switched back to blocking mode for frame I/O.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }
}

impl Listener for TcpAcceptor {
    fn poll_accept(&mut self) -> io::Result<Option<Box<dyn Connection>>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(Box::new(TcpConnection::new(stream, peer))))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
