use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Reply written after every client message
pub const ACK: &[u8] = b"I got your message";

const RECV_BUFFER_SIZE: usize = 16384; // 16KB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Reading,
    Responding,
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One read's worth of client bytes; `acked` is false if the reply failed
    Message { payload: Vec<u8>, acked: bool },
    /// Read timed out with nothing to do
    Idle,
    Closed,
}

/// One accepted client stream
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
    read_buf: Vec<u8>,
}

impl Connection {
    /// Wrap an accepted stream; reads and acknowledgements wait at most
    /// `io_timeout`
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        io_timeout: Duration,
    ) -> std::io::Result<Self> {
        // accepted sockets may inherit non-blocking mode from the listener
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Connection {
            stream,
            peer,
            state: ConnectionState::Accepted,
            read_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Wait up to the read timeout for client data.
    ///
    /// A message is acknowledged before it is returned. A read timeout is
    /// `Idle`; any other read failure closes the connection. A client that
    /// stops draining its acknowledgements is closed once the write times out.
    pub fn poll(&mut self) -> ConnectionEvent {
        if self.is_closed() {
            return ConnectionEvent::Closed;
        }
        self.state = ConnectionState::Reading;

        let n = loop {
            match self.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    debug!("{} closed the connection", self.peer);
                    return self.close();
                }
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return ConnectionEvent::Idle;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Read error from {}: {}", self.peer, e);
                    return self.close();
                }
            }
        };

        let message = self.read_buf[..n].to_vec();
        trace!("Here is the message: {}", String::from_utf8_lossy(&message));

        self.state = ConnectionState::Responding;
        if let Err(e) = self.stream.write_all(ACK) {
            warn!("Write error to {}: {}", self.peer, e);
            // the message still counts; the next poll reports the close
            self.close();
            return ConnectionEvent::Message { payload: message, acked: false };
        }
        self.state = ConnectionState::Reading;
        ConnectionEvent::Message { payload: message, acked: true }
    }

    fn close(&mut self) -> ConnectionEvent {
        self.state = ConnectionState::Closed;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        ConnectionEvent::Closed
    }
}
