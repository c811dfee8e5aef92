//! Non-blocking TCP wrappers.
//!
//! Thin wrappers over `std::net` presenting the byte-pipe contract the
//! protocol engines consume: poll-based accept and read that report
//! would-block distinctly from close, plus write-all send and an explicit
//! disconnect. Callers poll from scheduled actions, typically every
//! millisecond.

use std::io::{ErrorKind, Read as _, Write as _};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::Result;

/// The conventional delay between socket polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of a single non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum Read {
    /// This many bytes were read into the buffer.
    Data(usize),
    /// Nothing available right now.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
}

/// A non-blocking listening socket.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds and switches the socket to non-blocking mode.
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self> {
        let inner = TcpListener::bind(address)?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner })
    }

    /// Accepts one pending connection, or `None` when there is none.
    pub fn poll_accept(&self) -> Result<Option<Stream>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                stream.set_nonblocking(true)?;
                Ok(Some(Stream { inner: stream }))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

/// A non-blocking connected socket.
pub struct Stream {
    inner: TcpStream,
}

impl Stream {
    /// Connects, then switches the socket to non-blocking mode.
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self> {
        let inner = TcpStream::connect(address)?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner })
    }

    /// Reads whatever is available into `buffer`.
    pub fn poll_read(&mut self, buffer: &mut [u8]) -> Result<Read> {
        match self.inner.read(buffer) {
            Ok(0) => Ok(Read::Closed),
            Ok(count) => Ok(Read::Data(count)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Read::WouldBlock),
            Err(err) if err.kind() == ErrorKind::ConnectionReset => Ok(Read::Closed),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes all of `bytes`, retrying over transient would-block stalls.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            match self.inner.write(remaining) {
                Ok(count) => remaining = &remaining[count..],
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Closes both directions.
    pub fn disconnect(&mut self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }

    /// The peer address.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.inner.peer_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_reports_would_block_as_none() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        assert!(listener.poll_accept().unwrap().is_none());
    }

    #[test]
    fn round_trips_bytes_between_peers() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let mut client = Stream::connect(address).unwrap();
        let mut server = loop {
            if let Some(stream) = listener.poll_accept().unwrap() {
                break stream;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        client.send(b"ping").unwrap();
        let mut buffer = [0u8; 16];
        let mut received = Vec::new();
        while received.len() < 4 {
            match server.poll_read(&mut buffer).unwrap() {
                Read::Data(count) => received.extend_from_slice(&buffer[..count]),
                Read::WouldBlock => std::thread::sleep(POLL_INTERVAL),
                Read::Closed => panic!("peer closed early"),
            }
        }
        assert_eq!(received, b"ping");
    }

    #[test]
    fn disconnect_is_observed_as_closed() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let mut client = Stream::connect(address).unwrap();
        let mut server = loop {
            if let Some(stream) = listener.poll_accept().unwrap() {
                break stream;
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        client.disconnect();

        let mut buffer = [0u8; 16];
        loop {
            match server.poll_read(&mut buffer).unwrap() {
                Read::Closed => break,
                Read::WouldBlock => std::thread::sleep(POLL_INTERVAL),
                Read::Data(_) => {}
            }
        }
    }
}
