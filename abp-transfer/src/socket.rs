//! Datagram transport abstraction.
//!
//! [`Transport`] is the only thing the session layer knows about the network:
//! send bytes to an address, receive bytes from anyone.  [`Socket`] is the
//! real implementation over `tokio::net::UdpSocket`; the
//! [`crate::simulator::FaultyChannel`] decorator wraps any transport to inject
//! loss, delay, duplication and corruption.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

/// An unreliable, unordered datagram channel.
///
/// All methods are `&self` so a transport can be shared across tasks.
pub trait Transport: Send + Sync {
    /// Send `buf` as a single datagram to `dest`.
    fn send_to(
        &self,
        buf: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Wait for the next datagram; returns `(length, source)`.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl<T: Transport> Transport for Arc<T> {
    fn send_to(
        &self,
        buf: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        (**self).send_to(buf, dest)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        (**self).recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for Socket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
