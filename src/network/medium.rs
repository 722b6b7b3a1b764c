//! ## The broadcast medium under the transport
//!
//! [Medium] is whatever moves raw datagrams between nodes. On the real network it is a
//! [UdpMedium], one UDP broadcast socket per logical port. [MemoryHub] gives an in-process
//! medium with the same semantics (every endpoint, the sender included, sees every datagram)
//! so several nodes can be run inside one process.

use crate::config;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;


/// A shared, unreliable broadcast channel for datagrams.
///
/// Each transport task owns its own `Medium`, nothing else touches it.
pub trait Medium: Send + 'static {
    /// Broadcasts one datagram to everyone on the medium.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next datagram and copies it into `buf`.
    ///
    /// ## Returns
    /// - Number of bytes written to `buf`. Datagrams longer than `buf` are truncated.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}


/// UDP broadcast socket bound to one port.
pub struct UdpMedium {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
}

impl UdpMedium {
    /// Sets up a reusable broadcast socket listening on `port`.
    ///
    /// ## Behavior
    /// - Binds to [config::BC_LISTEN_ADDR] with reuse-address and broadcast enabled,
    ///   so several nodes on the same host can share the port
    /// - Sends to [config::BC_ADDR] on the same port
    ///
    /// ## Note
    /// Must be called from within a tokio runtime.
    pub fn bind(port: u16) -> io::Result<Self> {
        Self::open(port, port)
    }

    /// Sets up a broadcast socket for sending only, bound to an ephemeral port.
    ///
    /// Datagrams are sent to [config::BC_ADDR] on `port`.
    pub fn sender(port: u16) -> io::Result<Self> {
        Self::open(0, port)
    }

    fn open(bind_port: u16, port: u16) -> io::Result<Self> {
        let bind_addr: SocketAddr = format!("{}:{}", config::BC_LISTEN_ADDR, bind_port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let broadcast_addr: SocketAddr = format!("{}:{}", config::BC_ADDR, port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&bind_addr.into())?;

        Ok(Self {
            socket: UdpSocket::from_std(socket.into())?,
            broadcast_addr,
        })
    }
}

impl Medium for UdpMedium {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.broadcast_addr).await?;
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, _) = self.socket.recv_from(buf).await?;
        Ok(len)
    }
}


/// In-process broadcast medium. Endpoints are created with [MemoryHub::attach].
#[derive(Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<Vec<u8>>,
}

impl MemoryHub {
    /// Creates a hub buffering at most `capacity` datagrams per slow endpoint.
    /// Older datagrams are lost when an endpoint falls behind, like on a real network.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a new endpoint. It sees datagrams sent after this call.
    pub fn attach(&self) -> MemoryMedium {
        MemoryMedium {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

/// One endpoint on a [MemoryHub]
pub struct MemoryMedium {
    tx: broadcast::Sender<Vec<u8>>,
    rx: broadcast::Receiver<Vec<u8>>,
}

impl Medium for MemoryMedium {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        // Ingen mottakarar er ikkje ein feil på eit broadcast-nett
        let _ = self.tx.send(datagram.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.rx.recv().await {
                Ok(datagram) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    return Ok(len);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory hub closed"));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_endpoint_sees_every_datagram() {
        let hub = MemoryHub::new(16);
        let mut a = hub.attach();
        let mut b = hub.attach();

        a.send(b"hei").await.unwrap();

        let mut buf = [0u8; 8];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hei");
        // Avsendaren får sin eigen pakke tilbake, som på UDP broadcast
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hei");
    }

    #[tokio::test]
    async fn long_datagrams_are_truncated() {
        let hub = MemoryHub::new(16);
        let mut a = hub.attach();
        a.send(b"abcdef").await.unwrap();

        let mut buf = [0u8; 4];
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"abcd");
    }
}
