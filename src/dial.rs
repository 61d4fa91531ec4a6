//! Establishing connections to upstream servers.
//!
//! The resolver never opens sockets itself. Instead, it asks a [`Dial`]
//! implementation for a connection to a server over one of the two plain
//! transports in [`Network`]. This makes it possible to run the resolver
//! atop something other than the operating system’s network stack.
//! [`TokioDial`] is the implementation using Tokio’s sockets and is used
//! unless the configuration says otherwise.
//!
//! The same trait also provides the source address probe used when
//! ordering addresses, see [`Dial::probe_source`].

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tracing::trace;

//------------ Module Configuration ------------------------------------------

/// How many times do we try a new random port if we get ‘address in use.’
const RETRY_RANDOM_PORT: usize = 10;

/// The port used when probing for a source address.
///
/// Nothing is ever sent to it.
const PROBE_PORT: u16 = 9;

//------------ Network -------------------------------------------------------

/// A plain transport a connection can be made over.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Network {
    /// Datagrams over UDP.
    Udp,

    /// A byte stream over TCP.
    Tcp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Network::Udp => f.write_str("udp"),
            Network::Tcp => f.write_str("tcp"),
        }
    }
}

//------------ AsyncDgram ----------------------------------------------------

/// A connected datagram socket.
pub trait AsyncDgram: Send + Sync {
    /// Sends a datagram to the connected peer.
    fn send<'a>(&'a self, buf: &'a [u8]) -> IoFuture<'a, usize>;

    /// Receives a datagram from the connected peer.
    ///
    /// Returns the length of the datagram written into `buf`.
    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> IoFuture<'a, usize>;
}

impl AsyncDgram for UdpSocket {
    fn send<'a>(&'a self, buf: &'a [u8]) -> IoFuture<'a, usize> {
        Box::pin(UdpSocket::send(self, buf))
    }

    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> IoFuture<'a, usize> {
        Box::pin(UdpSocket::recv(self, buf))
    }
}

/// The future returned by the methods of [`AsyncDgram`].
pub type IoFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, io::Error>> + Send + 'a>>;

//------------ AsyncStream ---------------------------------------------------

/// A connected byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

//------------ Connection ----------------------------------------------------

/// An established connection to a server.
///
/// The connection is closed when the value is dropped.
pub enum Connection {
    /// A datagram connection.
    Dgram(Box<dyn AsyncDgram>),

    /// A stream connection.
    Stream(Box<dyn AsyncStream>),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Connection::Dgram(_) => f.write_str("Connection::Dgram"),
            Connection::Stream(_) => f.write_str("Connection::Stream"),
        }
    }
}

//------------ Dial ----------------------------------------------------------

/// Establish connections to servers.
pub trait Dial: fmt::Debug + Send + Sync {
    /// Connects to `addr` over the given network.
    ///
    /// For [`Network::Udp`], the returned connection should be a
    /// [`Connection::Dgram`], for [`Network::Tcp`] a
    /// [`Connection::Stream`].
    fn dial(&self, network: Network, addr: SocketAddr) -> DialFuture<'_>;

    /// Returns the local address that would be used to reach `dst`.
    ///
    /// This must not transmit anything. It returns `None` if `dst` isn’t
    /// reachable at all. The default implementation connects an unbound
    /// UDP socket to the destination and asks for its local address.
    ///
    /// The probe runs synchronously on the lookup task while the results
    /// are sorted, so implementations must not block for long.
    fn probe_source(&self, dst: IpAddr) -> Option<IpAddr> {
        probe_udp_source(dst)
    }
}

/// The future returned by [`Dial::dial`].
pub type DialFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Connection, io::Error>> + Send + 'a>>;

//------------ TokioDial -----------------------------------------------------

/// Dials servers using Tokio’s sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioDial;

impl TokioDial {
    /// Binds a UDP socket to a random local port and connects it.
    async fn udp_connect(addr: SocketAddr) -> Result<UdpSocket, io::Error> {
        let sock = Self::udp_bind(addr.is_ipv4()).await?;
        sock.connect(addr).await?;
        Ok(sock)
    }

    /// Binds to a local UDP port.
    async fn udp_bind(v4: bool) -> Result<UdpSocket, io::Error> {
        let mut i = 0;
        loop {
            let local: SocketAddr = if v4 {
                ([0u8; 4], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            match UdpSocket::bind(&local).await {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    if i == RETRY_RANDOM_PORT {
                        return Err(err);
                    } else {
                        i += 1
                    }
                }
            }
        }
    }
}

impl Dial for TokioDial {
    fn dial(&self, network: Network, addr: SocketAddr) -> DialFuture<'_> {
        Box::pin(async move {
            trace!(%network, %addr, "dialing");
            match network {
                Network::Udp => {
                    let sock = Self::udp_connect(addr).await?;
                    Ok(Connection::Dgram(Box::new(sock)))
                }
                Network::Tcp => {
                    let sock = TcpStream::connect(addr).await?;
                    Ok(Connection::Stream(Box::new(sock)))
                }
            }
        })
    }
}

//------------ probe_udp_source ----------------------------------------------

/// Determines the local address for reaching `dst` via a UDP connect.
///
/// Connecting a UDP socket only consults the routing table, so no packet
/// leaves the host.
pub fn probe_udp_source(dst: IpAddr) -> Option<IpAddr> {
    let local: SocketAddr = match dst {
        IpAddr::V4(_) => ([0u8; 4], 0).into(),
        IpAddr::V6(_) => ([0u16; 8], 0).into(),
    };
    let sock = std::net::UdpSocket::bind(local).ok()?;
    sock.connect(SocketAddr::new(dst, PROBE_PORT)).ok()?;
    sock.local_addr().ok().map(|addr| addr.ip())
}

//============ Testing =======================================================
