//! Helpers shared by the integration tests.
//!
//! The main piece is [`Server`], a tiny DNS server listening on the
//! loopback interface that answers from a closure and counts the queries
//! it sees.

#![allow(dead_code)]

use domain::base::iana::{Rcode, Rtype};
use domain::base::message::Message;
use domain::base::message_builder::MessageBuilder;
use domain::rdata::{Aaaa, A};
use domain_stub::dial::{Dial, DialFuture, Network, TokioDial};
use std::fs::File;
use std::io::{self, BufReader};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, RootCertStore};
use tokio_rustls::TlsAcceptor;

//------------ Logging -------------------------------------------------------

/// Initializes tracing based logging.
///
/// Override the level with the `RUST_LOG` environment variable, e.g.,
/// `RUST_LOG=trace`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//------------ Reply ---------------------------------------------------------

/// What the server does with a query.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Answer with those addresses that match the query type.
    Addrs(Vec<IpAddr>),

    /// Answer with the given response code and no records.
    Rcode(Rcode),

    /// Don’t answer at all.
    Silent,
}

impl Reply {
    pub fn addrs(addrs: &[&str]) -> Self {
        Reply::Addrs(addrs.iter().map(|s| s.parse().unwrap()).collect())
    }
}

/// Decides how to reply to a query for a name and record type.
///
/// The name is given in lower case without the trailing dot.
pub type Responder = Arc<dyn Fn(&str, Rtype) -> Reply + Send + Sync>;

pub fn responder(
    op: impl Fn(&str, Rtype) -> Reply + Send + Sync + 'static,
) -> Responder {
    Arc::new(op)
}

/// Produces the wire-format reply to `request`, if any.
fn respond(request: &[u8], responder: &Responder) -> Option<Vec<u8>> {
    let msg = Message::from_octets(request.to_vec()).ok()?;
    let question = msg.first_question()?;
    let qname = question.qname().to_string();
    let qname = qname.trim_end_matches('.').to_ascii_lowercase();
    let qtype = question.qtype();

    let (rcode, addrs) = match responder(&qname, qtype) {
        Reply::Addrs(addrs) => (Rcode::NOERROR, addrs),
        Reply::Rcode(rcode) => (rcode, Vec::new()),
        Reply::Silent => return None,
    };
    let mut answer = MessageBuilder::new_vec()
        .start_answer(&msg, rcode)
        .ok()?;
    for addr in addrs {
        match addr {
            IpAddr::V4(addr) if qtype == Rtype::A => {
                answer.push((question.qname(), 300, A::new(addr))).ok()?
            }
            IpAddr::V6(addr) if qtype == Rtype::AAAA => {
                answer.push((question.qname(), 300, Aaaa::new(addr))).ok()?
            }
            _ => {}
        }
    }
    Some(answer.into_message().into_octets())
}

//------------ Server --------------------------------------------------------

/// A DNS server on the loopback interface.
///
/// The server stops when the value is dropped.
pub struct Server {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Server {
    /// Starts a server on UDP.
    pub async fn udp(responder: Responder) -> Self {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = queries.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0; 4096];
            loop {
                let (len, peer) = match sock.recv_from(&mut buf).await {
                    Ok(some) => some,
                    Err(_) => continue,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(reply) = respond(&buf[..len], &responder) {
                    let _ = sock.send_to(&reply, peer).await;
                }
            }
        });
        Server {
            addr,
            queries,
            connections,
            task,
        }
    }

    /// Starts a server on TCP.
    pub async fn tcp(responder: Responder) -> Self {
        Self::stream(responder, None).await
    }

    /// Starts a server using DNS over TLS with the given certificate.
    pub async fn tls(responder: Responder, cert: &str, key: &str) -> Self {
        Self::stream(responder, Some(tls_acceptor(cert, key))).await
    }

    /// Starts a stream server that accepts connections but never speaks.
    ///
    /// Connections are kept open until the server is dropped.
    pub async fn stalled() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let conn_counter = connections.clone();
        let task = tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                if let Ok((sock, _)) = listener.accept().await {
                    conn_counter.fetch_add(1, Ordering::SeqCst);
                    open.push(sock);
                }
            }
        });
        Server {
            addr,
            queries,
            connections,
            task,
        }
    }

    async fn stream(
        responder: Responder,
        acceptor: Option<TlsAcceptor>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let (counter, conn_counter) = (queries.clone(), connections.clone());
        let task = tokio::spawn(async move {
            loop {
                let sock = match listener.accept().await {
                    Ok((sock, _)) => sock,
                    Err(_) => continue,
                };
                conn_counter.fetch_add(1, Ordering::SeqCst);
                let responder = responder.clone();
                let counter = counter.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => {
                            if let Ok(sock) = acceptor.accept(sock).await {
                                serve_stream(sock, &responder, &counter).await
                            }
                        }
                        None => serve_stream(sock, &responder, &counter).await,
                    }
                });
            }
        });
        Server {
            addr,
            queries,
            connections,
            task,
        }
    }

    /// Returns the address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the number of queries received so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Returns the number of stream connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.task.abort()
    }
}

async fn serve_stream<S: AsyncRead + AsyncWrite + Unpin>(
    mut sock: S,
    responder: &Responder,
    counter: &AtomicUsize,
) {
    loop {
        let len = match sock.read_u16().await {
            Ok(len) => len as usize,
            Err(_) => return,
        };
        let mut buf = vec![0; len];
        if sock.read_exact(&mut buf).await.is_err() {
            return;
        }
        counter.fetch_add(1, Ordering::SeqCst);
        let reply = match respond(&buf, responder) {
            Some(reply) => reply,
            None => continue,
        };
        let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&reply);
        if sock.write_all(&framed).await.is_err() {
            return;
        }
    }
}

//------------ TLS -----------------------------------------------------------

/// Returns the path of a file in the test PKI.
pub fn pki(file: &str) -> String {
    format!("{}/test-data/tls/{}", env!("CARGO_MANIFEST_DIR"), file)
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no key"))
}

fn tls_acceptor(cert: &str, key: &str) -> TlsAcceptor {
    let certs = load_certs(Path::new(&pki(cert))).unwrap();
    let key = load_key(Path::new(&pki(key))).unwrap();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Returns a client configuration trusting only the test CA.
pub fn client_config() -> Arc<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(Path::new(&pki("ca.pem"))).unwrap() {
        roots.add(cert).unwrap();
    }
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

//------------ TestDial ------------------------------------------------------

/// A dialer refusing some addresses and probing deterministically.
///
/// IPv4 destinations are reachable from 192.168.1.100, IPv6 destinations
/// are not reachable at all.
#[derive(Debug, Default)]
pub struct TestDial {
    inner: TokioDial,
    refused: Vec<SocketAddr>,
    dials: Mutex<Vec<SocketAddr>>,
}

impl TestDial {
    pub fn refusing(refused: &[SocketAddr]) -> Self {
        TestDial {
            refused: refused.into(),
            ..Default::default()
        }
    }

    /// Returns the addresses dialed so far.
    pub fn dials(&self) -> Vec<SocketAddr> {
        self.dials.lock().unwrap().clone()
    }
}

impl Dial for TestDial {
    fn dial(&self, network: Network, addr: SocketAddr) -> DialFuture<'_> {
        self.dials.lock().unwrap().push(addr);
        if self.refused.contains(&addr) {
            return Box::pin(async {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            });
        }
        self.inner.dial(network, addr)
    }

    fn probe_source(&self, dst: IpAddr) -> Option<IpAddr> {
        match dst {
            IpAddr::V4(_) => Some(Ipv4Addr::new(192, 168, 1, 100).into()),
            IpAddr::V6(_) => None,
        }
    }
}
