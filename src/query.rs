//! Executing a single query.
//!
//! A query asks one server for one record type of one name. It dials the
//! server, performs the TLS handshake if so configured, exchanges exactly
//! one request and its reply, and classifies the reply’s response code.
//! The connection lives only for the duration of the query.

use crate::conf::{Protocol, ResolvConf, ServerAddr};
use crate::context::{Interrupted, LookupContext};
use crate::dial::{AsyncDgram, AsyncStream, Connection};
use crate::error::{Detail, Error, ErrorContext, ErrorKind};
use domain::base::iana::{Rcode, Rtype};
use domain::base::message::Message;
use domain::base::message_builder::MessageBuilder;
use domain::base::name::Name;
use domain::rdata::{Aaaa, A};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace};

//------------ Module Configuration ------------------------------------------

/// The size of the buffer for receiving datagrams.
const RECV_SIZE: usize = 4096;

//------------ Request -------------------------------------------------------

/// A request message for a single question.
#[derive(Clone, Debug)]
pub(crate) struct Request {
    message: Message<Vec<u8>>,
}

impl Request {
    /// Creates a recursive query for `qname` and `rtype` with a random ID.
    pub fn new(
        qname: &Name<Vec<u8>>,
        rtype: Rtype,
    ) -> Result<Self, io::Error> {
        let mut builder = MessageBuilder::new_vec();
        builder.header_mut().set_rd(true);
        builder.header_mut().set_random_id();
        let mut builder = builder.question();
        builder.push((qname, rtype)).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "query too long")
        })?;
        Ok(Request {
            message: builder.into_message(),
        })
    }

    /// Returns the message as a datagram.
    pub fn dgram(&self) -> &[u8] {
        self.message.as_slice()
    }

    /// Returns the message with the two octet length prefix for streams.
    pub fn stream(&self) -> Vec<u8> {
        let msg = self.message.as_slice();
        let mut res = Vec::with_capacity(msg.len() + 2);
        res.extend_from_slice(&(msg.len() as u16).to_be_bytes());
        res.extend_from_slice(msg);
        res
    }

    /// Returns whether `reply` is an answer to this request.
    pub fn is_answered_by(&self, reply: &Message<Vec<u8>>) -> bool {
        reply.is_answer(&self.message)
    }
}

//------------ Answer --------------------------------------------------------

/// A successful reply.
#[derive(Clone, Debug)]
pub(crate) struct Answer {
    message: Message<Vec<u8>>,
}

impl Answer {
    /// Appends the addresses in the answer section to `addrs`.
    ///
    /// Addresses are appended in the order the records appear. Records
    /// other than A and AAAA are skipped. Parsing stops at the first
    /// malformed record.
    pub fn collect_addrs(&self, addrs: &mut Vec<IpAddr>) {
        let section = match self.message.answer() {
            Ok(section) => section,
            Err(_) => return,
        };
        for record in section {
            let record = match record {
                Ok(record) => record,
                Err(_) => break,
            };
            if let Ok(Some(record)) = record.to_record::<A>() {
                addrs.push(record.data().addr().into());
            } else if let Ok(Some(record)) = record.to_record::<Aaaa>() {
                addrs.push(record.data().addr().into());
            }
        }
    }
}

//------------ execute -------------------------------------------------------

/// Asks `server` for the `rtype` records of `qname`.
///
/// The name is given twice: `fqdn` is its textual form used in errors.
pub(crate) async fn execute(
    cx: &LookupContext,
    conf: &ResolvConf,
    server: ServerAddr,
    fqdn: &str,
    qname: &Name<Vec<u8>>,
    rtype: Rtype,
) -> Result<Answer, Error> {
    let deadline = cx.effective_deadline(conf.timeout);
    let addr = server.socket_addr(conf.protocol);
    let err_cx = ErrorContext::new(fqdn).with_server(addr);
    debug!(%addr, protocol = %conf.protocol, %rtype, name = fqdn, "query");

    let request = Request::new(qname, rtype)
        .map_err(|err| err_cx.extend(transport(err)))?;

    let conn = match cx
        .run(deadline, conf.dialer.dial(conf.protocol.network(), addr))
        .await
    {
        Ok(Ok(conn)) => conn,
        Ok(Err(err)) => {
            debug!(%addr, "dial failed: {}", err);
            return Err(err_cx.extend(transport(err)));
        }
        Err(reason) => return Err(err_cx.extend(interrupted(reason))),
    };

    let conn = secure(cx, deadline, conf, addr, conn, &err_cx).await?;

    let reply = match conn {
        Connection::Dgram(sock) => {
            cx.run(deadline, exchange_dgram(sock.as_ref(), &request))
                .await
        }
        Connection::Stream(mut stream) => {
            cx.run(deadline, exchange_stream(&mut stream, &request))
                .await
        }
    };
    let reply = match reply {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            debug!(%addr, "exchange failed: {}", err);
            return Err(err_cx.extend(transport(err)));
        }
        Err(reason) => return Err(err_cx.extend(interrupted(reason))),
    };

    classify(reply, &err_cx)
}

/// Turns a reply into an answer or an error based on its response code.
fn classify(
    reply: Message<Vec<u8>>,
    err_cx: &ErrorContext,
) -> Result<Answer, Error> {
    let rcode = reply.header().rcode();
    trace!(%rcode, "reply");
    if rcode == Rcode::NOERROR {
        Ok(Answer { message: reply })
    } else if rcode == Rcode::NXDOMAIN {
        Err(err_cx.extend(ErrorKind::NotFound))
    } else {
        // SERVFAIL may go away, so don’t let it be cached.
        Err(err_cx.extend(
            Detail::new(ErrorKind::ServerMisbehaving(rcode))
                .temporary(rcode == Rcode::SERVFAIL),
        ))
    }
}

fn transport(err: io::Error) -> Detail {
    Detail::new(ErrorKind::Transport(Arc::new(err))).temporary(true)
}

fn interrupted(reason: Interrupted) -> Detail {
    trace!(?reason, "query interrupted");
    Detail::new(ErrorKind::Timeout).temporary(true)
}

//------------ TLS -----------------------------------------------------------

/// Performs the TLS handshake if the protocol asks for it.
#[cfg(feature = "tls")]
async fn secure(
    cx: &LookupContext,
    deadline: Option<Instant>,
    conf: &ResolvConf,
    addr: SocketAddr,
    conn: Connection,
    err_cx: &ErrorContext,
) -> Result<Connection, Error> {
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::TlsConnector;

    if conf.protocol != Protocol::Tls {
        return Ok(conn);
    }
    let stream = match conn {
        Connection::Stream(stream) => stream,
        Connection::Dgram(_) => {
            return Err(err_cx.extend(transport(io::Error::new(
                io::ErrorKind::Unsupported,
                "datagram connection for TLS",
            ))))
        }
    };
    let connector = TlsConnector::from(conf.tls_client_config());
    let server_name = ServerName::IpAddress(addr.ip().into());
    match cx.run(deadline, connector.connect(server_name, stream)).await {
        Ok(Ok(stream)) => {
            trace!(%addr, "TLS handshake complete");
            Ok(Connection::Stream(Box::new(stream)))
        }
        Ok(Err(err)) => {
            debug!(%addr, "TLS handshake failed: {}", err);
            Err(err_cx.extend(ErrorKind::Handshake(Arc::new(err))))
        }
        Err(_) => Err(err_cx.extend(ErrorKind::Timeout)),
    }
}

#[cfg(not(feature = "tls"))]
async fn secure(
    _cx: &LookupContext,
    _deadline: Option<Instant>,
    conf: &ResolvConf,
    _addr: SocketAddr,
    conn: Connection,
    err_cx: &ErrorContext,
) -> Result<Connection, Error> {
    if conf.protocol == Protocol::Tls {
        Err(err_cx.extend(ErrorKind::UnsupportedProtocol))
    } else {
        Ok(conn)
    }
}

//------------ Exchange ------------------------------------------------------

/// Sends the request as a datagram and waits for the answer.
///
/// Datagrams that aren’t a well-formed answer to the request are ignored.
async fn exchange_dgram(
    sock: &dyn AsyncDgram,
    request: &Request,
) -> Result<Message<Vec<u8>>, io::Error> {
    let len = sock.send(request.dgram()).await?;
    if len != request.dgram().len() {
        return Err(io::Error::new(io::ErrorKind::Other, "short UDP send"));
    }
    loop {
        let mut buf = vec![0; RECV_SIZE];
        let len = sock.recv(&mut buf).await?;
        buf.truncate(len);

        // We ignore garbage since there is a timer on this whole thing.
        let answer = match Message::from_octets(buf) {
            Ok(answer) => answer,
            Err(_) => continue,
        };
        if !request.is_answered_by(&answer) {
            trace!("ignoring unrelated datagram");
            continue;
        }
        return Ok(answer);
    }
}

/// Sends the request over a stream and reads the answer.
async fn exchange_stream(
    stream: &mut Box<dyn AsyncStream>,
    request: &Request,
) -> Result<Message<Vec<u8>>, io::Error> {
    stream.write_all(&request.stream()).await?;
    stream.flush().await?;
    loop {
        let len = stream.read_u16().await? as usize;
        let mut buf = vec![0; len];
        stream.read_exact(&mut buf).await?;
        let answer = Message::from_octets(buf).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "short message")
        })?;
        if request.is_answered_by(&answer) {
            return Ok(answer);
        }
        trace!("ignoring unrelated message");
    }
}

//============ Testing =======================================================
