//! Lookup errors.
//!
//! Every failed lookup is reported through the single [`Error`] type. It
//! always names the host that was looked up and, once a server was
//! actually contacted, that server. Three flags tell a caller how to treat
//! the failure: whether a deadline or cancellation cut it short
//! ([`Error::is_timeout`]), whether asking again later may succeed
//! ([`Error::is_temporary`]), and whether the name definitely does not
//! exist ([`Error::is_not_found`]). The temporary flag is what a caller
//! should consult before caching a negative answer.
//!
//! Errors are raised by extending an [`ErrorContext`], which carries the
//! identifying information for one lookup or one attempt, with a
//! [`Detail`] describing what went wrong.

use domain::base::iana::Rcode;
use std::error;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// A failed lookup.
#[derive(Clone, Debug)]
pub struct Error {
    /// The name that was looked up.
    name: String,

    /// The server that was contacted, if any.
    server: Option<SocketAddr>,

    /// What went wrong.
    kind: ErrorKind,

    /// Whether a deadline or cancellation caused the failure.
    timeout: bool,

    /// Whether the failure may go away if asked again later.
    temporary: bool,
}

impl Error {
    /// Returns the name that was looked up.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the server that was contacted when the error happened.
    ///
    /// This is `None` for errors raised before any server was dialed.
    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns whether the lookup ran out of time or was cancelled.
    pub fn is_timeout(&self) -> bool {
        self.timeout
    }

    /// Returns whether the error may be temporary.
    ///
    /// Negative answers for temporary errors should not be cached.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Returns whether the name definitely does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    /// Returns whether trying another server or name cannot help.
    ///
    /// This is true for configuration errors and for failed TLS
    /// handshakes. Lookups stop at the first such error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnsupportedNetwork
                | ErrorKind::UnsupportedProtocol
                | ErrorKind::Handshake(_)
        )
    }
}

//--- Display and Error

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "lookup {}", self.name)?;
        if let Some(server) = self.server {
            write!(f, " on {}", server)?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind {
            ErrorKind::Transport(ref err) => Some(err.as_ref()),
            ErrorKind::Handshake(ref err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

//------------ ErrorKind -----------------------------------------------------

/// The kind of a lookup error.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The name does not exist or is not a valid host name.
    NotFound,

    /// The network class is not one of `ip`, `ip4`, or `ip6`.
    UnsupportedNetwork,

    /// The configured transport protocol is not available.
    UnsupportedProtocol,

    /// The server answered with an unexpected response code.
    ServerMisbehaving(Rcode),

    /// Connecting to or talking with the server failed.
    Transport(Arc<io::Error>),

    /// The TLS handshake with the server failed.
    Handshake(Arc<io::Error>),

    /// The deadline passed or the lookup was cancelled.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::NotFound => f.write_str("no such host"),
            ErrorKind::UnsupportedNetwork => {
                f.write_str("unsupported network")
            }
            ErrorKind::UnsupportedProtocol => {
                f.write_str("unsupported protocol")
            }
            ErrorKind::ServerMisbehaving(rcode) => {
                write!(
                    f,
                    "unexpected return code {}: server misbehaving",
                    rcode
                )
            }
            ErrorKind::Transport(err) => err.fmt(f),
            ErrorKind::Handshake(err) => {
                write!(f, "TLS handshake failed: {}", err)
            }
            ErrorKind::Timeout => f.write_str("i/o timeout"),
        }
    }
}

//------------ ErrorContext --------------------------------------------------

/// The identifying information shared by all errors of a lookup.
///
/// A context is created once per lookup or attempt and then extended with
/// the details of each failure, so every error carries the same name and
/// server without each call site having to repeat them.
#[derive(Clone, Debug)]
pub struct ErrorContext {
    /// The name being looked up.
    name: String,

    /// The server being talked to.
    server: Option<SocketAddr>,
}

impl ErrorContext {
    /// Creates a new context for looking up `name`.
    pub fn new(name: impl Into<String>) -> Self {
        ErrorContext {
            name: name.into(),
            server: None,
        }
    }

    /// Adds the server that is being talked to.
    pub fn with_server(mut self, server: SocketAddr) -> Self {
        self.server = Some(server);
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the server, if one was added.
    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    /// Creates an error from this context and the given detail.
    ///
    /// The name and server of the context are kept; kind and flags are
    /// taken from the detail.
    pub fn extend(&self, detail: impl Into<Detail>) -> Error {
        let detail = detail.into();
        Error {
            name: self.name.clone(),
            server: self.server,
            kind: detail.kind,
            timeout: detail.timeout,
            temporary: detail.temporary,
        }
    }
}

//------------ Detail --------------------------------------------------------

/// What went wrong in a failed lookup.
///
/// By default, only [`ErrorKind::Timeout`] is flagged as a timeout and
/// nothing is flagged temporary.
#[derive(Clone, Debug)]
pub struct Detail {
    kind: ErrorKind,
    timeout: bool,
    temporary: bool,
}

impl Detail {
    /// Creates a new detail of the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Detail {
            timeout: matches!(kind, ErrorKind::Timeout),
            temporary: false,
            kind,
        }
    }

    /// Sets whether the failure was caused by a deadline.
    pub fn timeout(mut self, timeout: bool) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether the failure may be temporary.
    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
}

impl From<ErrorKind> for Detail {
    fn from(kind: ErrorKind) -> Self {
        Detail::new(kind)
    }
}

//============ Testing =======================================================
