//! Resolver configuration.
//!
//! The configuration of a stub resolver is collected in [`ResolvConf`]. It
//! can be assembled by hand or parsed from a glibc-style configuration
//! file, commonly known as `/etc/resolv.conf`, through
//! [`ResolvConf::parse`] and [`ResolvConf::parse_file`].
//!
//! Once a resolver has been created from a configuration, the
//! configuration is never changed again. If you need a variation, clone it
//! and modify the clone. Cloning copies the server and search lists, so the
//! two configurations never share them.

use crate::dial::{Dial, Network, TokioDial};
use domain::base::name::Name;
use std::default::Default;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::{self, FromStr, SplitWhitespace};
use std::sync::Arc;
use std::time::Duration;
use std::{error, fmt, fs, ops};
#[cfg(feature = "tls")]
use std::sync::OnceLock;
#[cfg(feature = "tls")]
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

//------------ Protocol ------------------------------------------------------

/// The transport protocol used to talk to the servers.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// Unencrypted UDP transport.
    #[default]
    Udp,

    /// Unencrypted TCP transport.
    Tcp,

    /// DNS over TLS as defined in RFC 7858.
    Tls,
}

impl Protocol {
    /// Returns the port used if a server doesn’t specify one.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Udp | Protocol::Tcp => 53,
            Protocol::Tls => 853,
        }
    }

    /// Returns the plain network a connection is dialed over.
    ///
    /// TLS runs atop a TCP connection.
    pub fn network(self) -> Network {
        match self {
            Protocol::Udp => Network::Udp,
            Protocol::Tcp | Protocol::Tls => Network::Tcp,
        }
    }

    /// Returns whether this build is able to use the protocol.
    pub fn is_supported(self) -> bool {
        match self {
            Protocol::Udp | Protocol::Tcp => true,
            Protocol::Tls => cfg!(feature = "tls"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("udp") {
            Ok(Protocol::Udp)
        } else if s.eq_ignore_ascii_case("tcp") {
            Ok(Protocol::Tcp)
        } else if s.eq_ignore_ascii_case("tls")
            || s.eq_ignore_ascii_case("dot")
        {
            Ok(Protocol::Tls)
        } else {
            Err(Error::ParseError)
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("udp"),
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Tls => f.write_str("tls"),
        }
    }
}

//------------ ServerAddr ----------------------------------------------------

/// The address of an upstream server.
///
/// The port is optional. If it is missing, the default port of the
/// protocol in use is taken.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ServerAddr {
    /// The IP address of the server.
    addr: IpAddr,

    /// The port of the server, if given.
    port: Option<u16>,
}

impl ServerAddr {
    /// Creates a server address without a port.
    pub fn new(addr: IpAddr) -> Self {
        ServerAddr { addr, port: None }
    }

    /// Creates a server address with an explicit port.
    pub fn with_port(addr: IpAddr, port: u16) -> Self {
        ServerAddr {
            addr,
            port: Some(port),
        }
    }

    /// Returns the IP address of the server.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Returns the port of the server if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the socket address to use with the given protocol.
    pub fn socket_addr(&self, protocol: Protocol) -> SocketAddr {
        SocketAddr::new(
            self.addr,
            self.port.unwrap_or_else(|| protocol.default_port()),
        )
    }
}

impl From<IpAddr> for ServerAddr {
    fn from(addr: IpAddr) -> Self {
        Self::new(addr)
    }
}

impl From<SocketAddr> for ServerAddr {
    /// Converts a socket address.
    ///
    /// Port 0 is taken to mean that no port was given.
    fn from(addr: SocketAddr) -> Self {
        match addr.port() {
            0 => Self::new(addr.ip()),
            port => Self::with_port(addr.ip(), port),
        }
    }
}

impl FromStr for ServerAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = IpAddr::from_str(s) {
            return Ok(Self::new(addr));
        }
        SocketAddr::from_str(s)
            .map(Into::into)
            .map_err(|_| Error::ParseError)
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.port {
            Some(port) => SocketAddr::new(self.addr, port).fmt(f),
            None => self.addr.fmt(f),
        }
    }
}

//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// This type collects all information necessary to configure how a stub
/// resolver talks to its upstream servers.
///
/// After creating a value with [`ResolvConf::new`] you can manipulate the
/// members. Alternatively, [`ResolvConf::system`] reads the system’s
/// configuration file.
#[derive(Clone, Debug)]
pub struct ResolvConf {
    /// The transport protocol used for all servers.
    pub protocol: Protocol,

    /// Addresses of servers to query, in order of preference.
    pub servers: Vec<ServerAddr>,

    /// Use a new random order of the servers for every lookup.
    pub rotate: bool,

    /// Maximum time a single query may take, including connecting.
    ///
    /// A zero duration means that only the deadline of the lookup context
    /// applies.
    pub timeout: Duration,

    /// Establishes connections to the servers.
    pub dialer: Arc<dyn Dial>,

    /// Trust settings for DNS over TLS.
    ///
    /// If this is `None`, the Mozilla root certificates are trusted.
    #[cfg(feature = "tls")]
    pub tls_config: Option<Arc<ClientConfig>>,

    /// Search list for host-name lookup.
    pub search: SearchList,

    /// Number of dots before an initial absolute query is made.
    pub ndots: usize,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new configuration without any servers.
    pub fn new() -> Self {
        ResolvConf {
            protocol: Protocol::Udp,
            servers: Vec::new(),
            rotate: false,
            timeout: Duration::from_secs(5),
            dialer: Arc::new(TokioDial),
            #[cfg(feature = "tls")]
            tls_config: None,
            search: SearchList::new(),
            ndots: 1,
        }
    }

    /// Creates the configuration of this system.
    ///
    /// This parses `/etc/resolv.conf`. If that fails, or the file doesn’t
    /// list any servers, a server at `127.0.0.1` is used.
    pub fn system() -> Self {
        let mut res = Self::new();
        if let Err(err) = res.parse_file("/etc/resolv.conf") {
            tracing::debug!("cannot read /etc/resolv.conf: {}", err);
        }
        res.finalize();
        res
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, it adds `127.0.0.1`. This is exactly what
    /// glibc does.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            self.servers
                .push(ServerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        }
    }

    /// Returns the TLS client configuration to use.
    #[cfg(feature = "tls")]
    pub(crate) fn tls_client_config(&self) -> Arc<ClientConfig> {
        match self.tls_config {
            Some(ref config) => config.clone(),
            None => default_tls_config(),
        }
    }
}

/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                Some("domain") => self.parse_domain(words)?,
                Some("search") => self.parse_search(words)?,
                Some("sortlist") => {}
                Some("options") => self.parse_options(words)?,
                _ => return Err(Error::ParseError),
            }
        }
        Ok(())
    }

    fn parse_nameserver(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        let addr = ServerAddr::from_str(next_word(&mut words)?)?;
        self.servers.push(addr);
        no_more_words(words)
    }

    fn parse_domain(&mut self, mut words: SplitWhitespace) -> Result<(), Error> {
        let mut search = SearchList::new();
        search.push(next_word(&mut words)?)?;
        self.search = search;
        no_more_words(words)
    }

    fn parse_search(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        let mut search = SearchList::new();
        for word in words {
            search.push(word)?;
        }
        self.search = search;
        Ok(())
    }

    fn parse_options(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        for word in words {
            match split_arg(word)? {
                ("ndots", Some(n)) => self.ndots = n,
                ("timeout", Some(n)) => {
                    self.timeout = Duration::from_secs(n as u64)
                }
                ("rotate", None) => self.rotate = true,
                ("use-vc", None) => self.protocol = Protocol::Tcp,
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
        Ok(())
    }
}

//--- Default

impl Default for ResolvConf {
    fn default() -> Self {
        Self::new()
    }
}

//--- Display

impl fmt::Display for ResolvConf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for server in &self.servers {
            writeln!(f, "nameserver {}", server)?;
        }
        if !self.search.is_empty() {
            f.write_str("search")?;
            for name in self.search.iter() {
                write!(f, " {}", name)?;
            }
            f.write_str("\n")?;
        }

        // Only print options if there are any non-default ones.
        let mut options = Vec::new();
        if self.ndots != 1 {
            options.push(format!("ndots:{}", self.ndots));
        }
        if self.timeout != Duration::from_secs(5) {
            // Fractional seconds are lost here.
            options.push(format!("timeout:{}", self.timeout.as_secs()));
        }
        if self.rotate {
            options.push("rotate".into());
        }
        if self.protocol == Protocol::Tcp {
            options.push("use-vc".into());
        }
        if !options.is_empty() {
            writeln!(f, "options {}", options.join(" "))?;
        }
        Ok(())
    }
}

//------------ SearchList ----------------------------------------------------

/// The list of domain names appended to relative host names.
///
/// Names are kept in their textual form without a trailing dot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchList {
    search: Vec<String>,
}

impl SearchList {
    /// Creates an empty search list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a name to the list.
    ///
    /// The root name and names already present are skipped.
    pub fn push(&mut self, name: &str) -> Result<(), Error> {
        Name::<Vec<u8>>::vec_from_str(name).map_err(|_| Error::ParseError)?;
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if !name.is_empty() && !self.search.contains(&name) {
            self.search.push(name)
        }
        Ok(())
    }

    /// Returns the names as a slice.
    pub fn as_slice(&self) -> &[String] {
        self.as_ref()
    }
}

impl<'a> FromIterator<&'a str> for SearchList {
    /// Collects names into a list, skipping those that are not valid.
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut res = Self::new();
        for name in iter {
            let _ = res.push(name);
        }
        res
    }
}

//--- AsRef and Deref

impl AsRef<[String]> for SearchList {
    fn as_ref(&self) -> &[String] {
        self.search.as_ref()
    }
}

impl ops::Deref for SearchList {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

//------------ Default TLS Configuration -------------------------------------

/// Returns the TLS client configuration trusting the Mozilla roots.
///
/// The configuration is built once and shared afterwards.
#[cfg(feature = "tls")]
fn default_tls_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

//------------ Private Helpers -----------------------------------------------
//
// These are here to wrap stuff into Results.

/// Returns a reference to the next word or an error.
fn next_word<'a>(words: &'a mut str::SplitWhitespace) -> Result<&'a str, Error> {
    match words.next() {
        Some(word) => Ok(word),
        None => Err(Error::ParseError),
    }
}

/// Returns nothing but errors out if there are words left.
fn no_more_words(mut words: str::SplitWhitespace) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::ParseError),
        None => Ok(()),
    }
}

/// Splits the name and argument from an option with arguments.
///
/// These options consist of a name followed by a colon followed by a
/// value, which so far is only `usize`, so we do that.
fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.find(':') {
        Some(idx) => {
            let (left, right) = s.split_at(idx);
            Ok((left, Some(right[1..].parse()?)))
        }
        None => Ok((s, None)),
    }
}

//------------ Error ---------------------------------------------------------

/// The error that can happen when parsing a configuration.
#[derive(Debug)]
pub enum Error {
    /// The file is not a proper file.
    ParseError,

    /// Something happend while reading.
    Io(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ParseError => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(_: std::num::ParseIntError) -> Error {
        Error::ParseError
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError => f.write_str("error parsing configuration"),
            Error::Io(err) => err.fmt(f),
        }
    }
}

//============ Testing =======================================================
