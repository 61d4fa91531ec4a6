//! A stub resolver.
//!
//! The most simple resolver possible simply relays all questions to one of
//! a set of pre-configured servers that do the actual work. This module
//! provides such a stub resolver, [`StubResolver`].
//!
//! For each lookup, the resolver goes through its servers in order, or in
//! a fresh random order if the configuration asks for rotation. It asks
//! each server for every record type of the requested network. As soon as
//! one server has provided any addresses at all, these are sorted and
//! returned; the remaining servers aren’t asked. If no server provides any
//! addresses, the first error encountered is returned.

use crate::conf::{ResolvConf, ServerAddr};
use crate::context::LookupContext;
use crate::error::{Error, ErrorContext, ErrorKind};
use crate::query;
use crate::resolver::{self, Family, LookupFuture, Resolver};
use crate::sort::sort_preferred;
use domain::base::name::Name;
use rand::seq::SliceRandom;
use rand::Rng;
use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

//------------ StubResolver --------------------------------------------------

/// A DNS stub resolver.
///
/// You can create a new resolver using the system’s configuration via
/// [`new`][Self::new] or using your own configuration with
/// [`from_conf`][Self::from_conf].
///
/// Stub resolver values can be cloned cheaply as they keep their
/// configuration behind an arc. The configuration is never changed, so
/// any number of lookups can run concurrently.
#[derive(Clone, Debug)]
pub struct StubResolver {
    conf: Arc<ResolvConf>,
}

impl StubResolver {
    /// Creates a new resolver using the system’s default configuration.
    pub fn new() -> Self {
        Self::from_conf(ResolvConf::system())
    }

    /// Creates a new resolver using the given configuration.
    pub fn from_conf(conf: ResolvConf) -> Self {
        StubResolver {
            conf: Arc::new(conf),
        }
    }

    /// Returns the configuration of the resolver.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Looks up the addresses of `host` for the given network.
    ///
    /// See [`Resolver::lookup_ip`] for the meaning of the arguments.
    pub async fn lookup_ip(
        &self,
        cx: &LookupContext,
        network: &str,
        host: &str,
    ) -> Result<Vec<IpAddr>, Error> {
        let family = resolver::family(network, host)?;
        if let Some(res) = resolver::lookup_literal(family, host) {
            return res;
        }
        self.lookup_name(cx, family, host).await
    }

    /// Looks up the addresses of `host` and returns them as strings.
    pub async fn lookup_host(
        &self,
        cx: &LookupContext,
        host: &str,
    ) -> Result<Vec<String>, Error> {
        let addrs = self.lookup_ip(cx, "ip", host).await?;
        Ok(addrs.iter().map(ToString::to_string).collect())
    }

    async fn lookup_name(
        &self,
        cx: &LookupContext,
        family: Family,
        host: &str,
    ) -> Result<Vec<IpAddr>, Error> {
        let err_cx = ErrorContext::new(host);
        let (fqdn, qname) = match canonical_name(host) {
            Some(name) => name,
            None => return Err(err_cx.extend(ErrorKind::NotFound)),
        };
        if !self.conf.protocol.is_supported() {
            return Err(err_cx.extend(ErrorKind::UnsupportedProtocol));
        }

        let servers = self.server_order(&mut rand::thread_rng());
        debug!(
            name = fqdn.as_str(),
            network = family.as_str(),
            servers = servers.len(),
            "lookup"
        );

        let mut first_err = None;
        let mut addrs = Vec::new();
        for &server in servers.iter() {
            for &rtype in family.rtypes() {
                let res = query::execute(
                    cx, &self.conf, server, &fqdn, &qname, rtype,
                )
                .await;
                match res {
                    Ok(answer) => answer.collect_addrs(&mut addrs),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        trace!("{}", err);
                        first_err.get_or_insert(err);
                    }
                }
            }

            // Any data at all from this server is good enough.
            if !addrs.is_empty() {
                let dialer = &self.conf.dialer;
                let probe = |dst: IpAddr| dialer.probe_source(dst);
                sort_preferred(&mut addrs, &probe);
                return Ok(addrs);
            }
        }
        Err(first_err.unwrap_or_else(|| err_cx.extend(ErrorKind::NotFound)))
    }

    /// Returns the servers in the order they should be asked.
    ///
    /// With rotation enabled, this is a new random permutation of the
    /// configured servers every time.
    fn server_order<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Cow<'_, [ServerAddr]> {
        if self.conf.rotate && self.conf.servers.len() > 1 {
            let mut servers = self.conf.servers.clone();
            servers.shuffle(rng);
            Cow::Owned(servers)
        } else {
            Cow::Borrowed(&self.conf.servers)
        }
    }
}

impl Default for StubResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for StubResolver {
    fn lookup_ip<'a>(
        &'a self,
        cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>> {
        Box::pin(StubResolver::lookup_ip(self, cx, network, host))
    }
}

/// Returns the fully qualified form of a host name.
///
/// Returns `None` if `host` isn’t a valid domain name.
fn canonical_name(host: &str) -> Option<(String, Name<Vec<u8>>)> {
    if host.is_empty() || host == "." {
        return None;
    }
    let fqdn = if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{}.", host)
    };
    let qname = Name::vec_from_str(&fqdn).ok()?;
    Some((fqdn, qname))
}

//============ Testing =======================================================
