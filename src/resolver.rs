//! The trait defining an abstract resolver.
//!
//! All resolvers of this crate implement [`Resolver`]. They can be used
//! interchangeably and composed by wrapping one in another, such as
//! [`SearchResolver`] wrapping a [`StubResolver`].
//!
//! The module also provides [`IpResolver`], which only understands literal
//! addresses and never touches the network.
//!
//! [`SearchResolver`]: crate::search::SearchResolver
//! [`StubResolver`]: crate::stub::StubResolver

use crate::context::LookupContext;
use crate::error::{Error, ErrorContext, ErrorKind};
use domain::base::iana::Rtype;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

//------------ Resolver ------------------------------------------------------

/// A type that can look up the addresses of a host.
///
/// The trait is object safe, so resolvers can be kept as
/// `Arc<dyn Resolver>`.
pub trait Resolver: Send + Sync {
    /// Looks up the addresses of `host`.
    ///
    /// The `network` restricts the address families returned. It must be
    /// one of `"ip"` for both IPv4 and IPv6, `"ip4"` for IPv4 only, or
    /// `"ip6"` for IPv6 only. Anything else fails with
    /// [`ErrorKind::UnsupportedNetwork`].
    ///
    /// The addresses are returned in the order they should be tried.
    fn lookup_ip<'a>(
        &'a self,
        cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>>;

    /// Looks up the addresses of `host` in their textual form.
    ///
    /// This is [`lookup_ip`][Self::lookup_ip] for the `"ip"` network.
    fn lookup_host<'a>(
        &'a self,
        cx: &'a LookupContext,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<String>> {
        Box::pin(async move {
            let addrs = self.lookup_ip(cx, "ip", host).await?;
            Ok(addrs.iter().map(ToString::to_string).collect())
        })
    }
}

/// The future returned by the methods of [`Resolver`].
pub type LookupFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

impl<'r, R: Resolver + ?Sized> Resolver for &'r R {
    fn lookup_ip<'a>(
        &'a self,
        cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>> {
        (**self).lookup_ip(cx, network, host)
    }

    fn lookup_host<'a>(
        &'a self,
        cx: &'a LookupContext,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<String>> {
        (**self).lookup_host(cx, host)
    }
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn lookup_ip<'a>(
        &'a self,
        cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>> {
        (**self).lookup_ip(cx, network, host)
    }

    fn lookup_host<'a>(
        &'a self,
        cx: &'a LookupContext,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<String>> {
        (**self).lookup_host(cx, host)
    }
}

//------------ Family --------------------------------------------------------

const ANY_RTYPES: &[Rtype] = &[Rtype::A, Rtype::AAAA];
const V4_RTYPES: &[Rtype] = &[Rtype::A];
const V6_RTYPES: &[Rtype] = &[Rtype::AAAA];

/// The address families requested through a network name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Family {
    /// Both IPv4 and IPv6, network `"ip"`.
    Any,

    /// IPv4 only, network `"ip4"`.
    V4,

    /// IPv6 only, network `"ip6"`.
    V6,
}

impl Family {
    /// Returns the family for a network name.
    pub fn from_network(network: &str) -> Option<Self> {
        match network {
            "ip" => Some(Family::Any),
            "ip4" => Some(Family::V4),
            "ip6" => Some(Family::V6),
            _ => None,
        }
    }

    /// Returns the record types to ask for, in order.
    pub fn rtypes(self) -> &'static [Rtype] {
        match self {
            Family::Any => ANY_RTYPES,
            Family::V4 => V4_RTYPES,
            Family::V6 => V6_RTYPES,
        }
    }

    /// Returns the network name of the family.
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Any => "ip",
            Family::V4 => "ip4",
            Family::V6 => "ip6",
        }
    }

    /// Resolves a literal address against the family.
    ///
    /// Returns `None` if the address isn’t of this family. For
    /// [`Family::V4`], IPv4-mapped IPv6 addresses count as IPv4. The
    /// address is always returned as given.
    pub fn accept(self, addr: IpAddr) -> Option<IpAddr> {
        match (self, addr) {
            (Family::Any, addr) => Some(addr),
            (Family::V4, IpAddr::V4(_)) => Some(addr),
            (Family::V4, IpAddr::V6(v6)) => {
                v6.to_ipv4_mapped().map(|_| addr)
            }
            (Family::V6, IpAddr::V6(_)) => Some(addr),
            (Family::V6, IpAddr::V4(_)) => None,
        }
    }
}

//------------ Literal Addresses ---------------------------------------------

/// Returns the family for `network` or an unsupported network error.
pub(crate) fn family(network: &str, host: &str) -> Result<Family, Error> {
    Family::from_network(network).ok_or_else(|| {
        ErrorContext::new(host).extend(ErrorKind::UnsupportedNetwork)
    })
}

/// Answers a lookup for a literal address.
///
/// Returns `None` if `host` isn’t a literal address and has to be looked
/// up for real.
pub(crate) fn lookup_literal(
    family: Family,
    host: &str,
) -> Option<Result<Vec<IpAddr>, Error>> {
    let addr = IpAddr::from_str(host).ok()?;
    Some(match family.accept(addr) {
        Some(addr) => Ok(vec![addr]),
        None => Err(ErrorContext::new(host).extend(ErrorKind::NotFound)),
    })
}

//------------ IpResolver ----------------------------------------------------

/// A resolver for literal addresses only.
///
/// Any host that isn’t an IP address is reported as not found. No network
/// traffic is ever caused.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpResolver;

impl IpResolver {
    pub fn new() -> Self {
        IpResolver
    }
}

impl Resolver for IpResolver {
    fn lookup_ip<'a>(
        &'a self,
        _cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>> {
        Box::pin(async move {
            let family = family(network, host)?;
            lookup_literal(family, host).unwrap_or_else(|| {
                Err(ErrorContext::new(host).extend(ErrorKind::NotFound))
            })
        })
    }
}

//============ Testing =======================================================
