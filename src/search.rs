//! Resolving relative names through a search list.
//!
//! Legacy systems interpret relative domain names as within the local
//! system. They provide a list of suffixes that are attached to a name to
//! make it absolute. [`SearchResolver`] adds this behaviour to any other
//! resolver.
//!
//! The candidates for a name are derived as follows. Absolute names, i.e.,
//! those ending in a dot, and literal addresses are used as they are. A
//! name with at least `ndots` dots is first tried as if it were absolute.
//! Then each suffix of the search list is appended in turn. Finally, if it
//! hasn’t been tried yet, the name is tried as if it were absolute.

use crate::conf::{ResolvConf, SearchList};
use crate::context::LookupContext;
use crate::error::{ErrorContext, ErrorKind};
use crate::resolver::{self, LookupFuture, Resolver};
use crate::stub::StubResolver;
use std::net::IpAddr;
use tracing::trace;

//------------ SearchResolver ------------------------------------------------

/// A resolver applying a search list to relative names.
#[derive(Clone, Debug)]
pub struct SearchResolver<R> {
    /// The resolver doing the actual lookups.
    inner: R,

    /// The suffixes to append.
    search: SearchList,

    /// Number of dots before a name is first tried as absolute.
    ndots: usize,
}

impl<R> SearchResolver<R> {
    /// Creates a new search resolver atop `inner`.
    ///
    /// The number of dots needed for trying a name as absolute first
    /// starts out as one.
    pub fn new(inner: R, search: SearchList) -> Self {
        SearchResolver {
            inner,
            search,
            ndots: 1,
        }
    }

    /// Sets the number of dots needed for trying a name as absolute first.
    pub fn with_ndots(mut self, ndots: usize) -> Self {
        self.ndots = ndots;
        self
    }

    /// Returns a reference to the wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Returns the search list.
    pub fn search(&self) -> &SearchList {
        &self.search
    }

    /// Returns an iterator over the names to try for `host`.
    pub fn candidates<'a>(&'a self, host: &'a str) -> SearchIter<'a> {
        SearchIter::new(host, &self.search, self.ndots)
    }
}

impl SearchResolver<StubResolver> {
    /// Creates a stub resolver using the search list of `conf`.
    pub fn from_conf(conf: ResolvConf) -> Self {
        let search = conf.search.clone();
        let ndots = conf.ndots;
        SearchResolver::new(StubResolver::from_conf(conf), search)
            .with_ndots(ndots)
    }
}

impl<R: Resolver> Resolver for SearchResolver<R> {
    fn lookup_ip<'a>(
        &'a self,
        cx: &'a LookupContext,
        network: &'a str,
        host: &'a str,
    ) -> LookupFuture<'a, Vec<IpAddr>> {
        Box::pin(async move {
            resolver::family(network, host)?;
            let mut first_err = None;
            for name in self.candidates(host) {
                trace!(name = name.as_str(), "trying search candidate");
                let res = self.inner.lookup_ip(cx, network, &name).await;
                let err = match res {
                    Ok(addrs) => return Ok(addrs),
                    Err(err) => err,
                };
                let stop = !(err.is_not_found() || err.is_temporary())
                    || cx.is_done();
                first_err.get_or_insert(err);
                if stop {
                    break;
                }
            }
            Err(first_err.unwrap_or_else(|| {
                ErrorContext::new(host).extend(ErrorKind::NotFound)
            }))
        })
    }
}

//------------ SearchIter ----------------------------------------------------

/// An iterator over the names to try for a host name.
#[derive(Clone, Debug)]
pub struct SearchIter<'a> {
    /// The host name as given.
    name: &'a str,

    /// The suffixes still to try.
    suffixes: std::slice::Iter<'a, String>,

    /// Whether to try the name as is before the suffixes.
    as_is_first: bool,

    /// Whether to try the name as is after the suffixes.
    as_is_last: bool,
}

impl<'a> SearchIter<'a> {
    fn new(name: &'a str, search: &'a [String], ndots: usize) -> Self {
        let absolute = name.ends_with('.')
            || name.is_empty()
            || name.parse::<IpAddr>().is_ok();
        if absolute {
            return SearchIter {
                name,
                suffixes: search[..0].iter(),
                as_is_first: true,
                as_is_last: false,
            };
        }
        let as_is_first = name.matches('.').count() >= ndots;
        SearchIter {
            name,
            suffixes: search.iter(),
            as_is_first,
            as_is_last: !as_is_first,
        }
    }
}

impl<'a> Iterator for SearchIter<'a> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.as_is_first {
            self.as_is_first = false;
            return Some(self.name.into());
        }
        if let Some(suffix) = self.suffixes.next() {
            return Some(format!("{}.{}", self.name, suffix));
        }
        if self.as_is_last {
            self.as_is_last = false;
            return Some(self.name.into());
        }
        None
    }
}

//============ Testing =======================================================
