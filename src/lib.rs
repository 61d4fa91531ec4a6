//! A DNS stub resolver for looking up host addresses.
//!
//! This crate resolves host names into IP addresses by asking a set of
//! pre-configured upstream servers. It emulates what the resolver part of
//! the C library does, but runs on the [Tokio](https://tokio.rs/) async
//! runtime and can talk to its servers over UDP, TCP, or DNS over TLS.
//!
//! The addresses of a lookup are returned sorted according to the
//! destination address selection rules of RFC 6724, i.e., in the order
//! they should be tried when connecting to the host.
//!
//! # Modules
//!
//! * [resolver] defines the [`Resolver`] trait implemented by all
//!   resolvers, as well as [`IpResolver`] for literal addresses.
//! * [stub] contains [`StubResolver`], which queries the upstream servers.
//! * [search] contains [`SearchResolver`], which applies a search list to
//!   relative names atop any other resolver.
//! * [conf] describes the configuration of a stub resolver and can read
//!   it from `/etc/resolv.conf`.
//! * [context] provides the deadline and cancellation state handed to
//!   every lookup.
//! * [dial] defines how connections to the servers are established.
//! * [error] contains the error type of all lookups.
//! * [sort] implements the address ordering.
//!
//! # Example
//!
//! ```no_run
//! use domain_stub::{LookupContext, Resolver, StubResolver};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let resolver = StubResolver::new();
//! let cx = LookupContext::new().with_timeout(Duration::from_secs(10));
//! match resolver.lookup_host(&cx, "www.example.com").await {
//!     Ok(addrs) => println!("{}", addrs.join(", ")),
//!     Err(err) if err.is_temporary() => println!("try again: {}", err),
//!     Err(err) => println!("{}", err),
//! }
//! # }
//! ```
//!
//! # Reference of Feature Flags
//!
//! * `tls`: Enables DNS over TLS via
//!   [tokio-rustls](https://github.com/rustls/tokio-rustls), trusting the
//!   Mozilla root certificates unless configured otherwise. This feature
//!   is enabled by default.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod conf;
pub mod context;
pub mod dial;
pub mod error;
mod query;
pub mod resolver;
pub mod search;
pub mod sort;
pub mod stub;

pub use self::conf::{Protocol, ResolvConf, ServerAddr};
pub use self::context::LookupContext;
pub use self::error::{Error, ErrorKind};
pub use self::resolver::{IpResolver, Resolver};
pub use self::search::SearchResolver;
pub use self::stub::StubResolver;
