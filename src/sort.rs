//! Ordering of destination addresses.
//!
//! The addresses found by a lookup are returned in the order a client
//! should try them. This order is determined by the destination address
//! selection rules of [RFC 6724], section 6. Only those rules that can be
//! evaluated from the addresses alone are applied:
//!
//! 1. Avoid unusable destinations.
//! 2. Prefer matching scope.
//! 5. Prefer matching label.
//! 6. Prefer higher precedence.
//! 8. Prefer smaller scope.
//! 9. Use longest matching prefix.
//!
//! Rule 9 is only used between two IPv6 addresses and only considers the
//! first 64 bits, i.e., the network part. Addresses that compare equal keep
//! their original order.
//!
//! Which source address a destination would be reached from is determined
//! through a [`SourceProbe`].
//!
//! [RFC 6724]: https://tools.ietf.org/html/rfc6724

use std::cmp::Ordering;
use std::net::{IpAddr, Ipv6Addr};

//------------ SourceProbe ---------------------------------------------------

/// Determines the source address for reaching a destination.
pub trait SourceProbe {
    /// Returns the source address for `dst` or `None` if unreachable.
    fn source_for(&self, dst: IpAddr) -> Option<IpAddr>;
}

impl<F: Fn(IpAddr) -> Option<IpAddr>> SourceProbe for F {
    fn source_for(&self, dst: IpAddr) -> Option<IpAddr> {
        (self)(dst)
    }
}

//------------ sort_preferred ------------------------------------------------

/// Sorts `addrs` so that the most preferred destination comes first.
///
/// The sort is stable. The probe is asked once per address.
pub fn sort_preferred<P: SourceProbe + ?Sized>(
    addrs: &mut [IpAddr],
    probe: &P,
) {
    if addrs.len() < 2 {
        return;
    }
    let mut items: Vec<_> = addrs
        .iter()
        .map(|&dst| Candidate::new(dst, probe.source_for(dst)))
        .collect();
    items.sort_by(Candidate::compare);
    for (slot, item) in addrs.iter_mut().zip(items) {
        *slot = item.dst;
    }
}

//------------ Candidate -----------------------------------------------------

/// A destination address with everything needed to compare it.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    dst: IpAddr,
    dst_attrs: Attrs,
    src: Option<(IpAddr, Attrs)>,
}

impl Candidate {
    fn new(dst: IpAddr, src: Option<IpAddr>) -> Self {
        Candidate {
            dst,
            dst_attrs: Attrs::of(dst),
            src: src.map(|src| (src, Attrs::of(src))),
        }
    }

    /// Compares two candidates.
    ///
    /// Returns `Ordering::Less` if `a` is preferred over `b`.
    fn compare(a: &Self, b: &Self) -> Ordering {
        // Rule 1: Avoid unusable destinations.
        let (a_src, a_sattrs, b_src, b_sattrs) = match (a.src, b.src) {
            (Some(a_src), Some(b_src)) => (a_src.0, a_src.1, b_src.0, b_src.1),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        };
        let (da, db) = (a.dst_attrs, b.dst_attrs);

        // Rule 2: Prefer matching scope.
        let a_match = da.scope == a_sattrs.scope;
        let b_match = db.scope == b_sattrs.scope;
        if a_match != b_match {
            return prefer(a_match);
        }

        // Rule 5: Prefer matching label.
        let a_match = da.label == a_sattrs.label;
        let b_match = db.label == b_sattrs.label;
        if a_match != b_match {
            return prefer(a_match);
        }

        // Rule 6: Prefer higher precedence.
        if da.precedence != db.precedence {
            return db.precedence.cmp(&da.precedence);
        }

        // Rule 8: Prefer smaller scope.
        if da.scope != db.scope {
            return da.scope.cmp(&db.scope);
        }

        // Rule 9: Use longest matching prefix.
        if let (
            IpAddr::V6(a_dst),
            IpAddr::V6(a_src),
            IpAddr::V6(b_dst),
            IpAddr::V6(b_src),
        ) = (a.dst, a_src, b.dst, b_src)
        {
            let a_len = common_prefix_len(&a_src, &a_dst);
            let b_len = common_prefix_len(&b_src, &b_dst);
            if a_len != b_len {
                return b_len.cmp(&a_len);
            }
        }

        // Rule 10: Otherwise, leave the order unchanged.
        Ordering::Equal
    }
}

/// Returns the ordering that prefers `a` if the condition holds for it.
fn prefer(a: bool) -> Ordering {
    if a {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Returns the number of leading bits shared, up to 64.
fn common_prefix_len(a: &Ipv6Addr, b: &Ipv6Addr) -> u32 {
    let a = u128::from_be_bytes(a.octets()) >> 64;
    let b = u128::from_be_bytes(b.octets()) >> 64;
    ((a ^ b) as u64).leading_zeros()
}

//------------ Attrs ---------------------------------------------------------

/// The policy and scope attributes of an address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Attrs {
    scope: u8,
    precedence: u8,
    label: u8,
}

impl Attrs {
    fn of(addr: IpAddr) -> Self {
        let v6 = to_v6(addr);
        let policy = Policy::lookup(&v6);
        Attrs {
            scope: scope(addr),
            precedence: policy.precedence,
            label: policy.label,
        }
    }
}

/// Converts an address into IPv6, mapping IPv4 addresses.
fn to_v6(addr: IpAddr) -> Ipv6Addr {
    match addr {
        IpAddr::V4(addr) => addr.to_ipv6_mapped(),
        IpAddr::V6(addr) => addr,
    }
}

//------------ Scope ---------------------------------------------------------

const SCOPE_LINK_LOCAL: u8 = 0x2;
const SCOPE_SITE_LOCAL: u8 = 0x5;
const SCOPE_GLOBAL: u8 = 0xe;

/// Returns the scope of an address as defined in RFC 4291, section 2.7.
///
/// IPv4 addresses, including mapped ones, are scoped according to
/// RFC 6724, section 3.2.
fn scope(addr: IpAddr) -> u8 {
    let addr = match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        addr => addr,
    };
    match addr {
        IpAddr::V4(v4) => {
            if v4.is_loopback() || v4.is_link_local() {
                SCOPE_LINK_LOCAL
            } else {
                SCOPE_GLOBAL
            }
        }
        IpAddr::V6(v6) => {
            let octets = v6.octets();
            if v6.is_multicast() {
                octets[1] & 0x0f
            } else if v6.is_loopback() || is_unicast_link_local(&v6) {
                SCOPE_LINK_LOCAL
            } else if octets[0] == 0xfe && octets[1] & 0xc0 == 0xc0 {
                SCOPE_SITE_LOCAL
            } else {
                SCOPE_GLOBAL
            }
        }
    }
}

fn is_unicast_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

//------------ Policy --------------------------------------------------------

/// An entry of the policy table.
#[derive(Clone, Copy, Debug)]
struct Policy {
    prefix: u128,
    len: u32,
    precedence: u8,
    label: u8,
}

impl Policy {
    const fn new(prefix: u128, len: u32, precedence: u8, label: u8) -> Self {
        Policy {
            prefix,
            len,
            precedence,
            label,
        }
    }

    fn contains(&self, addr: &Ipv6Addr) -> bool {
        if self.len == 0 {
            return true;
        }
        let mask = u128::MAX << (128 - self.len);
        u128::from_be_bytes(addr.octets()) & mask == self.prefix
    }

    /// Returns the first matching entry of the table.
    fn lookup(addr: &Ipv6Addr) -> Policy {
        POLICY_TABLE
            .iter()
            .find(|policy| policy.contains(addr))
            .copied()
            .unwrap_or(DEFAULT_POLICY)
    }
}

const DEFAULT_POLICY: Policy = Policy::new(0, 0, 40, 1);

/// The default policy table of RFC 6724, section 2.1.
///
/// Entries are sorted by decreasing prefix length.
const POLICY_TABLE: &[Policy] = &[
    // ::1/128
    Policy::new(1, 128, 50, 0),
    // ::ffff:0:0/96
    Policy::new(0xffff_0000_0000, 96, 35, 4),
    // ::/96
    Policy::new(0, 96, 1, 3),
    // 2001::/32
    Policy::new(0x2001 << 112, 32, 5, 5),
    // 2002::/16
    Policy::new(0x2002 << 112, 16, 30, 2),
    // 3ffe::/16
    Policy::new(0x3ffe << 112, 16, 1, 12),
    // fec0::/10
    Policy::new(0xfec0 << 112, 10, 1, 11),
    // fc00::/7
    Policy::new(0xfc00 << 112, 7, 3, 13),
    // ::/0
    DEFAULT_POLICY,
];

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn sorted(dsts: &[&str], srcs: &[(&str, &str)]) -> Vec<IpAddr> {
        let table: HashMap<IpAddr, IpAddr> =
            srcs.iter().map(|(d, s)| (ip(d), ip(s))).collect();
        let mut addrs: Vec<_> = dsts.iter().map(|s| ip(s)).collect();
        sort_preferred(&mut addrs, &|dst: IpAddr| table.get(&dst).copied());
        addrs
    }

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| ip(s)).collect()
    }

    #[test]
    fn prefer_matching_scope() {
        // RFC 6724, section 10.2, first example.
        assert_eq!(
            sorted(
                &["2001:db8:1::1", "198.51.100.121"],
                &[
                    ("2001:db8:1::1", "2001:db8:1::2"),
                    ("198.51.100.121", "169.254.13.78"),
                ]
            ),
            ips(&["2001:db8:1::1", "198.51.100.121"])
        );
        assert_eq!(
            sorted(
                &["2001:db8:1::1", "198.51.100.121"],
                &[
                    ("2001:db8:1::1", "fe80::1"),
                    ("198.51.100.121", "198.51.100.117"),
                ]
            ),
            ips(&["198.51.100.121", "2001:db8:1::1"])
        );
    }

    #[test]
    fn prefer_higher_precedence() {
        assert_eq!(
            sorted(
                &["198.51.100.121", "2001:db8:1::1"],
                &[
                    ("2001:db8:1::1", "2001:db8:1::2"),
                    ("198.51.100.121", "198.51.100.117"),
                ]
            ),
            ips(&["2001:db8:1::1", "198.51.100.121"])
        );
        assert_eq!(
            sorted(
                &["2002:c633:6401::1", "2001:db8:1::1"],
                &[
                    ("2002:c633:6401::1", "2002:c633:6401::2"),
                    ("2001:db8:1::1", "2001:db8:1::2"),
                ]
            ),
            ips(&["2001:db8:1::1", "2002:c633:6401::1"])
        );
    }

    #[test]
    fn prefer_matching_label() {
        assert_eq!(
            sorted(
                &["2001:db8:1::1", "2002:c633:6401::1"],
                &[
                    ("2002:c633:6401::1", "2002:c633:6401::2"),
                    ("2001:db8:1::1", "2002:c633:6401::2"),
                ]
            ),
            ips(&["2002:c633:6401::1", "2001:db8:1::1"])
        );
    }

    #[test]
    fn prefer_smaller_scope() {
        assert_eq!(
            sorted(
                &["2001:db8:1::1", "fe80::1"],
                &[
                    ("2001:db8:1::1", "2001:db8:1::2"),
                    ("fe80::1", "fe80::2"),
                ]
            ),
            ips(&["fe80::1", "2001:db8:1::1"])
        );
    }

    #[test]
    fn longest_matching_prefix() {
        assert_eq!(
            sorted(
                &["2001:db8:2::1", "2001:db8:1::1"],
                &[
                    ("2001:db8:2::1", "2001:db8:1::2"),
                    ("2001:db8:1::1", "2001:db8:1::2"),
                ]
            ),
            ips(&["2001:db8:1::1", "2001:db8:2::1"])
        );
    }

    #[test]
    fn prefix_only_compares_network_part() {
        // Both share the full /64 with the source; the interface
        // identifier does not matter and the order is kept.
        assert_eq!(
            sorted(
                &["2001:db8:1::ffff", "2001:db8:1::1"],
                &[
                    ("2001:db8:1::ffff", "2001:db8:1::2"),
                    ("2001:db8:1::1", "2001:db8:1::2"),
                ]
            ),
            ips(&["2001:db8:1::ffff", "2001:db8:1::1"])
        );
    }

    #[test]
    fn unreachable_last() {
        assert_eq!(
            sorted(
                &["2001:db8:1::1", "192.0.2.1", "198.51.100.1"],
                &[("198.51.100.1", "198.51.100.117")]
            ),
            ips(&["198.51.100.1", "2001:db8:1::1", "192.0.2.1"])
        );
    }

    #[test]
    fn stable_for_equal() {
        let list = ["192.0.2.3", "192.0.2.1", "192.0.2.2"];
        assert_eq!(
            sorted(
                &list,
                &[
                    ("192.0.2.1", "192.0.2.100"),
                    ("192.0.2.2", "192.0.2.100"),
                    ("192.0.2.3", "192.0.2.100"),
                ]
            ),
            ips(&list)
        );
        assert_eq!(sorted(&list, &[]), ips(&list));
    }

    #[test]
    fn attributes() {
        assert_eq!(
            Attrs::of(ip("::1")),
            Attrs {
                scope: SCOPE_LINK_LOCAL,
                precedence: 50,
                label: 0
            }
        );
        assert_eq!(
            Attrs::of(ip("127.0.0.1")),
            Attrs {
                scope: SCOPE_LINK_LOCAL,
                precedence: 35,
                label: 4
            }
        );
        assert_eq!(
            Attrs::of(ip("192.0.2.1")),
            Attrs {
                scope: SCOPE_GLOBAL,
                precedence: 35,
                label: 4
            }
        );
        assert_eq!(
            Attrs::of(ip("2001::1")),
            Attrs {
                scope: SCOPE_GLOBAL,
                precedence: 5,
                label: 5
            }
        );
        assert_eq!(
            Attrs::of(ip("2001:db8::1")),
            Attrs {
                scope: SCOPE_GLOBAL,
                precedence: 40,
                label: 1
            }
        );
        assert_eq!(Attrs::of(ip("fd00::1")).label, 13);
        assert_eq!(Attrs::of(ip("fec0::1")).scope, SCOPE_SITE_LOCAL);
        assert_eq!(Attrs::of(ip("fe80::1")).scope, SCOPE_LINK_LOCAL);
        assert_eq!(Attrs::of(ip("ff05::1")).scope, 0x5);
        assert_eq!(Attrs::of(ip("2a00::1")).precedence, 40);
        assert_eq!(
            Attrs::of(ip("::ffff:169.254.1.1")).scope,
            SCOPE_LINK_LOCAL
        );
    }
}
