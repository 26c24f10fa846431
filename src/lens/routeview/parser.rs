//! Parser for Cisco-style `show ip bgp` output
//!
//! Route lines look like
//!
//! ```text
//!      Network          Next Hop            Metric LocPrf Weight Path
//!  V*   1.2.3.0/24       64.71.137.241                          0 6939 64500 i
//!  V*                    208.51.134.254           0             0 3257 64500 i
//!  N*>  12.0.0.0         4.68.4.46                0             0 3356 64500 ?
//!  *   203.0.113.128/25
//!                        4.68.4.46                0             0 3356 64500 i
//! ```
//!
//! The status column (an optional RPKI code followed by `*`, `>`, `i`, ...) is
//! followed by an optional network. Lines without a network continue the most
//! recent one. A network too wide for its column sits alone on its line and
//! the rest of the entry follows on the next line. Classful networks are
//! printed without a mask.
//!
//! Only the AS adjacent to the local AS is kept from each path.

use ipnet::{IpNet, Ipv4Net};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

use super::{ObservedRoutes, ParseStats};
use crate::error::ParseError;

/// Characters allowed in the status column, including RPKI validation codes
const STATUS_CHARS: &[char] = &[
    's', 'd', 'h', '*', '>', 'i', 'r', 'S', 'm', 'b', 'f', 'x', 'a', 'c', 't', 'L', 'V', 'I',
    'N', '=',
];

const ORIGIN_CODES: &[&str] = &["i", "e", "?"];

/// Parses looking-glass output seen from the point of view of `local_asn`
#[derive(Debug, Clone, Copy)]
pub struct RouteViewParser {
    local_asn: u32,
}

/// A route line split into its columns
#[derive(Debug)]
struct RouteLine<'a> {
    status: String,
    network: Option<IpNet>,
    /// Tokens after the network: next hop, metrics, weight, path and origin
    rest: Vec<&'a str>,
}

enum Line<'a> {
    /// Banner, header, footer or anything else that isn't a route
    Other,
    /// Looks like a route line but the network can't be read
    Malformed,
    Route(RouteLine<'a>),
}

enum Entry {
    Usable(IpNet, Option<u32>),
    Ignored,
    Malformed,
}

impl RouteViewParser {
    pub fn new(local_asn: u32) -> Self {
        Self { local_asn }
    }

    pub fn local_asn(&self) -> u32 {
        self.local_asn
    }

    /// Parse raw looking-glass text into the observed next-hop map
    ///
    /// Empty or whitespace-only input yields an empty map. Non-empty input
    /// without a single valid (`*`) route entry is a [`ParseError`].
    pub fn parse(&self, raw_text: &str) -> Result<ObservedRoutes, ParseError> {
        let mut routes: BTreeMap<IpNet, BTreeSet<u32>> = BTreeMap::new();
        let mut stats = ParseStats::default();

        let mut non_blank = 0usize;
        let mut current: Option<IpNet> = None;
        // network printed alone on its line, with its status
        let mut wrapped: Option<(String, IpNet)> = None;

        for line in raw_text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            non_blank += 1;

            let parsed = classify_line(line);

            let route = match (parsed, wrapped.take()) {
                (Line::Route(route), Some((status, network)))
                    if route.status.is_empty() && route.network.is_none() =>
                {
                    RouteLine {
                        status,
                        network: Some(network),
                        rest: route.rest,
                    }
                }
                (parsed, pending) => {
                    if pending.is_some() {
                        debug!("wrapped network line not followed by its route: {}", line);
                        stats.skipped += 1;
                    }
                    match parsed {
                        Line::Other => continue,
                        Line::Malformed => {
                            debug!("skipping malformed route line: {}", line);
                            stats.skipped += 1;
                            continue;
                        }
                        Line::Route(route) => route,
                    }
                }
            };

            // a continuation line without a pending network is not a route
            if route.status.is_empty() && route.network.is_none() {
                continue;
            }

            if let Some(network) = route.network {
                current = Some(network);
                if route.rest.is_empty() {
                    wrapped = Some((route.status, network));
                    continue;
                }
            }

            let Some(network) = current else {
                debug!("route line before any network: {}", line);
                stats.skipped += 1;
                continue;
            };

            match self.parse_entry(network, &route) {
                Entry::Usable(prefix, next_hop) => {
                    stats.entries += 1;
                    let hops = routes.entry(prefix).or_default();
                    if let Some(asn) = next_hop {
                        hops.insert(asn);
                    }
                }
                Entry::Ignored => stats.ignored += 1,
                Entry::Malformed => {
                    debug!("skipping malformed route entry: {}", line);
                    stats.skipped += 1;
                }
            }
        }

        if wrapped.is_some() {
            stats.skipped += 1;
        }

        if non_blank > 0 && stats.entries == 0 {
            return Err(ParseError {
                lines: non_blank,
                skipped: stats.skipped,
            });
        }

        info!(
            "parsed {} route entries for {} prefixes ({} ignored, {} malformed)",
            stats.entries,
            routes.len(),
            stats.ignored,
            stats.skipped
        );

        Ok(ObservedRoutes { routes, stats })
    }

    fn parse_entry(&self, network: IpNet, route: &RouteLine) -> Entry {
        if !route.status.contains('*') {
            return Entry::Ignored;
        }

        // next hop, then [metric] [locprf] weight path... origin
        let Some((origin, fields)) = route.rest.split_last() else {
            return Entry::Malformed;
        };
        if !ORIGIN_CODES.contains(origin) || fields.is_empty() {
            return Entry::Malformed;
        }
        let path = as_path(&fields[1..]);
        if path.is_empty() {
            return Entry::Malformed;
        }

        Entry::Usable(network.trunc(), self.next_hop(path))
    }

    /// The AS right before the first occurrence of the local AS
    fn next_hop(&self, path: &[&str]) -> Option<u32> {
        let position = path
            .iter()
            .position(|token| token.parse::<u32>().ok() == Some(self.local_asn))?;
        let neighbor = path.get(position.checked_sub(1)?)?.parse::<u32>().ok()?;
        (neighbor != self.local_asn && neighbor != 0).then_some(neighbor)
    }
}

/// Longest suffix of path segment tokens; the weight column (0) ends it
fn as_path<'a, 'b>(tokens: &'b [&'a str]) -> &'b [&'a str] {
    let start = tokens
        .iter()
        .rposition(|token| !is_path_token(token))
        .map(|i| i + 1)
        .unwrap_or(0);
    &tokens[start..]
}

fn is_path_token(token: &str) -> bool {
    if let Ok(asn) = token.parse::<u32>() {
        return asn != 0;
    }
    // AS_SET and confederation segments: {1,2} (65001 65002)
    token.starts_with(['{', '(', '['])
        || token.ends_with(['}', ')', ']'])
        || (token.contains(',') && token.split(',').all(|p| p.parse::<u32>().is_ok()))
}

fn is_status(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| STATUS_CHARS.contains(&c))
}

fn classify_line(line: &str) -> Line<'_> {
    let mut tokens = line.split_whitespace().peekable();

    let mut status = String::new();
    while let Some(token) = tokens.peek() {
        if !is_status(token) {
            break;
        }
        status.push_str(token);
        tokens.next();
    }

    let Some(first) = tokens.next() else {
        return Line::Other;
    };

    let Some((glued, address)) = split_status(first) else {
        return if status.contains('*') {
            Line::Malformed
        } else {
            Line::Other
        };
    };
    status.push_str(glued);

    let rest: Vec<&str> = tokens.collect();

    match address {
        Address::Net(net) => Line::Route(RouteLine {
            status,
            network: Some(net),
            rest,
        }),
        Address::Host(addr) => {
            let next_is_address = rest
                .first()
                .map(|t| t.parse::<IpAddr>().is_ok())
                .unwrap_or(false);
            // a bare IPv4 address is a classful network when the next hop
            // follows it, or when it stands alone after a status column
            let classful = match addr {
                IpAddr::V4(v4) if next_is_address || (rest.is_empty() && !status.is_empty()) => {
                    Some(classful_network(v4))
                }
                _ => None,
            };
            match classful {
                Some(network) => Line::Route(RouteLine {
                    status,
                    network: Some(network),
                    rest,
                }),
                None => {
                    let mut with_hop = Vec::with_capacity(rest.len() + 1);
                    with_hop.push(address_token(first, glued));
                    with_hop.extend(rest);
                    Line::Route(RouteLine {
                        status,
                        network: None,
                        rest: with_hop,
                    })
                }
            }
        }
    }
}

enum Address {
    Net(IpNet),
    Host(IpAddr),
}

/// Split a token like `*>1.2.3.0/24` into its glued status and its address
fn split_status(token: &str) -> Option<(&str, Address)> {
    token.char_indices().find_map(|(i, _)| {
        let (head, tail) = token.split_at(i);
        if !head.chars().all(|c| STATUS_CHARS.contains(&c)) {
            return None;
        }
        if tail.contains('/') {
            tail.parse::<IpNet>().ok().map(|n| (head, Address::Net(n)))
        } else {
            tail.parse::<IpAddr>().ok().map(|a| (head, Address::Host(a)))
        }
    })
}

fn address_token<'a>(token: &'a str, glued: &str) -> &'a str {
    &token[glued.len()..]
}

/// Mask implied by the address class for networks printed without a length
fn classful_network(addr: Ipv4Addr) -> IpNet {
    let len = match addr.octets()[0] {
        0..=127 => 8,
        128..=191 => 16,
        192..=223 => 24,
        _ => 32,
    };
    // lengths above are all valid for IPv4
    IpNet::V4(Ipv4Net::new(addr, len).unwrap_or_else(|_| Ipv4Net::from(addr)).trunc())
}
