//! Client address resolution.
//!
//! Candidate headers are consulted in a fixed order and the first one that
//! yields a public address wins. For comma-separated headers the first
//! element is taken: `X-Forwarded-For: client, proxy1, proxy2` lists the
//! original client first. Nothing here verifies that a header was written
//! by a trusted proxy; the ordering is a heuristic only.
//!
//! When no header qualifies, the transport peer address is used as-is
//! (after the same prefix and zone stripping) even if it is private.
//!
//! A bare IPv6 value ending in `:digits` is ambiguous: the suffix may be a
//! port or the last group. It is stripped as a port only when the remainder
//! still parses as an IPv6 address, so `::1` and `2001:db8::1` are kept
//! whole instead of collapsing into broken literals.
//!
//! Dotted quads that are not valid IPv4 addresses (`10.0.0.01`,
//! `192.168.1.300`) are still judged private by their leading octets.

use crate::config::ResolverConfig;
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

const MAPPED_PREFIX: &str = "::ffff:";

const PRIVATE_V4_RANGES: [Ipv4Net; 4] = [
    Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16),
    Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Net::new_assert(Ipv4Addr::new(169, 254, 0, 0), 16),
];

/// Resolve the client address from lowercase-keyed headers, falling back
/// to the peer address.
pub fn resolve_client_ip(
    headers: &HashMap<String, String>,
    peer: Option<&str>,
    config: &ResolverConfig,
) -> Option<String> {
    for header_name in &config.headers {
        let header_lower = header_name.to_lowercase();
        let Some(raw) = headers.get(&header_lower) else {
            continue;
        };

        match extract_ip_from_header(raw) {
            Some(ip) if !is_private_ip(&ip) => {
                debug!(header = %header_lower, ip = %ip, "Client address taken from header");
                return Some(ip);
            }
            Some(ip) => {
                debug!(header = %header_lower, ip = %ip, "Skipping private address");
            }
            None => {
                debug!(header = %header_lower, "Header has no usable address");
            }
        }
    }

    peer.and_then(normalize_peer_ip)
}

/// Pull a normalized address out of a raw header value.
pub fn extract_ip_from_header(raw: &str) -> Option<String> {
    let first = raw.split(',').map(str::trim).find(|s| !s.is_empty())?;
    let token = forwarded_for(first)?;

    if let Some((host, bracketed)) = unbracket(token) {
        if bracketed {
            return finish(host);
        }
        return normalize_unbracketed(host);
    }

    normalize_unbracketed(token)
}

/// Normalize the transport peer address. No port handling is needed.
pub fn normalize_peer_ip(addr: &str) -> Option<String> {
    finish(addr)
}

/// Whether an address is loopback, private, link-local or unspecified.
/// An empty value counts as private.
pub fn is_private_ip(ip: &str) -> bool {
    if ip.is_empty() {
        return true;
    }
    if matches!(ip, "127.0.0.1" | "::1" | "::") {
        return true;
    }

    if is_dotted_quad(ip) {
        return match ip.parse::<Ipv4Addr>() {
            Ok(addr) => PRIVATE_V4_RANGES.iter().any(|net| net.contains(&addr)),
            Err(_) => has_private_v4_prefix(ip),
        };
    }

    let lower = ip.to_ascii_lowercase();
    lower.starts_with("fc") || lower.starts_with("fd") || lower.starts_with("fe80:")
}

/// Prefix match on the textual octets, for dotted quads that do not parse.
fn has_private_v4_prefix(ip: &str) -> bool {
    let mut octets = ip.split('.');
    let first = octets.next().unwrap_or_default();
    let second = octets.next().unwrap_or_default();

    match first {
        "10" => true,
        "192" => second == "168",
        "169" => second == "254",
        "172" => {
            second.len() == 2
                && second
                    .parse::<u8>()
                    .is_ok_and(|octet| (16..=31).contains(&octet))
        }
        _ => false,
    }
}

/// RFC 7239 elements (`for=...;proto=...`) carry the address in `for`.
/// Plain tokens pass through untouched.
fn forwarded_for(token: &str) -> Option<&str> {
    if !token.contains('=') {
        return Some(token);
    }

    token.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("for") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Split `[host]` or `[host]:port` into its host. Returns `(value, true)`
/// for well-formed bracket notation and `(value, false)` when only stray
/// brackets were removed.
fn unbracket(token: &str) -> Option<(&str, bool)> {
    if let Some(inner) = token.strip_prefix('[') {
        if let Some((host, rest)) = inner.split_once(']') {
            let port_ok = rest.is_empty()
                || rest.strip_prefix(':').is_some_and(is_all_digits);
            if port_ok {
                return Some((host, true));
            }
        }
        return Some((inner.strip_suffix(']').unwrap_or(inner), false));
    }

    token.strip_suffix(']').map(|host| (host, false))
}

fn normalize_unbracketed(value: &str) -> Option<String> {
    let mut ip = value;

    if let Some((host, port)) = ip.rsplit_once(':') {
        if is_all_digits(port) && !host.is_empty() {
            if is_dotted_quad(host) {
                return non_empty(host);
            }
            // Without brackets a trailing `:digits` on an IPv6 literal may
            // be a port or the last group; it is treated as a port as long
            // as what remains is still an IPv6 literal.
            if host.contains(':') && host.parse::<Ipv6Addr>().is_ok() {
                ip = host;
            }
        }
    }

    finish(ip)
}

/// Strip the IPv4-mapped prefix and any zone id.
fn finish(value: &str) -> Option<String> {
    let mut ip = value;

    if ip.len() >= MAPPED_PREFIX.len()
        && ip.is_char_boundary(MAPPED_PREFIX.len())
        && ip[..MAPPED_PREFIX.len()].eq_ignore_ascii_case(MAPPED_PREFIX)
    {
        ip = &ip[MAPPED_PREFIX.len()..];
    }

    let ip = ip.split('%').next().unwrap_or_default();
    non_empty(ip)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_dotted_quad(s: &str) -> bool {
    let mut groups = 0;
    for part in s.split('.') {
        if !is_all_digits(part) {
            return false;
        }
        groups += 1;
    }
    groups == 4
}
