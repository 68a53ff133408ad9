//! Whitelist and identity checks (C12): `isWritable`/`isAccessible` admission control and the
//! `Uni-Source` header gate.

use ipnet::IpNet;
use std::net::IpAddr;

/// CIDR whitelists loaded from config, consulted once per request by the router.
#[derive(Clone, Debug, Default)]
pub struct Whitelist {
    write: Vec<IpNet>,
    read: Vec<IpNet>,
    uni_source_check: bool,
}

impl Whitelist {
    pub fn new(write: Vec<IpNet>, read: Vec<IpNet>, uni_source_check: bool) -> Self {
        Whitelist {
            write,
            read,
            uni_source_check,
        }
    }

    /// `isWritable`: an empty whitelist is fail-open by default. A non-empty whitelist admits
    /// only matching addresses.
    pub fn is_writable(&self, addr: IpAddr) -> bool {
        self.write.is_empty() || self.write.iter().any(|net| net.contains(&addr))
    }

    /// `isAccessible`: unlike `is_writable`, an empty read whitelist is closed-by-default —
    /// an unconfigured read-white set denies every address rather than admitting all of them.
    pub fn is_accessible(&self, addr: IpAddr) -> bool {
        !self.read.is_empty() && self.read.iter().any(|net| net.contains(&addr))
    }

    /// Whether upload requests must carry a non-empty `Uni-Source` header.
    pub fn requires_uni_source(&self) -> bool {
        self.uni_source_check
    }
}

/// The detail message for a whitelist rejection of `action` (e.g. `"write"`, `"read"`) by `addr`.
pub fn denied_detail(action: &str, addr: IpAddr) -> String {
    format!("It's not allowed to {action} by whitelist ({addr})")
}

/// Whether `path` is eligible for a TTL annotation: it must have more than one non-empty
/// `/`-delimited segment, ignoring a single trailing slash. Prevents TTL being set on the
/// root, `/public/`, or a bare single-segment business path.
pub fn is_path_eligible_for_ttl(path: &str) -> bool {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.split('/').filter(|s| !s.is_empty()).count() > 1
}

/// Extracts the caller's identity fields from request headers, falling back to the socket
/// address when a header is absent.
pub fn client_addr(headers: &http::HeaderMap, socket_addr: IpAddr) -> IpAddr {
    headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(socket_addr)
}

/// The `Uni-Source` header value, empty string if absent.
pub fn uni_source(headers: &http::HeaderMap) -> String {
    headers
        .get("Uni-Source")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The `Request-Id` header value, or a random <=8-digit decimal string if absent.
pub fn trace_id(headers: &http::HeaderMap) -> String {
    headers
        .get("Request-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| (rand::random::<u32>() % 100_000_000).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_write_whitelist_is_open_empty_read_whitelist_is_closed() {
        let wl = Whitelist::default();
        assert!(wl.is_writable("1.2.3.4".parse().unwrap()));
        assert!(!wl.is_accessible("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn nonempty_whitelist_restricts() {
        let wl = Whitelist::new(vec!["10.0.0.0/8".parse().unwrap()], vec![], false);
        assert!(wl.is_writable("10.1.2.3".parse().unwrap()));
        assert!(!wl.is_writable("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn trace_id_falls_back_when_absent() {
        let headers = http::HeaderMap::new();
        let id = trace_id(&headers);
        assert!(id.parse::<u32>().is_ok());
    }

    #[test]
    fn ttl_eligibility_matches_segment_count() {
        assert!(is_path_eligible_for_ttl("/ppp//asd"));
        assert!(is_path_eligible_for_ttl("/ppp//asd/"));
        assert!(!is_path_eligible_for_ttl("//ppp//"));
        assert!(!is_path_eligible_for_ttl("//ppp"));
    }
}
