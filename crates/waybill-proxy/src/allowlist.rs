//! Destination allowlist for the forwarding proxy.

/// Hostname allowlist with suffix-match semantics.
///
/// An empty list allows every destination. Ports are stripped before
/// matching, so `mobile.servientrega.com:443` matches an entry of
/// `servientrega.com`.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    /// Builds an allowlist from domain suffixes.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Allowlist that permits every destination.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks `addr` (hostname, `host:port`, or bracketed IPv6) against the
    /// list.
    pub fn allows(&self, addr: &str) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        let host = strip_port(addr);
        self.domains.iter().any(|domain| host.ends_with(domain))
    }
}

/// Drops a trailing `:port` from an address, leaving bare hostnames and
/// unbracketed IPv6 literals untouched.
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => addr,
    }
}
