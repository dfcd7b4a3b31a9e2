//! Addresses owned by this host, used to avoid probing ourselves.

use std::collections::HashSet;
use std::net::IpAddr;
use tracing::debug;

/// Non-loopback IPv4 addresses of this host.
///
/// Resolved once at startup and never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAddrs {
    addrs: HashSet<String>,
}

impl LocalAddrs {
    /// Enumerate interface addresses
    pub fn resolve() -> common::Result<Self> {
        let interfaces = if_addrs::get_if_addrs().map_err(common::Error::local_address)?;
        let local = Self::from_ips(interfaces.iter().map(|iface| iface.ip()));

        debug!(addrs = ?local.addrs, "Resolved local addresses");
        Ok(local)
    }

    /// Keep the IPv4, non-loopback members of `ips`
    pub fn from_ips(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        let addrs = ips
            .into_iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) if !v4.is_loopback() => Some(v4.to_string()),
                _ => None,
            })
            .collect();
        Self { addrs }
    }

    /// Whether `ip` belongs to this host. Ports are not considered.
    pub fn contains(&self, ip: &str) -> bool {
        self.addrs.contains(ip)
    }

    /// Number of local addresses
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether no local address was found
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Iterate the addresses in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addrs.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for LocalAddrs {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_from_ips_filters_loopback_and_ipv6() {
        let local = LocalAddrs::from_ips([
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(127, 0, 1, 1)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            "fe80::1".parse().unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        ]);

        assert_eq!(local.len(), 2);
        assert!(local.contains("10.0.0.5"));
        assert!(local.contains("192.168.1.20"));
        assert!(!local.contains("127.0.0.1"));
        assert!(!local.contains("::1"));
    }

    #[test]
    fn test_from_iter() {
        let local: LocalAddrs = ["10.0.0.5", "10.0.0.6"].into_iter().collect();
        assert!(local.contains("10.0.0.5"));
        assert!(!local.contains("10.0.0.9"));
        assert!(!local.is_empty());
    }

    #[test]
    fn test_accessors() {
        let empty = LocalAddrs::default();
        assert!(empty.is_empty());
        assert_eq!(empty.iter().count(), 0);

        let local: LocalAddrs = ["10.0.0.5"].into_iter().collect();
        assert_eq!(local.len(), 1);
        assert_eq!(local.iter().collect::<Vec<_>>(), vec!["10.0.0.5"]);
    }

    #[test]
    fn test_resolve_excludes_loopback() {
        let local = LocalAddrs::resolve().unwrap();
        assert!(!local.contains("127.0.0.1"));
        assert!(local.iter().all(|ip| ip.parse::<Ipv4Addr>().is_ok()));
    }
}
