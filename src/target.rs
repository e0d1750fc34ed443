use std::net::IpAddr;

use log::debug;

use crate::error::{Error, Result};

/// Address family a probe runs in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Family {
    #[default]
    V4,
    V6,
}

impl Family {
    /// Family of `ip`; IPv4-mapped IPv6 addresses fit in 4 bytes and count as IPv4.
    pub fn of(ip: IpAddr) -> Self {
        match ip.to_canonical() {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    fn admits(self, ip: IpAddr) -> bool {
        Family::of(ip) == self
    }
}

/// Parses a literal IPv4 or IPv6 address.
pub fn parse_ip(s: &str) -> Result<IpAddr> {
    s.parse()
        .map_err(|_| Error::AddressParse(format!("'{}' is invalid ip", s)))
}

pub fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|err| Error::AddressParse(format!("failed to get port {}: {}", s, err)))
}

/// Resolves `host` to the first address of `family`.
///
/// Literal addresses are returned as they are when they belong to the family,
/// anything else goes through the system resolver.
pub async fn resolve_host(host: &str, family: Family) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        let (ip, admitted) = match family {
            Family::V4 => (ip.to_canonical(), family.admits(ip)),
            Family::V6 => (ip, ip.is_ipv6()),
        };
        return if admitted {
            Ok(ip)
        } else {
            Err(Error::Resolve {
                host: host.into(),
                reason: format!("address is not {:?}", family),
            })
        };
    }

    let resolved = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|err| Error::Resolve {
            host: host.into(),
            reason: err.to_string(),
        })?
        .map(|addr| addr.ip())
        .find(|ip| family.admits(*ip))
        .ok_or_else(|| Error::Resolve {
            host: host.into(),
            reason: format!("no {:?} address", family),
        })?;
    debug!("resolved target host: {} ({})", resolved, host);
    Ok(resolved)
}

/// Formats a dialable endpoint, bracketing IPv6 hosts.
pub fn endpoint(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn test_family_selection() {
        assert_eq!(Family::of("127.0.0.1".parse().unwrap()), Family::V4);
        assert_eq!(Family::of("::1".parse().unwrap()), Family::V6);
        assert_eq!(Family::of("::ffff:10.0.0.1".parse().unwrap()), Family::V4);
    }

    #[test]
    fn test_parse_ip() {
        assert_eq!(
            parse_ip("192.168.1.1").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(parse_ip("::1").unwrap(), IpAddr::V6(Ipv6Addr::LOCALHOST));
        let err = parse_ip("300.1.1.1").unwrap_err();
        assert!(matches!(err, Error::AddressParse(_)));
        assert_eq!(err.to_string(), "'300.1.1.1' is invalid ip");
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("443").unwrap(), 443);
        assert!(matches!(parse_port("http"), Err(Error::AddressParse(_))));
        assert!(matches!(parse_port("70000"), Err(Error::AddressParse(_))));
    }

    #[test]
    fn test_endpoint_brackets_ipv6() {
        assert_eq!(endpoint("10.0.0.1".parse().unwrap(), 22), "10.0.0.1:22");
        assert_eq!(endpoint("::1".parse().unwrap(), 22), "[::1]:22");
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        assert_eq!(
            resolve_host("127.0.0.1", Family::V4).await.unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(
            resolve_host("::1", Family::V6).await.unwrap(),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
        assert!(matches!(
            resolve_host("::1", Family::V4).await,
            Err(Error::Resolve { .. })
        ));
        assert!(matches!(
            resolve_host("127.0.0.1", Family::V6).await,
            Err(Error::Resolve { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_unknown_host() {
        let err = resolve_host("no-such-host.invalid", Family::V4)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }
}
