use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, info};

use crate::error::CaptureError;

/// A single address assigned to a network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub addr: IpAddr,
    pub is_loopback: bool,
    pub is_up: bool,
}

/// Source of interface addresses, in the order the platform reports them.
pub trait InterfaceSource {
    fn interfaces(&self) -> std::io::Result<Vec<NetInterface>>;
}

/// Reads interfaces from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> std::io::Result<Vec<NetInterface>> {
        let interfaces = if_addrs::get_if_addrs()?;

        Ok(interfaces
            .into_iter()
            .map(|iface| NetInterface {
                is_loopback: iface.is_loopback(),
                is_up: iface.is_oper_up(),
                addr: iface.ip(),
                name: iface.name,
            })
            .collect())
    }
}

/// Anything that can produce the IPv4 address the pairing server binds to.
pub trait ResolveAddress: Send + Sync {
    fn resolve(&self) -> Result<Ipv4Addr, CaptureError>;
}

/// Picks the first IPv4 address on an active, non-loopback interface.
///
/// When several interfaces qualify (e.g. Ethernet and Wi-Fi), the winner is
/// whichever the platform enumerates first. That order is not stable across
/// machines and is intentionally left as-is.
#[derive(Debug, Clone, Default)]
pub struct AddressResolver<S = SystemInterfaces> {
    source: S,
}

impl AddressResolver<SystemInterfaces> {
    pub fn system() -> Self {
        Self::default()
    }
}

impl<S: InterfaceSource> AddressResolver<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    pub fn resolve(&self) -> Result<Ipv4Addr, CaptureError> {
        let interfaces = self
            .source
            .interfaces()
            .map_err(CaptureError::InterfaceEnumeration)?;

        for iface in interfaces {
            if iface.is_loopback || !iface.is_up {
                debug!("Skipping interface {} ({})", iface.name, iface.addr);
                continue;
            }

            if let IpAddr::V4(addr) = iface.addr {
                if addr.is_loopback() || addr.is_unspecified() {
                    continue;
                }
                info!("Resolved LAN address {} on interface {}", addr, iface.name);
                return Ok(addr);
            }
        }

        Err(CaptureError::NoAddressFound)
    }
}

impl<S: InterfaceSource + Send + Sync> ResolveAddress for AddressResolver<S> {
    fn resolve(&self) -> Result<Ipv4Addr, CaptureError> {
        AddressResolver::resolve(self)
    }
}

/// An address chosen by the operator, bypassing interface enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAddress(pub Ipv4Addr);

impl ResolveAddress for FixedAddress {
    fn resolve(&self) -> Result<Ipv4Addr, CaptureError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    struct StaticInterfaces(Vec<NetInterface>);

    impl InterfaceSource for StaticInterfaces {
        fn interfaces(&self) -> std::io::Result<Vec<NetInterface>> {
            Ok(self.0.clone())
        }
    }

    struct FailingInterfaces;

    impl InterfaceSource for FailingInterfaces {
        fn interfaces(&self) -> std::io::Result<Vec<NetInterface>> {
            Err(std::io::Error::other("getifaddrs failed"))
        }
    }

    fn iface(name: &str, addr: IpAddr, is_loopback: bool, is_up: bool) -> NetInterface {
        NetInterface {
            name: name.to_string(),
            addr,
            is_loopback,
            is_up,
        }
    }

    #[test]
    fn test_loopback_only_host_has_no_address() {
        let resolver = AddressResolver::with_source(StaticInterfaces(vec![
            iface("lo", IpAddr::V4(Ipv4Addr::LOCALHOST), true, true),
            iface("lo", IpAddr::V6(Ipv6Addr::LOCALHOST), true, true),
        ]));

        assert!(matches!(
            resolver.resolve(),
            Err(CaptureError::NoAddressFound)
        ));
    }

    #[test]
    fn test_single_lan_interface_is_returned() {
        let lan = Ipv4Addr::new(192, 168, 1, 42);
        let resolver = AddressResolver::with_source(StaticInterfaces(vec![
            iface("lo", IpAddr::V4(Ipv4Addr::LOCALHOST), true, true),
            iface("wlan0", IpAddr::V4(lan), false, true),
        ]));

        assert_eq!(resolver.resolve().unwrap(), lan);
    }

    #[test]
    fn test_inactive_and_ipv6_interfaces_are_skipped() {
        let lan = Ipv4Addr::new(10, 0, 0, 7);
        let resolver = AddressResolver::with_source(StaticInterfaces(vec![
            iface("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), false, false),
            iface("wlan0", IpAddr::V6("fe80::1".parse().unwrap()), false, true),
            iface("wlan0", IpAddr::V4(lan), false, true),
        ]));

        assert_eq!(resolver.resolve().unwrap(), lan);
    }

    #[test]
    fn test_first_enumerated_interface_wins() {
        let first = Ipv4Addr::new(192, 168, 0, 10);
        let resolver = AddressResolver::with_source(StaticInterfaces(vec![
            iface("eth0", IpAddr::V4(first), false, true),
            iface("wlan0", IpAddr::V4(Ipv4Addr::new(192, 168, 0, 11)), false, true),
        ]));

        assert_eq!(resolver.resolve().unwrap(), first);
    }

    #[test]
    fn test_no_interfaces_at_all() {
        let resolver = AddressResolver::with_source(StaticInterfaces(Vec::new()));
        assert!(matches!(
            resolver.resolve(),
            Err(CaptureError::NoAddressFound)
        ));
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        let resolver = AddressResolver::with_source(FailingInterfaces);
        assert!(matches!(
            resolver.resolve(),
            Err(CaptureError::InterfaceEnumeration(_))
        ));
    }

    #[test]
    fn test_fixed_address() {
        let addr = Ipv4Addr::new(172, 16, 0, 3);
        assert_eq!(FixedAddress(addr).resolve().unwrap(), addr);
    }

    #[test]
    fn test_system_interfaces_report_loopback_state() {
        let interfaces = SystemInterfaces.interfaces().unwrap();
        for iface in interfaces.iter().filter(|iface| iface.addr.is_loopback()) {
            assert!(iface.is_loopback, "{} not flagged as loopback", iface.name);
        }
    }
}
