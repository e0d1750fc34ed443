use std::net::{IpAddr, Ipv4Addr};

use pnet::{
    datalink::{self, NetworkInterface},
    util::MacAddr,
};

use crate::error::{Error, Result};

/// The local end of an ARP exchange: where frames go out and which
/// addresses they carry as sender.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct LocalInterface {
    pub name: String,
    pub mac: MacAddr,
    pub ipv4: Ipv4Addr,
}

impl LocalInterface {
    /// Uses the named interface when given, the default one otherwise.
    pub fn resolve(name: Option<&str>) -> Result<Self> {
        match name {
            Some(name) => Self::by_name(name),
            None => Self::default_route(),
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| Error::InterfaceResolution(format!("interface {} not found", name)))?;
        Self::try_from(&interface)
    }

    /// First interface that is up, is not a loopback and has a routable IPv4 address.
    pub fn default_route() -> Result<Self> {
        select_default(datalink::interfaces())
    }
}

impl TryFrom<&NetworkInterface> for LocalInterface {
    type Error = Error;

    fn try_from(interface: &NetworkInterface) -> Result<Self> {
        let mac = interface.mac.ok_or_else(|| {
            Error::InterfaceResolution(format!("interface {} has no mac address", interface.name))
        })?;
        let ipv4 = first_ipv4(interface)
            .ok_or_else(|| Error::InterfaceResolution("no ip v4 address found".into()))?;
        Ok(Self {
            name: interface.name.clone(),
            mac,
            ipv4,
        })
    }
}

fn first_ipv4(interface: &NetworkInterface) -> Option<Ipv4Addr> {
    interface.ips.iter().find_map(|net| match net.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
        _ => None,
    })
}

fn select_default(interfaces: Vec<NetworkInterface>) -> Result<LocalInterface> {
    interfaces
        .iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .find(|iface| first_ipv4(iface).is_some())
        .ok_or_else(|| Error::InterfaceResolution("default network interface not found".into()))
        .and_then(LocalInterface::try_from)
}
