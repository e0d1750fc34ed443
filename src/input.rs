use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use crate::{error::InputBuildError, interface::LocalInterface};

/// Addresses carried by one ARP request.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ArpProbeInput {
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

impl ArpProbeInput {
    /// Sender addresses taken from the interface the frame leaves through.
    pub fn from_interface(interface: &LocalInterface, target_ip: Ipv4Addr) -> Self {
        Self {
            sender_mac: interface.mac,
            sender_ip: interface.ipv4,
            target_ip,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ArpProbeInputBuilder {
    sender_mac: Option<MacAddr>,
    sender_ip: Option<Ipv4Addr>,
    target_ip: Option<Ipv4Addr>,
}

impl ArpProbeInputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender_mac(mut self, sender_mac: MacAddr) -> Self {
        self.sender_mac = Some(sender_mac);
        self
    }

    pub fn with_sender_ip(mut self, sender_ip: Ipv4Addr) -> Self {
        self.sender_ip = Some(sender_ip);
        self
    }

    pub fn with_target_ip(mut self, target_ip: Ipv4Addr) -> Self {
        self.target_ip = Some(target_ip);
        self
    }

    pub fn build(&self) -> std::result::Result<ArpProbeInput, InputBuildError> {
        Ok(ArpProbeInput {
            sender_mac: self.sender_mac.ok_or(InputBuildError::MissingSenderMac)?,
            sender_ip: self.sender_ip.ok_or(InputBuildError::MissingSenderIp)?,
            target_ip: self.target_ip.ok_or(InputBuildError::MissingTargetIp)?,
        })
    }
}
