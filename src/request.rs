use pnet::{
    packet::{
        arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket},
        ethernet::{EtherTypes, MutableEthernetPacket},
        Packet,
    },
    util::MacAddr,
};

use crate::{
    constants::{ARP_PACK_LEN, ETH_PACK_LEN, IP_V4_LEN, MAC_ADDR_LEN},
    error::{Error, Result},
    input::ArpProbeInput,
};

/// Broadcast Ethernet frame carrying an ARP request for `input.target_ip`.
pub fn arp_request_frame(input: &ArpProbeInput) -> Result<[u8; ETH_PACK_LEN]> {
    let mut eth_buf = [0; ETH_PACK_LEN];
    let mut eth_packet = MutableEthernetPacket::new(&mut eth_buf)
        .ok_or_else(|| Error::Serialization("Ethernet frame".into()))?;
    eth_packet.set_destination(MacAddr::broadcast());
    eth_packet.set_source(input.sender_mac);
    eth_packet.set_ethertype(EtherTypes::Arp);

    let mut arp_buf = [0; ARP_PACK_LEN];
    let mut arp_packet = MutableArpPacket::new(&mut arp_buf)
        .ok_or_else(|| Error::Serialization("ARP request".into()))?;
    arp_packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp_packet.set_protocol_type(EtherTypes::Ipv4);
    arp_packet.set_hw_addr_len(MAC_ADDR_LEN);
    arp_packet.set_proto_addr_len(IP_V4_LEN);
    arp_packet.set_operation(ArpOperations::Request);
    arp_packet.set_sender_hw_addr(input.sender_mac);
    arp_packet.set_sender_proto_addr(input.sender_ip);
    arp_packet.set_target_hw_addr(MacAddr::zero());
    arp_packet.set_target_proto_addr(input.target_ip);

    eth_packet.set_payload(arp_packet.packet());
    Ok(eth_buf)
}
