use std::net::Ipv4Addr;

use log::trace;
use pnet::packet::arp::{Arp, ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::{FromPacket, Packet};
use pnet::util::MacAddr;
use tokio::time::Instant;

use crate::constants::MAX_FRAME_LEN;
use crate::error::{Error, Result};
use crate::link::FrameRx;
use crate::notification::Completer;

/// Which ARP replies count as an answer to the probe.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ArpMatch {
    /// The first reply from any other host on the segment.
    #[default]
    AnyReply,
    /// Only a reply announcing the queried target address.
    Target,
}

/// Acceptance rule for captured ARP frames.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct ReplyFilter {
    pub(crate) own_mac: MacAddr,
    pub(crate) target_ip: Ipv4Addr,
    pub(crate) policy: ArpMatch,
}

impl ReplyFilter {
    pub(crate) fn accepts(&self, arp: &Arp) -> bool {
        if arp.operation != ArpOperations::Reply {
            return false;
        }
        // the interface may capture its own traffic
        if arp.sender_hw_addr == self.own_mac {
            return false;
        }
        match self.policy {
            ArpMatch::AnyReply => true,
            ArpMatch::Target => arp.sender_proto_addr == self.target_ip,
        }
    }
}

/// An accepted reply and the moment it was captured.
#[derive(Clone, Debug)]
pub(crate) struct ArpReply {
    pub(crate) arp: Arp,
    pub(crate) received_at: Instant,
}

/// Background reader draining the capture side of a link.
pub(super) struct Listener<R> {
    rx: R,
    filter: ReplyFilter,
}

impl<R: FrameRx> Listener<R> {
    pub(super) fn new(rx: R, filter: ReplyFilter) -> Self {
        Self { rx, filter }
    }

    /// Reads until a reply passes the filter or the completion side goes away.
    pub(super) async fn listen(mut self, completer: Completer<Result<ArpReply>>) {
        let outcome = tokio::select! {
            outcome = self.next_reply() => outcome,
            _ = completer.cancelled() => {
                trace!("arp reader cancelled");
                return;
            }
        };
        completer.complete(outcome);
    }

    async fn next_reply(&mut self) -> Result<ArpReply> {
        let mut buf = [0; MAX_FRAME_LEN];
        loop {
            let read_bytes = self.rx.recv_frame(&mut buf).await.map_err(Error::Receive)?;
            let received_at = Instant::now();
            match parse_arp_packet(&buf[..read_bytes]) {
                Ok(arp) if self.filter.accepts(&arp) => return Ok(ArpReply { arp, received_at }),
                Ok(arp) => trace!(
                    "ignoring arp {:?} from {}",
                    arp.operation,
                    arp.sender_hw_addr
                ),
                Err(_) => trace!("ignoring non-arp frame of {} bytes", read_bytes),
            }
        }
    }
}

/// Decodes the ARP body of an Ethernet frame; other ethertypes are rejected.
pub(super) fn parse_arp_packet(frame: &[u8]) -> Result<Arp> {
    let ethernet = EthernetPacket::new(frame)
        .ok_or_else(|| Error::Malformed(format!("{} byte ethernet frame", frame.len())))?;
    match ethernet.get_ethertype() {
        EtherTypes::Arp => ArpPacket::new(ethernet.payload())
            .map(|arp| arp.from_packet())
            .ok_or_else(|| Error::Malformed("truncated arp payload".into())),
        ethertype => Err(Error::Malformed(format!("ethertype {} is not arp", ethertype))),
    }
}
