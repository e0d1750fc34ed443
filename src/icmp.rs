use std::{io, net::IpAddr, time::Duration};

use log::debug;
use pnet::packet::{
    icmp::{
        self, echo_request::MutableEchoRequestPacket, IcmpCode, IcmpPacket, IcmpTypes,
    },
    icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet},
    ip::IpNextHeaderProtocols,
    Packet,
};
use tokio::time::Instant;

use crate::{
    constants::{
        DEFAULT_ICMP_READ_TIMEOUT, DEFAULT_ICMP_WRITE_TIMEOUT, ICMP_ECHO_HEADER_LEN,
        ICMP_ECHO_SEQUENCE, ICMP_READ_BUF_LEN,
    },
    error::{Error, Result},
    probe::{Peer, ProbeResult, Prober, Stopwatch},
    socket::{bind_addr, IcmpListener, IcmpSocket, IcmpSocketKind},
    target::{resolve_host, Family},
};

/// Echo message types and socket parameters of one address family.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IcmpFamily {
    pub family: Family,
    pub echo_request: u8,
    pub echo_reply: u8,
    /// IP protocol number the messages travel under.
    pub protocol: u8,
    pub network: &'static str,
}

pub const ICMP_V4: IcmpFamily = IcmpFamily {
    family: Family::V4,
    echo_request: IcmpTypes::EchoRequest.0,
    echo_reply: IcmpTypes::EchoReply.0,
    protocol: IpNextHeaderProtocols::Icmp.0,
    network: "ip4:icmp",
};

pub const ICMP_V6: IcmpFamily = IcmpFamily {
    family: Family::V6,
    echo_request: Icmpv6Types::EchoRequest.0,
    echo_reply: Icmpv6Types::EchoReply.0,
    protocol: IpNextHeaderProtocols::Icmpv6.0,
    network: "ip6:ipv6-icmp",
};

impl IcmpFamily {
    pub fn for_family(family: Family) -> Self {
        match family {
            Family::V4 => ICMP_V4,
            Family::V6 => ICMP_V6,
        }
    }

    /// Picks the family by whether `target` fits in 4 bytes.
    pub fn of(target: IpAddr) -> Self {
        Self::for_family(Family::of(target))
    }

    pub fn bind_addr(&self) -> IpAddr {
        bind_addr(self.family)
    }
}

/// Header fields of a received ICMP message.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IcmpReply {
    pub icmp_type: u8,
    pub code: u8,
    pub identifier: u16,
    pub sequence: u16,
}

/// Serializes an echo request with an empty payload.
///
/// The ICMPv4 checksum is filled in here; for ICMPv6 it covers a pseudo-header
/// with the source address, which only the kernel knows, so it is left zero.
pub fn echo_request(family: IcmpFamily, identifier: u16, sequence: u16) -> Result<Vec<u8>> {
    let mut buf = vec![0; ICMP_ECHO_HEADER_LEN];
    match family.family {
        Family::V4 => {
            let mut packet = MutableEchoRequestPacket::new(&mut buf)
                .ok_or_else(|| Error::Serialization("ICMP echo request".into()))?;
            packet.set_icmp_type(IcmpTypes::EchoRequest);
            packet.set_icmp_code(IcmpCode::new(0));
            packet.set_identifier(identifier);
            packet.set_sequence_number(sequence);
            let checksum = IcmpPacket::new(packet.packet())
                .map(|view| icmp::checksum(&view))
                .ok_or_else(|| Error::Serialization("ICMP echo request".into()))?;
            packet.set_checksum(checksum);
        }
        Family::V6 => {
            let mut packet = MutableIcmpv6Packet::new(&mut buf)
                .ok_or_else(|| Error::Serialization("ICMPv6 echo request".into()))?;
            packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
            packet.set_icmpv6_code(Icmpv6Code::new(0));
            let mut body = [0; 4];
            body[..2].copy_from_slice(&identifier.to_be_bytes());
            body[2..].copy_from_slice(&sequence.to_be_bytes());
            packet.set_payload(&body);
        }
    }
    Ok(buf)
}

/// Parses the header of an ICMP message of `family`.
pub fn parse_reply(family: IcmpFamily, bytes: &[u8]) -> Result<IcmpReply> {
    if bytes.len() < ICMP_ECHO_HEADER_LEN {
        return Err(Error::Malformed(format!(
            "{} bytes is too short for an icmp message",
            bytes.len()
        )));
    }
    let (icmp_type, code) = match family.family {
        Family::V4 => IcmpPacket::new(bytes)
            .map(|packet| (packet.get_icmp_type().0, packet.get_icmp_code().0)),
        Family::V6 => Icmpv6Packet::new(bytes)
            .map(|packet| (packet.get_icmpv6_type().0, packet.get_icmpv6_code().0)),
    }
    .ok_or_else(|| Error::Malformed("icmp header".into()))?;
    Ok(IcmpReply {
        icmp_type,
        code,
        identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
        sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
    })
}

#[derive(Debug, Clone)]
pub struct IcmpConfig {
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub socket_kind: IcmpSocketKind,
    pub identifier: u16,
    /// Family used when resolving host names.
    pub family: Family,
}

#[derive(Debug, Clone)]
pub struct IcmpConfigBuilder {
    config: IcmpConfig,
}

impl Default for IcmpConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IcmpConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IcmpConfig {
                write_timeout: DEFAULT_ICMP_WRITE_TIMEOUT,
                read_timeout: DEFAULT_ICMP_READ_TIMEOUT,
                socket_kind: IcmpSocketKind::default(),
                identifier: process_identifier(),
                family: Family::default(),
            },
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn with_socket_kind(mut self, kind: IcmpSocketKind) -> Self {
        self.config.socket_kind = kind;
        self
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.config.identifier = identifier;
        self
    }

    pub fn with_family(mut self, family: Family) -> Self {
        self.config.family = family;
        self
    }

    pub fn build(self) -> IcmpConfig {
        self.config
    }
}

fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Sends one echo request and reads exactly one message back.
///
/// Anything other than the family's echo reply in that single read fails the
/// probe with [`Error::UnexpectedReply`].
#[derive(Debug, Clone)]
pub struct IcmpProber {
    config: IcmpConfig,
}

impl IcmpProber {
    pub fn new(config: IcmpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcmpConfig {
        &self.config
    }

    /// Resolves `host` in the configured family and probes it.
    pub async fn probe_host(&self, host: &str) -> Result<ProbeResult> {
        let target = resolve_host(host, self.config.family).await?;
        self.probe(target).await
    }

    /// Runs the exchange on a socket already listening in the target's family.
    pub async fn probe_on<S: IcmpSocket>(
        &self,
        socket: &mut S,
        target: IpAddr,
    ) -> Result<ProbeResult> {
        let target = target.to_canonical();
        let family = IcmpFamily::of(target);
        let request = echo_request(family, self.config.identifier, ICMP_ECHO_SEQUENCE)?;

        let write_timeout = self.config.write_timeout;
        tokio::time::timeout(write_timeout, socket.send_to(&request, target))
            .await
            .map_err(|_| Error::Timeout(write_timeout))?
            .map_err(Error::Transmit)?;
        let stopwatch = Stopwatch::start();
        debug!(
            "sent {} echo request id {} to {}",
            family.network, self.config.identifier, target
        );

        let mut reply = [0; ICMP_READ_BUF_LEN];
        let read_timeout = self.config.read_timeout;
        let (read_bytes, peer) = tokio::time::timeout(read_timeout, socket.recv_from(&mut reply))
            .await
            .map_err(|_| Error::Timeout(read_timeout))?
            .map_err(|err| match err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                    Error::Timeout(read_timeout)
                }
                _ => Error::Receive(err),
            })?;
        let received_at = Instant::now();

        let message = parse_reply(family, &reply[..read_bytes])?;
        if message.icmp_type != family.echo_reply {
            return Err(Error::UnexpectedReply {
                icmp_type: message.icmp_type,
                code: message.code,
                peer,
            });
        }
        let elapsed = stopwatch.elapsed_at(received_at);
        debug!(
            "{} echo reply id {} seq {} from {} after {:?}",
            family.network, message.identifier, message.sequence, peer, elapsed
        );
        Ok(ProbeResult::new(Peer::Host(peer), elapsed))
    }
}

impl Prober for IcmpProber {
    type Input = IpAddr;

    async fn probe(&self, target: IpAddr) -> Result<ProbeResult> {
        let mut socket =
            IcmpListener::listen(Family::of(target), self.config.socket_kind)?;
        self.probe_on(&mut socket, target).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    enum Behaviour {
        Reply(Vec<u8>, IpAddr),
        Silent,
        StuckWrite,
        ReadError(io::ErrorKind),
    }

    struct ScriptedSocket {
        behaviour: Behaviour,
        sent: Vec<(Vec<u8>, IpAddr)>,
    }

    impl ScriptedSocket {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                sent: Vec::new(),
            }
        }
    }

    impl IcmpSocket for ScriptedSocket {
        async fn send_to(&mut self, message: &[u8], target: IpAddr) -> io::Result<()> {
            if let Behaviour::StuckWrite = self.behaviour {
                std::future::pending::<()>().await;
            }
            self.sent.push((message.to_vec(), target));
            Ok(())
        }

        async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
            match &self.behaviour {
                Behaviour::Reply(message, peer) => {
                    buf[..message.len()].copy_from_slice(message);
                    Ok((message.len(), *peer))
                }
                Behaviour::ReadError(kind) => Err(io::Error::from(*kind)),
                Behaviour::Silent | Behaviour::StuckWrite => std::future::pending().await,
            }
        }
    }

    fn message(icmp_type: u8, code: u8) -> Vec<u8> {
        vec![icmp_type, code, 0, 0, 0x12, 0x34, 0x00, 0x01]
    }

    fn prober() -> IcmpProber {
        IcmpProber::new(
            IcmpConfigBuilder::new()
                .with_identifier(0x1234)
                .with_read_timeout(Duration::from_millis(200))
                .with_write_timeout(Duration::from_millis(100))
                .build(),
        )
    }

    const V4_TARGET: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const V6_TARGET: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);

    #[test]
    fn test_family_selection() {
        assert_eq!(IcmpFamily::of(V4_TARGET), ICMP_V4);
        assert_eq!(IcmpFamily::of(V6_TARGET), ICMP_V6);
        assert_eq!((ICMP_V4.echo_request, ICMP_V4.echo_reply), (8, 0));
        assert_eq!((ICMP_V6.echo_request, ICMP_V6.echo_reply), (128, 129));
        assert_eq!((ICMP_V4.protocol, ICMP_V6.protocol), (1, 58));
        assert_eq!(ICMP_V4.bind_addr().to_string(), "0.0.0.0");
        assert_eq!(ICMP_V6.bind_addr().to_string(), "::");
    }

    #[test]
    fn test_echo_request_v4() {
        let packet = echo_request(ICMP_V4, 0xabcd, 1).unwrap();
        assert_eq!(packet.len(), ICMP_ECHO_HEADER_LEN);
        assert_eq!(&packet[..2], &[8, 0]);
        assert_eq!(&packet[4..], &[0xab, 0xcd, 0x00, 0x01]);

        let checksum = u16::from_be_bytes([packet[2], packet[3]]);
        assert_ne!(checksum, 0);
        assert_eq!(icmp::checksum(&IcmpPacket::new(&packet).unwrap()), checksum);
    }

    #[test]
    fn test_echo_request_v6() {
        let packet = echo_request(ICMP_V6, 0xabcd, 1).unwrap();
        assert_eq!(packet, vec![128, 0, 0, 0, 0xab, 0xcd, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_reply() {
        let reply = parse_reply(ICMP_V6, &message(129, 0)).unwrap();
        assert_eq!(
            reply,
            IcmpReply {
                icmp_type: 129,
                code: 0,
                identifier: 0x1234,
                sequence: 1
            }
        );
        assert!(matches!(
            parse_reply(ICMP_V4, &[0, 0, 0]),
            Err(Error::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_v4_echo_reply() {
        let mut socket = ScriptedSocket::new(Behaviour::Reply(message(0, 0), V4_TARGET));
        let result = prober().probe_on(&mut socket, V4_TARGET).await.unwrap();
        assert_eq!(result.peer, Peer::Host(V4_TARGET));
        assert!(result.elapsed >= Duration::ZERO);

        let (request, target) = &socket.sent[0];
        assert_eq!(*target, V4_TARGET);
        assert_eq!(request[0], ICMP_V4.echo_request);
        assert_eq!(&request[4..], &[0x12, 0x34, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_probe_v6_uses_v6_types() {
        let mut socket = ScriptedSocket::new(Behaviour::Reply(message(129, 0), V6_TARGET));
        let result = prober().probe_on(&mut socket, V6_TARGET).await.unwrap();
        assert_eq!(result.peer, Peer::Host(V6_TARGET));
        assert_eq!(socket.sent[0].0[0], ICMP_V6.echo_request);
    }

    #[tokio::test]
    async fn test_mapped_address_probes_as_v4() {
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        let mut socket = ScriptedSocket::new(Behaviour::Reply(message(0, 0), V4_TARGET));
        prober().probe_on(&mut socket, mapped).await.unwrap();
        assert_eq!(socket.sent[0], (echo_request(ICMP_V4, 0x1234, 1).unwrap(), V4_TARGET));
    }

    #[tokio::test]
    async fn test_unreachable_is_unexpected_reply() {
        let router = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut socket = ScriptedSocket::new(Behaviour::Reply(message(3, 1), router));
        let err = prober().probe_on(&mut socket, V4_TARGET).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedReply {
                icmp_type: 3,
                code: 1,
                peer
            } if peer == router
        ));
    }

    #[tokio::test]
    async fn test_other_family_reply_type_is_unexpected() {
        // a v4 echo reply type means nothing to a v6 probe
        let mut socket = ScriptedSocket::new(Behaviour::Reply(message(0, 0), V6_TARGET));
        let err = prober().probe_on(&mut socket, V6_TARGET).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply { icmp_type: 0, .. }));
    }

    #[tokio::test]
    async fn test_silence_times_out_within_deadline() {
        let mut socket = ScriptedSocket::new(Behaviour::Silent);
        let started = std::time::Instant::now();
        let err = prober().probe_on(&mut socket, V4_TARGET).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(200) + Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_write_times_out() {
        let mut socket = ScriptedSocket::new(Behaviour::StuckWrite);
        let err = prober().probe_on(&mut socket, V4_TARGET).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(timeout) if timeout == Duration::from_millis(100)));
        assert!(socket.sent.is_empty());
    }

    #[tokio::test]
    async fn test_read_errors() {
        let mut socket = ScriptedSocket::new(Behaviour::ReadError(io::ErrorKind::WouldBlock));
        assert!(prober()
            .probe_on(&mut socket, V4_TARGET)
            .await
            .unwrap_err()
            .is_timeout());

        let mut socket =
            ScriptedSocket::new(Behaviour::ReadError(io::ErrorKind::ConnectionRefused));
        assert!(matches!(
            prober().probe_on(&mut socket, V4_TARGET).await,
            Err(Error::Receive(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_reply_is_malformed() {
        let mut socket = ScriptedSocket::new(Behaviour::Reply(vec![0, 0, 0, 0], V4_TARGET));
        assert!(matches!(
            prober().probe_on(&mut socket, V4_TARGET).await,
            Err(Error::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_probes_are_independent() {
        let prober = prober();
        for _ in 0..2 {
            let mut socket = ScriptedSocket::new(Behaviour::Reply(message(0, 0), V4_TARGET));
            let result = prober.probe_on(&mut socket, V4_TARGET).await.unwrap();
            assert_eq!(result.peer, Peer::Host(V4_TARGET));
        }
    }

    #[tokio::test]
    async fn test_default_identifier_is_process_id() {
        let config = IcmpConfigBuilder::new().build();
        assert_eq!(config.identifier, (std::process::id() & 0xffff) as u16);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    #[ignore = "needs CAP_NET_RAW"]
    async fn test_raw_socket_loopback() {
        // the looped back echo request must not be the message read
        let prober = IcmpProber::new(IcmpConfigBuilder::new().build());
        for _ in 0..2 {
            let result = prober.probe(V4_TARGET).await.unwrap();
            assert_eq!(result.peer, Peer::Host(V4_TARGET));
        }
    }

    #[tokio::test]
    #[ignore = "needs net.ipv4.ping_group_range to include the test user"]
    async fn test_datagram_socket_loopback() {
        let prober = IcmpProber::new(
            IcmpConfigBuilder::new()
                .with_socket_kind(IcmpSocketKind::Datagram)
                .build(),
        );
        let result = prober.probe_host("localhost").await.unwrap();
        assert_eq!(result.peer, Peer::Host(V4_TARGET));
    }
}
