use std::{
    future::Future,
    io,
    mem,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    os::fd::AsRawFd,
};

use pnet::packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::{
    error::{Error, Result},
    icmp::IcmpFamily,
    target::Family,
};

// <linux/icmp.h> and <linux/icmpv6.h>
const ICMP_FILTER: libc::c_int = 1;
const ICMP6_FILTER: libc::c_int = 1;

// types a raw socket passes up: echo reply plus the error messages
const ICMP_PASSED_TYPES: [u8; 6] = [0, 3, 4, 5, 11, 12];
const ICMP6_PASSED_TYPES: [u8; 5] = [1, 2, 3, 4, 129];

/// A socket carrying bare ICMP messages, without the IP header.
pub trait IcmpSocket: Send {
    fn send_to(
        &mut self,
        message: &[u8],
        target: IpAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, IpAddr)>> + Send;
}

/// How the ICMP socket is opened.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum IcmpSocketKind {
    /// `SOCK_RAW`, needs `CAP_NET_RAW`.
    #[default]
    Raw,
    /// Unprivileged ping socket (`SOCK_DGRAM`); on Linux the group must be in
    /// `net.ipv4.ping_group_range` and the kernel rewrites the identifier.
    Datagram,
}

/// An ICMP socket bound to the unspecified address of one family.
#[derive(Debug)]
pub struct IcmpListener {
    socket: UdpSocket,
    family: Family,
    kind: IcmpSocketKind,
}

impl IcmpListener {
    /// Opens and binds the socket. Must be called from within a tokio runtime.
    pub fn listen(family: Family, kind: IcmpSocketKind) -> Result<Self> {
        let open_err = |source| Error::HandleOpen {
            what: "icmp socket",
            source,
        };
        let domain = match family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        };
        let protocol = Protocol::from(libc::c_int::from(
            IcmpFamily::for_family(family).protocol,
        ));
        let ty = match kind {
            IcmpSocketKind::Raw => Type::RAW,
            IcmpSocketKind::Datagram => Type::DGRAM,
        };
        let socket = Socket::new(domain, ty, Some(protocol)).map_err(open_err)?;
        if kind == IcmpSocketKind::Raw {
            // a raw socket sees every icmp message, our own looped back request included
            install_reply_filter(&socket, family).map_err(open_err)?;
        }
        socket.set_nonblocking(true).map_err(open_err)?;
        socket
            .bind(&SocketAddr::new(bind_addr(family), 0).into())
            .map_err(open_err)?;
        // the datagram wrapper only contributes readiness and sendto/recvfrom
        let socket = UdpSocket::from_std(socket.into()).map_err(open_err)?;
        Ok(Self {
            socket,
            family,
            kind,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }
}

impl IcmpSocket for IcmpListener {
    async fn send_to(&mut self, message: &[u8], target: IpAddr) -> io::Result<()> {
        self.socket
            .send_to(message, SocketAddr::new(target, 0))
            .await
            .map(|_| ())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let (read_bytes, peer) = self.socket.recv_from(buf).await?;
        let read_bytes = match (self.kind, self.family) {
            // raw ipv4 sockets deliver the ip header as well
            (IcmpSocketKind::Raw, Family::V4) => strip_ipv4_header(buf, read_bytes)?,
            _ => read_bytes,
        };
        Ok((read_bytes, peer.ip()))
    }
}

pub(crate) fn bind_addr(family: Family) -> IpAddr {
    match family {
        Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// `ICMP_FILTER` mask: a set bit drops that type (types above 31 always pass).
fn icmp_filter_mask() -> u32 {
    ICMP_PASSED_TYPES
        .iter()
        .fold(u32::MAX, |mask, ty| mask & !(1 << ty))
}

/// `ICMP6_FILTER` bitmap over all 256 types: a set bit drops that type.
fn icmp6_filter_mask() -> [u32; 8] {
    let mut mask = [u32::MAX; 8];
    for ty in ICMP6_PASSED_TYPES {
        mask[usize::from(ty >> 5)] &= !(1 << (ty & 31));
    }
    mask
}

fn install_reply_filter(socket: &Socket, family: Family) -> io::Result<()> {
    match family {
        Family::V4 => setsockopt(socket, libc::SOL_RAW, ICMP_FILTER, &icmp_filter_mask()),
        Family::V6 => setsockopt(
            socket,
            libc::IPPROTO_ICMPV6,
            ICMP6_FILTER,
            &icmp6_filter_mask(),
        ),
    }
}

fn setsockopt<T>(socket: &Socket, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    let result = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Moves the ICMP payload of the datagram in `buf[..len]` to the front.
fn strip_ipv4_header(buf: &mut [u8], len: usize) -> io::Result<usize> {
    let header_len = Ipv4Packet::new(&buf[..len])
        .map(|ip| usize::from(ip.get_header_length()) * 4)
        .filter(|header_len| *header_len <= len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated ipv4 header"))?;
    buf.copy_within(header_len..len, 0);
    Ok(len - header_len)
}
