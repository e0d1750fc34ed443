use std::{
    fmt,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use pnet::util::MacAddr;
use tokio::time::Instant;

use crate::error::Result;

/// A single reachability strategy.
///
/// Implementors send one request, wait for the matching answer and report how
/// long the exchange took. Each call is independent: no state is carried from
/// one invocation to the next.
pub trait Prober {
    /// What the strategy needs to know about the target.
    type Input;

    /// Runs one probe against `input`.
    fn probe(&self, input: Self::Input) -> impl Future<Output = Result<ProbeResult>> + Send;
}

/// Identity of whoever answered the probe.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Peer {
    /// ARP reply: the sender hardware address and the protocol address it announced.
    Link { mac: MacAddr, ip: Ipv4Addr },
    /// ICMP echo reply source.
    Host(IpAddr),
    /// Endpoint of an established TCP connection.
    Endpoint(SocketAddr),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ProbeResult {
    pub peer: Peer,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn new(peer: Peer, elapsed: Duration) -> Self {
        Self { peer, elapsed }
    }

    /// Round trip in milliseconds with microsecond resolution.
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_micros() as f64 / 1000.0
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.elapsed_millis();
        match self.peer {
            Peer::Link { mac, ip } => write!(f, "ip {} is at {} (time={:.3} ms)", ip, mac, millis),
            Peer::Host(ip) => write!(f, "reply at {} (time={:.3} ms)", ip, millis),
            Peer::Endpoint(endpoint) => {
                write!(f, "connect at {} (time={:.3} ms)", endpoint, millis)
            }
        }
    }
}

/// Monotonic start mark for one probe exchange.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time between the start mark and `finished`, clamped at zero.
    pub(crate) fn elapsed_at(&self, finished: Instant) -> Duration {
        finished.saturating_duration_since(self.started)
    }
}
