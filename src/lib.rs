//! Single-shot reachability probes.
//!
//! Three strategies share the [`Prober`] capability and report a [`ProbeResult`]:
//! - [`ArpProber`] broadcasts an ARP request on a link and times the first reply,
//! - [`IcmpProber`] sends one ICMP or ICMPv6 echo request and reads one message back,
//! - [`TcpProber`] times a TCP handshake.
//!
//! Every probe either returns a result or a typed [`Error`]; nothing is retried.
//!
//! ## Example
//! The demo below takes a subcommand per strategy. Run it as root (or with
//! `CAP_NET_RAW`) for the ARP and raw ICMP probes.
//! ```rust,no_run
#![doc = include_str!("../demos/reach.rs")]
//! ```

pub mod arp;
pub mod constants;
pub mod error;
pub mod icmp;
pub mod input;
pub mod interface;
pub mod link;
pub mod probe;
pub mod request;
pub mod socket;
pub mod target;
pub mod tcp;

pub(crate) mod notification;
pub(crate) mod response;

pub use arp::{ArpConfig, ArpConfigBuilder, ArpProber};
pub use error::{Error, InputBuildError, Result};
pub use icmp::{IcmpConfig, IcmpConfigBuilder, IcmpFamily, IcmpProber};
pub use input::{ArpProbeInput, ArpProbeInputBuilder};
pub use interface::LocalInterface;
pub use probe::{Peer, ProbeResult, Prober};
pub use response::ArpMatch;
pub use socket::{IcmpListener, IcmpSocket, IcmpSocketKind};
pub use target::Family;
pub use tcp::{TcpConfig, TcpConfigBuilder, TcpProber};
