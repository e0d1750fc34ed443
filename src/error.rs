use std::{io, net::IpAddr, time::Duration};

use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single probe invocation.
///
/// Every variant is terminal for the probe that produced it, nothing in this
/// crate retries on its own.
#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    AddressParse(String),
    #[error("failed to resolve host {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("{0}")]
    InterfaceResolution(String),
    #[error("failed to open {what}: {source}")]
    HandleOpen {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize {0}")]
    Serialization(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("failed to write packet: {0}")]
    Transmit(#[source] io::Error),
    #[error("failed to read packet: {0}")]
    Receive(#[source] io::Error),
    #[error("no valid reply within {0:?}")]
    Timeout(Duration),
    #[error("got icmp type {icmp_type} code {code} from {peer}; want echo reply")]
    UnexpectedReply {
        icmp_type: u8,
        code: u8,
        peer: IpAddr,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum InputBuildError {
    #[error("sender MAC address is required")]
    MissingSenderMac,
    #[error("sender IP address is required")]
    MissingSenderIp,
    #[error("target IP address is required")]
    MissingTargetIp,
}
