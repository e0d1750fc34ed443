use std::{future::Future, io, net::SocketAddr, time::Duration};

use log::debug;
use tokio::net::TcpStream;

use crate::{
    error::{Error, Result},
    probe::{Peer, ProbeResult, Prober, Stopwatch},
    target::{endpoint, resolve_host, Family},
};

#[derive(Debug, Clone, Default)]
pub struct TcpConfig {
    /// Upper bound for the handshake; `None` leaves it to the operating system.
    pub connect_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct TcpConfigBuilder {
    connect_timeout: Option<Duration>,
}

impl TcpConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TcpConfig {
        TcpConfig {
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Times a single TCP handshake. No data is exchanged and the connection is
/// closed as soon as it is established.
#[derive(Debug, Clone, Default)]
pub struct TcpProber {
    config: TcpConfig,
}

impl TcpProber {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Resolves `host` in `family` and connects to `port` on it.
    pub async fn probe_host(&self, host: &str, port: u16, family: Family) -> Result<ProbeResult> {
        let ip = resolve_host(host, family).await?;
        self.probe(SocketAddr::new(ip, port)).await
    }
}

impl Prober for TcpProber {
    type Input = SocketAddr;

    async fn probe(&self, target: SocketAddr) -> Result<ProbeResult> {
        timed_connect(target, self.config.connect_timeout, TcpStream::connect(target)).await
    }
}

/// Brackets `connect` with the stopwatch and maps its outcome.
async fn timed_connect<F>(
    target: SocketAddr,
    connect_timeout: Option<Duration>,
    connect: F,
) -> Result<ProbeResult>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let target_str = endpoint(target.ip(), target.port());
    let stopwatch = Stopwatch::start();
    let stream = match connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| Error::Timeout(timeout))?,
        None => connect.await,
    }
    .map_err(|source| Error::Connect {
        endpoint: target_str.clone(),
        source,
    })?;
    let elapsed = stopwatch.elapsed();

    let peer = stream.peer_addr().unwrap_or(target);
    drop(stream);
    debug!("connected to {} after {:?}", target_str, elapsed);
    Ok(ProbeResult::new(Peer::Endpoint(peer), elapsed))
}
