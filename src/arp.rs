use std::time::Duration;

use log::debug;

use crate::{
    constants::DEFAULT_ARP_RESPONSE_TIMEOUT,
    error::{Error, Result},
    input::ArpProbeInput,
    link::{open_link, FrameTx, LinkChannel},
    notification::completion,
    probe::{Peer, ProbeResult, Prober, Stopwatch},
    request::arp_request_frame,
    response::{ArpMatch, Listener, ReplyFilter},
};

#[derive(Debug, Clone)]
pub struct ArpConfig {
    pub interface_name: String,
    pub response_timeout: Duration,
    pub match_policy: ArpMatch,
}

#[derive(Debug, Clone)]
pub struct ArpConfigBuilder {
    interface_name: String,
    response_timeout: Duration,
    match_policy: ArpMatch,
}

impl ArpConfigBuilder {
    pub fn new(interface_name: &str) -> Self {
        Self {
            interface_name: interface_name.into(),
            response_timeout: DEFAULT_ARP_RESPONSE_TIMEOUT,
            match_policy: ArpMatch::default(),
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_match_policy(mut self, policy: ArpMatch) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn build(self) -> ArpConfig {
        ArpConfig {
            interface_name: self.interface_name,
            response_timeout: self.response_timeout,
            match_policy: self.match_policy,
        }
    }
}

/// Probes a neighbour by broadcasting one ARP request and waiting for a reply.
///
/// A background reader is started on the capture side of the link before the
/// request goes out, so replies arriving right after transmission are not
/// missed. The first frame passing the [`ArpMatch`] policy completes the probe.
///
/// # Example
/// ```no_run
/// use async_reach::{ArpConfigBuilder, ArpProbeInput, ArpProber, LocalInterface, Prober};
/// use std::net::Ipv4Addr;
///
/// tokio_test::block_on(async {
///     let interface = LocalInterface::by_name("eth0").unwrap();
///     let prober = ArpProber::new(ArpConfigBuilder::new(&interface.name).build());
///     let input = ArpProbeInput::from_interface(&interface, Ipv4Addr::new(192, 168, 1, 1));
///     let result = prober.probe(input).await.unwrap();
///     println!("{}", result);
/// })
/// ```
#[derive(Debug, Clone)]
pub struct ArpProber {
    config: ArpConfig,
}

impl ArpProber {
    pub fn new(config: ArpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArpConfig {
        &self.config
    }

    /// Runs the exchange on an already opened link.
    ///
    /// # Errors
    /// Fails with [`Error::Transmit`] if the request cannot be written, with
    /// [`Error::Receive`] if capturing fails and with [`Error::Timeout`] if no
    /// acceptable reply arrives within the configured response timeout.
    pub async fn probe_on<L: LinkChannel>(
        &self,
        link: L,
        input: ArpProbeInput,
    ) -> Result<ProbeResult> {
        let frame = arp_request_frame(&input)?;
        let (mut tx, rx) = link.split();

        let filter = ReplyFilter {
            own_mac: input.sender_mac,
            target_ip: input.target_ip,
            policy: self.config.match_policy,
        };
        let (completer, completion) = completion();
        tokio::spawn(Listener::new(rx, filter).listen(completer));

        let stopwatch = Stopwatch::start();
        tx.send_frame(&frame).await.map_err(Error::Transmit)?;
        debug!(
            "sent arp request for {} on {}",
            input.target_ip, self.config.interface_name
        );

        let reply = completion.wait(self.config.response_timeout).await??;
        let elapsed = stopwatch.elapsed_at(reply.received_at);
        debug!(
            "arp reply from {} ({}) after {:?}",
            reply.arp.sender_proto_addr, reply.arp.sender_hw_addr, elapsed
        );
        Ok(ProbeResult::new(
            Peer::Link {
                mac: reply.arp.sender_hw_addr,
                ip: reply.arp.sender_proto_addr,
            },
            elapsed,
        ))
    }
}

impl Prober for ArpProber {
    type Input = ArpProbeInput;

    /// Opens a packet socket on the configured interface and probes through it.
    async fn probe(&self, input: ArpProbeInput) -> Result<ProbeResult> {
        let link = open_link(&self.config.interface_name)?;
        self.probe_on(link, input).await
    }
}
