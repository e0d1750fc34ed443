use async_reach::{
    target::{parse_ip, parse_port, resolve_host},
    ArpConfigBuilder, ArpProbeInput, ArpProber, Error, Family, IcmpConfigBuilder, IcmpProber,
    IcmpSocketKind, LocalInterface, Peer, Prober, TcpProber,
};
use clap::{Parser, Subcommand};
use std::{net::IpAddr, process::ExitCode, time::Duration};

/// Test connectivity to a host by ARP, ICMP echo or TCP connect
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test connectivity by arp
    Arp {
        /// Source interface name, the default interface when omitted
        #[arg(short, long)]
        iface: Option<String>,
        /// Reply timeout in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        timeout: u64,
        target: String,
    },
    /// Test connectivity by icmp
    Icmp {
        /// Use ipv6
        #[arg(short = '6')]
        ipv6: bool,
        /// Use an unprivileged ping socket
        #[arg(short, long)]
        unprivileged: bool,
        target: String,
    },
    /// Test connectivity by tcp
    Tcp {
        /// Use ipv6
        #[arg(short = '6')]
        ipv6: bool,
        target: String,
        port: String,
    },
}

fn family(ipv6: bool) -> Family {
    if ipv6 {
        Family::V6
    } else {
        Family::V4
    }
}

async fn resolve(host: &str, family: Family) -> Result<IpAddr, Error> {
    let ip = resolve_host(host, family).await?;
    if ip.to_string() != host {
        println!("resolved target host: {} ({})", ip, host);
    }
    Ok(ip)
}

async fn run(command: Command) -> Result<String, Error> {
    match command {
        Command::Arp {
            iface,
            timeout,
            target,
        } => {
            let target = match parse_ip(&target)?.to_canonical() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(_) => return Err(Error::AddressParse(format!("'{}' is not ipv4", target))),
            };
            let interface = LocalInterface::resolve(iface.as_deref())?;
            let prober = ArpProber::new(
                ArpConfigBuilder::new(&interface.name)
                    .with_response_timeout(Duration::from_millis(timeout))
                    .build(),
            );
            let result = prober
                .probe(ArpProbeInput::from_interface(&interface, target))
                .await?;
            match result.peer {
                Peer::Link { mac, ip } => Ok(format!(
                    "ip {} is at {} (if={} time={:.3} ms)",
                    ip,
                    mac,
                    interface.name,
                    result.elapsed_millis()
                )),
                _ => Ok(result.to_string()),
            }
        }
        Command::Icmp {
            ipv6,
            unprivileged,
            target,
        } => {
            let kind = if unprivileged {
                IcmpSocketKind::Datagram
            } else {
                IcmpSocketKind::Raw
            };
            let family = family(ipv6);
            let ip = resolve(&target, family).await?;
            let prober = IcmpProber::new(
                IcmpConfigBuilder::new()
                    .with_family(family)
                    .with_socket_kind(kind)
                    .build(),
            );
            Ok(prober.probe(ip).await?.to_string())
        }
        Command::Tcp { ipv6, target, port } => {
            let port = parse_port(&port)?;
            let ip = resolve(&target, family(ipv6)).await?;
            Ok(TcpProber::default().probe((ip, port).into()).await?.to_string())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args.command).await {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
