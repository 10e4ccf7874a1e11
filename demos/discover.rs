//! Discovers Art-Net nodes and the RDM devices behind their outputs.
//!
//! Run with: `cargo run --example discover -- [--target 2.255.255.255] [--load]`

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use artnet_rdm::{
    load_device, Channel, ChannelConfig, Discovery, DiscoveryConfig, RdmConfig, RdmRequester,
    Result, TodMode, ARTNET_PORT,
};
use clap::Parser;

#[derive(Parser)]
#[command(about = "List Art-Net nodes, their outputs and RDM devices")]
struct Args {
    /// Poll this address instead of every interface's broadcast address
    #[arg(short, long)]
    target: Vec<IpAddr>,

    /// Seconds to wait for poll replies
    #[arg(short, long, default_value_t = 3)]
    wait: u64,

    /// Ask for cached tables instead of flushing them
    #[arg(long)]
    cached: bool,

    /// Skip table-of-devices requests
    #[arg(long)]
    no_rdm: bool,

    /// Read DEVICE_INFO and labels from every RDM device found
    #[arg(short, long)]
    load: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let targets: Vec<SocketAddr> = args
        .target
        .iter()
        .map(|ip| SocketAddr::new(*ip, ARTNET_PORT))
        .collect();
    let config = DiscoveryConfig::new()
        .with_targets(targets)
        .with_poll_reply_wait(Duration::from_secs(args.wait))
        .with_rdm_discovery(!args.no_rdm)
        .with_tod_mode(if args.cached {
            TodMode::Request
        } else {
            TodMode::Flush
        });

    let channel = Arc::new(Channel::open(&ChannelConfig::default())?);
    let discovery = Discovery::with_transport(config, channel.clone())?;
    let requester = RdmRequester::new(channel, RdmConfig::default());

    println!("Polling for Art-Net nodes...\n");
    let snapshot = discovery.refresh()?;

    if snapshot.is_empty() {
        println!("No nodes found.");
        return Ok(());
    }

    for node in snapshot.unique_nodes() {
        println!(
            "{} \"{}\" firmware {:#06x}, ESTA {:#06x}",
            node,
            node.long_name(),
            node.firmware_version(),
            node.esta_manufacturer()
        );
        for port in node.output_ports() {
            let Some(addr) = port.output_addr() else {
                continue;
            };
            let uids = snapshot.uids_on(&addr);
            println!(
                "  port {:>3}: universe {} ({} RDM devices)",
                port.number,
                addr.port,
                uids.map_or(0, |u| u.len())
            );
            for uid in uids.into_iter().flatten() {
                println!("    {}", uid);
            }
        }
    }

    if args.load {
        println!();
        for uid in snapshot.all_uids() {
            match load_device(&requester, &snapshot, uid) {
                Ok(device) => println!(
                    "{}: {} {} at DMX {} ({} slots)",
                    uid,
                    device.manufacturer_label().unwrap_or("?"),
                    device.model_description().unwrap_or("?"),
                    device.dmx_start_address(),
                    device.dmx_footprint()
                ),
                Err(e) => println!("{}: {}", uid, e),
            }
        }
    }

    println!(
        "\n{} nodes, {} RDM devices in {:?}",
        snapshot.unique_nodes().len(),
        snapshot.all_uids().len(),
        snapshot.duration()
    );
    Ok(())
}
