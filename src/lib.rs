//! Art-Net 4 node discovery and RDM device control.
//!
//! This crate speaks the Art-Net protocol over UDP: it finds nodes with
//! ArtPoll, reads each output's table of RDM devices, and queries or
//! configures those devices with RDM GET/SET requests tunnelled in ArtRdm.
//!
//! # Getting Started
//!
//! ## Discovering nodes and devices
//!
//! ```no_run
//! use artnet_rdm::{discover, DiscoveryConfig};
//!
//! let snapshot = discover(DiscoveryConfig::default())?;
//! for node in snapshot.unique_nodes() {
//!     println!("{}", node);
//!     for port in node.output_ports() {
//!         if let Some(addr) = port.output_addr() {
//!             let uids = snapshot.uids_on(&addr).map(|u| u.len()).unwrap_or(0);
//!             println!("  port {} -> {} ({} RDM devices)", port.number, addr.port, uids);
//!         }
//!     }
//! }
//! # Ok::<(), artnet_rdm::Error>(())
//! ```
//!
//! ## Talking to an RDM device
//!
//! Share one [`Channel`] between discovery and RDM so replies reach both:
//!
//! ```no_run
//! use std::sync::Arc;
//! use artnet_rdm::{
//!     load_device, Channel, ChannelConfig, Discovery, DiscoveryConfig, RdmConfig, RdmRequester,
//! };
//!
//! let channel = Arc::new(Channel::open(&ChannelConfig::default())?);
//! let discovery = Discovery::with_transport(DiscoveryConfig::default(), channel.clone())?;
//! let requester = RdmRequester::new(channel, RdmConfig::default());
//!
//! let snapshot = discovery.refresh()?;
//! for uid in snapshot.all_uids() {
//!     let mut device = load_device(&requester, &snapshot, uid)?;
//!     println!("{} {:?}", uid, device.model_description());
//!     device.set_dmx_address(&requester, 1)?;
//! }
//! # Ok::<(), artnet_rdm::Error>(())
//! ```
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for configuration and addressing types.
//!
//! # Layers
//!
//! - [`protocol`]: Art-Net packet codec. Opcodes without a dedicated type
//!   pass through as [`Message::Unsupported`].
//! - [`rdm`]: RDM packet codec, request correlation and the device model.
//! - [`transport`]: the multiplexed [`Channel`] and the single-socket [`Listener`].
//! - [`discovery`]: the poll / table-of-devices cycle and node merging.

pub mod config;
pub mod discovery;
mod error;
pub mod net_utils;
pub mod protocol;
pub mod rdm;
pub mod transport;
pub mod types;

// Crate-level error types
pub use error::{Error, Result};

// Configuration
pub use config::{BindMode, ChannelConfig, DiscoveryConfig, RdmConfig, TodMode};

// Addressing
pub use types::{NodeAddr, Port, PortAddr, Uid};

// Wire codec
pub use protocol::{Message, OpCode, ProtocolError, ARTNET_PORT};

// Transports
pub use transport::{
    receiver_fn, ArtNetReceiver, Channel, ChannelStats, Listener, ReceiverId, Transport,
};

// Discovery
pub use discovery::{
    merge_nodes, Discovery, DiscoverySnapshot, MergedNode, Node, NodePort, OutputPort, Phase,
};

// RDM
pub use rdm::{
    CommandClass, DeviceInfo, NackReason, ParameterId, RdmDevice, RdmPacket, RdmRequester,
    RdmTarget, ResponseType,
};

use std::sync::Arc;

/// Runs one discovery cycle on a temporary channel bound with default settings.
pub fn discover(config: DiscoveryConfig) -> Result<Arc<DiscoverySnapshot>> {
    let discovery = Discovery::new(config, ChannelConfig::default())?;
    discovery.refresh()
}

/// Loads the RDM device `uid`, wherever `snapshot` found it.
pub fn load_device(
    requester: &RdmRequester,
    snapshot: &DiscoverySnapshot,
    uid: Uid,
) -> Result<RdmDevice> {
    let location = snapshot
        .locate(uid)
        .ok_or_else(|| Error::msg(format!("RDM device {} not found", uid)))?;
    RdmDevice::load(requester, uid, location)
}
