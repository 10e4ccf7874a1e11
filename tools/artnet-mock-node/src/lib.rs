//! Mock Art-Net node for testing and simulation.
//!
//! This crate provides a reusable mock Art-Net node with RDM responders
//! behind its outputs, customizable via the [`NodeBehavior`] trait. It
//! answers ArtPoll, table-of-devices queries and ArtRdm GET/SET requests.
//!
//! # Architecture
//!
//! - **Protocol layer**: constants and packet builders (stateless)
//! - **Configuration layer**: node, binding, port and responder types
//! - **Node layer**: core UDP loop with trait-based behavior hooks
//!
//! # Example
//!
//! ```ignore
//! use artnet_mock_node::{MockArtNetNode, MockPort, MockResponder, NodeConfig, SimpleBehavior};
//!
//! let port = MockPort::new(0).with_responder(MockResponder::new(0x7ff0, 1));
//! let config = NodeConfig::new("Mock")
//!     .with_bindings(vec![artnet_mock_node::MockBinding::new(1, vec![port])]);
//! let handle = MockArtNetNode::new(config, SimpleBehavior)?.spawn()?;
//! ```

mod behavior;
mod config;
mod constants;
mod packet_builder;
mod server;

pub use behavior::{NodeBehavior, SimpleBehavior};
pub use config::{MockBinding, MockPort, MockResponder, NodeConfig};
pub use constants::*;
pub use packet_builder::*;
pub use server::{MockArtNetNode, NodeHandle};
