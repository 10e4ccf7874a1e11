//! Behavior trait for customizing mock node responses.

use std::time::Duration;

/// Behavior hooks for customizing how the mock node answers.
pub trait NodeBehavior: Send + 'static {
    /// Called for every datagram, before any filtering.
    fn on_packet_received(&mut self, _raw_data: &[u8]) {}

    /// Whether to answer a packet with `opcode`.
    ///
    /// Return `false` to simulate a node that hears but does not answer.
    fn should_respond(&self, opcode: u16) -> bool;

    /// Answer table-of-devices requests with a NAK instead of the table.
    fn refuse_tod(&self) -> bool {
        false
    }

    /// Send a stale RDM response (wrong transaction number) before the real one.
    fn send_stale_rdm_reply(&self) -> bool {
        false
    }

    /// Delay applied before every answer.
    fn get_simulated_latency(&self) -> Duration {
        Duration::ZERO
    }
}

/// Answers everything, immediately.
#[derive(Default)]
pub struct SimpleBehavior;

impl NodeBehavior for SimpleBehavior {
    fn should_respond(&self, _opcode: u16) -> bool {
        true
    }
}
