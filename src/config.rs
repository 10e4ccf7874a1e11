//! Configuration for the transport, discovery and the RDM requester.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::ARTNET_PORT;
use crate::types::Uid;

/// How [`crate::transport::Channel`] binds its sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BindMode {
    /// One socket per port on 0.0.0.0.
    #[default]
    Wildcard,
    /// Per port and interface: one socket on the interface address and one on
    /// its broadcast address.
    PerInterface,
}

/// Settings for the multiplexed UDP channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelConfig {
    /// UDP ports to listen on (default: `[6454]`). Port 0 binds an ephemeral port.
    pub ports: Vec<u16>,

    pub bind_mode: BindMode,

    /// Reusable send buffers (default: 32). Sends fail once all are in flight.
    pub send_buffers: usize,

    /// Initial capacity of each send buffer (default: 1500 bytes).
    pub buffer_size: usize,

    /// Upper bound on one selection wait (default: 100ms).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub select_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ports: vec![ARTNET_PORT],
            bind_mode: BindMode::Wildcard,
            send_buffers: 32,
            buffer_size: 1500,
            select_timeout: Duration::from_millis(100),
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.ports = ports.into();
        self
    }

    pub fn with_bind_mode(mut self, mode: BindMode) -> Self {
        self.bind_mode = mode;
        self
    }

    pub fn with_send_buffers(mut self, count: usize) -> Self {
        self.send_buffers = count;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_select_timeout(mut self, timeout: Duration) -> Self {
        self.select_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(Error::InvalidConfig("no ports to listen on".into()));
        }
        if self.send_buffers == 0 {
            return Err(Error::InvalidConfig("send buffer pool is empty".into()));
        }
        Ok(())
    }
}

/// How discovery asks nodes for their tables of devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TodMode {
    /// ArtTodControl flush: nodes rerun RDM discovery, then send ArtTodData.
    #[default]
    Flush,
    /// ArtTodRequest: nodes send their cached table.
    Request,
}

/// Settings for the discovery orchestrator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryConfig {
    /// Poll targets. Empty means every local interface's broadcast address
    /// on `port`, or 255.255.255.255 when none is found.
    pub targets: Vec<SocketAddr>,

    /// Destination port for derived broadcast targets (default: 6454).
    pub port: u16,

    /// How long to collect ArtPollReply (default: 3s).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub poll_reply_wait: Duration,

    /// How long to collect ArtTodData after the last TOD request (default: 4s).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub tod_data_wait: Duration,

    /// Request tables of devices from discovered outputs (default: true).
    pub rdm_discovery: bool,

    pub tod_mode: TodMode,

    /// How often the cycle deadline is checked (default: 50ms).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub tick: Duration,

    /// ArtPoll flags byte.
    pub poll_flags: u8,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            port: ARTNET_PORT,
            poll_reply_wait: Duration::from_secs(3),
            tod_data_wait: Duration::from_secs(4),
            rdm_discovery: true,
            tod_mode: TodMode::Flush,
            tick: Duration::from_millis(50),
            poll_flags: 0,
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(mut self, targets: impl Into<Vec<SocketAddr>>) -> Self {
        self.targets = targets.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_poll_reply_wait(mut self, wait: Duration) -> Self {
        self.poll_reply_wait = wait;
        self
    }

    pub fn with_tod_data_wait(mut self, wait: Duration) -> Self {
        self.tod_data_wait = wait;
        self
    }

    pub fn with_rdm_discovery(mut self, enabled: bool) -> Self {
        self.rdm_discovery = enabled;
        self
    }

    pub fn with_tod_mode(mut self, mode: TodMode) -> Self {
        self.tod_mode = mode;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_poll_flags(mut self, flags: u8) -> Self {
        self.poll_flags = flags;
        self
    }

    /// Worst-case length of a cycle without TOD extensions.
    pub fn cycle_budget(&self) -> Duration {
        if self.rdm_discovery {
            self.poll_reply_wait + self.tod_data_wait
        } else {
            self.poll_reply_wait
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(Error::InvalidConfig("discovery tick must be non-zero".into()));
        }
        Ok(())
    }
}

/// Settings for [`crate::rdm::RdmRequester`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RdmConfig {
    /// UID this controller sends from.
    pub source_uid: Uid,

    /// How long to wait for a matching response (default: 4s).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub timeout: Duration,

    /// Where requests go when no node address is known
    /// (default: 255.255.255.255:6454).
    pub broadcast: SocketAddr,
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            // ESTA prototype range
            source_uid: Uid::new(0x7ff0, 0x0000_0001),
            timeout: Duration::from_secs(4),
            broadcast: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, ARTNET_PORT)),
        }
    }
}

impl RdmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_uid(mut self, uid: Uid) -> Self {
        self.source_uid = uid;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_broadcast(mut self, target: SocketAddr) -> Self {
        self.broadcast = target;
        self
    }
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis().min(u64::MAX as u128) as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.ports, vec![6454]);
        assert_eq!(config.bind_mode, BindMode::Wildcard);
        assert_eq!(config.send_buffers, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_config_rejects_empty_pool() {
        let config = ChannelConfig::new().with_send_buffers(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        let config = ChannelConfig::new().with_ports(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discovery_cycle_budget() {
        let config = DiscoveryConfig::new()
            .with_poll_reply_wait(Duration::from_millis(300))
            .with_tod_data_wait(Duration::from_millis(200));
        assert_eq!(config.cycle_budget(), Duration::from_millis(500));
        let config = config.with_rdm_discovery(false);
        assert_eq!(config.cycle_budget(), Duration::from_millis(300));
    }

    #[test]
    fn test_rdm_config_defaults() {
        let config = RdmConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(4));
        assert_eq!(config.broadcast.port(), 6454);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_discovery_config_serde_round_trip() {
        let config = DiscoveryConfig::new()
            .with_tod_mode(TodMode::Request)
            .with_tick(Duration::from_millis(20));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"tick\":20"));
        let back: DiscoveryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
