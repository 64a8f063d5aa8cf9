//! Server configuration.

use std::time::Duration;

/// Default WebSocket listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:10002";
/// Default stats listen address.
pub const DEFAULT_STATS_BIND: &str = "0.0.0.0:10001";
/// Default shared server key.
pub const DEFAULT_SERVER_KEY: &str = "demokey";

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// WebSocket (byte-stream) listen address.
    pub bind: String,
    /// Stats endpoint address. `None` disables it.
    pub stats_bind: Option<String>,
    /// Shared key every handshake must present.
    pub server_key: String,
    /// Substring every game key must contain, if set.
    pub game_namespace: Option<String>,
    /// How often the datagram peer transport is drained, in Hz.
    pub tick_rate: u32,
    /// How long an empty room waits for a rejoin before it is destroyed.
    pub idle_life: Duration,
    /// How often the reaper sweeps for expired rooms.
    pub reap_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_owned(),
            stats_bind: Some(DEFAULT_STATS_BIND.to_owned()),
            server_key: DEFAULT_SERVER_KEY.to_owned(),
            game_namespace: None,
            tick_rate: 30,
            idle_life: Duration::from_secs(30),
            reap_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind, "0.0.0.0:10002");
        assert_eq!(cfg.stats_bind.as_deref(), Some("0.0.0.0:10001"));
        assert_eq!(cfg.server_key, "demokey");
        assert_eq!(cfg.tick_rate, 30);
        assert_eq!(cfg.idle_life, Duration::from_secs(30));
    }
}
