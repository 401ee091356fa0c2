//! Global configuration settings
//!
//! These settings apply across all components and provide sensible defaults.

use serde::Deserialize;

/// Ring queue overflow behavior
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    /// Default/low priority frames are rejected when full; immediate
    /// frames evict the oldest entry (default)
    #[default]
    EvictForImmediate,
    /// Reject all overflow regardless of priority
    RejectAll,
    /// Evict the oldest entry for any priority
    EvictAll,
}

/// Global configuration that applies to all components
///
/// All fields have sensible defaults - you only need to specify what you
/// want to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Outbound ring queue capacity in frames, per peer
    /// Default: 1024
    pub ring_capacity: usize,

    /// What happens when a frame arrives at a full ring
    /// Default: evict_for_immediate
    pub overflow: OverflowSetting,

    /// How long a sender waits for an Acknowledge frame (milliseconds)
    /// Default: 5000
    pub ack_timeout_ms: u64,

    /// How long finalize waits for rings to drain (milliseconds)
    /// Default: 2000
    pub drain_timeout_ms: u64,

    /// Background flush interval for batched value traffic (milliseconds)
    /// Default: 100
    pub flush_interval_ms: u64,

    /// Client check-in interval (milliseconds), 0 disables the heartbeat
    /// Default: 10000
    pub heartbeat_interval_ms: u64,

    /// Number of ids handed to a client per guid block grant
    /// Default: 4096
    pub guid_block_size: u64,

    /// First id of this process's allocation range
    ///
    /// Give daemons disjoint `[guid_start, guid_max]` ranges and their
    /// grants never collide without any coordination.
    /// Default: 1
    pub guid_start: u64,

    /// Upper bound of this process's allocation range
    /// Default: u64::MAX
    pub guid_max: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            overflow: OverflowSetting::default(),
            ack_timeout_ms: 5_000,
            drain_timeout_ms: 2_000,
            flush_interval_ms: 100,
            heartbeat_interval_ms: 10_000,
            guid_block_size: 4096,
            guid_start: 1,
            guid_max: u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.ring_capacity, 1024);
        assert_eq!(config.overflow, OverflowSetting::EvictForImmediate);
        assert_eq!(config.ack_timeout_ms, 5_000);
        assert_eq!(config.guid_block_size, 4096);
    }

    #[test]
    fn test_deserialize_empty() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.ring_capacity, 1024);
    }

    #[test]
    fn test_deserialize_overflow_settings() {
        for (s, expected) in [
            ("evict_for_immediate", OverflowSetting::EvictForImmediate),
            ("reject_all", OverflowSetting::RejectAll),
            ("evict_all", OverflowSetting::EvictAll),
        ] {
            let toml = format!("overflow = \"{}\"", s);
            let config: GlobalConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.overflow, expected);
        }
    }

    #[test]
    fn test_partial_override() {
        let config: GlobalConfig = toml::from_str("ring_capacity = 16\nack_timeout_ms = 250")
            .unwrap();
        assert_eq!(config.ring_capacity, 16);
        assert_eq!(config.ack_timeout_ms, 250);
        // untouched fields keep defaults
        assert_eq!(config.flush_interval_ms, 100);
    }
}
