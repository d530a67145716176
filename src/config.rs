//! Node configuration parameters
//!
//! All tunable parameters for the TerraSCOPE sensor node.
//! Defaults match the deployed EU868 profile; overrides arrive as JSON
//! (`from_json`) or as a postcard blob from flash.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::MAX_NOTIFY_DEPTH;
use crate::pipeline::NODE_TOPICS;
use crate::timeout::Timeout;

/// LoRa channel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bandwidth {
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    pub const fn khz(self) -> u32 {
        match self {
            Self::Khz125 => 125,
            Self::Khz250 => 250,
            Self::Khz500 => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadingFactor {
    Sf6,
    Sf7,
    Sf8,
    Sf9,
    Sf10,
    Sf11,
    Sf12,
}

impl SpreadingFactor {
    pub const fn value(self) -> u8 {
        match self {
            Self::Sf6 => 6,
            Self::Sf7 => 7,
            Self::Sf8 => 8,
            Self::Sf9 => 9,
            Self::Sf10 => 10,
            Self::Sf11 => 11,
            Self::Sf12 => 12,
        }
    }
}

/// Forward error correction rate, 4/5 through 4/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingRate {
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
}

impl CodingRate {
    /// Denominator of the rate (`4/n`).
    pub const fn denominator(self) -> u8 {
        match self {
            Self::Cr4_5 => 5,
            Self::Cr4_6 => 6,
            Self::Cr4_7 => 7,
            Self::Cr4_8 => 8,
        }
    }
}

/// Radio modem parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Carrier frequency in Hz
    pub frequency: u32,
    pub bandwidth: Bandwidth,
    pub spreading_factor: SpreadingFactor,
    pub coding_rate: CodingRate,
    /// Output power in dBm
    pub tx_power: i8,
    /// Preamble length in symbols
    pub preamble_len: u8,
    pub iq_inverted: bool,
    /// Public (LoRaWAN) sync word instead of the private one
    pub public_network: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency: 865_100_000,
            bandwidth: Bandwidth::Khz125,
            spreading_factor: SpreadingFactor::Sf10,
            coding_rate: CodingRate::Cr4_5,
            tx_power: 4,
            preamble_len: 8,
            iq_inverted: false,
            public_network: false,
        }
    }
}

/// Periods and deadlines of the pipeline, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the first sensor reading
    pub sensor_start_delay_ms: u32,
    pub sensor_period_ms: u32,
    pub status_period_ms: u32,
    /// Producer-side publish deadline (0 = no wait)
    pub publish_timeout_ms: u32,
    /// Dispatcher read deadline after a notification (0 = no wait)
    pub read_timeout_ms: u32,
    /// Back-off before a producer retries a failed ring allocation
    pub producer_retry_ms: u32,
    /// Delay before the egress dispatcher starts draining
    pub consumer_start_delay_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_start_delay_ms: 1_000,
            sensor_period_ms: 10_000,
            status_period_ms: 7_000,
            publish_timeout_ms: 200,
            read_timeout_ms: 2,
            producer_retry_ms: 500,
            consumer_start_delay_ms: 3_000,
        }
    }
}

impl TimingConfig {
    pub fn sensor_start_delay(&self) -> Duration {
        ms(self.sensor_start_delay_ms)
    }

    pub fn sensor_period(&self) -> Duration {
        ms(self.sensor_period_ms)
    }

    pub fn status_period(&self) -> Duration {
        ms(self.status_period_ms)
    }

    pub fn publish_timeout(&self) -> Timeout {
        ms(self.publish_timeout_ms).into()
    }

    pub fn read_timeout(&self) -> Timeout {
        ms(self.read_timeout_ms).into()
    }

    pub fn producer_retry(&self) -> Duration {
        ms(self.producer_retry_ms)
    }

    pub fn consumer_start_delay(&self) -> Duration {
        ms(self.consumer_start_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Pending-notification depth of the egress subscription; at least one
    /// slot per node topic
    pub subscriber_depth: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { subscriber_depth: 2 }
    }
}

/// Which transport carries messages from producers to egress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportKind {
    #[default]
    Bus,
    Ring,
}

/// Complete node configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub radio: RadioConfig,
    pub timing: TimingConfig,
    pub bus: BusConfig,
    pub transport: TransportKind,
    /// Evict the oldest unread records when the ring is full
    pub ring_overwrite: bool,
}

impl NodeConfig {
    /// Range-check every field.  Out-of-range values are rejected, never
    /// clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.radio;
        if !(137_000_000..=1_020_000_000).contains(&r.frequency) {
            return Err(ConfigError::ValidationFailed("radio.frequency outside 137-1020 MHz"));
        }
        if !(-9..=22).contains(&r.tx_power) {
            return Err(ConfigError::ValidationFailed("radio.tx_power outside -9..=22 dBm"));
        }
        if r.preamble_len < 6 {
            return Err(ConfigError::ValidationFailed("radio.preamble_len below 6 symbols"));
        }

        let t = &self.timing;
        if t.sensor_period_ms == 0 {
            return Err(ConfigError::ValidationFailed("timing.sensor_period_ms must be > 0"));
        }
        if t.status_period_ms == 0 {
            return Err(ConfigError::ValidationFailed("timing.status_period_ms must be > 0"));
        }
        if t.producer_retry_ms == 0 {
            return Err(ConfigError::ValidationFailed("timing.producer_retry_ms must be > 0"));
        }

        let depth = self.bus.subscriber_depth as usize;
        if !(NODE_TOPICS..=MAX_NOTIFY_DEPTH).contains(&depth) {
            return Err(ConfigError::ValidationFailed("bus.subscriber_depth outside 2..=8"));
        }
        Ok(())
    }

    /// Parse a (possibly partial) JSON override on top of the defaults and
    /// validate the result.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}

fn ms(v: u32) -> Duration {
    Duration::from_millis(u64::from(v))
}

/// Errors from loading or validating a [`NodeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    /// The `&'static str` names the field and the rule.
    ValidationFailed(&'static str),
    /// The override document is not valid for this schema.
    Parse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Parse => write!(f, "malformed config document"),
        }
    }
}
