//! LoRa device adapter.
//!
//! Implements the [`Radio`] port on top of a low-level [`LoraModem`]
//! driver (SX127x / SX126x binding on target, [`MockModem`] on host).
//!
//! The modem is reprogrammed for the direction of every operation: TX
//! parameters before each send, RX parameters before each receive.
//! Driver errors are folded into [`RadioError`], and the last error is
//! kept for diagnostics.
//!
//! [`MockModem`]: super::mock_modem::MockModem

use core::fmt;
use core::time::Duration;

use log::{error, info, warn};

use crate::app::ports::{Radio, Reception};
use crate::config::{Bandwidth, RadioConfig, SpreadingFactor};
use crate::error::RadioError;

// ───────────────────────────────────────────────────────────────
// Driver seam
// ───────────────────────────────────────────────────────────────

/// Radio parameters plus the direction they are being applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemConfig {
    pub radio: RadioConfig,
    /// `true` for transmit, `false` for receive.
    pub tx: bool,
}

/// Errors reported by a modem driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// The transceiver is in the middle of another operation.
    Busy,
    TimedOut,
    InvalidArgument,
    /// The driver does not implement this operation.
    NotSupported,
    /// Any other driver status code.
    Io(i32),
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "busy"),
            Self::TimedOut => write!(f, "timed out"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotSupported => write!(f, "not supported"),
            Self::Io(rc) => write!(f, "I/O error (rc={})", rc),
        }
    }
}

/// Raw transceiver operations.
pub trait LoraModem {
    fn is_ready(&self) -> bool;

    fn configure(&mut self, config: &ModemConfig) -> Result<(), ModemError>;

    fn send(&mut self, data: &[u8]) -> Result<(), ModemError>;

    /// Returns `(len, rssi, snr)` of the received frame.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(usize, i16, i8), ModemError>;
}

/// Fold a driver error into the port's error space.
/// `fallback` names the operation that failed.
fn map_modem_error(e: ModemError, fallback: RadioError) -> RadioError {
    match e {
        ModemError::Busy => RadioError::Busy,
        ModemError::TimedOut => RadioError::Timeout,
        ModemError::InvalidArgument => RadioError::InvalidParams,
        ModemError::NotSupported | ModemError::Io(_) => fallback,
    }
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

pub struct LoraDevice<M> {
    modem: M,
    config: RadioConfig,
    initialized: bool,
    last_error: Option<RadioError>,
}

impl<M: LoraModem> LoraDevice<M> {
    pub fn new(modem: M, config: RadioConfig) -> Self {
        Self {
            modem,
            config,
            initialized: false,
            last_error: None,
        }
    }

    /// Check the transceiver and program the initial (TX) configuration.
    pub fn init(&mut self) -> Result<(), RadioError> {
        if !self.modem.is_ready() {
            error!("LoRa: device not ready");
            return self.fail(RadioError::DeviceNotReady);
        }
        self.apply(true)?;
        self.initialized = true;
        info!("LoRa: device initialized");
        self.log_configuration();
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.initialized && self.modem.is_ready()
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<RadioError> {
        self.last_error
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut M {
        &mut self.modem
    }

    // ── Runtime setters ───────────────────────────────────────
    //
    // Each one re-applies the configuration when the device is live.

    pub fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError> {
        self.config.frequency = hz;
        self.reapply()
    }

    pub fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.config.tx_power = dbm;
        self.reapply()
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) -> Result<(), RadioError> {
        self.config.bandwidth = bandwidth;
        self.reapply()
    }

    pub fn set_spreading_factor(&mut self, sf: SpreadingFactor) -> Result<(), RadioError> {
        self.config.spreading_factor = sf;
        self.reapply()
    }

    /// Dump the active configuration to the log.
    pub fn log_configuration(&self) {
        let c = &self.config;
        info!("LoRa configuration:");
        info!("  Frequency: {}.{:03} MHz", c.frequency / 1_000_000, (c.frequency / 1_000) % 1_000);
        info!("  Bandwidth: {} kHz", c.bandwidth.khz());
        info!("  Spreading factor: SF{}", c.spreading_factor.value());
        info!("  Coding rate: 4/{}", c.coding_rate.denominator());
        info!("  TX power: {} dBm", c.tx_power);
        info!("  Preamble: {} symbols", c.preamble_len);
        info!("  IQ inverted: {}", c.iq_inverted);
        info!("  Public network: {}", c.public_network);
    }

    // ── Internal ──────────────────────────────────────────────

    fn reapply(&mut self) -> Result<(), RadioError> {
        if self.initialized { self.apply(true) } else { Ok(()) }
    }

    fn apply(&mut self, tx: bool) -> Result<(), RadioError> {
        let cfg = ModemConfig { radio: self.config, tx };
        match self.modem.configure(&cfg) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("LoRa: configure ({}) failed: {}", if tx { "tx" } else { "rx" }, e);
                self.fail(map_modem_error(e, RadioError::ConfigFailed))
            }
        }
    }

    fn ensure_ready(&mut self) -> Result<(), RadioError> {
        if self.is_ready() { Ok(()) } else { self.fail(RadioError::DeviceNotReady) }
    }

    fn fail<T>(&mut self, e: RadioError) -> Result<T, RadioError> {
        self.last_error = Some(e);
        Err(e)
    }
}

impl<M: LoraModem> Radio for LoraDevice<M> {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        self.config = *config;
        self.apply(true)
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        self.ensure_ready()?;
        if payload.is_empty() {
            warn!("LoRa: refusing to send an empty frame");
            return self.fail(RadioError::InvalidParams);
        }
        self.apply(true)?;
        if let Err(e) = self.modem.send(payload) {
            error!("LoRa: send of {} bytes failed: {}", payload.len(), e);
            return self.fail(map_modem_error(e, RadioError::SendFailed));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Reception, RadioError> {
        self.ensure_ready()?;
        if buf.is_empty() {
            return self.fail(RadioError::InvalidParams);
        }
        self.apply(false)?;
        match self.modem.recv(buf, timeout) {
            Ok((len, rssi, snr)) => {
                info!("LoRa: received {} bytes (RSSI {} dBm, SNR {} dB)", len, rssi, snr);
                Ok(Reception { len, rssi, snr })
            }
            Err(e) => {
                warn!("LoRa: receive failed: {}", e);
                self.fail(map_modem_error(e, RadioError::RecvFailed))
            }
        }
    }
}
