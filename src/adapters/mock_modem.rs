//! Simulated modem for host builds and tests.
//!
//! Logs every configuration and frame instead of keying a transmitter.
//! Receiving is not supported.  Failures can be injected for the next
//! N sends, and the most recent frames are kept for inspection.

use core::time::Duration;

use heapless::HistoryBuffer;
use log::info;

use super::lora::{LoraModem, ModemConfig, ModemError};
use crate::wire::MAX_ENCODED_LEN;

/// Frames kept for inspection.
pub const FRAME_HISTORY: usize = 16;

pub type Frame = heapless::Vec<u8, MAX_ENCODED_LEN>;

pub struct MockModem {
    ready: bool,
    config: Option<ModemConfig>,
    frames: HistoryBuffer<Frame, FRAME_HISTORY>,
    sent: u32,
    fail_remaining: u32,
    fail_with: ModemError,
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModem {
    pub fn new() -> Self {
        Self {
            ready: true,
            config: None,
            frames: HistoryBuffer::new(),
            sent: 0,
            fail_remaining: 0,
            fail_with: ModemError::Io(-1),
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Make the next `count` sends fail with `error`.
    pub fn fail_sends(&mut self, count: u32, error: ModemError) {
        self.fail_remaining = count;
        self.fail_with = error;
    }

    pub fn sent_count(&self) -> u32 {
        self.sent
    }

    pub fn last_config(&self) -> Option<ModemConfig> {
        self.config
    }

    pub fn last_frame(&self) -> Option<&[u8]> {
        self.frames.recent().map(Frame::as_slice)
    }

    /// Retained frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        self.frames.oldest_ordered().map(Frame::as_slice)
    }
}

impl LoraModem for MockModem {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn configure(&mut self, config: &ModemConfig) -> Result<(), ModemError> {
        let r = &config.radio;
        info!(
            "Mock LoRa: configure {} | {} Hz, BW{} SF{} CR4/{} {} dBm",
            if config.tx { "TX" } else { "RX" },
            r.frequency,
            r.bandwidth.khz(),
            r.spreading_factor.value(),
            r.coding_rate.denominator(),
            r.tx_power
        );
        self.config = Some(*config);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), ModemError> {
        if self.fail_remaining > 0 {
            self.fail_remaining -= 1;
            return Err(self.fail_with);
        }
        info!("Mock LoRa: sending {} bytes {:02x?}", data.len(), data);
        let frame = Frame::from_slice(data).map_err(|_| ModemError::InvalidArgument)?;
        self.frames.write(frame);
        self.sent += 1;
        Ok(())
    }

    fn recv(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<(usize, i16, i8), ModemError> {
        Err(ModemError::NotSupported)
    }
}
