//! Packet-buffer transport.
//!
//! An alternative to the channel bus for the producer → egress path:
//! producers pack messages into records of a shared lock-free arena and
//! the egress dispatcher claims them in arena order.
//!
//! ```text
//!   producer ─┐                               ┌─ claim → unpack → encode → radio
//!   producer ─┼─► allocate/commit ─► [arena] ─┤
//!   reporter ─┘        │                      └─ free
//!                      └── ready signal ──────► egress wakes
//! ```

pub mod buffer;
pub mod packet;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, warn};

pub use buffer::{ClaimedRecord, PacketBuffer, RecordHandle, RecordHeader};
pub use packet::{MAX_PAYLOAD_WORDS, PacketError};

use crate::messages::OutgoingMessage;
use crate::timeout::{Elapsed, Timeout, with_timeout};

/// Arena size used by the node.
pub const ARENA_WORDS: usize = 32;

/// A packet buffer plus the wake-up the consumer blocks on.
pub struct RingTransport<const N: usize = ARENA_WORDS> {
    buffer: PacketBuffer<N>,
    ready: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> RingTransport<N> {
    pub fn new(overwrite: bool) -> Self {
        Self {
            buffer: PacketBuffer::new(overwrite),
            ready: Signal::new(),
        }
    }

    /// Pack `message` into a fresh record and commit it.  Never blocks.
    pub fn post(&self, message: &OutgoingMessage) -> Result<(), PacketError> {
        let mut words = [0u32; MAX_PAYLOAD_WORDS];
        let n = packet::pack(message, &mut words)?;

        let mut handle = self.buffer.allocate(n).ok_or(PacketError::NoSpace)?;
        handle.write_words(0, &words[..n]);
        self.buffer.commit(handle);
        self.ready.signal(());
        Ok(())
    }

    /// Claim, unpack and free the oldest committed record.
    ///
    /// `None` when nothing is ready.  A record that fails to unpack is
    /// still freed.
    pub fn take(&self) -> Option<Result<OutgoingMessage, PacketError>> {
        let record = self.buffer.claim()?;
        let header = record.header();
        let mut words = [0u32; MAX_PAYLOAD_WORDS];
        let result = if record.payload_words() > MAX_PAYLOAD_WORDS {
            Err(PacketError::Truncated)
        } else {
            let n = record.copy_payload(&mut words);
            packet::unpack(&words[..n])
        };
        self.buffer.free(record);

        match &result {
            Ok(_) => debug!(
                "Ring: took record busy={} valid={} length={}",
                header.busy, header.valid, header.length
            ),
            Err(e) => warn!("Ring: dropping record ({})", e),
        }
        Some(result)
    }

    /// Suspend until a record is ready to claim.
    pub async fn wait_ready(&self, timeout: Timeout) -> Result<(), Elapsed> {
        with_timeout(timeout, async {
            loop {
                if self.buffer.has_pending() {
                    return;
                }
                self.ready.wait().await;
            }
        })
        .await
    }

    pub fn buffer(&self) -> &PacketBuffer<N> {
        &self.buffer
    }
}
