//! Application boundary — port traits and the events crossing them.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping the pipeline fully testable without a modem or
//! sensors attached.

pub mod events;
pub mod ports;
