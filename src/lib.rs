//! TerraSCOPE sensor node library.
//!
//! The telemetry-to-radio pipeline: producers publish messages onto the
//! channel bus (or pack them into the packet ring), the egress dispatcher
//! encodes them as CBOR frames and hands them to the LoRa radio.
//! Everything outside the pipeline is reached through the port traits in
//! [`app::ports`], so the whole crate runs on the host for testing.

#![deny(unused_must_use)]

pub mod app;
pub mod bus;
pub mod config;
pub mod egress;
pub mod events;
pub mod messages;
pub mod pipeline;
pub mod producer;
pub mod ring;
pub mod timeout;
pub mod wire;

pub mod error;

pub mod adapters;
pub mod drivers;

pub use error::{Error, RadioError, Result};
