//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements  | Connects to                     |
//! |--------------|-------------|---------------------------------|
//! | `lora`       | Radio       | any [`lora::LoraModem`] driver  |
//! | `mock_modem` | LoraModem   | log output (host simulation)    |
//! | `sim_sensor` | SensorPort  | seeded PRNG                     |
//! | `time`       | ClockPort   | ESP32 system timer / `Instant`  |
//! | `log_sink`   | EventSink   | Serial log output               |

pub mod log_sink;
pub mod lora;
pub mod mock_modem;
pub mod sim_sensor;
pub mod time;
