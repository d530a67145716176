//! Thread and timer plumbing.

pub mod hw_timer;
pub mod task_pin;
