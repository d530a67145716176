//! Egress thread — hosts the dispatcher on a local async executor.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────┐
//!  │  Egress Thread                                       │
//!  │  ┌────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::block_on                        │  │
//!  │  │  ┌──────────────────────────────────────────┐  │  │
//!  │  │  │  edge_executor::LocalExecutor            │  │  │
//!  │  │  │   start delay ⏱ ─▶ EgressDispatcher::run │  │  │
//!  │  │  └──────────────────────────────────────────┘  │  │
//!  │  └────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────┘
//! ```
//!
//! Suspensions on bus/ring waits and read deadlines are woken by the
//! embassy-sync signals and `async-io-mini` timers, so the thread sleeps
//! between messages.

use core::time::Duration;
use std::io;
use std::thread::JoinHandle;

use log::info;

use super::{EgressDispatcher, MessageSource};
use crate::app::ports::{EventSink, Radio};
use crate::drivers::task_pin::{Core, spawn_on_core};

const EGRESS_PRIORITY: u8 = 10;
const EGRESS_STACK_KB: usize = 8;

/// Drive `dispatcher` forever on the current thread, after `start_delay`.
pub fn run_egress_loop<S, R, E>(mut dispatcher: EgressDispatcher<S, R, E>, start_delay: Duration)
where
    S: MessageSource,
    R: Radio,
    E: EventSink,
{
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    executor
        .spawn(async move {
            if !start_delay.is_zero() {
                info!("Egress: starting in {} ms", start_delay.as_millis());
                async_io_mini::Timer::after(start_delay).await;
            }
            dispatcher.run().await;
        })
        .detach();

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn the egress thread on the application core.
pub fn spawn<S, R, E>(dispatcher: EgressDispatcher<S, R, E>, start_delay: Duration) -> io::Result<JoinHandle<()>>
where
    S: MessageSource + Send + 'static,
    R: Radio + Send + 'static,
    E: EventSink + Send + 'static,
{
    spawn_on_core(Core::App, EGRESS_PRIORITY, EGRESS_STACK_KB, "egress\0", move || {
        run_egress_loop(dispatcher, start_delay);
    })
}
