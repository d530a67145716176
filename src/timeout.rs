//! Kernel-style timeouts for the blocking points of the pipeline.
//!
//! Every suspension point (bus publish/read/wait, ring wait) takes a
//! [`Timeout`].  Deadlines are raced against `async-io-mini` reactor
//! timers, so waiting never spins.

use core::future::Future;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a call may suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    /// Poll exactly once and fail if not immediately ready.
    NoWait,
    /// Give up after the duration elapses.
    After(Duration),
    /// Suspend until the operation completes.
    Forever,
}

impl Timeout {
    pub const fn millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Self::NoWait } else { Self::After(d) }
    }
}

/// Marker returned when a deadline passes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Drive `fut` to completion or until `timeout` expires.
pub async fn with_timeout<F: Future>(timeout: Timeout, fut: F) -> Result<F::Output, Elapsed> {
    match timeout {
        Timeout::Forever => Ok(fut.await),
        Timeout::NoWait => futures_lite::future::poll_once(fut).await.ok_or(Elapsed),
        Timeout::After(d) => {
            futures_lite::future::or(async { Ok(fut.await) }, async {
                async_io_mini::Timer::after(d).await;
                Err(Elapsed)
            })
            .await
        }
    }
}
