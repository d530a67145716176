//! Periodic work timers.
//!
//! A [`PeriodicTimer`] fires once after an initial delay and then on a
//! fixed period, submitting its [`Work`] item to the shared queue on every
//! expiry.
//!
//! - **`target_os = "espidf"`**: an `esp_timer` with `ESP_TIMER_TASK`
//!   dispatch.  The first expiry is a one-shot after the initial delay; its
//!   callback re-arms the same timer as periodic.  Callbacks run in the
//!   esp_timer task (not ISR), so they may call [`WorkQueue::submit`].
//! - **`not(target_os = "espidf")`**: a small thread sleeping to absolute
//!   deadlines, so a slow submit never accumulates drift.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::debug;

use crate::events::{Work, WorkQueue};

/// State shared between the timer handle and its expiry callback.
struct Tick {
    queue: Arc<WorkQueue>,
    work: Work,
    fired: AtomicU32,
}

impl Tick {
    fn new(queue: Arc<WorkQueue>, work: Work) -> Self {
        Self {
            queue,
            work,
            fired: AtomicU32::new(0),
        }
    }

    fn fire(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
        if !self.queue.submit(self.work) {
            debug!("hw_timer: {:?} still pending, coalesced", self.work);
        }
    }
}

fn log_started(name: &str, initial_delay: Duration, period: Duration) {
    log::info!(
        "hw_timer: '{}' started (delay={}ms, period={}ms)",
        name,
        initial_delay.as_millis(),
        period.as_millis()
    );
}

// ── ESP-IDF: esp_timer ────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod imp {
    use core::ffi::c_void;
    use core::sync::atomic::{AtomicBool, AtomicPtr};
    use std::io;

    use esp_idf_svc::sys::*;

    use super::*;

    struct Armed {
        tick: Tick,
        period_us: u64,
        /// Set until the first (one-shot) expiry switches to periodic.
        rearm: AtomicBool,
        timer: AtomicPtr<esp_timer>,
    }

    unsafe extern "C" fn on_expiry(arg: *mut c_void) {
        // SAFETY: `arg` points at the `Armed` boxed inside the owning
        // `PeriodicTimer`, which stops and deletes the timer before the box
        // is freed.
        let armed = unsafe { &*(arg as *const Armed) };
        armed.tick.fire();
        if armed.rearm.swap(false, Ordering::AcqRel) {
            // SAFETY: the handle was stored before the timer was started.
            let rc = unsafe { esp_timer_start_periodic(armed.timer.load(Ordering::Acquire), armed.period_us) };
            if let Err(e) = EspError::convert(rc) {
                log::error!("hw_timer: periodic re-arm failed ({}), timer stops", e);
            }
        }
    }

    fn check(rc: esp_err_t, what: &str) -> io::Result<()> {
        EspError::convert(rc).map_err(|e| io::Error::other(format!("{what} failed: {e}")))
    }

    pub struct PeriodicTimer {
        name: &'static str,
        armed: Box<Armed>,
    }

    impl PeriodicTimer {
        /// Start a timer that submits `work` to `queue` after `initial_delay`
        /// and then every `period`.  `name` must be NUL-terminated.
        pub fn start(
            name: &'static str,
            initial_delay: Duration,
            period: Duration,
            queue: Arc<WorkQueue>,
            work: Work,
        ) -> io::Result<Self> {
            let armed = Box::new(Armed {
                tick: Tick::new(queue, work),
                period_us: period.as_micros() as u64,
                rearm: AtomicBool::new(true),
                timer: AtomicPtr::new(core::ptr::null_mut()),
            });

            let args = esp_timer_create_args_t {
                callback: Some(on_expiry),
                arg: &*armed as *const Armed as *mut c_void,
                dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
                name: name.as_ptr() as *const _,
                skip_unhandled_events: true,
            };
            let mut handle: esp_timer_handle_t = core::ptr::null_mut();
            // SAFETY: `args` is fully initialised; `name` is 'static and
            // NUL-terminated; `armed` outlives the timer (see `Drop`).
            check(unsafe { esp_timer_create(&args, &mut handle) }, "esp_timer_create")?;
            armed.timer.store(handle, Ordering::Release);

            let timer = Self {
                name: name.trim_end_matches('\0'),
                armed,
            };
            // SAFETY: `handle` is the timer created above and not yet running.
            check(
                unsafe { esp_timer_start_once(handle, initial_delay.as_micros() as u64) },
                "esp_timer_start_once",
            )?;

            log_started(timer.name, initial_delay, period);
            Ok(timer)
        }

        /// Number of expiries so far.
        pub fn fired(&self) -> u32 {
            self.armed.tick.fired.load(Ordering::Relaxed)
        }

        /// Stop the timer.  No further expiries are dispatched.
        pub fn stop(&self) {
            self.armed.rearm.store(false, Ordering::Release);
            let handle = self.armed.timer.load(Ordering::Acquire);
            if !handle.is_null() {
                // SAFETY: valid handle until `Drop` deletes it.  Stopping an
                // idle timer only returns ESP_ERR_INVALID_STATE.
                unsafe { esp_timer_stop(handle) };
            }
        }

        /// Stop the timer and release it.
        pub fn join(self) {}

        pub fn name(&self) -> &'static str {
            self.name
        }
    }

    impl Drop for PeriodicTimer {
        fn drop(&mut self) {
            self.stop();
            let handle = self.armed.timer.swap(core::ptr::null_mut(), Ordering::AcqRel);
            if !handle.is_null() {
                // SAFETY: the timer is stopped; deleting it before `armed`
                // drops keeps the callback argument valid.
                unsafe { esp_timer_delete(handle) };
            }
        }
    }
}

// ── Host: deadline thread ─────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod imp {
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::thread::JoinHandle;
    use std::time::Instant;

    use super::*;
    use crate::drivers::task_pin::{Core, spawn_on_core};

    const TIMER_STACK_KB: usize = 4;
    const TIMER_PRIORITY: u8 = 6;

    pub struct PeriodicTimer {
        name: &'static str,
        tick: Arc<Tick>,
        stopped: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl PeriodicTimer {
        /// Start a timer that submits `work` to `queue` after `initial_delay`
        /// and then every `period`.  `name` must be NUL-terminated.
        pub fn start(
            name: &'static str,
            initial_delay: Duration,
            period: Duration,
            queue: Arc<WorkQueue>,
            work: Work,
        ) -> io::Result<Self> {
            let tick = Arc::new(Tick::new(queue, work));
            let stopped = Arc::new(AtomicBool::new(false));

            let handle = {
                let tick = tick.clone();
                let stopped = stopped.clone();
                spawn_on_core(Core::App, TIMER_PRIORITY, TIMER_STACK_KB, name, move || {
                    let mut deadline = Instant::now() + initial_delay;
                    loop {
                        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        if stopped.load(Ordering::Acquire) {
                            break;
                        }
                        tick.fire();
                        deadline += period;
                    }
                })?
            };

            let name = name.trim_end_matches('\0');
            log_started(name, initial_delay, period);
            Ok(Self {
                name,
                tick,
                stopped,
                handle: Some(handle),
            })
        }

        /// Number of expiries so far.
        pub fn fired(&self) -> u32 {
            self.tick.fired.load(Ordering::Relaxed)
        }

        /// Stop the timer.  The thread exits at its next wake-up.
        pub fn stop(&self) {
            self.stopped.store(true, Ordering::Release);
        }

        /// Stop the timer and wait for its thread to exit.
        pub fn join(mut self) {
            self.stop();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }

        pub fn name(&self) -> &'static str {
            self.name
        }
    }

    impl Drop for PeriodicTimer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

pub use imp::PeriodicTimer;
