//! Periodic event source.
//!
//! Stands in for a hardware timer: a background thread invokes a hook at a
//! fixed interval, typically [`KernelHandle::event`](crate::KernelHandle::event)
//! to unblock the oldest waiting process.

use crate::errors::LifecycleError;
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
    ticks: AtomicU64,
}

/// Handle to a running timer thread. Dropping it stops the timer.
pub struct EventSource {
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl EventSource {
    /// Spawn a timer thread calling `hook` every `interval`.
    ///
    /// Ticks are scheduled against a fixed cadence, so a slow hook delays
    /// the next tick rather than shifting every later one.
    pub fn start<F>(interval: Duration, hook: F) -> Result<Self, LifecycleError>
    where
        F: Fn() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(LifecycleError::InvalidConfig("event interval must be non-zero"));
        }
        if Instant::now().checked_add(interval).is_none() {
            return Err(LifecycleError::InvalidConfig("event interval overflows the clock"));
        }

        let signal = Arc::new(Signal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
            ticks: AtomicU64::new(0),
        });

        let timer_signal = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name("sim-event-source".into())
            .spawn(move || run_timer(&timer_signal, interval, hook))
            .map_err(|err| {
                error!(error = %err, "failed to spawn event source");
                LifecycleError::Spawn(err)
            })?;

        debug!(interval_us = interval.as_micros() as u64, "event source started");
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Number of times the hook has been invoked.
    pub fn ticks(&self) -> u64 {
        self.signal.ticks.load(Ordering::Relaxed)
    }

    /// Stop the timer and join its thread. Wakes the timer immediately
    /// instead of waiting out the current interval.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
            self.signal.wake.notify_all();
        }
        if thread.join().is_err() {
            error!("event source hook panicked");
        }
        debug!(ticks = self.ticks(), "event source stopped");
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer<F: Fn()>(signal: &Signal, interval: Duration, hook: F) {
    let mut next_tick = Instant::now().checked_add(interval);
    loop {
        {
            let mut stopped = signal.stopped.lock();
            while !*stopped {
                match next_tick {
                    Some(deadline) => {
                        if signal.wake.wait_until(&mut stopped, deadline).timed_out() {
                            break;
                        }
                    }
                    // No representable next tick: idle until stopped.
                    None => signal.wake.wait(&mut stopped),
                }
            }
            if *stopped {
                return;
            }
        }

        hook();
        signal.ticks.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        next_tick = match next_tick.and_then(|tick| tick.checked_add(interval)) {
            Some(tick) if tick >= now => Some(tick),
            _ => now.checked_add(interval),
        };
    }
}
