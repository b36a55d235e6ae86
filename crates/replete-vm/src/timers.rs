//! Timer emulation (`setTimeout` / `setInterval`)
//!
//! Each live timer is a plain OS thread that sleeps and then submits commands
//! back to the dispatcher. Timer threads never touch the engine; they only
//! carry the [`ForeignHandle`] of the callback and send it back as an
//! `InvokeCallback` or `ReleaseHandle` payload.
//!
//! # Cancellation
//!
//! Cancellation is cooperative: it sets a flag that the timer thread checks at
//! its next wake-up. An in-flight sleep is never interrupted.
//!
//! - A one-shot timer canceled before it wakes never invokes its callback.
//!   Cancelling after the callback was submitted has no effect on that firing.
//! - A repeating timer fires at most once more after cancellation, then
//!   submits exactly one release and stops.
//!
//! Every timer thread releases its callback exactly once, on every exit path.
//!
//! Repeating timers sleep at least [`MIN_INTERVAL`] between firings, so
//! `setInterval(f, 0)` cannot flood the command queue.

use crate::command::{Command, CommandSender, ForeignHandle};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Shortest period between two firings of a repeating timer.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Largest integer a double represents exactly (2^53 - 1).
///
/// Timer ids travel to scripts as numbers, so they wrap here.
pub const MAX_TIMER_ID: u64 = 9_007_199_254_740_991;

/// Kind of emulated timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Repeating,
}

impl TimerKind {
    fn label(self) -> &'static str {
        match self {
            TimerKind::OneShot => "timeout",
            TimerKind::Repeating => "interval",
        }
    }
}

/// Wrapping id counter for one timer facility.
///
/// The first id issued is 1; after [`MAX_TIMER_ID`] the next id is 0.
#[derive(Debug, Clone, Default)]
pub struct TimerIds {
    last: u64,
}

impl TimerIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter positioned so that the next id is `last + 1` (or 0 after the max).
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: last.min(MAX_TIMER_ID),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        self.last = if self.last >= MAX_TIMER_ID {
            0
        } else {
            self.last + 1
        };
        self.last
    }
}

/// A live timer.
#[derive(Debug)]
struct TimerRecord {
    canceled: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// One timer facility: its own id counter and its own live table.
#[derive(Debug)]
pub struct TimerFacility {
    kind: TimerKind,
    ids: TimerIds,
    live: HashMap<u64, TimerRecord>,
}

impl TimerFacility {
    pub fn new(kind: TimerKind) -> Self {
        Self::with_ids(kind, TimerIds::new())
    }

    pub fn with_ids(kind: TimerKind, ids: TimerIds) -> Self {
        Self {
            kind,
            ids,
            live: HashMap::new(),
        }
    }

    /// Start a timer for `callback` and return its id.
    pub fn register(
        &mut self,
        callback: ForeignHandle,
        period: Duration,
        sink: CommandSender,
    ) -> io::Result<u64> {
        self.live.retain(|_, record| !record.thread.is_finished());

        let id = self.ids.next_id();
        let canceled = Arc::new(AtomicBool::new(false));
        let flag = canceled.clone();
        let kind = self.kind;

        let thread = thread::Builder::new()
            .name(format!("replete-{}-{}", kind.label(), id))
            .spawn(move || {
                let lease = CallbackLease::new(callback, sink);
                match kind {
                    TimerKind::OneShot => run_one_shot(&lease, period, &flag),
                    TimerKind::Repeating => run_repeating(&lease, period, &flag),
                }
            })?;

        tracing::debug!("Started {} {} ({:?})", kind.label(), id, period);
        self.live.insert(id, TimerRecord { canceled, thread });
        Ok(id)
    }

    /// Cancel the timer with `id`. Unknown ids are ignored.
    pub fn cancel(&mut self, id: u64) -> bool {
        match self.live.remove(&id) {
            Some(record) => {
                record.canceled.store(true, Ordering::SeqCst);
                tracing::debug!("Canceled {} {}", self.kind.label(), id);
                true
            }
            None => false,
        }
    }

    /// Cancel every live timer.
    pub fn cancel_all(&mut self) {
        for (_, record) in self.live.drain() {
            record.canceled.store(true, Ordering::SeqCst);
        }
    }

    /// Number of timers registered and not yet canceled or pruned.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Both timer facilities, with independent id spaces.
#[derive(Debug)]
pub struct Timers {
    pub timeouts: TimerFacility,
    pub intervals: TimerFacility,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            timeouts: TimerFacility::new(TimerKind::OneShot),
            intervals: TimerFacility::new(TimerKind::Repeating),
        }
    }
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_all(&mut self) {
        self.timeouts.cancel_all();
        self.intervals.cancel_all();
    }
}

/// Owns the obligation to release a callback handle.
///
/// Dropping the lease submits `ReleaseHandle`, so the release happens on
/// every exit path of the timer thread, including unwinding.
struct CallbackLease {
    callback: ForeignHandle,
    sink: CommandSender,
}

impl CallbackLease {
    fn new(callback: ForeignHandle, sink: CommandSender) -> Self {
        Self { callback, sink }
    }

    /// Submit an invocation. Returns false once the dispatcher is gone.
    fn fire(&self) -> bool {
        self.sink.submit(Command::InvokeCallback(self.callback)).is_ok()
    }
}

impl Drop for CallbackLease {
    fn drop(&mut self) {
        if self.sink.submit(Command::ReleaseHandle(self.callback)).is_err() {
            tracing::debug!("Dispatcher closed before release of {:?}", self.callback);
        }
    }
}

fn run_one_shot(lease: &CallbackLease, delay: Duration, canceled: &AtomicBool) {
    thread::sleep(delay);
    if !canceled.load(Ordering::SeqCst) {
        lease.fire();
    }
}

fn run_repeating(lease: &CallbackLease, interval: Duration, canceled: &AtomicBool) {
    let interval = interval.max(MIN_INTERVAL);
    loop {
        thread::sleep(interval);
        if canceled.load(Ordering::SeqCst) || !lease.fire() {
            break;
        }
    }
}
