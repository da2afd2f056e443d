// SPDX-License-Identifier: MPL-2.0

//! Timer and animation-frame scheduling
//!
//! State machines never sleep or spawn on their own. They ask a [`Scheduler`]
//! for a timer or a frame callback and remember the returned id; the host
//! later routes the matching [`Wakeup`] back to them. Ids that no longer match
//! (cancelled, superseded) are ignored by the receiver, so a late timer can
//! never act on an item that already settled.
//!
//! [`ManualScheduler`] drives everything from a virtual clock in tests;
//! [`TokioScheduler`] backs timers with tokio tasks in a real host.

use crate::constants::timing::FRAME_INTERVAL;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Handle to a pending timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Handle to a pending animation-frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

/// A fired timer or frame, to be routed to the machine that requested it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Timer(TimerId),
    Frame(FrameId),
}

/// Timer/frame scheduling seam
pub trait Scheduler: Send + Sync {
    /// Monotonic time since the scheduler was created
    fn now(&self) -> Duration;

    /// Wall-clock milliseconds, used for cache-busting query values
    fn epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Fire [`Wakeup::Timer`] once after `delay`
    fn set_timeout(&self, delay: Duration) -> TimerId;

    /// Cancel a pending timer; unknown or fired ids are ignored
    fn cancel_timeout(&self, id: TimerId);

    /// Fire [`Wakeup::Frame`] once on the next frame
    fn request_frame(&self) -> FrameId;

    /// Cancel a pending frame callback
    fn cancel_frame(&self, id: FrameId);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: Vec<(Duration, TimerId)>,
    frames: Vec<FrameId>,
}

/// Deterministic virtual-clock scheduler
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
    epoch_base: i64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the form state machines take
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move the clock forward and collect everything that fired
    ///
    /// Due timers are returned in deadline order, followed by every pending
    /// frame request (each fires once per advance).
    pub fn advance(&self, by: Duration) -> Vec<Wakeup> {
        let mut state = lock(&self.state);
        let target = state.now + by;

        state.timers.sort();
        let due = state
            .timers
            .iter()
            .take_while(|(deadline, _)| *deadline <= target)
            .count();
        let mut fired: Vec<Wakeup> = state
            .timers
            .drain(..due)
            .map(|(_, id)| Wakeup::Timer(id))
            .collect();

        state.now = target;
        fired.extend(state.frames.drain(..).map(Wakeup::Frame));
        fired
    }

    /// Number of timers still pending
    pub fn pending_timers(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Number of frame callbacks still pending
    pub fn pending_frames(&self) -> usize {
        lock(&self.state).frames.len()
    }

    /// Whether a specific timer is still pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        lock(&self.state).timers.iter().any(|(_, t)| *t == id)
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        lock(&self.state).now
    }

    fn epoch_millis(&self) -> i64 {
        self.epoch_base + self.now().as_millis() as i64
    }

    fn set_timeout(&self, delay: Duration) -> TimerId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let deadline = state.now + delay;
        state.timers.push((deadline, id));
        id
    }

    fn cancel_timeout(&self, id: TimerId) {
        lock(&self.state).timers.retain(|(_, t)| *t != id);
    }

    fn request_frame(&self) -> FrameId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = FrameId(state.next_id);
        state.frames.push(id);
        id
    }

    fn cancel_frame(&self, id: FrameId) {
        lock(&self.state).frames.retain(|f| *f != id);
    }
}

/// Tokio-backed scheduler delivering wakeups over a channel
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    origin: tokio::time::Instant,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    sender: mpsc::UnboundedSender<Wakeup>,
}

impl TokioScheduler {
    /// Create the scheduler and the receiver the host loop drains
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Wakeup>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            origin: tokio::time::Instant::now(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
            sender,
        });
        (scheduler, receiver)
    }

    fn spawn_after(&self, delay: Duration, wakeup: impl FnOnce(u64) -> Wakeup) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let event = wakeup(id);
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the host shut down
            let _ = sender.send(event);
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(id, handle);
        id
    }

    fn abort(&self, id: u64) {
        if let Some(task) = lock(&self.tasks).remove(&id) {
            trace!(id, "Aborting scheduled wakeup");
            task.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn set_timeout(&self, delay: Duration) -> TimerId {
        TimerId(self.spawn_after(delay, |id| Wakeup::Timer(TimerId(id))))
    }

    fn cancel_timeout(&self, id: TimerId) {
        self.abort(id.0);
    }

    fn request_frame(&self) -> FrameId {
        FrameId(self.spawn_after(FRAME_INTERVAL, |id| Wakeup::Frame(FrameId(id))))
    }

    fn cancel_frame(&self, id: FrameId) {
        self.abort(id.0);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in lock(&self.tasks).drain() {
            task.abort();
        }
    }
}
