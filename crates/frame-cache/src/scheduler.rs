//! Injectable timers.
//!
//! Everything in this crate that waits (the playback clock, staggered batch
//! creation) goes through [`Scheduler`]. Fired timers are delivered back to
//! the owner as [`TimerId`]s, so the same state machines run against
//! [`TokioScheduler`] in production and [`VirtualScheduler`] in tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Identifier of a scheduled timer. Never reused within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Timer facility.
pub trait Scheduler {
    /// Fire once after `delay`.
    fn schedule_once(&mut self, delay: Duration) -> TimerId;

    /// Fire every `period`, first after one full period.
    fn schedule_repeating(&mut self, period: Duration) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

// ============================================================================
// Virtual time
// ============================================================================

#[derive(Debug)]
struct VirtualTimer {
    deadline: Duration,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
struct VirtualClock {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, VirtualTimer>,
}

impl VirtualClock {
    fn insert(&mut self, deadline: Duration, period: Option<Duration>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.insert(id, VirtualTimer { deadline, period });
        id
    }

    /// Pop the earliest timer due at or before `until`, re-arming repeaters.
    fn pop_due(&mut self, until: Duration) -> Option<TimerId> {
        let (id, deadline) = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= until)
            .min_by_key(|(id, t)| (t.deadline, **id))
            .map(|(id, t)| (*id, t.deadline))?;

        self.now = deadline;
        match self.timers.get_mut(&id) {
            Some(timer) => match timer.period {
                Some(period) => timer.deadline = deadline + period,
                None => {
                    self.timers.remove(&id);
                }
            },
            None => return None,
        }
        Some(id)
    }
}

/// Deterministic scheduler driven by explicit calls to [`VirtualScheduler::advance`].
///
/// Clones share one clock, so several components can schedule against the
/// same virtual time.
#[derive(Debug, Clone, Default)]
pub struct VirtualScheduler {
    clock: Rc<RefCell<VirtualClock>>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.clock.borrow().timers.len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.clock.borrow().timers.contains_key(&id)
    }

    /// Advance virtual time by `by`, calling `on_fire` for every timer that
    /// comes due, in deadline order.
    ///
    /// The clock is not borrowed while `on_fire` runs, so handlers may
    /// schedule and cancel timers; newly scheduled timers that fall inside
    /// the window fire in the same call.
    pub fn advance(&self, by: Duration, mut on_fire: impl FnMut(TimerId)) {
        let until = self.now() + by;
        loop {
            let next = self.clock.borrow_mut().pop_due(until);
            match next {
                Some(id) => on_fire(id),
                None => break,
            }
        }
        self.clock.borrow_mut().now = until;
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let mut clock = self.clock.borrow_mut();
        let deadline = clock.now + delay;
        clock.insert(deadline, None)
    }

    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        let mut clock = self.clock.borrow_mut();
        let deadline = clock.now + period;
        clock.insert(deadline, Some(period))
    }

    fn cancel(&mut self, id: TimerId) {
        self.clock.borrow_mut().timers.remove(&id);
    }
}

// ============================================================================
// Tokio
// ============================================================================

/// Scheduler backed by tokio timers.
///
/// Each timer is a spawned task that sends its id on the channel returned by
/// [`TokioScheduler::new`]; the event loop feeds received ids back into the
/// engine. Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    next_id: Arc<AtomicU64>,
    tasks: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
    fired: mpsc::UnboundedSender<TimerId>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            fired,
        };
        (scheduler, rx)
    }

    fn allocate(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of timers that have not fired (once) or been cancelled.
    pub fn pending(&self) -> usize {
        lock_tasks(&self.tasks).len()
    }
}

fn lock_tasks(tasks: &Mutex<HashMap<TimerId, AbortHandle>>) -> MutexGuard<'_, HashMap<TimerId, AbortHandle>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        let fired = self.fired.clone();
        let registry = Arc::clone(&self.tasks);

        // Registry stays locked until the handle is inserted.
        let mut tasks = lock_tasks(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock_tasks(&registry).remove(&id);
            let _ = fired.send(id);
        });
        tasks.insert(id, handle.abort_handle());
        id
    }

    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let period = period.max(Duration::from_millis(1));
        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if fired.send(id).is_err() {
                    break;
                }
            }
        });
        lock_tasks(&self.tasks).insert(id, handle.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        let handle = lock_tasks(&self.tasks).remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_once_fires_at_deadline() {
        let mut scheduler = VirtualScheduler::new();
        let id = scheduler.schedule_once(Duration::from_millis(150));

        let mut fired = Vec::new();
        scheduler.advance(Duration::from_millis(149), |t| fired.push(t));
        assert!(fired.is_empty());

        scheduler.advance(Duration::from_millis(1), |t| fired.push(t));
        assert_eq!(fired, vec![id]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_virtual_repeating_fires_each_period() {
        let mut scheduler = VirtualScheduler::new();
        let id = scheduler.schedule_repeating(Duration::from_millis(100));

        let mut count = 0;
        scheduler.advance(Duration::from_millis(350), |t| {
            assert_eq!(t, id);
            count += 1;
        });
        assert_eq!(count, 3);
        assert_eq!(scheduler.now(), Duration::from_millis(350));
        assert!(scheduler.is_pending(id));
    }

    #[test]
    fn test_virtual_cancel() {
        let mut scheduler = VirtualScheduler::new();
        let id = scheduler.schedule_repeating(Duration::from_millis(100));
        scheduler.cancel(id);

        let mut fired = false;
        scheduler.advance(Duration::from_secs(1), |_| fired = true);
        assert!(!fired);
    }

    #[test]
    fn test_virtual_clones_share_clock() {
        let mut a = VirtualScheduler::new();
        let mut b = a.clone();
        let first = a.schedule_once(Duration::from_millis(10));
        let second = b.schedule_once(Duration::from_millis(5));
        assert_ne!(first, second);

        let mut order = Vec::new();
        a.advance(Duration::from_millis(20), |t| order.push(t));
        assert_eq!(order, vec![second, first]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_once_and_cancel() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let keep = scheduler.schedule_once(Duration::from_millis(50));
        let dropped = scheduler.schedule_once(Duration::from_millis(10));
        scheduler.cancel(dropped);

        let fired = rx.recv().await;
        assert_eq!(fired, Some(keep));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_repeating() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let id = scheduler.schedule_repeating(Duration::from_millis(100));

        assert_eq!(rx.recv().await, Some(id));
        assert_eq!(rx.recv().await, Some(id));
        scheduler.cancel(id);
        assert_eq!(scheduler.pending(), 0);
    }
}
