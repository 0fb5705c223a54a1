//! Deferred continuations.
//!
//! [`Scheduler`] runs a task after roughly a given delay. [`DeadlineScheduler`]
//! is the real implementation: one worker thread sleeping on a condvar until
//! the earliest monotonic deadline. Every wake re-reads the clock, so a task
//! never runs before its deadline even when the wait returns early, and
//! lateness is bounded by one wake-up.
//!
//! # Thread Safety
//! Tasks run on the worker thread with the queue unlocked, so a task may arm
//! or cancel further tasks on the same scheduler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A continuation run once by a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identifies an armed task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

pub trait Scheduler: Send + Sync {
    /// Run `task` once, no earlier than `delay` from now.
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Drop an armed task. Unknown or already-fired handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

#[derive(Default)]
struct Queue {
    next_id: u64,
    /// Ordered by deadline, then by arm order
    tasks: BTreeMap<(Instant, u64), Task>,
    deadlines: HashMap<u64, Instant>,
    shutdown: bool,
}

impl Queue {
    fn insert(&mut self, deadline: Instant, task: Task) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert((deadline, id), task);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    fn remove(&mut self, handle: TimerHandle) -> Option<Task> {
        let deadline = self.deadlines.remove(&handle.0)?;
        self.tasks.remove(&(deadline, handle.0))
    }

    fn earliest(&self) -> Option<(Instant, u64)> {
        self.tasks.keys().next().copied()
    }
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

/// Monotonic-deadline scheduler backed by a single worker thread.
pub struct DeadlineScheduler {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DeadlineScheduler {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Run `task` once at `deadline`, or as soon as possible if it has passed.
    pub fn at(&self, deadline: Instant, task: Task) -> TimerHandle {
        let mut queue = self.shared.queue.lock();
        let handle = queue.insert(deadline, task);
        // Only the head of the queue changes the worker's wait target
        if queue.earliest().map(|(_, id)| id) == Some(handle.0) {
            self.shared.wake.notify_one();
        }
        handle
    }

    /// Drop every task that has not started yet.
    pub fn cancel_all(&self) {
        let mut queue = self.shared.queue.lock();
        queue.tasks.clear();
        queue.deadlines.clear();
        self.shared.wake.notify_one();
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }
}

impl Scheduler for DeadlineScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        self.at(Instant::now() + delay, task)
    }

    fn cancel(&self, handle: TimerHandle) {
        let removed = self.shared.queue.lock().remove(handle);
        // Dropped outside the lock: a task's captures may own another scheduler
        drop(removed);
    }
}

impl Drop for DeadlineScheduler {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.tasks.clear();
            queue.deadlines.clear();
        }
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take() {
            // A task dropping the last handle to its own scheduler runs this on the worker
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run_worker(shared: &Shared) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.shutdown {
            return;
        }

        let Some((deadline, id)) = queue.earliest() else {
            shared.wake.wait(&mut queue);
            continue;
        };

        // Early or spurious wakes just loop back to re-check the head
        if Instant::now() < deadline {
            shared.wake.wait_until(&mut queue, deadline);
            continue;
        }

        if let Some(task) = queue.remove(TimerHandle(id)) {
            MutexGuard::unlocked(&mut queue, task);
        }
    }
}

/// Virtual-time scheduler for driving timing logic in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

#[cfg(test)]
#[derive(Default)]
struct ManualState {
    now: Duration,
    queue: Queue,
    armed: Vec<Duration>,
}

#[cfg(test)]
impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays passed to `after`, in arm order.
    pub fn armed_delays(&self) -> Vec<Duration> {
        self.state.lock().armed.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.tasks.len()
    }

    /// Advance virtual time, running due tasks in deadline order.
    ///
    /// Tasks armed by a running task fire in the same call if they fall due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let due = {
                let mut state = self.state.lock();
                let epoch = epoch();
                match state.queue.earliest() {
                    Some((deadline, id)) if deadline.duration_since(epoch) <= target => {
                        state.now = state.now.max(deadline.duration_since(epoch));
                        state.queue.remove(TimerHandle(id))
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };
            match due {
                Some(task) => task(),
                None => return,
            }
        }
    }

    /// Run only the earliest pending task, whatever its deadline.
    pub fn fire_next(&self) -> bool {
        let due = {
            let mut state = self.state.lock();
            let epoch = epoch();
            let head = state.queue.earliest();
            head.and_then(|(deadline, id)| {
                state.now = state.now.max(deadline.duration_since(epoch));
                state.queue.remove(TimerHandle(id))
            })
        };
        match due {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

/// Fixed origin that maps virtual time onto `Instant` keys.
#[cfg(test)]
fn epoch() -> Instant {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

#[cfg(test)]
impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut state = self.state.lock();
        state.armed.push(delay);
        let deadline = epoch() + state.now + delay;
        state.queue.insert(deadline, task)
    }

    fn cancel(&self, handle: TimerHandle) {
        let removed = self.state.lock().queue.remove(handle);
        drop(removed);
    }
}
