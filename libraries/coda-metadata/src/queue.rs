/// Two-priority, per-track-deduplicated metadata load queue
///
/// High-priority tasks always dequeue before normal ones; within a lane the
/// order is FIFO. A bounded worker pool executes the caller-supplied task
/// function; excess enqueues wait in the lanes.
///
/// Deduplication: only one queued-or-in-flight task exists per track id. A
/// duplicate enqueue returns a ticket for the existing completion; when the
/// duplicate is high priority and the original is still waiting in the
/// normal lane, the original task is promoted in place (moved into the high
/// lane, same task identity).
///
/// The task function is responsible for re-validating that the track id
/// still maps to the same path before and after its own suspension points:
/// the playlist may have mutated while extraction was in flight, and stale
/// results must be discarded rather than applied.
use coda_core::TrackId;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

/// Boxed future produced by the task function
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The caller-supplied extraction task
pub type TaskFn = Arc<dyn Fn(TrackId, PathBuf) -> TaskFuture + Send + Sync>;

/// Priority lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Ahead of every normal task (current track, visible rows)
    High,
    /// Background fill
    Normal,
}

struct Task {
    track_id: TrackId,
    path: PathBuf,
    done_tx: watch::Sender<bool>,
}

struct Inner {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    /// Completion signal per queued-or-in-flight track id
    tickets: HashMap<TrackId, watch::Receiver<bool>>,
    running: usize,
    shut_down: bool,
}

/// Completion ticket returned by [`LoadQueue::enqueue`]
///
/// Duplicate enqueues for the same track share one underlying completion.
#[derive(Clone)]
pub struct LoadTicket {
    rx: watch::Receiver<bool>,
}

impl LoadTicket {
    fn pending(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    fn resolved() -> Self {
        let (tx, rx) = watch::channel(true);
        drop(tx);
        Self { rx }
    }

    /// Wait until the task has completed (or was drained by shutdown)
    pub async fn done(mut self) {
        // a dropped sender also counts as completion
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

/// Bounded-concurrency metadata load scheduler
pub struct LoadQueue {
    inner: Arc<Mutex<Inner>>,
    task_fn: TaskFn,
    concurrency: usize,
}

impl LoadQueue {
    /// Create a queue with the default worker budget of
    /// `min(4, available cores)`
    pub fn new(task_fn: TaskFn) -> Self {
        Self::with_concurrency(task_fn, 4.min(num_cpus::get().max(1)))
    }

    /// Create a queue with an explicit worker budget
    pub fn with_concurrency(task_fn: TaskFn, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                tickets: HashMap::new(),
                running: 0,
                shut_down: false,
            })),
            task_fn,
            concurrency: concurrency.max(1),
        }
    }

    /// Schedule a load for `(track_id, path)`.
    ///
    /// Returns a ticket that resolves when the task completes. After
    /// [`LoadQueue::shutdown`] the ticket resolves immediately and the task
    /// function is never invoked.
    pub fn enqueue(&self, track_id: TrackId, path: PathBuf, priority: Priority) -> LoadTicket {
        let mut inner = self.inner.lock().unwrap();

        if inner.shut_down {
            return LoadTicket::resolved();
        }

        if let Some(existing) = inner.tickets.get(&track_id).cloned() {
            if priority == Priority::High {
                promote(&mut inner, track_id);
            }
            return LoadTicket::pending(existing);
        }

        let (done_tx, done_rx) = watch::channel(false);
        inner.tickets.insert(track_id, done_rx.clone());
        let task = Task {
            track_id,
            path,
            done_tx,
        };
        match priority {
            Priority::High => inner.high.push_back(task),
            Priority::Normal => inner.normal.push_back(task),
        }

        if inner.running < self.concurrency {
            inner.running += 1;
            let inner_ref = Arc::clone(&self.inner);
            let task_fn = Arc::clone(&self.task_fn);
            tokio::spawn(run_worker(inner_ref, task_fn));
        }

        LoadTicket::pending(done_rx)
    }

    /// Number of tasks waiting in the lanes (excludes in-flight tasks)
    pub fn queued_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.high.len() + inner.normal.len()
    }

    /// Resolve all queued-but-unstarted tasks without running their work and
    /// make every future enqueue a resolved no-op. Tasks already in flight
    /// finish normally.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shut_down = true;
        let mut drained: Vec<Task> = inner.high.drain(..).collect();
        drained.extend(inner.normal.drain(..));
        debug!(count = drained.len(), "draining metadata load queue");
        for task in drained {
            inner.tickets.remove(&task.track_id);
            let _ = task.done_tx.send(true);
        }
    }
}

/// Move a task waiting in the normal lane into the high lane, preserving its
/// identity and completion signal. In-flight tasks need no promotion: the
/// duplicate caller just shares the existing completion.
fn promote(inner: &mut Inner, track_id: TrackId) {
    if let Some(position) = inner.normal.iter().position(|t| t.track_id == track_id) {
        if let Some(task) = inner.normal.remove(position) {
            debug!(%track_id, "promoting queued metadata load to high priority");
            inner.high.push_back(task);
        }
    }
}

/// Worker: pull strictly high-before-normal until both lanes are empty,
/// then retire.
async fn run_worker(inner: Arc<Mutex<Inner>>, task_fn: TaskFn) {
    loop {
        let task = {
            let mut guard = inner.lock().unwrap();
            match guard
                .high
                .pop_front()
                .or_else(|| guard.normal.pop_front())
            {
                Some(task) => task,
                None => {
                    guard.running -= 1;
                    return;
                }
            }
        };

        let future = (task_fn)(task.track_id, task.path.clone());
        future.await;

        inner.lock().unwrap().tickets.remove(&task.track_id);
        let _ = task.done_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Task fn that logs execution order and waits for a shared gate
    fn gated_task_fn(
        log: Arc<Mutex<Vec<TrackId>>>,
        gate: watch::Receiver<bool>,
    ) -> TaskFn {
        Arc::new(move |track_id, _path| {
            let log = Arc::clone(&log);
            let mut gate = gate.clone();
            Box::pin(async move {
                log.lock().unwrap().push(track_id);
                let _ = gate.wait_for(|open| *open).await;
            })
        })
    }

    fn counting_task_fn(counter: Arc<AtomicUsize>) -> TaskFn {
        Arc::new(move |_track_id, _path| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    /// Wait until `count` tasks have started executing
    async fn wait_for_started(log: &Arc<Mutex<Vec<TrackId>>>, count: usize) {
        timeout(Duration::from_secs(2), async {
            while log.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn duplicate_enqueue_runs_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        // hold the single worker busy so the duplicate lands while queued
        let (gate_tx, gate_rx) = watch::channel(false);
        let log = Arc::new(Mutex::new(Vec::new()));
        let executions = Arc::clone(&counter);
        let order = Arc::clone(&log);
        let task_fn: TaskFn = Arc::new(move |track_id, _path| {
            let executions = Arc::clone(&executions);
            let order = Arc::clone(&order);
            let mut gate = gate_rx.clone();
            Box::pin(async move {
                executions.fetch_add(1, Ordering::SeqCst);
                order.lock().unwrap().push(track_id);
                let _ = gate.wait_for(|open| *open).await;
            })
        });

        let queue = LoadQueue::with_concurrency(task_fn, 1);
        let blocker = TrackId::generate();
        let target = TrackId::generate();
        let _blocker_ticket = queue.enqueue(blocker, PathBuf::from("/m/blocker.mp3"), Priority::High);
        wait_for_started(&log, 1).await;

        let first = queue.enqueue(target, PathBuf::from("/m/t.mp3"), Priority::Normal);
        let second = queue.enqueue(target, PathBuf::from("/m/t.mp3"), Priority::High);
        assert_eq!(queue.queued_len(), 1, "duplicate must not create a second task");

        gate_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), first.done()).await.unwrap();
        timeout(Duration::from_secs(2), second.done()).await.unwrap();

        // blocker + one target execution
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(log.lock().unwrap().iter().filter(|id| **id == target).count(), 1);
    }

    #[tokio::test]
    async fn high_priority_dequeues_before_normal() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = LoadQueue::with_concurrency(gated_task_fn(Arc::clone(&log), gate_rx), 1);

        let blocker = TrackId::generate();
        let normal = TrackId::generate();
        let high = TrackId::generate();
        let t0 = queue.enqueue(blocker, PathBuf::from("/m/0.mp3"), Priority::Normal);
        wait_for_started(&log, 1).await;
        let t1 = queue.enqueue(normal, PathBuf::from("/m/1.mp3"), Priority::Normal);
        let t2 = queue.enqueue(high, PathBuf::from("/m/2.mp3"), Priority::High);

        gate_tx.send(true).unwrap();
        for ticket in [t0, t1, t2] {
            timeout(Duration::from_secs(2), ticket.done()).await.unwrap();
        }

        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec![blocker, high, normal]);
    }

    #[tokio::test]
    async fn promotion_moves_queued_task_into_high_lane() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = LoadQueue::with_concurrency(gated_task_fn(Arc::clone(&log), gate_rx), 1);

        let blocker = TrackId::generate();
        let a = TrackId::generate();
        let b = TrackId::generate();
        let blocker_ticket = queue.enqueue(blocker, PathBuf::from("/m/0.mp3"), Priority::Normal);
        wait_for_started(&log, 1).await;
        let tickets = vec![
            blocker_ticket,
            queue.enqueue(a, PathBuf::from("/m/a.mp3"), Priority::Normal),
            queue.enqueue(b, PathBuf::from("/m/b.mp3"), Priority::Normal),
            // duplicate high enqueue promotes b over a
            queue.enqueue(b, PathBuf::from("/m/b.mp3"), Priority::High),
        ];

        gate_tx.send(true).unwrap();
        for ticket in tickets {
            timeout(Duration::from_secs(2), ticket.done()).await.unwrap();
        }

        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec![blocker, b, a]);
    }

    #[tokio::test]
    async fn shutdown_resolves_queued_tasks_without_running_them() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = LoadQueue::with_concurrency(gated_task_fn(Arc::clone(&log), gate_rx), 1);

        let blocker = TrackId::generate();
        let queued = TrackId::generate();
        let blocker_ticket = queue.enqueue(blocker, PathBuf::from("/m/0.mp3"), Priority::High);
        // wait until the blocker is actually in flight
        wait_for_started(&log, 1).await;

        let queued_ticket = queue.enqueue(queued, PathBuf::from("/m/q.mp3"), Priority::Normal);
        queue.shutdown();

        // queued task resolves without execution
        timeout(Duration::from_secs(2), queued_ticket.done())
            .await
            .unwrap();
        assert!(!log.lock().unwrap().contains(&queued));

        // future enqueues resolve immediately without invocation
        let late = queue.enqueue(TrackId::generate(), PathBuf::from("/m/l.mp3"), Priority::High);
        timeout(Duration::from_secs(2), late.done()).await.unwrap();

        // the in-flight blocker still completes normally
        gate_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), blocker_ticket.done())
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn worker_budget_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = watch::channel(false);

        let active_ref = Arc::clone(&active);
        let peak_ref = Arc::clone(&peak);
        let task_fn: TaskFn = Arc::new(move |_id, _path| {
            let active = Arc::clone(&active_ref);
            let peak = Arc::clone(&peak_ref);
            let mut gate = gate_rx.clone();
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let _ = gate.wait_for(|open| *open).await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
        });

        let queue = LoadQueue::with_concurrency(task_fn, 2);
        let tickets: Vec<_> = (0..5)
            .map(|i| {
                queue.enqueue(
                    TrackId::generate(),
                    PathBuf::from(format!("/m/{i}.mp3")),
                    Priority::Normal,
                )
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        gate_tx.send(true).unwrap();
        for ticket in tickets {
            timeout(Duration::from_secs(2), ticket.done()).await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn completed_task_can_be_enqueued_again() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = LoadQueue::with_concurrency(counting_task_fn(Arc::clone(&counter)), 2);

        let id = TrackId::generate();
        let first = queue.enqueue(id, PathBuf::from("/m/a.mp3"), Priority::Normal);
        timeout(Duration::from_secs(2), first.done()).await.unwrap();

        let second = queue.enqueue(id, PathBuf::from("/m/a.mp3"), Priority::Normal);
        timeout(Duration::from_secs(2), second.done()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
