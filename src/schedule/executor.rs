/*!

The frame task executor.

One coordinator thread (the caller of [`FrameTaskExecutor::run_frame`]) does
all dependency bookkeeping, zone partitioning and readiness decisions; task
bodies run either inline on the coordinator or on a bounded worker pool.
Dispatch is fire-and-continue — nothing a task does can suspend the
coordinator's partitioning loop.

The frame's task list is kept in four contiguous zones, maintained with
in-place swaps and never reallocated:

```text
[0, completed)        archived, finished
[completed, allocated) dispatched but not finished
[allocated, ready)     ready, not yet dispatched
[ready, len)           blocked
```

A task is ready when its dependency bits no longer intersect the mask of
unfinished schedules. When nothing is ready and nothing is running but
unfinished work remains, the cycle breaker promotes the first blocked task
whose *hard* dependencies are satisfied — or, failing that, force-promotes
the next blocked task outright — so a frame always runs to completion, even
over a cyclic dependency relation. Two schedules with a declared read/write
or write/write conflict are still never `Running` at the same instant: the
breaker only fires when nothing is running.

A panicking task body is caught at this boundary, logged once, and its node
still reaches `Finished` so dependents are not starved.

*/

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use fixedbitset::FixedBitSet;
use log::{error, warn};

use super::graph::{DependencyGraph, ExecutionState, ScheduleNode};
use super::ScheduleDescriptor;

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// The maximum number of task bodies handed to the worker pool at once.
    /// Also the number of worker threads spawned.
    pub worker_budget: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { worker_budget: 12 }
    }
}

type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// One schedule's concrete work for the current frame: descriptor, priority
/// and the closure to run. Ephemeral — consumed by the executor within the
/// frame it was queued for.
pub struct FrameTask {
    descriptor: Arc<ScheduleDescriptor>,
    priority: i32,
    body: TaskBody,
}

impl FrameTask {
    pub fn new(
        descriptor: Arc<ScheduleDescriptor>,
        priority: i32,
        body: impl FnOnce() + Send + 'static,
    ) -> Self {
        FrameTask {
            descriptor,
            priority,
            body: Box::new(body),
        }
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ScheduleDescriptor> {
        &self.descriptor
    }
}

/// A fixed set of worker threads fed through an unbounded channel. Dropping
/// the pool closes the channel and joins the workers.
struct WorkerPool {
    sender: Option<Sender<TaskBody>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    fn new(size: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<TaskBody>();
        let workers = (0..size)
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("orrery-worker-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        WorkerPool {
            sender: Some(sender),
            workers,
        }
    }

    fn execute(&self, job: TaskBody) {
        if let Some(sender) = &self.sender {
            // The receivers only disappear once the pool is dropped.
            sender.send(job).expect("worker pool channel closed");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// One frame task, armed for execution: its node, snapshots of its dependency
/// bitsets, and the body until dispatched.
struct TaskEntry {
    node: Arc<ScheduleNode>,
    dependencies: FixedBitSet,
    hard_dependencies: FixedBitSet,
    body: Option<TaskBody>,
}

impl TaskEntry {
    fn slot(&self) -> usize {
        self.node.schedule().id() as usize
    }
}

/// Drives one frame's tasks to exhaustion across the coordinator thread and
/// the worker pool.
pub struct FrameTaskExecutor {
    graph: Arc<DependencyGraph>,
    pool: WorkerPool,
    worker_budget: usize,
}

impl FrameTaskExecutor {
    #[must_use]
    pub fn new(graph: Arc<DependencyGraph>, config: ExecutorConfig) -> Self {
        FrameTaskExecutor {
            graph,
            pool: WorkerPool::new(config.worker_budget),
            worker_budget: config.worker_budget,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    /// Runs one frame's task list to completion.
    ///
    /// # Panics
    ///
    /// Panics if a task's descriptor was not registered with this executor's
    /// graph. Task *bodies* never panic out of this method; failures are
    /// logged and the failing schedule is marked finished.
    pub fn run_frame(&self, tasks: Vec<FrameTask>) {
        if tasks.is_empty() {
            return;
        }

        // Bring every node up to date before snapshotting any edge set: a
        // later rebuild may add edges to an earlier node.
        for task in &tasks {
            let node = self
                .graph
                .node(task.descriptor.schedule())
                .unwrap_or_else(|| {
                    panic!(
                        "schedule '{}' is not registered with this executor's dependency graph",
                        task.descriptor.name()
                    )
                });
            self.graph.update_dependencies(&task.descriptor);
            node.set_state(ExecutionState::Pending);
        }

        let mut entries: Vec<TaskEntry> = tasks
            .into_iter()
            .map(|task| {
                let node = self.graph.node(task.descriptor.schedule()).unwrap();
                TaskEntry {
                    dependencies: node.dependencies(),
                    hard_dependencies: node.hard_dependencies(),
                    node,
                    body: Some(task.body),
                }
            })
            .collect();

        let total = entries.len();
        let mut unfinished = FixedBitSet::new();
        for entry in &entries {
            unfinished.grow(entry.slot() + 1);
            unfinished.insert(entry.slot());
        }

        let finished = Arc::new(AtomicUsize::new(0));
        let mut completed = 0; // end of the archived-finished zone
        let mut allocated = 0; // end of the dispatched zone
        let mut ready = 0; // end of the ready zone

        loop {
            let finished_at_pass_start = finished.load(Ordering::Acquire);

            // Archive dispatched tasks whose nodes reached Finished, clearing
            // them from the unfinished mask.
            let mut index = completed;
            while index < allocated {
                if entries[index].node.state() == ExecutionState::Finished {
                    unfinished.set(entries[index].slot(), false);
                    entries.swap(index, completed);
                    completed += 1;
                }
                index += 1;
            }
            if completed == total {
                break;
            }

            // Promote blocked tasks whose dependencies no longer intersect
            // the unfinished mask.
            let mut index = ready;
            while index < total {
                if entries[index].dependencies.is_disjoint(&unfinished) {
                    entries[index].node.set_state(ExecutionState::Ready);
                    entries.swap(index, ready);
                    ready += 1;
                }
                index += 1;
            }

            let ready_count = ready - allocated;
            let running = allocated - completed;

            if ready_count == 1 {
                // A single ready task is cheaper to run here than to bounce
                // through the pool.
                allocated = self.run_inline(&mut entries, allocated, &finished);
            } else if ready_count > 1 {
                let batch = self.worker_budget.saturating_sub(running).min(ready_count);
                if batch == 0 {
                    // Pool saturated: make progress on the coordinator.
                    allocated = self.run_inline(&mut entries, allocated, &finished);
                } else {
                    for _ in 0..batch {
                        let entry = &mut entries[allocated];
                        let node = entry.node.clone();
                        let body = entry.body.take();
                        let finished = finished.clone();
                        allocated += 1;
                        self.pool
                            .execute(Box::new(move || run_task(&node, body, &finished)));
                    }
                }
            } else if running == 0 {
                // Nothing ready, nothing running, unfinished work remains:
                // break the cycle. Prefer a task whose explicit constraints
                // are satisfied; force one through otherwise.
                let mut promoted = false;
                let mut index = ready;
                while index < total {
                    if entries[index].hard_dependencies.is_disjoint(&unfinished) {
                        entries[index].node.set_state(ExecutionState::Ready);
                        entries.swap(index, ready);
                        ready += 1;
                        promoted = true;
                        break;
                    }
                    index += 1;
                }
                if !promoted {
                    let entry = &entries[ready];
                    warn!(
                        "forcing schedule '{}' past an unresolved dependency cycle",
                        entry.node.descriptor().name()
                    );
                    entry.node.set_state(ExecutionState::Ready);
                    ready += 1;
                }
                continue;
            }

            if finished.load(Ordering::Acquire) == finished_at_pass_start {
                // No task finished this pass; let the workers in.
                thread::yield_now();
            }
        }
    }

    /// Runs the first undispatched ready task on the coordinator. Returns the
    /// new `allocated` boundary.
    fn run_inline(
        &self,
        entries: &mut [TaskEntry],
        allocated: usize,
        finished: &Arc<AtomicUsize>,
    ) -> usize {
        let entry = &mut entries[allocated];
        let node = entry.node.clone();
        let body = entry.body.take();
        run_task(&node, body, finished);
        allocated + 1
    }
}

/// Runs one task body: claims the node via the Ready→Running CAS, guards the
/// body against panics, and unconditionally marks the node finished — a
/// failing task is isolated, not retried, and never starves its dependents.
fn run_task(node: &ScheduleNode, body: Option<TaskBody>, finished: &AtomicUsize) {
    if node.try_begin_run() {
        if let Some(body) = body {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(body)) {
                let message: &str = if let Some(message) = panic.downcast_ref::<&str>() {
                    message
                } else if let Some(message) = panic.downcast_ref::<String>() {
                    message
                } else {
                    "non-string panic payload"
                };
                error!(
                    "schedule '{}' failed: {message}",
                    node.descriptor().name()
                );
            }
        }
    }
    node.set_state(ExecutionState::Finished);
    finished.fetch_add(1, Ordering::AcqRel);
}
