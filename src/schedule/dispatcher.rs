use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::executor::{FrameTask, FrameTaskExecutor};
use super::{DependencyGraph, ScheduleDescriptor};

type TaskBody = Box<dyn FnOnce() + Send + 'static>;

struct MainTask {
    priority: i32,
    body: TaskBody,
}

struct DelayedTask {
    remaining: Duration,
    descriptor: Arc<ScheduleDescriptor>,
    body: TaskBody,
}

/// Owns the three per-frame task buckets and the frame driver.
///
/// * **main** — run immediately on the calling thread at the start of
///   [`update`](Self::update), in priority order (lowest value first).
/// * **work** — handed to the [`FrameTaskExecutor`] for the frame, then
///   cleared.
/// * **delayed** — carry a remaining duration; each update decrements it by
///   the frame delta and migrates expired entries into the work bucket before
///   the work pass runs.
///
/// Schedule bodies are plain `FnOnce` closures. Recurring work re-enqueues
/// itself (or is re-enqueued by a front-end) via [`enqueue`](Self::enqueue).
pub struct ScheduleDispatcher {
    graph: Arc<DependencyGraph>,
    executor: FrameTaskExecutor,
    main_tasks: Mutex<Vec<MainTask>>,
    work_tasks: Mutex<Vec<FrameTask>>,
    delayed_tasks: Mutex<Vec<DelayedTask>>,
}

impl ScheduleDispatcher {
    #[must_use]
    pub fn new(graph: Arc<DependencyGraph>, executor: FrameTaskExecutor) -> Self {
        ScheduleDispatcher {
            graph,
            executor,
            main_tasks: Mutex::new(Vec::new()),
            work_tasks: Mutex::new(Vec::new()),
            delayed_tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    /// Registers a schedule without queueing any work for it.
    #[must_use]
    pub fn declare(&self, name: &str, priority: i32) -> Arc<ScheduleDescriptor> {
        self.graph.declare(name, priority)
    }

    /// Registers a schedule and queues its first frame task. The body
    /// declares its accesses on the descriptor as it runs; recurring work
    /// re-enqueues itself via [`enqueue`](Self::enqueue).
    #[must_use]
    pub fn schedule(
        &self,
        name: &str,
        priority: i32,
        body: impl FnOnce() + Send + 'static,
    ) -> Arc<ScheduleDescriptor> {
        let descriptor = self.graph.declare(name, priority);
        self.enqueue(&descriptor, body);
        descriptor
    }

    /// Queues one frame task for a registered schedule.
    pub fn enqueue(&self, descriptor: &Arc<ScheduleDescriptor>, body: impl FnOnce() + Send + 'static) {
        let task = FrameTask::new(descriptor.clone(), descriptor.priority(), body);
        self.work_tasks.lock().unwrap().push(task);
    }

    /// Queues a task to run on the frame thread at the start of the next
    /// update, ordered by priority (lowest first).
    pub fn run_on_main(&self, priority: i32, body: impl FnOnce() + Send + 'static) {
        self.main_tasks.lock().unwrap().push(MainTask {
            priority,
            body: Box::new(body),
        });
    }

    /// Queues a frame task that joins the work bucket once `delay` worth of
    /// frame deltas has elapsed.
    pub fn run_delayed(
        &self,
        delay: Duration,
        descriptor: &Arc<ScheduleDescriptor>,
        body: impl FnOnce() + Send + 'static,
    ) {
        self.delayed_tasks.lock().unwrap().push(DelayedTask {
            remaining: delay,
            descriptor: descriptor.clone(),
            body: Box::new(body),
        });
    }

    /// The number of tasks currently waiting in the work bucket.
    #[must_use]
    pub fn pending_work(&self) -> usize {
        self.work_tasks.lock().unwrap().len()
    }

    /// The per-frame entry point: runs main tasks in priority order, ticks
    /// delayed tasks, then hands the accumulated work list to the executor.
    pub fn update(&self, delta: Duration) {
        // 1. Main-thread tasks, lowest priority value first. The sort is
        // stable, so equal priorities keep their enqueue order.
        let mut main = {
            let mut bucket = self.main_tasks.lock().unwrap();
            std::mem::take(&mut *bucket)
        };
        main.sort_by_key(|task| task.priority);
        for task in main {
            (task.body)();
        }

        // 2. Tick delayed tasks and migrate expired ones into the work
        // bucket, ahead of the work pass.
        let expired = {
            let mut bucket = self.delayed_tasks.lock().unwrap();
            let mut expired = Vec::new();
            let mut index = 0;
            while index < bucket.len() {
                bucket[index].remaining = bucket[index].remaining.saturating_sub(delta);
                if bucket[index].remaining.is_zero() {
                    expired.push(bucket.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            expired
        };
        if !expired.is_empty() {
            let mut work = self.work_tasks.lock().unwrap();
            for task in expired {
                work.push(FrameTask::new(
                    task.descriptor.clone(),
                    task.descriptor.priority(),
                    task.body,
                ));
            }
        }

        // 3. The work pass: take the bucket, order it, run it to exhaustion.
        let mut work = {
            let mut bucket = self.work_tasks.lock().unwrap();
            std::mem::take(&mut *bucket)
        };
        work.sort_by_key(FrameTask::priority);
        self.executor.run_frame(work);
    }
}
