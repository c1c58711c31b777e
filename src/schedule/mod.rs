/*!

Schedules and their frame-time execution.

A schedule is a registered, recurring unit of work identified by a
[`ScheduleId`]. Its [`ScheduleDescriptor`] records the data-access footprint
the schedule has declared — component reads and writes, family reads,
explicit ordering constraints — and the [`DependencyGraph`] turns those
declarations into "must-run-after" (hard) and "must-not-run-concurrently"
(soft) edges between schedules.

Each frame, the [`ScheduleDispatcher`] collects the queued work and the
[`FrameTaskExecutor`] drives it to exhaustion: non-conflicting tasks run in
parallel on a bounded worker pool, conflicting tasks are serialized by the
graph's edges, and the ordering guarantee — two schedules with a declared
read/write or write/write conflict are never running at the same instant —
is enforced purely by the dependency graph and the node state machine, not
by locks on component storage.

*/

pub mod descriptor;
pub mod dispatcher;
pub mod executor;
pub mod graph;

pub use descriptor::{ScheduleDescriptor, ScheduleId};
pub use dispatcher::ScheduleDispatcher;
pub use executor::{ExecutorConfig, FrameTask, FrameTaskExecutor};
pub use graph::{DependencyGraph, ExecutionState, ScheduleNode};
