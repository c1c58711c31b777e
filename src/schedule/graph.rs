/*!

The dependency graph between schedules.

One [`ScheduleNode`] exists per registered schedule; it carries the edge sets
derived from the schedule's declared accesses and explicit constraints, plus
the atomic execution-state cell the frame executor drives through
`Pending → Ready → Running → Finished`.

Two kinds of edge are distinguished:

* **hard** — an explicit ordering constraint (`depends_on` /
  `depends_on_name`): the dependent must run after its dependency.
* **soft** — inferred from a data conflict (read/write or write/write on the
  same component index). Soft conflicts set the dependency bit in *both*
  directions, so the two schedules are mutually exclusive rather than
  strictly ordered; whichever the executor frees first runs first.

Edges are recomputed incrementally: a node is rebuilt only when its
descriptor's `(schedule, version)` stamp changed, and the node's reverse
`dependents` index lets the rebuild clear its old edges without a full
O(n²) rescan.

*/

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use fixedbitset::FixedBitSet;
use log::trace;

use super::descriptor::{AccessSets, ScheduleDescriptor, ScheduleId};

/// The per-frame lifecycle of a schedule's node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    Pending = 0,
    Ready = 1,
    Running = 2,
    Finished = 3,
}

impl ExecutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutionState::Pending,
            1 => ExecutionState::Ready,
            2 => ExecutionState::Running,
            3 => ExecutionState::Finished,
            _ => unreachable!("invalid execution state {value}"),
        }
    }
}

#[derive(Debug, Default)]
struct NodeEdges {
    /// Every schedule this one must wait for (soft and hard alike).
    dependencies: FixedBitSet,
    /// The explicit-constraint subset of `dependencies`.
    hard_dependencies: FixedBitSet,
    /// Reverse index: every schedule whose `dependencies` contain this one.
    dependents: FixedBitSet,
    /// The `(schedule, descriptor-version)` stamp the edges were built from.
    built: Option<(ScheduleId, u64)>,
}

/// A schedule's vertex in the dependency graph.
pub struct ScheduleNode {
    descriptor: Arc<ScheduleDescriptor>,
    edges: Mutex<NodeEdges>,
    state: AtomicU8,
}

impl ScheduleNode {
    fn new(descriptor: Arc<ScheduleDescriptor>) -> Self {
        ScheduleNode {
            descriptor,
            edges: Mutex::new(NodeEdges::default()),
            state: AtomicU8::new(ExecutionState::Pending as u8),
        }
    }

    #[must_use]
    pub fn schedule(&self) -> ScheduleId {
        self.descriptor.schedule()
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ScheduleDescriptor> {
        &self.descriptor
    }

    #[must_use]
    pub fn state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ExecutionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The one transition that must be a true compare-and-swap: whoever moves
    /// the node from `Ready` to `Running` owns the task body for this frame.
    pub(crate) fn try_begin_run(&self) -> bool {
        self.state
            .compare_exchange(
                ExecutionState::Ready as u8,
                ExecutionState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// A snapshot of every dependency (soft and hard).
    #[must_use]
    pub fn dependencies(&self) -> FixedBitSet {
        self.edges.lock().unwrap().dependencies.clone()
    }

    /// A snapshot of the explicit-constraint dependencies only.
    #[must_use]
    pub fn hard_dependencies(&self) -> FixedBitSet {
        self.edges.lock().unwrap().hard_dependencies.clone()
    }

    #[must_use]
    pub fn dependents(&self) -> FixedBitSet {
        self.edges.lock().unwrap().dependents.clone()
    }
}

/// Derives and maintains the "must-not-run-concurrently" / "must-run-after"
/// relation between registered schedules.
pub struct DependencyGraph {
    nodes: RwLock<Vec<Arc<ScheduleNode>>>,
    /// Serializes every structural (edge) mutation.
    structure: Mutex<()>,
    /// Counts actual edge recomputations, so no-op `update_dependencies`
    /// calls are observable.
    rebuilds: AtomicU64,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        DependencyGraph::new()
    }
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        DependencyGraph {
            nodes: RwLock::new(Vec::new()),
            structure: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Registers a schedule, allocating its id and node.
    #[must_use]
    pub fn declare(&self, name: &str, priority: i32) -> Arc<ScheduleDescriptor> {
        let mut nodes = self.nodes.write().unwrap();
        let schedule = ScheduleId::new(nodes.len() as u32, 1);
        let descriptor = Arc::new(ScheduleDescriptor::new(schedule, name, priority));
        nodes.push(Arc::new(ScheduleNode::new(descriptor.clone())));
        descriptor
    }

    /// Looks up the node for a schedule handle. A stale handle (version
    /// mismatch) resolves to `None`.
    #[must_use]
    pub fn node(&self, schedule: ScheduleId) -> Option<Arc<ScheduleNode>> {
        let nodes = self.nodes.read().unwrap();
        nodes
            .get(schedule.id() as usize)
            .filter(|node| node.schedule() == schedule)
            .cloned()
    }

    /// The number of registered schedules.
    #[must_use]
    pub fn schedule_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    /// The number of edge recomputations performed so far.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Acquire)
    }

    /// Brings the descriptor's node up to date with its declared accesses.
    ///
    /// A no-op (returning `false`) unless the descriptor's
    /// `(schedule, version)` stamp changed since the node was last built. On
    /// change: the node's old edges are cleared from every affected node via
    /// the reverse index, its own sets are reset, and one O(n) pass over all
    /// registered nodes recomputes the edges in both directions.
    pub fn update_dependencies(&self, descriptor: &ScheduleDescriptor) -> bool {
        let _structure = self.structure.lock().unwrap();

        let nodes: Vec<Arc<ScheduleNode>> = self.nodes.read().unwrap().clone();
        let schedule = descriptor.schedule();
        let slot = schedule.id() as usize;
        let Some(node) = nodes.get(slot).filter(|node| node.schedule() == schedule) else {
            return false;
        };

        let stamp = (schedule, descriptor.version());
        let (old_dependencies, old_dependents) = {
            let edges = node.edges.lock().unwrap();
            if edges.built == Some(stamp) {
                return false;
            }
            (edges.dependencies.clone(), edges.dependents.clone())
        };

        self.rebuilds.fetch_add(1, Ordering::AcqRel);
        trace!(
            "rebuilding dependencies of schedule '{}' (version {})",
            descriptor.name(),
            descriptor.version()
        );

        // Detach the stale edges. Nodes that depended on us have our bit in
        // their dependency sets; nodes we depended on have our bit in their
        // reverse index.
        for dependent in old_dependents.ones() {
            if let Some(other) = nodes.get(dependent) {
                let mut edges = other.edges.lock().unwrap();
                clear_bit(&mut edges.dependencies, slot);
                clear_bit(&mut edges.hard_dependencies, slot);
            }
        }
        for dependency in old_dependencies.ones() {
            if let Some(other) = nodes.get(dependency) {
                let mut edges = other.edges.lock().unwrap();
                clear_bit(&mut edges.dependents, slot);
            }
        }
        {
            let mut edges = node.edges.lock().unwrap();
            edges.dependencies.clear();
            edges.hard_dependencies.clear();
            edges.dependents.clear();
            edges.built = Some(stamp);
        }

        // One pass over all registered nodes, checking each pair in both
        // directions.
        let access = descriptor.access_snapshot();
        for (other_slot, other) in nodes.iter().enumerate() {
            if other_slot == slot {
                continue;
            }
            let other_descriptor = other.descriptor();
            let other_access = other_descriptor.access_snapshot();

            let we_depend_hard = is_explicit_dependency(&access, other_descriptor);
            let they_depend_hard = is_explicit_dependency(&other_access, descriptor);
            let conflict = accesses_conflict(&access, &other_access);

            if we_depend_hard || conflict {
                let mut edges = node.edges.lock().unwrap();
                set_bit(&mut edges.dependencies, other_slot);
                if we_depend_hard {
                    set_bit(&mut edges.hard_dependencies, other_slot);
                }
                drop(edges);
                let mut other_edges = other.edges.lock().unwrap();
                set_bit(&mut other_edges.dependents, slot);
            }
            if they_depend_hard || conflict {
                let mut other_edges = other.edges.lock().unwrap();
                set_bit(&mut other_edges.dependencies, slot);
                if they_depend_hard {
                    set_bit(&mut other_edges.hard_dependencies, slot);
                }
                drop(other_edges);
                let mut edges = node.edges.lock().unwrap();
                set_bit(&mut edges.dependents, other_slot);
            }
        }

        true
    }
}

/// Whether `access` names `dependency` as an explicit (hard) dependency,
/// either by schedule handle or by name.
fn is_explicit_dependency(access: &AccessSets, dependency: &ScheduleDescriptor) -> bool {
    access.depends_on.contains(&dependency.schedule())
        || access.depends_on_names.contains(dependency.name())
}

/// The data-conflict rule: a read/write or write/write overlap on any
/// component index makes the two schedules mutually exclusive.
fn accesses_conflict(a: &AccessSets, b: &AccessSets) -> bool {
    !a.reads.is_disjoint(&b.writes)
        || !a.writes.is_disjoint(&b.reads)
        || !a.writes.is_disjoint(&b.writes)
}

fn set_bit(bits: &mut FixedBitSet, index: usize) {
    bits.grow(index + 1);
    bits.insert(index);
}

fn clear_bit(bits: &mut FixedBitSet, index: usize) {
    if index < bits.len() {
        bits.set(index, false);
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyGraph, ExecutionState};
    use crate::component::Component;
    use crate::define_component;

    define_component!(struct Translation(f32));
    define_component!(struct Rotation(f32));
    define_component!(struct Scale(f32));

    #[test]
    fn read_write_conflict_is_mutual() {
        let graph = DependencyGraph::new();
        let writer = graph.declare("writer", 0);
        let reader = graph.declare("reader", 0);
        writer.declare_write::<Translation>();
        reader.declare_read::<Translation>();

        graph.update_dependencies(&writer);
        graph.update_dependencies(&reader);

        let writer_node = graph.node(writer.schedule()).unwrap();
        let reader_node = graph.node(reader.schedule()).unwrap();

        // Both directions: the two are mutually exclusive, either order.
        assert!(writer_node
            .dependencies()
            .contains(reader.schedule().id() as usize));
        assert!(reader_node
            .dependencies()
            .contains(writer.schedule().id() as usize));
        // But neither direction is a hard constraint.
        assert!(writer_node.hard_dependencies().is_clear());
        assert!(reader_node.hard_dependencies().is_clear());
    }

    #[test]
    fn write_write_conflict_is_mutual() {
        let graph = DependencyGraph::new();
        let a = graph.declare("a", 0);
        let b = graph.declare("b", 0);
        a.declare_write::<Rotation>();
        b.declare_write::<Rotation>();

        graph.update_dependencies(&a);
        graph.update_dependencies(&b);

        let node_a = graph.node(a.schedule()).unwrap();
        let node_b = graph.node(b.schedule()).unwrap();
        assert!(node_a.dependencies().contains(b.schedule().id() as usize));
        assert!(node_b.dependencies().contains(a.schedule().id() as usize));
    }

    #[test]
    fn disjoint_accesses_create_no_edges() {
        let graph = DependencyGraph::new();
        let a = graph.declare("a", 0);
        let b = graph.declare("b", 0);
        a.declare_write::<Translation>();
        b.declare_read::<Rotation>();
        // Two readers of the same component do not conflict either.
        a.declare_read::<Scale>();
        b.declare_read::<Scale>();

        graph.update_dependencies(&a);
        graph.update_dependencies(&b);

        assert!(graph.node(a.schedule()).unwrap().dependencies().is_clear());
        assert!(graph.node(b.schedule()).unwrap().dependencies().is_clear());
    }

    #[test]
    fn explicit_dependencies_are_hard_and_one_directional() {
        let graph = DependencyGraph::new();
        let first = graph.declare("first", 0);
        let second = graph.declare("second", 0);
        let third = graph.declare("third", 0);
        second.depends_on(first.schedule());
        third.depends_on_name("second");

        graph.update_dependencies(&first);
        graph.update_dependencies(&second);
        graph.update_dependencies(&third);

        let second_node = graph.node(second.schedule()).unwrap();
        assert!(second_node
            .hard_dependencies()
            .contains(first.schedule().id() as usize));
        // Hard edges point one way.
        let first_node = graph.node(first.schedule()).unwrap();
        assert!(!first_node
            .dependencies()
            .contains(second.schedule().id() as usize));
        assert!(first_node
            .dependents()
            .contains(second.schedule().id() as usize));

        let third_node = graph.node(third.schedule()).unwrap();
        assert!(third_node
            .hard_dependencies()
            .contains(second.schedule().id() as usize));
    }

    #[test]
    fn update_is_idempotent_per_version() {
        let graph = DependencyGraph::new();
        let a = graph.declare("a", 0);
        a.declare_write::<Translation>();

        assert!(graph.update_dependencies(&a));
        let rebuilds = graph.rebuild_count();

        // Unchanged version: no recomputation.
        assert!(!graph.update_dependencies(&a));
        assert!(!graph.update_dependencies(&a));
        assert_eq!(graph.rebuild_count(), rebuilds);

        // A new mutation makes the next update real again.
        a.declare_read::<Rotation>();
        assert!(graph.update_dependencies(&a));
        assert_eq!(graph.rebuild_count(), rebuilds + 1);
    }

    #[test]
    fn rebuilds_keep_edges_consistent() {
        let graph = DependencyGraph::new();
        let a = graph.declare("a", 0);
        let b = graph.declare("b", 0);
        a.declare_write::<Translation>();
        b.declare_read::<Translation>();
        graph.update_dependencies(&a);
        graph.update_dependencies(&b);

        let node_a = graph.node(a.schedule()).unwrap();
        let node_b = graph.node(b.schedule()).unwrap();
        assert!(node_a.dependencies().contains(b.schedule().id() as usize));

        // Another mutation on `b` forces its node through the
        // clear-and-recompute path; the surviving conflict must come out the
        // other side intact, with the reverse indexes still agreeing.
        b.declare_read::<Scale>();
        graph.update_dependencies(&b);
        assert!(node_a.dependencies().contains(b.schedule().id() as usize));
        assert!(node_b.dependencies().contains(a.schedule().id() as usize));
        assert!(node_a.dependents().contains(b.schedule().id() as usize));
        assert!(node_b.dependents().contains(a.schedule().id() as usize));

        // A brand-new writer conflicts with both; its rebuild leaves the
        // existing edges between a and b alone.
        let c = graph.declare("c", 0);
        c.declare_write::<Translation>();
        graph.update_dependencies(&c);
        assert!(node_a.dependencies().contains(c.schedule().id() as usize));
        assert!(node_b.dependencies().contains(c.schedule().id() as usize));
        assert!(node_a.dependencies().contains(b.schedule().id() as usize));
    }

    #[test]
    fn state_machine_cas_guards_running() {
        let graph = DependencyGraph::new();
        let a = graph.declare("a", 0);
        let node = graph.node(a.schedule()).unwrap();

        assert_eq!(node.state(), ExecutionState::Pending);
        // Not ready yet: the CAS must fail.
        assert!(!node.try_begin_run());

        node.set_state(ExecutionState::Ready);
        assert!(node.try_begin_run());
        assert_eq!(node.state(), ExecutionState::Running);
        // A second claimant loses.
        assert!(!node.try_begin_run());

        node.set_state(ExecutionState::Finished);
        assert_eq!(node.state(), ExecutionState::Finished);
    }
}
