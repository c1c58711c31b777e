use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use fixedbitset::FixedBitSet;

use crate::component::Component;
use crate::family::Family;
use crate::HashSet;

/// Identifies one registered unit of recurring work.
///
/// Like [`Entity`](crate::entity::Entity), the handle packs a dense `id` with
/// a `version` tag so a handle to a retired schedule slot can be told apart
/// from the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId {
    id: u32,
    version: u32,
}

impl ScheduleId {
    pub(crate) fn new(id: u32, version: u32) -> Self {
        ScheduleId { id, version }
    }

    /// The dense slot index of this schedule.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }
}

/// The access sets a schedule has declared so far.
#[derive(Debug, Default, Clone)]
pub(crate) struct AccessSets {
    /// Component indices the schedule reads.
    pub reads: FixedBitSet,
    /// Component indices the schedule writes.
    pub writes: FixedBitSet,
    /// Explicit ordering constraints by schedule handle.
    pub depends_on: HashSet<ScheduleId>,
    /// Explicit ordering constraints by schedule name.
    pub depends_on_names: HashSet<String>,
}

/// The declared data-access footprint and ordering constraints of one
/// schedule.
///
/// Descriptors are mutable records: a schedule's body declares reads, writes,
/// families and explicit dependencies as it first executes, and may refine
/// them later. Every mutation bumps the descriptor version, which tells the
/// [`DependencyGraph`](super::DependencyGraph) that the schedule's node must
/// be rebuilt.
pub struct ScheduleDescriptor {
    schedule: ScheduleId,
    name: String,
    priority: i32,
    access: Mutex<AccessSets>,
    version: AtomicU64,
}

impl ScheduleDescriptor {
    pub(crate) fn new(schedule: ScheduleId, name: &str, priority: i32) -> Self {
        ScheduleDescriptor {
            schedule,
            name: name.to_string(),
            priority,
            access: Mutex::new(AccessSets::default()),
            version: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn schedule(&self) -> ScheduleId {
        self.schedule
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower priority values run earlier.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The mutation counter; bumped on every declared access or dependency.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Declares that this schedule reads component type `C`.
    pub fn declare_read<C: Component>(&self) {
        self.declare_read_index(C::index());
    }

    /// Declares a read of a component type by registry index.
    pub fn declare_read_index(&self, index: usize) {
        {
            let mut access = self.access.lock().unwrap();
            access.reads.grow(index + 1);
            access.reads.insert(index);
        }
        self.bump();
    }

    /// Declares that this schedule writes component type `C`.
    pub fn declare_write<C: Component>(&self) {
        self.declare_write_index(C::index());
    }

    /// Declares a write of a component type by registry index.
    pub fn declare_write_index(&self, index: usize) {
        {
            let mut access = self.access.lock().unwrap();
            access.writes.grow(index + 1);
            access.writes.insert(index);
        }
        self.bump();
    }

    /// Declares that this schedule reads a family: every component type the
    /// family's definition mentions is folded into the read set.
    pub fn declare_family_read(&self, family: &Family) {
        {
            let mut access = self.access.lock().unwrap();
            let indices = family.definition().component_indices();
            access.reads.union_with(&indices);
        }
        self.bump();
    }

    /// Declares that this schedule must run after `other`.
    pub fn depends_on(&self, other: ScheduleId) {
        {
            let mut access = self.access.lock().unwrap();
            access.depends_on.insert(other);
        }
        self.bump();
    }

    /// Declares that this schedule must run after the schedule registered
    /// under `name`.
    pub fn depends_on_name(&self, name: &str) {
        {
            let mut access = self.access.lock().unwrap();
            access.depends_on_names.insert(name.to_string());
        }
        self.bump();
    }

    pub(crate) fn access_snapshot(&self) -> AccessSets {
        self.access.lock().unwrap().clone()
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::{ScheduleDescriptor, ScheduleId};
    use crate::component::Component;
    use crate::define_component;

    define_component!(struct Heading(f32));
    define_component!(struct Speed(f32));

    #[test]
    fn every_mutation_bumps_the_version() {
        let descriptor = ScheduleDescriptor::new(ScheduleId::new(0, 1), "steering", 0);
        assert_eq!(descriptor.version(), 0);

        descriptor.declare_read::<Heading>();
        assert_eq!(descriptor.version(), 1);
        descriptor.declare_write::<Speed>();
        assert_eq!(descriptor.version(), 2);
        descriptor.depends_on(ScheduleId::new(1, 1));
        assert_eq!(descriptor.version(), 3);
        descriptor.depends_on_name("physics");
        assert_eq!(descriptor.version(), 4);

        // Re-declaring an existing access still counts as a mutation.
        descriptor.declare_read::<Heading>();
        assert_eq!(descriptor.version(), 5);
    }

    #[test]
    fn declared_accesses_land_in_the_snapshot() {
        let descriptor = ScheduleDescriptor::new(ScheduleId::new(0, 1), "steering", 0);
        descriptor.declare_read::<Heading>();
        descriptor.declare_write::<Speed>();
        descriptor.depends_on_name("physics");

        let access = descriptor.access_snapshot();
        assert!(access.reads.contains(Heading::index()));
        assert!(access.writes.contains(Speed::index()));
        assert!(!access.writes.contains(Heading::index()));
        assert!(access.depends_on_names.contains("physics"));
    }
}
