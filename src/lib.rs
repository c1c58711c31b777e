//! An entity-component-system runtime core
//!
//! Orrery manages entity identity, per-type component storage, cached
//! entity-set views ("families"), and the per-frame execution of registered
//! units of work ("schedules") whose declared component accesses let the
//! runtime run non-conflicting work in parallel.
//!
//! The central services are:
//! * [`EntityStore`] — allocates and recycles entity identifiers with a
//!   monotonically increasing version tag, so a recycled id never aliases a
//!   stale handle.
//! * [`ComponentStore`] — per-entity component-presence bitsets plus typed
//!   per-component-type storage, created lazily on first use.
//! * [`FamilyStore`] — caches entity sets matching an all/any/none component
//!   predicate, kept current incrementally from entity lifecycle events.
//! * [`DependencyGraph`] — derives which schedules must not run concurrently
//!   (declared read/write conflicts) or must run after others (explicit
//!   constraints).
//! * [`FrameTaskExecutor`] — drives one frame's tasks to completion across a
//!   coordinator thread and a bounded worker pool.
//! * [`ScheduleDispatcher`] — owns the main-thread/work/delayed task buckets
//!   and the per-frame [`update`](ScheduleDispatcher::update) entry point.
//!
//! An application assembles the services with plain constructor injection;
//! [`World`] is that assembly step packaged for convenience. Component types
//! are declared with [`define_component!`] / [`define_tag_component!`], which
//! assign each type a dense, process-stable index usable directly as a bit
//! position.

pub mod component;
pub mod entity;
pub mod error;
pub mod family;
pub mod log;
mod macros;
pub mod prelude;
pub mod schedule;
pub mod world;

// Re-exported for the expansion of the component macros.
pub use ctor;
pub use paste;

pub use crate::component::{Component, ComponentHolder, ComponentStore};
pub use crate::entity::{Entity, EntityObserver, EntityStore};
pub use crate::error::OrreryError;
pub use crate::family::{Family, FamilyDefinition, FamilyStore};
pub use crate::schedule::{
    DependencyGraph, ExecutorConfig, FrameTask, FrameTaskExecutor, ScheduleDescriptor,
    ScheduleDispatcher, ScheduleId,
};
pub use crate::world::World;

/// Hash containers used throughout the crate.
///
/// The standard library `HashMap` is randomly seeded; these variants hash
/// deterministically and faster for the small keys (indices, ids, names) we
/// store. `HashMap<K, V, S>` has no `new` method for a non-default hasher, so
/// use `HashMap::default()` to construct one.
pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
/// See [`HashMap`].
pub type HashSet<T> = rustc_hash::FxHashSet<T>;
