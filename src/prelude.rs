//! One-stop imports for the common surface of the crate.

pub use crate::component::{Component, ComponentHolder, ComponentStore};
pub use crate::entity::{Entity, EntityObserver, EntityStore};
pub use crate::error::OrreryError;
pub use crate::family::{Family, FamilyDefinition, FamilyStore};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::schedule::{
    DependencyGraph, ExecutionState, ExecutorConfig, FrameTask, FrameTaskExecutor,
    ScheduleDescriptor, ScheduleDispatcher, ScheduleId,
};
pub use crate::world::World;
pub use crate::{define_component, define_tag_component, impl_component};
