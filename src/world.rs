/*!

The assembly step. [`World`] wires the services together with plain
constructor injection — entity store, component store, family cache,
dependency graph, executor, dispatcher — registers the lifecycle observers
that keep component storage and families consistent, and offers thin
delegates for the common operations. Applications that need a different
wiring can perform the same steps by hand; nothing here is required by the
services themselves.

*/

use std::sync::Arc;
use std::time::Duration;

use crate::component::{Component, ComponentStore};
use crate::entity::{Entity, EntityStore};
use crate::error::OrreryError;
use crate::family::{Family, FamilyDefinition, FamilyStore};
use crate::schedule::{
    DependencyGraph, ExecutorConfig, FrameTaskExecutor, ScheduleDescriptor, ScheduleDispatcher,
};

/// A fully assembled runtime: one world, one frame loop.
pub struct World {
    entities: Arc<EntityStore>,
    components: Arc<ComponentStore>,
    families: Arc<FamilyStore>,
    dispatcher: ScheduleDispatcher,
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        World::with_config(ExecutorConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ExecutorConfig) -> Self {
        let entities = Arc::new(EntityStore::new());
        let components = Arc::new(ComponentStore::new(entities.clone()));
        let families = Arc::new(FamilyStore::new(entities.clone(), components.clone()));

        // Destruction order matters: the component sweep runs before families
        // drop the entity, so either observer sees a consistent store.
        entities.add_observer(components.clone());
        entities.add_observer(families.clone());
        components.add_observer(families.clone());

        let graph = Arc::new(DependencyGraph::new());
        let executor = FrameTaskExecutor::new(graph.clone(), config);
        let dispatcher = ScheduleDispatcher::new(graph, executor);

        World {
            entities,
            components,
            families,
            dispatcher,
        }
    }

    #[must_use]
    pub fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    #[must_use]
    pub fn components(&self) -> &Arc<ComponentStore> {
        &self.components
    }

    #[must_use]
    pub fn families(&self) -> &Arc<FamilyStore> {
        &self.families
    }

    #[must_use]
    pub fn dispatcher(&self) -> &ScheduleDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        self.dispatcher.graph()
    }

    pub fn create_entity(&self) -> Entity {
        self.entities.create()
    }

    pub fn remove_entity(&self, entity: Entity) -> Result<(), OrreryError> {
        self.entities.remove(entity)
    }

    pub fn set<C: Component>(&self, entity: Entity, value: C) -> Result<(), OrreryError> {
        self.components.set(entity, value)
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Result<C, OrreryError> {
        self.components.get(entity)
    }

    #[must_use]
    pub fn get_or_none<C: Component>(&self, entity: Entity) -> Option<C> {
        self.components.get_or_none(entity)
    }

    pub fn remove_component<C: Component>(&self, entity: Entity) -> Option<C> {
        self.components.remove(entity)
    }

    #[must_use]
    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        self.components.contains::<C>(entity)
    }

    #[must_use]
    pub fn family(&self, definition: FamilyDefinition) -> Arc<Family> {
        self.families.family(definition)
    }

    /// See [`ScheduleDispatcher::schedule`].
    #[must_use]
    pub fn schedule(
        &self,
        name: &str,
        priority: i32,
        body: impl FnOnce() + Send + 'static,
    ) -> Arc<ScheduleDescriptor> {
        self.dispatcher.schedule(name, priority, body)
    }

    /// Advances the world by one frame.
    pub fn update(&self, delta: Duration) {
        self.dispatcher.update(delta);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::World;
    use crate::family::FamilyDefinition;
    use crate::{define_component, define_tag_component};

    define_component!(struct Fuel(u32));
    define_tag_component!(Empty);

    #[test]
    fn assembled_world_keeps_families_current() {
        let world = World::new();
        let running = world.family(
            FamilyDefinition::new().with_all::<Fuel>().with_none::<Empty>(),
        );

        let tank = world.create_entity();
        world.set(tank, Fuel(100)).unwrap();
        assert!(running.contains(tank));

        world.set(tank, Empty).unwrap();
        assert!(!running.contains(tank));

        world.remove_entity(tank).unwrap();
        assert!(running.is_empty());
        assert_eq!(world.get_or_none::<Fuel>(tank), None);
    }

    #[test]
    fn schedules_run_through_update() {
        let world = World::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let _descriptor = {
            let ran = ran.clone();
            world.schedule("tick", 0, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        world.update(Duration::from_millis(16));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
