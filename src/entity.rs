/*!

Entity identity. An [`Entity`] is a plain `(id, version)` handle: the `id`
indexes storage arrays throughout the crate, and the `version` invalidates
stale handles after an id has been recycled. The [`EntityStore`] owns the
live set, the per-id version array and the recycle list, and is the source of
entity lifecycle notifications.

*/

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use fixedbitset::FixedBitSet;

use crate::error::OrreryError;

/// An opaque handle identifying one runtime object.
///
/// A handle is "live" iff the store's live set contains its `id` *and* the
/// stored version for that id equals the handle's version. Handles held after
/// [`EntityStore::remove`] fail that check forever: the version is upgraded
/// before the id is handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: u32,
    version: u32,
}

impl Entity {
    pub(crate) fn new(id: u32, version: u32) -> Self {
        Entity { id, version }
    }

    /// The dense storage index of this entity.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The generation tag distinguishing this entity from earlier users of
    /// the same id.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Receives entity lifecycle notifications.
///
/// Observers are registered once during assembly and invoked outside of any
/// store lock, so an observer may freely call back into the stores. All
/// methods default to no-ops; implementors override the events they care
/// about.
pub trait EntityObserver: Send + Sync {
    /// A new entity was created.
    fn entity_created(&self, _entity: Entity) {}
    /// An entity's component set changed.
    fn entity_updated(&self, _entity: Entity) {}
    /// An entity was removed and its id queued for recycling.
    fn entity_destroyed(&self, _entity: Entity) {}
}

struct StoreState {
    /// Ids currently live.
    live: FixedBitSet,
    /// Stored version per allocated id. An id is "allocated" once it has a
    /// slot here, whether currently live or recycled.
    versions: Vec<u32>,
    /// Ids available for reuse, oldest first.
    recycled: VecDeque<u32>,
}

impl StoreState {
    fn is_live(&self, entity: Entity) -> bool {
        let id = entity.id as usize;
        self.live.contains(id) && self.versions[id] == entity.version
    }
}

/// Allocates and recycles entity identifiers.
///
/// All mutation paths serialize on the writer side of one coarse lock;
/// [`contains`](EntityStore::contains) and [`get`](EntityStore::get) only take
/// the shared side and never contend with each other.
pub struct EntityStore {
    state: RwLock<StoreState>,
    observers: RwLock<Vec<Arc<dyn EntityObserver>>>,
}

impl Default for EntityStore {
    fn default() -> Self {
        EntityStore::new()
    }
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        EntityStore {
            state: RwLock::new(StoreState {
                live: FixedBitSet::new(),
                versions: Vec::new(),
                recycled: VecDeque::new(),
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a lifecycle observer. Observers are notified in registration
    /// order.
    pub fn add_observer(&self, observer: Arc<dyn EntityObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Creates a new entity, reusing a recycled id when one is available.
    ///
    /// The stored version is incremented before the handle is returned, so a
    /// removed-then-recreated id never aliases an old handle.
    pub fn create(&self) -> Entity {
        let entity = {
            let mut state = self.state.write().unwrap();
            let id = match state.recycled.pop_front() {
                Some(id) => id,
                None => {
                    state.versions.push(0);
                    (state.versions.len() - 1) as u32
                }
            };
            Self::activate(&mut state, id)
        };
        self.notify(|observer| observer.entity_created(entity));
        entity
    }

    /// Creates an entity with an explicit id.
    ///
    /// Ids beyond the current capacity are first materialized as
    /// pre-recycled, so sparse explicit ids do not force dense allocation.
    /// Fails if the requested id is currently live.
    pub fn create_at(&self, id: u32) -> Result<Entity, OrreryError> {
        let entity = {
            let mut state = self.state.write().unwrap();
            let index = id as usize;
            if index < state.versions.len() {
                if state.live.contains(index) {
                    return Err(OrreryError::OrreryError(format!(
                        "entity id {id} is already live"
                    )));
                }
                // The id is allocated but inactive, so it is sitting in the
                // recycle list; claim it.
                state.recycled.retain(|&recycled| recycled != id);
            } else {
                // Materialize every intermediate id as pre-recycled, then the
                // requested one.
                for intermediate in state.versions.len()..index {
                    state.versions.push(0);
                    state.recycled.push_back(intermediate as u32);
                }
                state.versions.push(0);
            }
            Self::activate(&mut state, id)
        };
        self.notify(|observer| observer.entity_created(entity));
        Ok(entity)
    }

    /// Upgrades the stored version for `id` and marks it live. Callers hold
    /// the write lock and guarantee the id is allocated and inactive.
    fn activate(state: &mut StoreState, id: u32) -> Entity {
        let index = id as usize;
        state.versions[index] += 1;
        state.live.grow(index + 1);
        state.live.insert(index);
        Entity::new(id, state.versions[index])
    }

    /// Whether the handle refers to a live entity (id live and version
    /// current).
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        let state = self.state.read().unwrap();
        (entity.id as usize) < state.versions.len() && state.is_live(entity)
    }

    /// Returns the current handle for `id`, live or not. Errs on an id that
    /// was never allocated.
    pub fn get(&self, id: u32) -> Result<Entity, OrreryError> {
        let state = self.state.read().unwrap();
        match state.versions.get(id as usize) {
            Some(&version) => Ok(Entity::new(id, version)),
            None => Err(OrreryError::OutOfRange(format!(
                "entity id {id} is beyond the allocated range ({} ids)",
                state.versions.len()
            ))),
        }
    }

    /// Removes an entity. A stale handle (version mismatch, or id already
    /// inactive) is a no-op; an id that was never allocated is an error.
    pub fn remove(&self, entity: Entity) -> Result<(), OrreryError> {
        {
            let mut state = self.state.write().unwrap();
            let index = entity.id as usize;
            if index >= state.versions.len() {
                return Err(OrreryError::OutOfRange(format!(
                    "entity id {} is beyond the allocated range ({} ids)",
                    entity.id,
                    state.versions.len()
                )));
            }
            if !state.is_live(entity) {
                return Ok(());
            }
            state.live.set(index, false);
            state.recycled.push_back(entity.id);
        }
        self.notify(|observer| observer.entity_destroyed(entity));
        Ok(())
    }

    /// Removes every live entity. Versions are retained, so handles from
    /// before the clear can never alias entities created after it.
    pub fn clear(&self) {
        let removed = {
            let mut state = self.state.write().unwrap();
            let removed: Vec<Entity> = state
                .live
                .ones()
                .map(|id| Entity::new(id as u32, state.versions[id]))
                .collect();
            state.live.clear();
            state.recycled = (0..state.versions.len() as u32).collect();
            removed
        };
        for entity in removed {
            self.notify(|observer| observer.entity_destroyed(entity));
        }
    }

    /// The number of currently live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.read().unwrap().live.count_ones(..)
    }

    /// A snapshot of every live entity.
    #[must_use]
    pub fn live_entities(&self) -> Vec<Entity> {
        let state = self.state.read().unwrap();
        state
            .live
            .ones()
            .map(|id| Entity::new(id as u32, state.versions[id]))
            .collect()
    }

    /// Invokes `event` on every registered observer, outside the state lock.
    fn notify(&self, event: impl Fn(&dyn EntityObserver)) {
        let observers: Vec<Arc<dyn EntityObserver>> =
            self.observers.read().unwrap().iter().cloned().collect();
        for observer in &observers {
            event(observer.as_ref());
        }
    }
}
