/*!

The [`ComponentStore`] ties component storage to entity identity: it owns the
per-entity presence bitsets, lazily creates one holder per component type
(memoized by the type's registry index), checks entity liveness on every
access, and notifies observers when an entity's component set changes. It
also implements the destruction sweep that drops a removed entity's
components, so recycled ids never inherit stale data.

*/

use std::sync::{Arc, RwLock};

use fixedbitset::FixedBitSet;

use super::holder::ErasedHolder;
use super::{registry, Component, ComponentHolder};
use crate::entity::{Entity, EntityObserver, EntityStore};
use crate::error::OrreryError;

/// Per-entity component-presence bitsets plus typed per-component-type
/// storage.
pub struct ComponentStore {
    entities: Arc<EntityStore>,
    /// Presence bits per entity id; the backing vector auto-grows.
    bits: RwLock<Vec<FixedBitSet>>,
    /// Holders by component-type index, created on first use.
    holders: RwLock<Vec<Option<Arc<dyn ErasedHolder>>>>,
    observers: RwLock<Vec<Arc<dyn EntityObserver>>>,
}

impl ComponentStore {
    #[must_use]
    pub fn new(entities: Arc<EntityStore>) -> Self {
        ComponentStore {
            entities,
            bits: RwLock::new(Vec::new()),
            holders: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Registers an observer notified after every component-set change.
    pub fn add_observer(&self, observer: Arc<dyn EntityObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// The component-presence bits of an entity, by id. Entities that never
    /// had a component report an empty set.
    #[must_use]
    pub fn component_bits(&self, entity: Entity) -> FixedBitSet {
        let bits = self.bits.read().unwrap();
        bits.get(entity.id() as usize).cloned().unwrap_or_default()
    }

    /// Fetches the holder for component type `C`, creating it on first use.
    /// Holders are memoized by the type's registry index.
    ///
    /// # Panics
    ///
    /// Panics if the memoized holder at `C`'s index was created for a
    /// different type index; that can only happen when a component type was
    /// registered incorrectly (i.e., not through
    /// [`define_component!`][crate::define_component]).
    #[must_use]
    pub fn holder<C: Component>(&self) -> Arc<ComponentHolder<C>> {
        let index = C::index();

        if let Some(holder) = self.lookup_holder::<C>(index) {
            return holder;
        }

        // First use of this component type: create and memoize, re-checking
        // under the write lock in case another thread won the race.
        let mut holders = self.holders.write().unwrap();
        if holders.len() <= index {
            holders.resize_with(index + 1, || None);
        }
        let erased = holders[index]
            .get_or_insert_with(|| Arc::new(ComponentHolder::<C>::new()))
            .clone();
        drop(holders);
        Self::downcast_holder::<C>(index, erased)
    }

    fn lookup_holder<C: Component>(&self, index: usize) -> Option<Arc<ComponentHolder<C>>> {
        let holders = self.holders.read().unwrap();
        let erased = holders.get(index)?.clone()?;
        Some(Self::downcast_holder::<C>(index, erased))
    }

    fn downcast_holder<C: Component>(
        index: usize,
        erased: Arc<dyn ErasedHolder>,
    ) -> Arc<ComponentHolder<C>> {
        assert_eq!(
            erased.type_index(),
            index,
            "holder at index {index} does not match registered component type {}. You must use the `define_component!` macro to create a component.",
            C::name()
        );
        erased
            .as_any_arc()
            .downcast::<ComponentHolder<C>>()
            .unwrap_or_else(|_| {
                panic!(
                    "holder at index {index} does not match registered component type {}. You must use the `define_component!` macro to create a component.",
                    C::name()
                )
            })
    }

    /// Attaches `value` to the entity, replacing any previous value of that
    /// type. Errs on a stale handle.
    pub fn set<C: Component>(&self, entity: Entity, value: C) -> Result<(), OrreryError> {
        if !self.entities.contains(entity) {
            return Err(OrreryError::StaleEntity(entity));
        }
        self.holder::<C>().set(entity.id(), value);
        self.set_bit(entity.id(), C::index(), true);
        self.notify_updated(entity);
        Ok(())
    }

    /// Fetches the entity's value of component type `C`. Errs with
    /// `StaleEntity` on a dead handle and `MissingComponent` on absence.
    pub fn get<C: Component>(&self, entity: Entity) -> Result<C, OrreryError> {
        if !self.entities.contains(entity) {
            return Err(OrreryError::StaleEntity(entity));
        }
        self.holder::<C>().get(entity.id())
    }

    /// Fetches the entity's value of component type `C`, reporting absence
    /// (or a dead handle) as `None`.
    #[must_use]
    pub fn get_or_none<C: Component>(&self, entity: Entity) -> Option<C> {
        if !self.entities.contains(entity) {
            return None;
        }
        self.holder::<C>().get_or_none(entity.id())
    }

    /// Detaches and returns the entity's value of component type `C`.
    /// Absence, like a dead handle, is reported as `None`.
    pub fn remove<C: Component>(&self, entity: Entity) -> Option<C> {
        if !self.entities.contains(entity) {
            return None;
        }
        let removed = self.holder::<C>().remove(entity.id());
        if removed.is_some() {
            self.set_bit(entity.id(), C::index(), false);
            self.notify_updated(entity);
        }
        removed
    }

    /// Whether the (live) entity currently has component type `C`.
    #[must_use]
    pub fn contains<C: Component>(&self, entity: Entity) -> bool {
        self.entities.contains(entity) && {
            let bits = self.bits.read().unwrap();
            bits.get(entity.id() as usize)
                .is_some_and(|entity_bits| entity_bits.contains(C::index()))
        }
    }

    fn set_bit(&self, id: u32, index: usize, enabled: bool) {
        let mut bits = self.bits.write().unwrap();
        let slot = id as usize;
        if bits.len() <= slot {
            bits.resize_with(slot + 1, FixedBitSet::new);
        }
        bits[slot].grow(index + 1);
        bits[slot].set(index, enabled);
    }

    /// Drops every component of the entity id: detach callbacks run, presence
    /// bits are cleared, and no update notifications fire (destruction is
    /// reported through the entity lifecycle instead).
    fn sweep(&self, id: u32) {
        let present = {
            let bits = self.bits.read().unwrap();
            match bits.get(id as usize) {
                Some(entity_bits) => entity_bits.clone(),
                None => return,
            }
        };
        {
            let holders = self.holders.read().unwrap();
            for index in present.ones() {
                if let Some(Some(holder)) = holders.get(index) {
                    holder.discard(id);
                } else {
                    log::error!(
                        "no holder for component index {index} ({:?}) while sweeping entity {id}",
                        registry::component_name(index)
                    );
                }
            }
        }
        let mut bits = self.bits.write().unwrap();
        if let Some(entity_bits) = bits.get_mut(id as usize) {
            entity_bits.clear();
        }
    }

    fn notify_updated(&self, entity: Entity) {
        let observers: Vec<Arc<dyn EntityObserver>> =
            self.observers.read().unwrap().iter().cloned().collect();
        for observer in &observers {
            observer.entity_updated(entity);
        }
    }
}

impl EntityObserver for ComponentStore {
    fn entity_destroyed(&self, entity: Entity) {
        self.sweep(entity.id());
    }
}
