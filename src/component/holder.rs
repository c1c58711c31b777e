/*!

Typed per-component-type storage. One [`ComponentHolder<C>`] owns the mapping
entity-id → component value for a single component type: a hash map keyed by
entity id in the general case, a plain bitset for zero-payload tag types.
Holders sit behind a type-erased boundary ([`ErasedHolder`]) so the
[`ComponentStore`][super::ComponentStore] can keep them all in one
index-addressed vector.

Holders are internally locked so they can be shared across worker threads,
but correctness does not depend on those locks: the frame scheduler never
runs two schedules with conflicting declared accesses at the same time, so
the locks are uncontended by construction.

*/

use std::any::Any;
use std::sync::{Arc, RwLock};

use fixedbitset::FixedBitSet;

use super::Component;
use crate::error::OrreryError;
use crate::HashMap;

enum HolderState<C> {
    /// General map-backed storage.
    Values(HashMap<u32, C>),
    /// Presence bits for zero-payload tag types.
    Tags(FixedBitSet),
}

/// Storage for every value of one component type.
pub struct ComponentHolder<C: Component> {
    index: usize,
    state: RwLock<HolderState<C>>,
}

impl<C: Component> Default for ComponentHolder<C> {
    fn default() -> Self {
        ComponentHolder::new()
    }
}

impl<C: Component> ComponentHolder<C> {
    #[must_use]
    pub fn new() -> Self {
        let state = if C::TAG {
            HolderState::Tags(FixedBitSet::new())
        } else {
            HolderState::Values(HashMap::default())
        };
        ComponentHolder {
            index: C::index(),
            state: RwLock::new(state),
        }
    }

    /// Stores `value` for the entity id, replacing any previous value. The
    /// detach callback runs on the replaced value, then the attach callback
    /// on the new one; both run after the storage lock is released.
    pub fn set(&self, id: u32, value: C) {
        let replaced = {
            let mut state = self.state.write().unwrap();
            match &mut *state {
                HolderState::Values(values) => values.insert(id, value.clone()),
                HolderState::Tags(members) => {
                    let had = members.contains(id as usize);
                    members.grow(id as usize + 1);
                    members.insert(id as usize);
                    had.then(C::tag_instance)
                }
            }
        };
        if let Some(previous) = replaced {
            previous.on_detach();
        }
        value.on_attach();
    }

    /// Fetches the value for the entity id, or errs with `MissingComponent`
    /// when absent.
    pub fn get(&self, id: u32) -> Result<C, OrreryError> {
        self.get_or_none(id).ok_or_else(|| {
            OrreryError::MissingComponent(format!("entity {id} has no {}", C::name()))
        })
    }

    /// Fetches the value for the entity id, reporting absence as `None`.
    #[must_use]
    pub fn get_or_none(&self, id: u32) -> Option<C> {
        let state = self.state.read().unwrap();
        match &*state {
            HolderState::Values(values) => values.get(&id).cloned(),
            HolderState::Tags(members) => members.contains(id as usize).then(C::tag_instance),
        }
    }

    /// Removes and returns the value for the entity id. Absence is reported
    /// as `None`, not an error. The detach callback runs on the removed
    /// value.
    pub fn remove(&self, id: u32) -> Option<C> {
        let removed = {
            let mut state = self.state.write().unwrap();
            match &mut *state {
                HolderState::Values(values) => values.remove(&id),
                HolderState::Tags(members) => {
                    let had = members.contains(id as usize);
                    if had {
                        members.set(id as usize, false);
                    }
                    had.then(C::tag_instance)
                }
            }
        };
        if let Some(value) = &removed {
            value.on_detach();
        }
        removed
    }

    /// Whether a value is stored for the entity id.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        let state = self.state.read().unwrap();
        match &*state {
            HolderState::Values(values) => values.contains_key(&id),
            HolderState::Tags(members) => members.contains(id as usize),
        }
    }

    /// The number of entities holding this component.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap();
        match &*state {
            HolderState::Values(values) => values.len(),
            HolderState::Tags(members) => members.count_ones(..),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The type-erased face of a [`ComponentHolder`], used by the store's
/// index-addressed holder vector and the entity destruction sweep.
pub(crate) trait ErasedHolder: Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// The component-type index this holder was created for.
    fn type_index(&self) -> usize;

    /// Drops the value stored for the entity id, if any, running the detach
    /// callback.
    fn discard(&self, id: u32);
}

impl<C: Component> ErasedHolder for ComponentHolder<C> {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_index(&self) -> usize {
        self.index
    }

    fn discard(&self, id: u32) {
        let _ = self.remove(id);
    }
}
