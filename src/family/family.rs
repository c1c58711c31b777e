use std::sync::RwLock;

use fixedbitset::FixedBitSet;

use super::FamilyDefinition;
use crate::entity::Entity;

type MembershipCallback = Box<dyn Fn(Entity) + Send + Sync>;

/// A cached set of entities matching one [`FamilyDefinition`].
///
/// Membership is seeded once when the family is created and from then on only
/// updated incrementally, one entity per lifecycle event — never recomputed
/// from scratch. Insertion/removal callbacks fire exactly on a membership
/// transition (never redundantly), after all internal locks are released.
pub struct Family {
    definition: FamilyDefinition,
    /// Member entity ids.
    members: RwLock<FixedBitSet>,
    inserted: RwLock<Vec<MembershipCallback>>,
    removed: RwLock<Vec<MembershipCallback>>,
}

impl Family {
    pub(crate) fn new(definition: FamilyDefinition) -> Self {
        Family {
            definition,
            members: RwLock::new(FixedBitSet::new()),
            inserted: RwLock::new(Vec::new()),
            removed: RwLock::new(Vec::new()),
        }
    }

    /// The predicate this family caches.
    #[must_use]
    pub fn definition(&self) -> &FamilyDefinition {
        &self.definition
    }

    /// Whether the entity is currently a member.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.members.read().unwrap().contains(entity.id() as usize)
    }

    /// A snapshot of the member entity ids, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        self.members
            .read()
            .unwrap()
            .ones()
            .map(|id| id as u32)
            .collect()
    }

    /// The number of member entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().unwrap().count_ones(..)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a callback fired whenever an entity enters the family.
    pub fn on_entity_inserted(&self, callback: impl Fn(Entity) + Send + Sync + 'static) {
        self.inserted.write().unwrap().push(Box::new(callback));
    }

    /// Registers a callback fired whenever an entity leaves the family.
    pub fn on_entity_removed(&self, callback: impl Fn(Entity) + Send + Sync + 'static) {
        self.removed.write().unwrap().push(Box::new(callback));
    }

    /// Re-evaluates a single entity against the definition and transitions it
    /// into or out of membership. Fires a notification only when the
    /// membership state actually changed.
    pub(crate) fn evaluate(&self, entity: Entity, bits: &FixedBitSet) {
        let matches = self.definition.matches(bits);
        let transition = {
            let mut members = self.members.write().unwrap();
            let index = entity.id() as usize;
            let had = members.contains(index);
            if matches == had {
                None
            } else {
                members.grow(index + 1);
                members.set(index, matches);
                Some(matches)
            }
        };
        match transition {
            Some(true) => self.fire(&self.inserted, entity),
            Some(false) => self.fire(&self.removed, entity),
            None => {}
        }
    }

    /// Drops a destroyed entity from membership, firing the removal
    /// notification when it was a member.
    pub(crate) fn discard(&self, entity: Entity) {
        let was_member = {
            let mut members = self.members.write().unwrap();
            let index = entity.id() as usize;
            let had = members.contains(index);
            if had {
                members.set(index, false);
            }
            had
        };
        if was_member {
            self.fire(&self.removed, entity);
        }
    }

    fn fire(&self, callbacks: &RwLock<Vec<MembershipCallback>>, entity: Entity) {
        let callbacks = callbacks.read().unwrap();
        for callback in callbacks.iter() {
            callback(entity);
        }
    }
}
