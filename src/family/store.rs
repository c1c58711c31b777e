use std::sync::{Arc, Mutex};

use log::trace;

use super::{Family, FamilyDefinition};
use crate::component::ComponentStore;
use crate::entity::{Entity, EntityObserver, EntityStore};
use crate::HashMap;

/// The family cache.
///
/// Families are deduplicated by structural [`FamilyDefinition`] equality: the
/// first request for a definition builds the family and seeds it by
/// evaluating every currently-live entity once; every later request for an
/// equal definition returns the cached instance. Registered as an entity
/// observer, the store keeps every cached family current at a cost of
/// O(#families) per lifecycle event.
pub struct FamilyStore {
    entities: Arc<EntityStore>,
    components: Arc<ComponentStore>,
    families: Mutex<HashMap<FamilyDefinition, Arc<Family>>>,
}

impl FamilyStore {
    #[must_use]
    pub fn new(entities: Arc<EntityStore>, components: Arc<ComponentStore>) -> Self {
        FamilyStore {
            entities,
            components,
            families: Mutex::new(HashMap::default()),
        }
    }

    /// Fetches the family for `definition`, building and seeding it on the
    /// first request.
    #[must_use]
    pub fn family(&self, definition: FamilyDefinition) -> Arc<Family> {
        let mut families = self.families.lock().unwrap();
        if let Some(family) = families.get(&definition) {
            return family.clone();
        }

        trace!("seeding new family {definition:?}");
        let family = Arc::new(Family::new(definition.clone()));
        for entity in self.entities.live_entities() {
            family.evaluate(entity, &self.components.component_bits(entity));
        }
        families.insert(definition, family.clone());
        family
    }

    /// The number of distinct cached families.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.lock().unwrap().len()
    }

    /// A snapshot of the cached families, taken so lifecycle fan-out runs
    /// without holding the cache lock.
    fn snapshot(&self) -> Vec<Arc<Family>> {
        self.families.lock().unwrap().values().cloned().collect()
    }

    fn reevaluate(&self, entity: Entity) {
        let bits = self.components.component_bits(entity);
        for family in self.snapshot() {
            family.evaluate(entity, &bits);
        }
    }
}

impl EntityObserver for FamilyStore {
    fn entity_created(&self, entity: Entity) {
        self.reevaluate(entity);
    }

    fn entity_updated(&self, entity: Entity) {
        self.reevaluate(entity);
    }

    fn entity_destroyed(&self, entity: Entity) {
        for family in self.snapshot() {
            family.discard(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::FamilyStore;
    use crate::component::ComponentStore;
    use crate::entity::EntityStore;
    use crate::family::FamilyDefinition;
    use crate::{define_component, define_tag_component};

    define_component!(struct Health(u32));
    define_component!(struct Mana(u32));
    define_tag_component!(Dead);

    struct Fixture {
        entities: Arc<EntityStore>,
        components: Arc<ComponentStore>,
        families: Arc<FamilyStore>,
    }

    fn fixture() -> Fixture {
        let entities = Arc::new(EntityStore::new());
        let components = Arc::new(ComponentStore::new(entities.clone()));
        let families = Arc::new(FamilyStore::new(entities.clone(), components.clone()));
        entities.add_observer(components.clone());
        entities.add_observer(families.clone());
        components.add_observer(families.clone());
        Fixture {
            entities,
            components,
            families,
        }
    }

    #[test]
    fn structurally_equal_definitions_share_a_family() {
        let fx = fixture();
        let a = fx
            .families
            .family(FamilyDefinition::new().with_all::<Health>().with_none::<Dead>());
        let b = fx
            .families
            .family(FamilyDefinition::new().with_none::<Dead>().with_all::<Health>());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fx.families.family_count(), 1);
    }

    #[test]
    fn families_seed_from_live_entities() {
        let fx = fixture();
        let healthy = fx.entities.create();
        fx.components.set(healthy, Health(10)).unwrap();
        let dead = fx.entities.create();
        fx.components.set(dead, Health(0)).unwrap();
        fx.components.set(dead, Dead).unwrap();

        let family = fx
            .families
            .family(FamilyDefinition::new().with_all::<Health>().with_none::<Dead>());
        assert!(family.contains(healthy));
        assert!(!family.contains(dead));
        assert_eq!(family.len(), 1);
    }

    #[test]
    fn membership_follows_component_changes() {
        let fx = fixture();
        let family = fx
            .families
            .family(FamilyDefinition::new().with_all::<Health>().with_none::<Dead>());

        let inserted = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        {
            let inserted = inserted.clone();
            family.on_entity_inserted(move |_| {
                inserted.fetch_add(1, Ordering::Relaxed);
            });
        }
        {
            let removed = removed.clone();
            family.on_entity_removed(move |_| {
                removed.fetch_add(1, Ordering::Relaxed);
            });
        }

        let entity = fx.entities.create();
        fx.components.set(entity, Health(5)).unwrap();
        assert!(family.contains(entity));

        fx.components.set(entity, Dead).unwrap();
        assert!(!family.contains(entity));

        fx.components.remove::<Dead>(entity);
        assert!(family.contains(entity));

        // Three transitions, three notifications, no duplicates.
        assert_eq!(inserted.load(Ordering::Relaxed), 2);
        assert_eq!(removed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn destroyed_entities_leave_their_families() {
        let fx = fixture();
        let family = fx.families.family(FamilyDefinition::new().with_all::<Health>());
        let entity = fx.entities.create();
        fx.components.set(entity, Health(1)).unwrap();
        assert!(family.contains(entity));

        fx.entities.remove(entity).unwrap();
        assert!(!family.contains(entity));
        assert!(family.is_empty());
    }

    #[test]
    fn empty_definition_tracks_the_whole_population() {
        let fx = fixture();
        let everyone = fx.families.family(FamilyDefinition::new());
        let a = fx.entities.create();
        let b = fx.entities.create();
        assert_eq!(everyone.len(), 2);

        fx.entities.remove(a).unwrap();
        assert_eq!(everyone.len(), 1);
        assert!(everyone.contains(b));
    }

    // Randomized add/remove sequences: membership must always equal the
    // brute-force predicate applied to the entity's current component bits.
    #[test]
    fn randomized_membership_matches_brute_force() {
        let fx = fixture();
        let mut rng = SmallRng::seed_from_u64(0x0ddba11);

        let definitions = [
            FamilyDefinition::new().with_all::<Health>(),
            FamilyDefinition::new().with_all::<Health>().with_none::<Dead>(),
            FamilyDefinition::new().with_any::<Health>().with_any::<Mana>(),
            FamilyDefinition::new().with_all::<Mana>().with_any::<Health>().with_none::<Dead>(),
        ];
        let families: Vec<_> = definitions
            .iter()
            .map(|definition| fx.families.family(definition.clone()))
            .collect();

        let entities: Vec<_> = (0..16).map(|_| fx.entities.create()).collect();

        for _ in 0..400 {
            let entity = entities[rng.random_range(0..entities.len())];
            match rng.random_range(0..6) {
                0 => fx.components.set(entity, Health(rng.random_range(0..100))).unwrap(),
                1 => fx.components.set(entity, Mana(rng.random_range(0..100))).unwrap(),
                2 => fx.components.set(entity, Dead).unwrap(),
                3 => {
                    fx.components.remove::<Health>(entity);
                }
                4 => {
                    fx.components.remove::<Mana>(entity);
                }
                _ => {
                    fx.components.remove::<Dead>(entity);
                }
            }

            for (definition, family) in definitions.iter().zip(&families) {
                for &probe in &entities {
                    let expected = definition.matches(&fx.components.component_bits(probe));
                    assert_eq!(
                        family.contains(probe),
                        expected,
                        "family {definition:?} disagrees with predicate for {probe:?}"
                    );
                }
            }
        }
    }
}
