use std::hash::{Hash, Hasher};

use fixedbitset::FixedBitSet;

use crate::component::Component;

/// An all/any/none predicate over component indices.
///
/// An entity matches when each non-empty constraint holds against its
/// component-presence bits:
/// * `all` — every listed component present,
/// * `any` — at least one listed component present,
/// * `none` — no listed component present.
///
/// A definition with all three sets empty matches every entity. Definitions
/// compare (and hash) by bit content, so two independently built but
/// structurally equal definitions always resolve to the same cached family.
#[derive(Debug, Clone, Default)]
pub struct FamilyDefinition {
    all: FixedBitSet,
    any: FixedBitSet,
    none: FixedBitSet,
}

impl FamilyDefinition {
    #[must_use]
    pub fn new() -> Self {
        FamilyDefinition::default()
    }

    /// Requires component `C` to be present.
    #[must_use]
    pub fn with_all<C: Component>(mut self) -> Self {
        grow_and_insert(&mut self.all, C::index());
        self
    }

    /// Requires at least one of the `with_any` components to be present.
    #[must_use]
    pub fn with_any<C: Component>(mut self) -> Self {
        grow_and_insert(&mut self.any, C::index());
        self
    }

    /// Requires component `C` to be absent.
    #[must_use]
    pub fn with_none<C: Component>(mut self) -> Self {
        grow_and_insert(&mut self.none, C::index());
        self
    }

    /// Evaluates the predicate against an entity's component-presence bits.
    #[must_use]
    pub fn matches(&self, bits: &FixedBitSet) -> bool {
        (self.all.is_clear() || self.all.is_subset(bits))
            && (self.any.is_clear() || !self.any.is_disjoint(bits))
            && (self.none.is_clear() || self.none.is_disjoint(bits))
    }

    /// Every component index the definition mentions (`all ∪ any ∪ none`).
    /// Reading a family amounts to reading these component types.
    #[must_use]
    pub fn component_indices(&self) -> FixedBitSet {
        let mut indices = self.all.clone();
        indices.union_with(&self.any);
        indices.union_with(&self.none);
        indices
    }
}

fn grow_and_insert(bits: &mut FixedBitSet, index: usize) {
    bits.grow(index + 1);
    bits.insert(index);
}

/// Set-wise equality: two bitsets are equal when they contain the same bits,
/// regardless of allocated capacity.
fn bits_eq(a: &FixedBitSet, b: &FixedBitSet) -> bool {
    a.ones().eq(b.ones())
}

fn bits_hash<H: Hasher>(bits: &FixedBitSet, state: &mut H) {
    for index in bits.ones() {
        index.hash(state);
    }
    // Separates the three sets in the composite hash.
    usize::MAX.hash(state);
}

impl PartialEq for FamilyDefinition {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(&self.all, &other.all)
            && bits_eq(&self.any, &other.any)
            && bits_eq(&self.none, &other.none)
    }
}

impl Eq for FamilyDefinition {}

impl Hash for FamilyDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bits_hash(&self.all, state);
        bits_hash(&self.any, state);
        bits_hash(&self.none, state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use fixedbitset::FixedBitSet;

    use super::FamilyDefinition;
    use crate::component::Component;
    use crate::{define_component, define_tag_component};

    define_component!(struct Health(u32));
    define_component!(struct Armor(u32));
    define_tag_component!(Dead);

    fn bits_of(indices: &[usize]) -> FixedBitSet {
        let mut bits = FixedBitSet::new();
        for &index in indices {
            bits.grow(index + 1);
            bits.insert(index);
        }
        bits
    }

    #[test]
    fn empty_definition_matches_everything() {
        let definition = FamilyDefinition::new();
        assert!(definition.matches(&FixedBitSet::new()));
        assert!(definition.matches(&bits_of(&[Health::index(), Dead::index()])));
    }

    #[test]
    fn all_requires_every_component() {
        let definition = FamilyDefinition::new().with_all::<Health>().with_all::<Armor>();
        assert!(definition.matches(&bits_of(&[Health::index(), Armor::index()])));
        assert!(!definition.matches(&bits_of(&[Health::index()])));
        assert!(!definition.matches(&FixedBitSet::new()));
    }

    #[test]
    fn any_requires_at_least_one() {
        let definition = FamilyDefinition::new().with_any::<Health>().with_any::<Armor>();
        assert!(definition.matches(&bits_of(&[Armor::index()])));
        assert!(definition.matches(&bits_of(&[Health::index(), Armor::index()])));
        assert!(!definition.matches(&bits_of(&[Dead::index()])));
    }

    #[test]
    fn none_requires_absence() {
        let definition = FamilyDefinition::new().with_all::<Health>().with_none::<Dead>();
        assert!(definition.matches(&bits_of(&[Health::index()])));
        assert!(!definition.matches(&bits_of(&[Health::index(), Dead::index()])));
    }

    #[test]
    fn equality_is_structural() {
        let a = FamilyDefinition::new().with_all::<Health>().with_none::<Dead>();
        let b = FamilyDefinition::new().with_none::<Dead>().with_all::<Health>();
        assert_eq!(a, b);

        let mut hasher_a = DefaultHasher::new();
        a.hash(&mut hasher_a);
        let mut hasher_b = DefaultHasher::new();
        b.hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());

        let c = FamilyDefinition::new().with_all::<Health>();
        assert_ne!(a, c);
        // The same index in a different role is a different definition.
        let d = FamilyDefinition::new().with_any::<Health>().with_none::<Dead>();
        assert_ne!(a, d);
    }

    #[test]
    fn component_indices_union_all_roles() {
        let definition = FamilyDefinition::new()
            .with_all::<Health>()
            .with_any::<Armor>()
            .with_none::<Dead>();
        let indices = definition.component_indices();
        assert!(indices.contains(Health::index()));
        assert!(indices.contains(Armor::index()));
        assert!(indices.contains(Dead::index()));
    }
}
