/*!

Families: cached, incrementally maintained entity sets.

A [`FamilyDefinition`] is an all/any/none predicate over component indices; a
[`Family`] owns the live set of entity ids matching one definition. The
[`FamilyStore`] deduplicates families by structural definition equality and
keeps every cached family current from entity lifecycle events — each event
re-evaluates only the one affected entity in each family, never the whole
population.

```rust,ignore
let alive = families.family(
    FamilyDefinition::new().with_all::<Health>().with_none::<Dead>(),
);
alive.on_entity_inserted(|entity| info!("{entity:?} joined"));
```

*/

mod definition;
mod family;
mod store;

pub use definition::FamilyDefinition;
pub use family::Family;
pub use store::FamilyStore;
