/*!

Component storage. A [`Component`] is a typed piece of per-entity data; each
concrete component type carries a dense, process-stable index assigned by the
[`registry`] and usable directly as a bit position. The [`ComponentStore`]
maintains one presence bitset per entity plus one [`ComponentHolder`] per
component type, created lazily on first use.

Component types are declared with the [`define_component!`][crate::define_component]
and [`define_tag_component!`][crate::define_tag_component] macros:

```rust,ignore
define_component!(struct Health(u32));
define_tag_component!(Dead);
```

*/

pub mod holder;
pub mod registry;
pub mod store;

pub use holder::ComponentHolder;
pub use store::ComponentStore;

use std::fmt::Debug;

/// A typed piece of per-entity data.
///
/// Implemented via [`impl_component!`][crate::impl_component] (usually through
/// [`define_component!`][crate::define_component]); the macro wires up the
/// index registration that must happen at startup. Do not implement this
/// trait by hand.
pub trait Component: Clone + Debug + Send + Sync + 'static {
    /// Zero-payload marker component, stored as a presence bit only.
    const TAG: bool = false;

    /// The declared name of the component type.
    fn name() -> &'static str;

    /// The globally unique, dense index of this component type. Assigned
    /// once, stable for the process lifetime.
    fn index() -> usize;

    /// The canonical instance handed back by getters of a tag component.
    ///
    /// # Panics
    ///
    /// Panics for components that carry a payload.
    fn tag_instance() -> Self;

    /// Called when a value of this type is attached to an entity, including
    /// on replacement. A no-op unless the component type opts in.
    fn on_attach(&self) {}

    /// Called when a value is detached: replaced, removed, or dropped with a
    /// destroyed entity. A no-op unless the component type opts in.
    fn on_detach(&self) {}
}
