/*!

Macros for declaring component types.

# [`define_component!`]

For the most common cases, use the [`define_component!`] macro. It defines a
struct or enum with the standard derives every component needs and implements
[`Component`][crate::component::Component] (via [`impl_component!`]) for you.

```rust,ignore
define_component!(struct Position { x: f32, y: f32 });
define_component!(struct Health(u32));
define_component!(
    enum Allegiance {
        Friendly,
        Hostile,
        Neutral,
    }
);
```

Zero-payload marker components are declared with [`define_tag_component!`];
their presence is stored as a single bit rather than a map entry:

```rust,ignore
define_tag_component!(Dead);
```

# [`impl_component!`]

You can implement [`Component`][crate::component::Component] for an existing
type with [`impl_component!`]. The catch is that you have to remember to
`derive` at least `Clone` and `Debug` in your type declaration. The macro also
accepts optional keyword arguments (in this order) to opt in to lifecycle
callbacks:

* `attach = <closure>` — run whenever a value of this type is attached to an
  entity (including on replacement).
* `detach = <closure>` — run whenever a value is detached: replaced, removed,
  or dropped with a destroyed entity.

```rust,ignore
#[derive(Clone, Debug, PartialEq)]
struct Handle(u64);
impl_component!(
    Handle,
    attach = |h: &Handle| acquire(h.0),
    detach = |h: &Handle| release(h.0)
);
```

*/

/// Defines a `struct` or `enum` with a standard set of derives and
/// automatically invokes [`impl_component!`] for it. A `pub` visibility is
/// added to the type and to the fields of tuple structs in the expansion.
///
/// If you need a more complex type definition (generics, extra derives,
/// attributes), define the type manually and call [`impl_component!`]
/// directly.
#[macro_export]
macro_rules! define_component {
    // Struct (tuple)
    (
        struct $name:ident ( $($field_ty:ty),* $(,)? )
        $(, $($extra:tt)+)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name($(pub $field_ty),*);
        $crate::impl_component!($name $(, $($extra)+)?);
    };

    // Struct (named fields)
    (
        struct $name:ident { $($field_name:ident : $field_ty:ty),* $(,)? }
        $(, $($extra:tt)+)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name { $(pub $field_name : $field_ty),* }
        $crate::impl_component!($name $(, $($extra)+)?);
    };

    // Enum
    (
        enum $name:ident { $($variant:ident),* $(,)? }
        $(, $($extra:tt)+)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum $name {
            $($variant),*
        }
        $crate::impl_component!($name $(, $($extra)+)?);
    };
}

/// Defines a zero-payload marker ("tag") component. Tag components carry no
/// data; storage keeps only a presence bit per entity, and getters hand back
/// the canonical unit instance.
#[macro_export]
macro_rules! define_tag_component {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;
        $crate::impl_component!($name, tag = true, tag_instance = $name);
    };
}

/// Implements the [`Component`][crate::component::Component] trait for the
/// given type and registers it at startup.
///
/// Each component type gets a dense, process-stable index, claimed on first
/// use from a global counter and cached in a per-type static. Registration
/// runs in a `ctor` so every component type linked into the binary has its
/// index assigned before any store is constructed.
///
/// # Parameters
///
/// Optional keyword parameters must be given in this order:
///
/// * `tag = <bool>` — zero-payload marker component; use
///   [`define_tag_component!`] instead of setting this directly.
/// * `tag_instance = <expr>` — the canonical instance handed back by getters
///   of a tag component. Calling it on a non-tag component panics.
/// * `attach = <closure>` / `detach = <closure>` — lifecycle callbacks; no-ops
///   unless provided.
#[macro_export]
macro_rules! impl_component {
    (
        $component:ident
        $(, tag = $tag:expr)?
        $(, tag_instance = $tag_instance:expr)?
        $(, attach = $attach:expr)?
        $(, detach = $detach:expr)?
    ) => {
        impl $crate::component::Component for $component {
            const TAG: bool = $crate::impl_component!(@unwrap_or $($tag)?, false);

            fn name() -> &'static str {
                stringify!($component)
            }

            fn index() -> usize {
                // This static must be initialized with a compile-time constant
                // expression. We use `usize::MAX` as a sentinel to mean
                // "uninitialized". The static is shared among all instances of
                // this concrete component type.
                static INDEX: std::sync::atomic::AtomicUsize =
                    std::sync::atomic::AtomicUsize::new(usize::MAX);

                // Fast path: already initialized.
                let index = INDEX.load(std::sync::atomic::Ordering::Relaxed);
                if index != usize::MAX {
                    return index;
                }

                // Slow path: initialize it.
                $crate::component::registry::initialize_component_index::<$component>(&INDEX)
            }

            fn tag_instance() -> Self {
                $crate::impl_component!(
                    @unwrap_or
                    $($tag_instance)?,
                    panic!(
                        "component {} is not a tag and has no canonical instance",
                        stringify!($component)
                    )
                )
            }

            fn on_attach(&self) {
                ($crate::impl_component!(@unwrap_or $($attach)?, |_: &Self| {}))(self);
            }

            fn on_detach(&self) {
                ($crate::impl_component!(@unwrap_or $($detach)?, |_: &Self| {}))(self);
            }
        }

        $crate::paste::paste! {
            $crate::ctor::declarative::ctor! {
                #[ctor]
                fn [<_register_component_ $component:snake>]() {
                    $crate::component::registry::add_to_component_registry::<$component>();
                }
            }
        }
    };

    // Helpers for defaults.
    (@unwrap_or $value:expr, $_default:expr) => { $value };
    (@unwrap_or, $default:expr) => { $default };
}
