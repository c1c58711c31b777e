/*!

The global component-type registry. Each concrete [`Component`] type is
assigned a unique, dense index ranging from `0` to `COMPONENT_COUNT - 1`, one
time, stable for the lifetime of the process. Indices are claimed in the
`ctor` of each component type (see [`impl_component!`][crate::impl_component]),
so every linked component has its index before any store is constructed, and
the indices are usable directly as bit positions in presence bitsets, family
definitions and schedule access sets.

*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::Component;

/// Global component index counter; keeps track of the index that will be
/// assigned to the next component type that requests one. Equivalently, holds
/// a *count* of the number of component types currently registered.
static NEXT_COMPONENT_INDEX: Mutex<usize> = Mutex::new(0);

/// Component names by index, for diagnostics and log messages. Written under
/// the same lock that assigns indices.
static COMPONENT_NAMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Adds a component type to the registry. Called in the `ctor` function of
/// each component type; forcing `C::index()` here is what claims the index at
/// startup rather than on first storage access.
pub fn add_to_component_registry<C: Component>() {
    let _ = C::index();
}

/// A convenience getter for `NEXT_COMPONENT_INDEX`.
pub fn registered_component_count() -> usize {
    *NEXT_COMPONENT_INDEX.lock().unwrap()
}

/// Returns the registered name for a component index, if one was assigned.
pub fn component_name(index: usize) -> Option<&'static str> {
    COMPONENT_NAMES.lock().unwrap().get(index).copied()
}

/// Encapsulates the synchronization logic for initializing a component type's
/// index.
///
/// Acquires a global lock on the next available index, but only increments it
/// if we successfully initialize the provided per-type static. It is possible
/// for a single type to attempt to initialize its index from multiple threads
/// at once, which is why the compare-exchange is required; the overhead is
/// negligible, as initialization happens once per type on first access.
pub fn initialize_component_index<C: Component>(index: &AtomicUsize) -> usize {
    // Acquire a global lock.
    let mut guard = NEXT_COMPONENT_INDEX.lock().unwrap();
    let candidate = *guard;

    // Try to claim the candidate index, guarding against the race that another
    // thread initialized this type's index just before we obtained the lock.
    // If the index has been initialized beneath us, we do not update
    // `NEXT_COMPONENT_INDEX`, we just return the value it was initialized to.
    match index.compare_exchange(usize::MAX, candidate, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // We won the race. Record the name and advance the counter.
            let mut names = COMPONENT_NAMES.lock().unwrap();
            debug_assert_eq!(names.len(), candidate);
            names.push(C::name());
            *guard += 1;
            candidate
        }
        Err(existing) => existing,
    }
}
