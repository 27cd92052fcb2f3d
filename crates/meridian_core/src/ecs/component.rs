//! # Component System
//!
//! Components are plain data owned by a per-type storage. Each type carries
//! a persisted name and gets a small process-local index from the
//! [`ComponentTypes`] registry.
//!
//! ## Type indices
//!
//! Indices are assigned by explicit registration in first-come order and
//! are stable for the lifetime of the process only. They must never be
//! persisted; save files identify component types by [`Component::NAME`].

use super::handle::HEntity;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Trait for ECS components.
///
/// Components must be:
/// - `Clone` + `PartialEq`: diffs compare actual data against base data
/// - `Default`: template and params data are merged over the default
/// - `Serialize` + `DeserializeOwned`: binary and params persistence
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
/// struct Position {
///     x: f32,
///     y: f32,
///     z: f32,
/// }
///
/// impl Component for Position {
///     const NAME: &'static str = "Position";
/// }
/// ```
pub trait Component:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Persisted type name.
    const NAME: &'static str;

    /// Creates runtime resources for this component. Returns false if the
    /// component can't be made usable.
    #[inline]
    fn validate(&mut self, _entity: HEntity) -> bool {
        true
    }

    /// Releases runtime resources created by [`Component::validate`].
    #[inline]
    fn invalidate(&mut self, _entity: HEntity) {}
}

fn registry() -> &'static RwLock<HashMap<TypeId, usize>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, usize>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Process-wide component type index registry.
pub struct ComponentTypes;

impl ComponentTypes {
    /// Registers `T` and returns its index. Registering again returns the
    /// same index.
    pub fn register<T: Component>() -> usize {
        let key = TypeId::of::<T>();
        if let Some(&index) = registry().read().get(&key) {
            return index;
        }

        let mut table = registry().write();
        let next = table.len();
        let index = *table.entry(key).or_insert(next);
        if index == next {
            tracing::debug!("component type '{}' registered at index {}", T::NAME, index);
        }
        index
    }

    /// Index of `T`, if it was registered.
    #[inline]
    #[must_use]
    pub fn index_of<T: Component>() -> Option<usize> {
        registry().read().get(&TypeId::of::<T>()).copied()
    }

    /// Number of registered component types in this process.
    #[must_use]
    pub fn count() -> usize {
        registry().read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Alpha(u32);

    impl Component for Alpha {
        const NAME: &'static str = "Alpha";
    }

    #[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Beta;

    impl Component for Beta {
        const NAME: &'static str = "Beta";
    }

    #[test]
    fn test_registration_is_idempotent() {
        let a = ComponentTypes::register::<Alpha>();
        let b = ComponentTypes::register::<Beta>();
        assert_ne!(a, b);
        assert_eq!(ComponentTypes::register::<Alpha>(), a);
        assert_eq!(ComponentTypes::index_of::<Beta>(), Some(b));
        assert!(ComponentTypes::count() >= 2);
    }

    #[test]
    fn test_default_hooks() {
        let mut alpha = Alpha(3);
        assert!(alpha.validate(HEntity::new(0, 1)));
        alpha.invalidate(HEntity::new(0, 1));
        assert_eq!(alpha.0, 3);
    }
}
