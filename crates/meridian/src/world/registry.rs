//! Component storages of one world, addressed two ways: by the process-wide
//! type index for typed access, and by persisted name for everything that
//! reads or writes data.

use meridian_core::{Component, ComponentStorage, ComponentStore, ComponentTypes};
use meridian_shared::StrId;
use std::collections::BTreeMap;

/// Storages indexed by [`ComponentTypes`] index. Slots of types never
/// registered in this world stay empty.
#[derive(Default)]
pub struct StorageRegistry {
    slots: Vec<Option<Box<dyn ComponentStorage>>>,
    by_name: BTreeMap<StrId, usize>,
}

impl StorageRegistry {
    /// Creates a registry with no storages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a storage for `T`, replacing an existing one.
    pub fn register<T: Component>(&mut self, lazy_base: bool) {
        let index = ComponentTypes::register::<T>();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(Box::new(ComponentStore::<T>::new(lazy_base)));
        self.by_name.insert(StrId::new(T::NAME), index);
    }

    /// Number of registered storages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Typed storage of `T`.
    #[inline]
    #[must_use]
    pub fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        let index = ComponentTypes::index_of::<T>()?;
        self.slots
            .get(index)?
            .as_deref()?
            .as_any()
            .downcast_ref::<ComponentStore<T>>()
    }

    /// Mutable typed storage of `T`.
    #[inline]
    pub fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        let index = ComponentTypes::index_of::<T>()?;
        self.slots
            .get_mut(index)?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()
    }

    /// Storage persisted under `name`.
    #[must_use]
    pub fn by_name(&self, name: StrId) -> Option<&dyn ComponentStorage> {
        let index = *self.by_name.get(&name)?;
        self.slots.get(index)?.as_deref()
    }

    /// Mutable storage persisted under `name`.
    pub fn by_name_mut(&mut self, name: StrId) -> Option<&mut (dyn ComponentStorage + 'static)> {
        let index = *self.by_name.get(&name)?;
        self.slots.get_mut(index)?.as_deref_mut()
    }

    /// Storages in name order. Save files list component sections in
    /// this order.
    pub fn iter(&self) -> impl Iterator<Item = (StrId, &dyn ComponentStorage)> + '_ {
        self.by_name
            .iter()
            .filter_map(|(name, &index)| Some((*name, self.slots.get(index)?.as_deref()?)))
    }

    /// Every storage, mutably, in type index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn ComponentStorage + 'static)> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.as_deref_mut())
    }

    /// Takes the storage of `T` out of its slot. The slot reads as
    /// unregistered until [`StorageRegistry::put_back`].
    pub(crate) fn take<T: Component>(&mut self) -> Option<(usize, Box<dyn ComponentStorage>)> {
        let index = ComponentTypes::index_of::<T>()?;
        let storage = self.slots.get_mut(index)?.take()?;
        Some((index, storage))
    }

    /// Returns a storage taken by [`StorageRegistry::take`].
    pub(crate) fn put_back(&mut self, index: usize, storage: Box<dyn ComponentStorage>) {
        self.slots[index] = Some(storage);
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(name, storage)| (name, storage.len())))
            .finish()
    }
}
