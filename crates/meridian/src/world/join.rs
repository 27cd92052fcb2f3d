//! # Join Queries
//!
//! The component set visited alongside the driving component of
//! [`GameWorld::for_each_entity_with`](super::GameWorld::for_each_entity_with).
//!
//! - `&T`: mandatory, entities without `T` are skipped
//! - `Option<&T>`: optional, missing reads as `None`
//! - tuples of the above, up to six, in declaration order
//! - `()`: nothing besides the driving component
//!
//! Storages are looked up once per query, then probed per entity.

use super::registry::StorageRegistry;
use meridian_core::{Component, ComponentStore, HEntity};

/// A set of components fetched for one entity.
pub trait Join {
    /// Storages resolved for the whole query.
    type Storages<'w>: Copy;

    /// Components fetched for one entity.
    type Item<'w>;

    /// Resolves the storages this join reads.
    fn storages(registry: &StorageRegistry) -> Self::Storages<'_>;

    /// Fetches the components of `entity`. `None` skips the entity.
    fn fetch(storages: Self::Storages<'_>, entity: HEntity) -> Option<Self::Item<'_>>;
}

impl Join for () {
    type Storages<'w> = ();
    type Item<'w> = ();

    #[inline]
    fn storages(_registry: &StorageRegistry) -> Self::Storages<'_> {}

    #[inline]
    fn fetch(_storages: Self::Storages<'_>, _entity: HEntity) -> Option<Self::Item<'_>> {
        Some(())
    }
}

impl<T: Component> Join for &T {
    type Storages<'w> = Option<&'w ComponentStore<T>>;
    type Item<'w> = &'w T;

    #[inline]
    fn storages(registry: &StorageRegistry) -> Self::Storages<'_> {
        registry.store::<T>()
    }

    #[inline]
    fn fetch(storages: Self::Storages<'_>, entity: HEntity) -> Option<Self::Item<'_>> {
        storages?.find(entity)
    }
}

impl<T: Component> Join for Option<&T> {
    type Storages<'w> = Option<&'w ComponentStore<T>>;
    type Item<'w> = Option<&'w T>;

    #[inline]
    fn storages(registry: &StorageRegistry) -> Self::Storages<'_> {
        registry.store::<T>()
    }

    #[inline]
    fn fetch(storages: Self::Storages<'_>, entity: HEntity) -> Option<Self::Item<'_>> {
        Some(storages.and_then(|store| store.find(entity)))
    }
}

macro_rules! impl_join_tuple {
    ($($name:ident),+) => {
        impl<$($name: Join),+> Join for ($($name,)+) {
            type Storages<'w> = ($($name::Storages<'w>,)+);
            type Item<'w> = ($($name::Item<'w>,)+);

            #[inline]
            fn storages(registry: &StorageRegistry) -> Self::Storages<'_> {
                ($($name::storages(registry),)+)
            }

            #[inline]
            #[allow(non_snake_case)]
            fn fetch(storages: Self::Storages<'_>, entity: HEntity) -> Option<Self::Item<'_>> {
                let ($($name,)+) = storages;
                Some(($($name::fetch($name, entity)?,)+))
            }
        }
    };
}

impl_join_tuple!(A);
impl_join_tuple!(A, B);
impl_join_tuple!(A, B, C);
impl_join_tuple!(A, B, C, D);
impl_join_tuple!(A, B, C, D, E);
impl_join_tuple!(A, B, C, D, E, F);
