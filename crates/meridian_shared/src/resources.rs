//! # Resource Manager
//!
//! Reference-counted shared resources identified by [`StrId`].
//!
//! A resource is registered for a concrete object type, which attaches that
//! type's loader. The object itself is created lazily on the first
//! [`Resource::validate_object`] call and then shared by every holder.
//!
//! Reference counts are plain `Arc` strong counts. A resource held only by
//! the manager and one caller reports a count of 2.

use crate::str_id::StrId;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type AnyObject = Arc<dyn Any + Send + Sync>;
type ErasedLoader = Arc<dyn Fn(StrId) -> Option<AnyObject> + Send + Sync>;

/// A single named resource and its lazily created object.
pub struct Resource {
    uid: StrId,
    type_id: TypeId,
    loader: Option<ErasedLoader>,
    object: Mutex<Option<AnyObject>>,
}

impl Resource {
    /// Resource id
    #[inline]
    #[must_use]
    pub const fn uid(&self) -> StrId {
        self.uid
    }

    /// True if the object has been created
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.object.lock().is_some()
    }

    /// Returns the object, creating it with the registered loader if needed.
    ///
    /// Returns `None` if `T` is not the type this resource was registered
    /// for, no loader exists, or the loader failed.
    #[must_use]
    pub fn validate_object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if self.type_id != TypeId::of::<T>() {
            return None;
        }

        let mut slot = self.object.lock();
        if slot.is_none() {
            let loader = self.loader.as_ref()?;
            let Some(created) = loader(self.uid) else {
                tracing::warn!("resource '{}' failed to load", self.uid);
                return None;
            };
            *slot = Some(created);
        }

        slot.clone()?.downcast::<T>().ok()
    }

    /// Sets the object directly, bypassing the loader.
    pub fn set_object<T: Any + Send + Sync>(&self, object: Arc<T>) -> bool {
        if self.type_id != TypeId::of::<T>() {
            return false;
        }
        *self.object.lock() = Some(object);
        true
    }

    /// Removes the object from the resource and hands it to the caller.
    #[must_use]
    pub fn take_object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if self.type_id != TypeId::of::<T>() {
            return None;
        }
        self.object.lock().take()?.downcast::<T>().ok()
    }

    /// Drops the object. It will be recreated on the next validation.
    pub fn unload(&self) {
        *self.object.lock() = None;
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("uid", &self.uid)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Registry of shared resources.
///
/// Safe to share between threads, but resource loading is expected to be
/// serialized by the caller; the exclusivity checks based on reference
/// counts are a heuristic, not a lock.
#[derive(Default)]
pub struct ResourceManager {
    resources: RwLock<HashMap<StrId, Arc<Resource>>>,
    loaders: RwLock<HashMap<TypeId, ErasedLoader>>,
}

impl ResourceManager {
    /// Creates an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the loader used to create objects of type `T`.
    pub fn register_loader<T, F>(&self, loader: F)
    where
        T: Any + Send + Sync,
        F: Fn(StrId) -> Option<T> + Send + Sync + 'static,
    {
        let erased: ErasedLoader =
            Arc::new(move |uid| loader(uid).map(|obj| Arc::new(obj) as AnyObject));
        self.loaders.write().insert(TypeId::of::<T>(), erased);
    }

    /// Returns the resource `uid`, registering it for type `T` if absent.
    ///
    /// An existing resource registered for another type is returned as is;
    /// validating it as `T` will then fail.
    pub fn register_resource<T: Any + Send + Sync>(&self, uid: StrId) -> Arc<Resource> {
        if let Some(existing) = self.resources.read().get(&uid) {
            return Arc::clone(existing);
        }

        let loader = self.loaders.read().get(&TypeId::of::<T>()).cloned();
        let mut resources = self.resources.write();
        Arc::clone(resources.entry(uid).or_insert_with(|| {
            Arc::new(Resource {
                uid,
                type_id: TypeId::of::<T>(),
                loader,
                object: Mutex::new(None),
            })
        }))
    }

    /// Registers `uid` with an already created object.
    pub fn insert<T: Any + Send + Sync>(&self, uid: StrId, object: T) -> Arc<Resource> {
        let rsrc = self.register_resource::<T>(uid);
        if !rsrc.set_object(Arc::new(object)) {
            tracing::warn!("resource '{}' is registered for another type", uid);
        }
        rsrc
    }

    /// Finds a registered resource
    #[must_use]
    pub fn find_resource(&self, uid: StrId) -> Option<Arc<Resource>> {
        self.resources.read().get(&uid).cloned()
    }

    /// Removes `uid` from the registry. Existing holders keep their `Arc`.
    pub fn unregister_resource(&self, uid: StrId) -> bool {
        self.resources.write().remove(&uid).is_some()
    }

    /// Number of registered resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Mesh(u32);

    #[test]
    fn test_lazy_materialization() {
        let mgr = ResourceManager::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        mgr.register_loader::<Mesh, _>(move |uid| {
            counter.fetch_add(1, Ordering::Relaxed);
            Some(Mesh(u32::try_from(uid.as_str().len()).unwrap()))
        });

        let rsrc = mgr.register_resource::<Mesh>(StrId::new("rock"));
        assert!(!rsrc.is_loaded());

        let a = rsrc.validate_object::<Mesh>().unwrap();
        let b = rsrc.validate_object::<Mesh>().unwrap();
        assert_eq!(*a, Mesh(4));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_wrong_type_fails() {
        let mgr = ResourceManager::new();
        let rsrc = mgr.insert(StrId::new("m"), Mesh(1));
        assert!(rsrc.validate_object::<String>().is_none());
        assert!(rsrc.validate_object::<Mesh>().is_some());
    }

    #[test]
    fn test_refcount_and_unregister() {
        let mgr = ResourceManager::new();
        let rsrc = mgr.insert(StrId::new("scene"), Mesh(7));
        assert_eq!(Arc::strong_count(&rsrc), 2);

        assert!(mgr.unregister_resource(StrId::new("scene")));
        assert_eq!(Arc::strong_count(&rsrc), 1);
        assert!(mgr.find_resource(StrId::new("scene")).is_none());
    }

    #[test]
    fn test_missing_loader() {
        let mgr = ResourceManager::new();
        let rsrc = mgr.register_resource::<Mesh>(StrId::new("nothing"));
        assert!(rsrc.validate_object::<Mesh>().is_none());
    }
}
