//! # Component Storage
//!
//! Per-type component containers with two layers:
//!
//! - **actual**: the live data, a sparse set (entity index → dense slot)
//!   so typed lookups are O(1) and iteration is contiguous
//! - **base**: the loaded snapshot, keyed by handle. Payloads stay encoded
//!   in the shared base stream until first access
//!
//! Explicit removals in the actual layer are remembered until the next
//! `clear_diff`, so template instantiation can't bring them back.
//!
//! Typed access goes through [`ComponentStore<T>`] directly. Bulk
//! operations used by the world's load/save protocol go through the
//! object-safe [`ComponentStorage`] trait.
//!
//! ## Binary payloads
//!
//! ```text
//! bulk:  u32 count, count × (u64 handle, u32 len, postcard bytes)
//! diff:  u64 removed handle ... 0,
//!        (u64 handle, u32 len, postcard bytes) ... 0
//! ```

use super::component::Component;
use super::entity::EntityStorage;
use super::handle::HEntity;
use crate::error::{CoreError, CoreResult};
use crate::io::{BaseStream, BinaryReader, BinaryWriter};
use meridian_shared::{Data, StrId};
use std::any::Any;
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Type-erased storage interface used for bulk operations.
///
/// Every operation on a missing component is a no-op returning
/// `false`/`None`.
pub trait ComponentStorage: Any + Send {
    /// Persisted component type name.
    fn name(&self) -> StrId;

    /// Number of components in the actual state.
    fn len(&self) -> usize;

    /// True if the actual state is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `entity` has this component in the actual state.
    fn contains(&self, entity: HEntity) -> bool;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Merges `data` over the existing component (or the default) and
    /// attaches the result.
    fn add_from_params(&mut self, entity: HEntity, data: &Data) -> bool;

    /// Detaches the component and remembers the removal, so templates
    /// won't fill it back in.
    fn remove_component(&mut self, entity: HEntity) -> bool;

    /// Detaches the component of a deleted entity. Nothing is remembered.
    fn forget_entity(&mut self, entity: HEntity) -> bool;

    /// Copies the component of `src` to `dst`. No-op if `src` has none.
    fn clone_component(&mut self, src: HEntity, dst: HEntity) -> bool;

    /// Full component data, if the entity has the component.
    fn save_component_to_params(&self, entity: HEntity) -> Option<Data>;

    /// Component data changed against the base component, or against
    /// `template` when there is no base component.
    ///
    /// Returns `None` when unchanged and [`Data::Void`] when the component
    /// was removed.
    fn save_component_diff_to_params(&self, entity: HEntity, template: Option<&Data>)
        -> Option<Data>;

    /// Replaces all data with the bulk payload at `range` of `stream`.
    ///
    /// # Errors
    ///
    /// Fails on a truncated payload or an eagerly decoded bad component.
    fn load_base(&mut self, stream: &BaseStream, range: Range<usize>) -> CoreResult<()>;

    /// Resets actual data to base, then applies a diff payload.
    ///
    /// # Errors
    ///
    /// Fails on a truncated or undecodable payload.
    fn load_diff(&mut self, payload: &[u8]) -> CoreResult<()>;

    /// Writes the actual state as a bulk payload.
    ///
    /// # Errors
    ///
    /// Fails if a component can't be encoded.
    fn save_all(&self, w: &mut BinaryWriter) -> CoreResult<()>;

    /// Writes the difference between actual and base as a diff payload.
    ///
    /// # Errors
    ///
    /// Fails if a component can't be encoded.
    fn save_diff(&self, w: &mut BinaryWriter) -> CoreResult<()>;

    /// Drops everything, base included.
    fn clear_all(&mut self);

    /// Drops the actual state and rebuilds it from base.
    fn clear_diff(&mut self);

    /// Fills in template data unless the entity already has the component
    /// in the target layer, or had it removed from the actual layer.
    fn instantiate_template(
        &mut self,
        entity: HEntity,
        data: &Data,
        into_base: bool,
        validate: bool,
    ) -> bool;

    /// Validates components of entities in `level`. Returns how many
    /// became valid.
    fn validate_components(&mut self, level: StrId, entities: &EntityStorage) -> usize;

    /// Invalidates components of entities in `level`.
    fn invalidate_components(&mut self, level: StrId, entities: &EntityStorage) -> usize;
}

const EMPTY_SLOT: u32 = u32::MAX;

struct Record<T> {
    entity: HEntity,
    value: T,
    validated: bool,
}

struct BaseEntry<T> {
    /// Encoded payload in the base stream. Empty for template-instantiated
    /// entries, which are created decoded.
    range: Range<usize>,
    value: OnceCell<T>,
}

/// Typed component storage.
pub struct ComponentStore<T: Component> {
    name: StrId,
    sparse: Vec<u32>,
    dense: Vec<Record<T>>,
    base: BTreeMap<HEntity, BaseEntry<T>>,
    base_stream: Option<BaseStream>,
    lazy_base: bool,
    /// Handles whose component was removed from the actual layer.
    removed: BTreeSet<HEntity>,
}

impl<T: Component> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<T: Component> ComponentStore<T> {
    /// Creates an empty storage. With `lazy_base`, base payloads are
    /// decoded on first access instead of at load.
    #[must_use]
    pub fn new(lazy_base: bool) -> Self {
        Self {
            name: StrId::new(T::NAME),
            sparse: Vec::new(),
            dense: Vec::new(),
            base: BTreeMap::new(),
            base_stream: None,
            lazy_base,
            removed: BTreeSet::new(),
        }
    }

    #[inline]
    fn slot_of(&self, entity: HEntity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == EMPTY_SLOT {
            return None;
        }
        let slot = slot as usize;
        (self.dense[slot].entity == entity).then_some(slot)
    }

    /// Attaches `value`, replacing an existing component.
    ///
    /// Returns `None` for the invalid handle.
    pub fn add(&mut self, entity: HEntity, value: T) -> Option<&mut T> {
        if !entity.is_valid() {
            return None;
        }

        self.removed.remove(&entity);
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, EMPTY_SLOT);
        }

        let slot = self.sparse[index];
        if slot != EMPTY_SLOT {
            // Same index, possibly a previous generation: overwrite in place
            let record = &mut self.dense[slot as usize];
            *record = Record {
                entity,
                value,
                validated: false,
            };
            return Some(&mut record.value);
        }

        let Ok(slot) = u32::try_from(self.dense.len()) else {
            return None;
        };
        self.sparse[index] = slot;
        self.dense.push(Record {
            entity,
            value,
            validated: false,
        });
        self.dense.last_mut().map(|r| &mut r.value)
    }

    /// Component of `entity` in the actual state.
    #[inline]
    #[must_use]
    pub fn find(&self, entity: HEntity) -> Option<&T> {
        self.slot_of(entity).map(|slot| &self.dense[slot].value)
    }

    /// Mutable component of `entity` in the actual state.
    #[inline]
    pub fn find_mut(&mut self, entity: HEntity) -> Option<&mut T> {
        self.slot_of(entity).map(|slot| &mut self.dense[slot].value)
    }

    /// Detaches and returns the component of `entity`.
    ///
    /// The removal is remembered until the next `clear_diff`, even when
    /// there was nothing to detach.
    pub fn remove(&mut self, entity: HEntity) -> Option<T> {
        if entity.is_valid() {
            self.removed.insert(entity);
        }
        self.detach(entity)
    }

    /// True if the component of `entity` was explicitly removed from the
    /// actual layer.
    #[must_use]
    pub fn is_removed(&self, entity: HEntity) -> bool {
        self.removed.contains(&entity)
    }

    fn detach(&mut self, entity: HEntity) -> Option<T> {
        let slot = self.slot_of(entity)?;
        self.sparse[entity.index() as usize] = EMPTY_SLOT;
        let record = self.dense.swap_remove(slot);
        if let Some(moved) = self.dense.get(slot) {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.sparse[moved.entity.index() as usize] = slot as u32;
            }
        }
        Some(record.value)
    }

    /// Component of `entity` in the base state, decoding it on first use.
    #[must_use]
    pub fn find_base(&self, entity: HEntity) -> Option<&T> {
        let entry = self.base.get(&entity)?;
        if let Some(value) = entry.value.get() {
            return Some(value);
        }

        match self.decode_range(entry.range.clone()) {
            Ok(value) => {
                // Single-threaded: nobody else could have filled the cell
                let _ = entry.value.set(value);
                entry.value.get()
            }
            Err(err) => {
                tracing::warn!("base component of {:?} unreadable: {}", entity, err);
                None
            }
        }
    }

    /// Number of components in the base state.
    #[must_use]
    pub fn base_len(&self) -> usize {
        self.base.len()
    }

    /// Iterates the actual state.
    pub fn iter(&self) -> impl Iterator<Item = (HEntity, &T)> + '_ {
        self.dense.iter().map(|r| (r.entity, &r.value))
    }

    /// Iterates the actual state mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (HEntity, &mut T)> + '_ {
        self.dense.iter_mut().map(|r| (r.entity, &mut r.value))
    }

    fn decode_range(&self, range: Range<usize>) -> CoreResult<T> {
        let bytes = self
            .base_stream
            .as_deref()
            .and_then(|s| s.get(range.clone()))
            .ok_or(CoreError::UnexpectedEof {
                needed: range.len(),
                offset: range.start,
                remaining: 0,
            })?;
        self.decode(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> CoreResult<T> {
        postcard::from_bytes(bytes).map_err(|source| CoreError::Payload {
            component: self.name,
            source,
        })
    }

    fn encode(&self, value: &T) -> CoreResult<Vec<u8>> {
        postcard::to_stdvec(value).map_err(|source| CoreError::Payload {
            component: self.name,
            source,
        })
    }

    fn to_data(&self, value: &T) -> Option<Data> {
        match Data::from_serialize(value) {
            Ok(data) => Some(data),
            Err(source) => {
                let err = CoreError::Params {
                    component: self.name,
                    source,
                };
                tracing::warn!("{}", err);
                None
            }
        }
    }

    /// Merges `patch` over `value` through the params representation.
    fn merged(&self, value: &T, patch: &Data) -> Option<T> {
        let mut data = self.to_data(value)?;
        data.merge(patch);
        match data.to_deserialize() {
            Ok(merged) => Some(merged),
            Err(source) => {
                let err = CoreError::Params {
                    component: self.name,
                    source,
                };
                tracing::warn!("{}", err);
                None
            }
        }
    }

    fn write_record(&self, w: &mut BinaryWriter, entity: HEntity, value: &T) -> CoreResult<()> {
        w.write_u64(entity.raw());
        w.write_blob(&self.encode(value)?)
    }

    fn read_handle(r: &mut BinaryReader<'_>) -> CoreResult<HEntity> {
        r.read_u64().map(HEntity::from_raw)
    }
}

impl<T: Component> ComponentStorage for ComponentStore<T> {
    fn name(&self) -> StrId {
        self.name
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn contains(&self, entity: HEntity) -> bool {
        self.slot_of(entity).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn add_from_params(&mut self, entity: HEntity, data: &Data) -> bool {
        let merged = match self.find(entity) {
            Some(existing) => self.merged(existing, data),
            None => self.merged(&T::default(), data),
        };
        match merged {
            Some(value) => self.add(entity, value).is_some(),
            None => false,
        }
    }

    fn remove_component(&mut self, entity: HEntity) -> bool {
        self.remove(entity).is_some()
    }

    fn forget_entity(&mut self, entity: HEntity) -> bool {
        self.removed.remove(&entity);
        self.detach(entity).is_some()
    }

    fn clone_component(&mut self, src: HEntity, dst: HEntity) -> bool {
        match self.find(src).cloned() {
            Some(value) => self.add(dst, value).is_some(),
            None => false,
        }
    }

    fn save_component_to_params(&self, entity: HEntity) -> Option<Data> {
        self.find(entity).and_then(|value| self.to_data(value))
    }

    fn save_component_diff_to_params(
        &self,
        entity: HEntity,
        template: Option<&Data>,
    ) -> Option<Data> {
        let reference = match self.find_base(entity) {
            Some(base) => self.to_data(base),
            None => template
                .and_then(|t| self.merged(&T::default(), t))
                .and_then(|value| self.to_data(&value)),
        };

        match (self.find(entity), reference) {
            (None, None) => None,
            (None, Some(_)) => Some(Data::Void),
            (Some(actual), None) => self.to_data(actual),
            (Some(actual), Some(reference)) => self.to_data(actual)?.diff(&reference),
        }
    }

    fn load_base(&mut self, stream: &BaseStream, range: Range<usize>) -> CoreResult<()> {
        self.clear_all();
        self.base_stream = Some(BaseStream::clone(stream));

        let offset = range.start;
        let bytes = stream.get(range.clone()).ok_or(CoreError::UnexpectedEof {
            needed: range.len(),
            offset,
            remaining: stream.len().saturating_sub(offset),
        })?;
        let mut r = BinaryReader::new(bytes);

        let count = r.read_u32()?;
        for _ in 0..count {
            let entity = Self::read_handle(&mut r)?;
            if !entity.is_valid() {
                return Err(CoreError::InvalidHandle("component base"));
            }
            let len = r.read_u32()? as usize;
            let start = offset + r.position();
            r.skip(len)?;

            let entry = BaseEntry {
                range: start..start + len,
                value: OnceCell::new(),
            };
            if !self.lazy_base {
                let value = self.decode_range(entry.range.clone())?;
                let _ = entry.value.set(value);
            }
            self.base.insert(entity, entry);
        }

        tracing::debug!("'{}': {} base components", self.name, self.base.len());
        Ok(())
    }

    fn load_diff(&mut self, payload: &[u8]) -> CoreResult<()> {
        self.clear_diff();

        let mut r = BinaryReader::new(payload);
        loop {
            let entity = Self::read_handle(&mut r)?;
            if !entity.is_valid() {
                break;
            }
            self.remove(entity);
        }
        loop {
            let entity = Self::read_handle(&mut r)?;
            if !entity.is_valid() {
                break;
            }
            let value = self.decode(r.read_blob()?)?;
            self.add(entity, value);
        }
        Ok(())
    }

    fn save_all(&self, w: &mut BinaryWriter) -> CoreResult<()> {
        let count = u32::try_from(self.dense.len())
            .map_err(|_| CoreError::SectionTooLarge(self.dense.len()))?;
        w.write_u32(count);
        for record in &self.dense {
            self.write_record(w, record.entity, &record.value)?;
        }
        Ok(())
    }

    fn save_diff(&self, w: &mut BinaryWriter) -> CoreResult<()> {
        for entity in self.base.keys() {
            if !self.contains(*entity) {
                w.write_u64(entity.raw());
            }
        }
        // Removals with no base entry still block templates on reload
        for entity in &self.removed {
            if !self.base.contains_key(entity) && !self.contains(*entity) {
                w.write_u64(entity.raw());
            }
        }
        w.write_u64(HEntity::INVALID.raw());

        for record in &self.dense {
            if self.find_base(record.entity) == Some(&record.value) {
                continue;
            }
            self.write_record(w, record.entity, &record.value)?;
        }
        w.write_u64(HEntity::INVALID.raw());
        Ok(())
    }

    fn clear_all(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.removed.clear();
        self.base.clear();
        self.base_stream = None;
    }

    fn clear_diff(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.removed.clear();

        let entities: Vec<HEntity> = self.base.keys().copied().collect();
        for entity in entities {
            if let Some(value) = self.find_base(entity).cloned() {
                self.add(entity, value);
            }
        }
    }

    fn instantiate_template(
        &mut self,
        entity: HEntity,
        data: &Data,
        into_base: bool,
        validate: bool,
    ) -> bool {
        if !entity.is_valid() {
            return false;
        }

        if into_base {
            if self.base.contains_key(&entity) {
                return false;
            }
            let Some(value) = self.merged(&T::default(), data) else {
                return false;
            };
            let cell = OnceCell::new();
            let _ = cell.set(value);
            self.base.insert(
                entity,
                BaseEntry {
                    range: 0..0,
                    value: cell,
                },
            );
            return true;
        }

        if self.contains(entity) || self.removed.contains(&entity) {
            return false;
        }
        let Some(value) = self.merged(&T::default(), data) else {
            return false;
        };
        if self.add(entity, value).is_none() {
            return false;
        }
        if validate {
            if let Some(slot) = self.slot_of(entity) {
                let record = &mut self.dense[slot];
                record.validated = record.value.validate(entity);
            }
        }
        true
    }

    fn validate_components(&mut self, level: StrId, entities: &EntityStorage) -> usize {
        let mut count = 0;
        for record in &mut self.dense {
            if record.validated {
                continue;
            }
            let in_level = entities
                .get(record.entity)
                .is_some_and(|e| e.level_id == level);
            if in_level && record.value.validate(record.entity) {
                record.validated = true;
                count += 1;
            }
        }
        count
    }

    fn invalidate_components(&mut self, level: StrId, entities: &EntityStorage) -> usize {
        let mut count = 0;
        for record in &mut self.dense {
            if !record.validated {
                continue;
            }
            let in_level = entities
                .get(record.entity)
                .is_some_and(|e| e.level_id == level);
            if in_level {
                record.value.invalidate(record.entity);
                record.validated = false;
                count += 1;
            }
        }
        count
    }
}
