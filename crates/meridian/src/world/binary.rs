//! # Binary World Format
//!
//! ```text
//! base:  u32 entity count, count × (u64 handle, entity record)
//!        component sections
//! diff:  u64 deleted handle ... 0
//!        (u64 handle, entity record diff) ... 0
//!        component sections
//!
//! component sections:
//!        u32 section count, count × (str id type, u32 byte length, payload)
//! ```
//!
//! Sections of component types this world doesn't know are skipped by
//! their length. A truncated or otherwise corrupt stream fails the whole
//! load and leaves the world empty.

use super::{GameWorld, WorldState};
use crate::error::WorldResult;
use meridian_core::{
    BaseStream, BinaryReader, BinaryWriter, ComponentStorage, CoreError, CoreResult, Entity,
    HEntity,
};
use std::collections::HashSet;

/// Smallest encoded base entity: handle plus two empty ids and a flag.
const MIN_ENTITY_RECORD: usize = 8 + 2 + 2 + 1;

impl GameWorld {
    /// Loads a base snapshot, replacing everything in the world.
    ///
    /// The stream is kept: with lazy base components enabled, payloads
    /// are decoded from it on first access. The world ends up in
    /// [`WorldState::BaseLoaded`]; start it or load a diff next.
    ///
    /// # Errors
    ///
    /// Fails on a truncated or corrupt stream. The world is cleared.
    pub fn load_base(&mut self, stream: impl Into<BaseStream>) -> WorldResult<()> {
        let stream = stream.into();
        if let Err(err) = self.read_base(&stream) {
            tracing::warn!("world base rejected: {}", err);
            self.clear_all(0);
            return Err(err.into());
        }

        tracing::info!(
            "world base loaded: {} entities, {} bytes",
            self.entities_base.len(),
            stream.len()
        );
        Ok(())
    }

    fn read_base(&mut self, stream: &BaseStream) -> CoreResult<()> {
        let mut r = BinaryReader::new(stream);

        let count = r.read_u32()? as usize;
        // Capacity hint only, a corrupt count must not reserve memory
        self.clear_all(count.min(r.remaining() / MIN_ENTITY_RECORD));
        self.base_stream = Some(BaseStream::clone(stream));

        for _ in 0..count {
            let entity = HEntity::from_raw(r.read_u64()?);
            let record = Entity::read(&mut r)?;
            if !entity.is_valid() {
                return Err(CoreError::InvalidHandle("base entity list"));
            }
            if !self.entities_base.allocate_with_handle(entity, record) {
                return Err(CoreError::HandleConflict { raw: entity.raw() });
            }
        }

        let sections = r.read_u32()?;
        for _ in 0..sections {
            let name = r.read_str_id()?;
            let len = r.read_u32()? as usize;
            let start = r.position();
            r.skip(len)?;

            match self.storages.by_name_mut(name) {
                Some(storage) => storage.load_base(stream, start..start + len)?,
                None => tracing::warn!("skipping unregistered component section '{}'", name),
            }
        }

        // Purely templated components are never stored per entity
        self.instantiate_all_templates(true);

        self.state = WorldState::BaseLoaded;
        Ok(())
    }

    /// Rebuilds the actual state as the loaded base plus `diff`.
    ///
    /// The world ends up in [`WorldState::Stopped`].
    ///
    /// # Errors
    ///
    /// Fails on a truncated or corrupt diff. The world is cleared.
    pub fn load_diff(&mut self, diff: &[u8]) -> WorldResult<()> {
        if let Err(err) = self.read_diff(diff) {
            tracing::warn!("world diff rejected: {}", err);
            self.clear_all(0);
            return Err(err.into());
        }

        tracing::info!(
            "world diff loaded: {} entities over {} in base",
            self.entities.len(),
            self.entities_base.len()
        );
        Ok(())
    }

    fn read_diff(&mut self, diff: &[u8]) -> CoreResult<()> {
        let mut r = BinaryReader::new(diff);

        self.entities.clear(self.entities_base.len());

        let mut deleted = HashSet::new();
        loop {
            let entity = HEntity::from_raw(r.read_u64()?);
            if !entity.is_valid() {
                break;
            }
            deleted.insert(entity);
        }

        loop {
            let entity = HEntity::from_raw(r.read_u64()?);
            if !entity.is_valid() {
                break;
            }
            let mut record = self.entities_base.get(entity).copied().unwrap_or_default();
            record.read_diff(&mut r)?;
            if !self.entities.allocate_with_handle(entity, record) {
                return Err(CoreError::HandleConflict { raw: entity.raw() });
            }
        }

        let unchanged: Vec<(HEntity, Entity)> = self
            .entities_base
            .iter()
            .filter(|(entity, _)| !self.entities.contains(*entity) && !deleted.contains(entity))
            .map(|(entity, record)| (entity, *record))
            .collect();
        for (entity, record) in unchanged {
            self.entities.allocate_with_handle(entity, record);
        }

        // Storages without a section keep their base data
        for storage in self.storages.iter_mut() {
            storage.clear_diff();
        }

        let sections = r.read_u32()?;
        for _ in 0..sections {
            let name = r.read_str_id()?;
            let payload = r.read_blob()?;
            match self.storages.by_name_mut(name) {
                Some(storage) => storage.load_diff(payload)?,
                None => tracing::warn!("skipping unregistered component section '{}'", name),
            }
        }

        for storage in self.storages.iter_mut() {
            for entity in &deleted {
                storage.forget_entity(*entity);
            }
        }

        self.instantiate_all_templates(false);

        self.state = WorldState::Stopped;
        Ok(())
    }

    /// Writes the whole actual state in the base format.
    ///
    /// Returns `Ok(false)` without writing while the actual state isn't
    /// built yet.
    ///
    /// # Errors
    ///
    /// Fails if an identifier or a component can't be encoded.
    pub fn save_all(&self, w: &mut BinaryWriter) -> WorldResult<bool> {
        if self.state == WorldState::BaseLoaded {
            return Ok(false);
        }

        let count = u32::try_from(self.entities.len())
            .map_err(|_| CoreError::SectionTooLarge(self.entities.len()))?;
        w.write_u32(count);
        for (entity, record) in self.entities.iter() {
            w.write_u64(entity.raw());
            record.write(w)?;
        }

        self.write_sections(w, |storage, w| storage.save_all(w))?;
        Ok(true)
    }

    /// Writes the difference between the actual state and base.
    ///
    /// Existing entities without changes are left out. New entities are
    /// always written, even when they equal a default record.
    ///
    /// Returns `Ok(false)` without writing while the actual state isn't
    /// built yet.
    ///
    /// # Errors
    ///
    /// Fails if an identifier or a component can't be encoded.
    pub fn save_diff(&self, w: &mut BinaryWriter) -> WorldResult<bool> {
        if self.state == WorldState::BaseLoaded {
            return Ok(false);
        }

        for (entity, _) in self.entities_base.iter() {
            if !self.entities.contains(entity) {
                w.write_u64(entity.raw());
            }
        }
        w.write_u64(HEntity::INVALID.raw());

        let default_record = Entity::default();
        for (entity, record) in self.entities.iter() {
            let base = self.entities_base.get(entity);
            if let Some(base) = base {
                debug_assert_eq!(
                    record.template_id, base.template_id,
                    "entity template must never change at runtime"
                );
                if record.diff_mask(base) == 0 {
                    continue;
                }
            }
            w.write_u64(entity.raw());
            record.write_diff(base.unwrap_or(&default_record), w)?;
        }
        w.write_u64(HEntity::INVALID.raw());

        self.write_sections(w, |storage, w| storage.save_diff(w))?;
        Ok(true)
    }

    fn write_sections<F>(&self, w: &mut BinaryWriter, mut write: F) -> CoreResult<()>
    where
        F: FnMut(&dyn ComponentStorage, &mut BinaryWriter) -> CoreResult<()>,
    {
        let count = u32::try_from(self.storages.len())
            .map_err(|_| CoreError::SectionTooLarge(self.storages.len()))?;
        w.write_u32(count);

        for (name, storage) in self.storages.iter() {
            w.write_str_id(name)?;
            let marker = w.begin_section();
            write(storage, w)?;
            w.end_section(marker)?;
        }
        Ok(())
    }
}
