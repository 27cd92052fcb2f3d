//! # Entity Records
//!
//! The per-entity record kept by the world: owning level, source template
//! and the active flag. Components are stored separately.

use super::handle::HandleArray;
use crate::error::CoreResult;
use crate::io::{BinaryReader, BinaryWriter};
use meridian_shared::{Data, Params, StrId};

/// Entity storage of the world.
pub type EntityStorage = HandleArray<Entity>;

const DIFF_LEVEL: u8 = 1 << 0;
const DIFF_TEMPLATE: u8 = 1 << 1;
const DIFF_ACTIVE: u8 = 1 << 2;

/// Params key of the level id.
pub const KEY_LEVEL: &str = "Level";
/// Params key of the template id.
pub const KEY_TEMPLATE: &str = "Template";
/// Params key of the active flag.
pub const KEY_IS_ACTIVE: &str = "IsActive";

/// Entity record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entity {
    /// Level the entity belongs to. Empty for global entities.
    pub level_id: StrId,
    /// Template the entity was created from. Empty if none.
    pub template_id: StrId,
    /// Inactive entities are skipped by iteration.
    pub is_active: bool,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            level_id: StrId::EMPTY,
            template_id: StrId::EMPTY,
            is_active: true,
        }
    }
}

impl Entity {
    /// Creates an active entity record.
    #[must_use]
    pub const fn new(level_id: StrId, template_id: StrId) -> Self {
        Self {
            level_id,
            template_id,
            is_active: true,
        }
    }

    /// Writes the full record.
    ///
    /// # Errors
    ///
    /// Fails if an identifier is too long.
    pub fn write(&self, w: &mut BinaryWriter) -> CoreResult<()> {
        w.write_str_id(self.level_id)?;
        w.write_str_id(self.template_id)?;
        w.write_u8(u8::from(self.is_active));
        Ok(())
    }

    /// Reads a full record.
    ///
    /// # Errors
    ///
    /// Fails on a truncated stream.
    pub fn read(r: &mut BinaryReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            level_id: r.read_str_id()?,
            template_id: r.read_str_id()?,
            is_active: r.read_u8()? != 0,
        })
    }

    /// Mask of the fields that differ from `base`.
    #[must_use]
    pub fn diff_mask(&self, base: &Self) -> u8 {
        let mut mask = 0;
        if self.level_id != base.level_id {
            mask |= DIFF_LEVEL;
        }
        if self.template_id != base.template_id {
            mask |= DIFF_TEMPLATE;
        }
        if self.is_active != base.is_active {
            mask |= DIFF_ACTIVE;
        }
        mask
    }

    /// Writes the changed fields against `base`: a mask byte, then the
    /// fields whose bit is set.
    ///
    /// # Errors
    ///
    /// Fails if an identifier is too long.
    pub fn write_diff(&self, base: &Self, w: &mut BinaryWriter) -> CoreResult<()> {
        let mask = self.diff_mask(base);
        w.write_u8(mask);
        if mask & DIFF_LEVEL != 0 {
            w.write_str_id(self.level_id)?;
        }
        if mask & DIFF_TEMPLATE != 0 {
            w.write_str_id(self.template_id)?;
        }
        if mask & DIFF_ACTIVE != 0 {
            w.write_u8(u8::from(self.is_active));
        }
        Ok(())
    }

    /// Applies a diff written by [`Entity::write_diff`] over `self`.
    ///
    /// # Errors
    ///
    /// Fails on a truncated stream.
    pub fn read_diff(&mut self, r: &mut BinaryReader<'_>) -> CoreResult<()> {
        let mask = r.read_u8()?;
        if mask & DIFF_LEVEL != 0 {
            self.level_id = r.read_str_id()?;
        }
        if mask & DIFF_TEMPLATE != 0 {
            self.template_id = r.read_str_id()?;
        }
        if mask & DIFF_ACTIVE != 0 {
            self.is_active = r.read_u8()? != 0;
        }
        Ok(())
    }

    /// Full record as params. Default-valued fields are omitted.
    #[must_use]
    pub fn to_params(&self) -> Params {
        self.to_params_diff(&Self::default())
    }

    /// Changed fields against `base` as params.
    #[must_use]
    pub fn to_params_diff(&self, base: &Self) -> Params {
        let mut out = Params::new();
        let mask = self.diff_mask(base);
        if mask & DIFF_LEVEL != 0 {
            out.set(StrId::new(KEY_LEVEL), self.level_id.as_str());
        }
        if mask & DIFF_TEMPLATE != 0 {
            out.set(StrId::new(KEY_TEMPLATE), self.template_id.as_str());
        }
        if mask & DIFF_ACTIVE != 0 {
            out.set(StrId::new(KEY_IS_ACTIVE), self.is_active);
        }
        out
    }

    /// Overwrites the fields present in `params`. Other keys are ignored.
    pub fn apply_params(&mut self, params: &Params) {
        if let Some(level) = params.get(StrId::new(KEY_LEVEL)).and_then(Data::as_str) {
            self.level_id = StrId::new(level);
        }
        if let Some(template) = params.get(StrId::new(KEY_TEMPLATE)).and_then(Data::as_str) {
            self.template_id = StrId::new(template);
        }
        if let Some(active) = params.get(StrId::new(KEY_IS_ACTIVE)).and_then(Data::as_bool) {
            self.is_active = active;
        }
    }
}
