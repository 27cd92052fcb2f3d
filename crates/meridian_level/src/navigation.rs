//! # Navigation
//!
//! A [`NavMap`] binds one navigation mesh resource to the agent size it was
//! built for, plus the runtime state of its named regions: which entity
//! controls a region (a door, a bridge) and which flags are raised on it.

use meridian_core::HEntity;
use meridian_shared::{Resource, StrId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Region flag: agents may not pass.
pub const NAV_FLAG_LOCKED: u16 = 0x0001;

/// Navigation mesh resource object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NavMesh {
    /// Number of polygons
    pub poly_count: u32,
    /// Polygons of each named region
    pub regions: BTreeMap<String, Vec<u32>>,
}

impl NavMesh {
    /// Polygons of `region`
    #[must_use]
    pub fn region_polys(&self, region: StrId) -> Option<&[u32]> {
        self.regions.get(region.as_str()).map(Vec::as_slice)
    }
}

/// A navmesh usable by agents up to a given size.
#[derive(Debug, Clone)]
pub struct NavMap {
    agent_radius: f32,
    agent_height: f32,
    nav_mesh: Arc<Resource>,
    controllers: BTreeMap<StrId, HEntity>,
    flags: BTreeMap<StrId, u16>,
}

impl NavMap {
    /// Creates a map for agents of the given size.
    #[must_use]
    pub fn new(agent_radius: f32, agent_height: f32, nav_mesh: Arc<Resource>) -> Self {
        Self {
            agent_radius,
            agent_height,
            nav_mesh,
            controllers: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    /// Agent radius
    #[must_use]
    pub const fn agent_radius(&self) -> f32 {
        self.agent_radius
    }

    /// Agent height
    #[must_use]
    pub const fn agent_height(&self) -> f32 {
        self.agent_height
    }

    /// Navmesh resource
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.nav_mesh
    }

    /// Navmesh, loading it if needed.
    #[must_use]
    pub fn nav_mesh(&self) -> Option<Arc<NavMesh>> {
        self.nav_mesh.validate_object::<NavMesh>()
    }

    /// Sets the entity controlling `region`. An invalid handle clears it.
    pub fn set_region_controller(&mut self, region: StrId, controller: HEntity) {
        if controller.is_valid() {
            self.controllers.insert(region, controller);
        } else {
            self.controllers.remove(&region);
        }
    }

    /// Entity controlling `region`
    #[must_use]
    pub fn region_controller(&self, region: StrId) -> Option<HEntity> {
        self.controllers.get(&region).copied()
    }

    /// Raises or clears `flags` on `region`.
    pub fn set_region_flags(&mut self, region: StrId, flags: u16, on: bool) {
        let current = self.flags.entry(region).or_insert(0);
        if on {
            *current |= flags;
        } else {
            *current &= !flags;
        }
        if *current == 0 {
            self.flags.remove(&region);
        }
    }

    /// Flags raised on `region`
    #[must_use]
    pub fn region_flags(&self, region: StrId) -> u16 {
        self.flags.get(&region).copied().unwrap_or(0)
    }
}
