//! Level description.
//!
//! Every field is optional. Keys use PascalCase so the same document reads
//! from TOML files and from params values embedded in other descriptions.

use crate::error::LevelResult;
use meridian_shared::{Aabb, Data, Params, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Depth used when a description leaves `SubdivisionDepth` at 0.
pub const DEFAULT_SUBDIVISION_DEPTH: u32 = 5;

/// One navigation mesh entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NavigationDesc {
    /// Radius of the agents the mesh was built for
    pub agent_radius: f32,
    /// Height of the agents the mesh was built for
    pub agent_height: f32,
    /// Navmesh resource id
    pub nav_mesh: String,
    /// Load the navmesh with the level instead of on first use
    pub preload: bool,
}

/// Level description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LevelDesc {
    /// Center of the level bounds
    pub center: Vec3,
    /// Full size of the level bounds
    pub size: Vec3,
    /// SPS depth, 0 picks the default
    pub subdivision_depth: u32,
    /// Center of the interactive area, defaults to `center`
    pub interactive_center: Option<Vec3>,
    /// Size of the interactive area, defaults to `size`
    pub interactive_size: Option<Vec3>,
    /// Static scene parts: child node name to scene resource id
    pub static_scene: BTreeMap<String, String>,
    /// Allow taking exclusive ownership of static scene resources
    pub static_scene_is_unique: bool,
    /// Navigation meshes
    pub navigation: Vec<NavigationDesc>,
    /// Entities in the params world format, loaded as the level's base
    pub entities: Option<Params>,
}

impl Default for LevelDesc {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            size: Vec3::new(512.0, 128.0, 512.0),
            subdivision_depth: 0,
            interactive_center: None,
            interactive_size: None,
            static_scene: BTreeMap::new(),
            static_scene_is_unique: true,
            navigation: Vec::new(),
            entities: None,
        }
    }
}

impl LevelDesc {
    /// Parses a TOML description.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or wrongly typed fields.
    pub fn from_toml_str(text: &str) -> LevelResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML description from disk.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> LevelResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Converts a params value.
    ///
    /// # Errors
    ///
    /// Fails if a present field has the wrong shape.
    pub fn from_params(params: &Params) -> LevelResult<Self> {
        Ok(Data::from(params.clone()).to_deserialize()?)
    }

    /// Level bounds
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_extent(self.center, self.size * 0.5)
    }

    /// Interactive area bounds
    #[must_use]
    pub fn interactive_bounds(&self) -> Aabb {
        Aabb::from_center_extent(
            self.interactive_center.unwrap_or(self.center),
            self.interactive_size.unwrap_or(self.size) * 0.5,
        )
    }

    /// SPS depth with the default applied
    #[must_use]
    pub const fn effective_depth(&self) -> u32 {
        if self.subdivision_depth == 0 {
            DEFAULT_SUBDIVISION_DEPTH
        } else {
            self.subdivision_depth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let desc = LevelDesc::from_toml_str("").unwrap();
        assert_eq!(desc, LevelDesc::default());
        assert_eq!(desc.effective_depth(), DEFAULT_SUBDIVISION_DEPTH);
        assert_eq!(desc.interactive_bounds(), desc.bounds());
        assert!(desc.static_scene_is_unique);
    }

    #[test]
    fn test_toml_fields() {
        let desc = LevelDesc::from_toml_str(
            r#"
            SubdivisionDepth = 7
            Size = { x = 100.0, y = 20.0, z = 200.0 }
            InteractiveSize = { x = 50.0, y = 20.0, z = 50.0 }

            [StaticScene]
            Terrain = "scenes/terrain"

            [[Navigation]]
            AgentRadius = 0.3
            AgentHeight = 1.7
            NavMesh = "nav/small"
            Preload = true
            "#,
        )
        .unwrap();

        assert_eq!(desc.effective_depth(), 7);
        assert_eq!(desc.bounds().max, Vec3::new(50.0, 10.0, 100.0));
        assert_eq!(desc.interactive_bounds().max.x, 25.0);
        assert_eq!(desc.static_scene["Terrain"], "scenes/terrain");
        assert_eq!(desc.navigation.len(), 1);
        assert!(desc.navigation[0].preload);
    }

    #[test]
    fn test_from_params() {
        let params = Params::from_json_str(
            r#"{"Center": {"x": 1.0, "y": 2.0, "z": 3.0}, "StaticSceneIsUnique": false,
                "Entities": {"__4294967296": {"Level": "L"}}}"#,
        )
        .unwrap();
        let desc = LevelDesc::from_params(&params).unwrap();
        assert_eq!(desc.center, Vec3::new(1.0, 2.0, 3.0));
        assert!(!desc.static_scene_is_unique);
        assert_eq!(desc.entities.map(|e| e.len()), Some(1));
    }

    #[test]
    fn test_wrong_type_rejected() {
        assert!(LevelDesc::from_toml_str("SubdivisionDepth = \"deep\"").is_err());
    }
}
