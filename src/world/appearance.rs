use crate::entities::object::ObjectTypeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Traversal cost the minimap records for fields nobody can walk on.
pub const COST_UNPASSABLE: u8 = 255;
const COST_MAX_WALKABLE: u16 = 254;

/// What the decoder needs to know about an object type. Everything else
/// about appearances belongs to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceType {
    pub id: ObjectTypeId,
    #[serde(default)]
    pub is_ground: bool,
    /// Ground speed; only meaningful for ground types.
    #[serde(default)]
    pub ground_speed: u16,
    /// Cumulative, fluid and splash types carry a data byte on the wire.
    #[serde(default)]
    pub has_count: bool,
    #[serde(default)]
    pub is_unpassable: bool,
    #[serde(default)]
    pub is_animated: bool,
    #[serde(default)]
    pub minimap_color: Option<u8>,
}

impl AppearanceType {
    pub fn new(id: u16) -> Self {
        Self {
            id: ObjectTypeId(id),
            is_ground: false,
            ground_speed: 0,
            has_count: false,
            is_unpassable: false,
            is_animated: false,
            minimap_color: None,
        }
    }

    pub fn ground(id: u16, speed: u16) -> Self {
        Self {
            is_ground: true,
            ground_speed: speed,
            ..Self::new(id)
        }
    }

    pub fn walk_cost(&self) -> u8 {
        if !self.is_ground || self.is_unpassable {
            return COST_UNPASSABLE;
        }
        self.ground_speed.min(COST_MAX_WALKABLE) as u8
    }
}

/// Opaque lookup from type id to appearance, provided by the asset layer.
pub trait AppearanceCatalog {
    fn appearance(&self, type_id: ObjectTypeId) -> Option<&AppearanceType>;
}

#[derive(Debug, Default, Clone)]
pub struct AppearanceIndex {
    types: HashMap<ObjectTypeId, AppearanceType>,
}

impl AppearanceIndex {
    pub fn get(&self, id: ObjectTypeId) -> Option<&AppearanceType> {
        self.types.get(&id)
    }

    pub fn insert(&mut self, appearance: AppearanceType) -> Result<(), String> {
        if self.types.contains_key(&appearance.id) {
            return Err(format!("appearance type {} already exists", appearance.id.0));
        }
        self.types.insert(appearance.id, appearance);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Loads a YAML list of appearance entries.
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        let entries: Vec<AppearanceType> = serde_yaml::from_str(content)
            .map_err(|err| format!("appearance list parse failed: {}", err))?;
        let mut index = Self::default();
        for entry in entries {
            index.insert(entry)?;
        }
        Ok(index)
    }
}

impl AppearanceCatalog for AppearanceIndex {
    fn appearance(&self, type_id: ObjectTypeId) -> Option<&AppearanceType> {
        self.get(type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicates() {
        let mut index = AppearanceIndex::default();
        index.insert(AppearanceType::ground(100, 150)).expect("insert");
        assert!(index.insert(AppearanceType::new(100)).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn yaml_entries_default_missing_flags() {
        let index = AppearanceIndex::from_yaml_str(
            "- id: 100\n  is_ground: true\n  ground_speed: 150\n  minimap_color: 24\n- id: 3031\n  has_count: true\n",
        )
        .expect("yaml");
        let grass = index.appearance(ObjectTypeId(100)).expect("grass");
        assert!(grass.is_ground);
        assert_eq!(grass.minimap_color, Some(24));
        let gold = index.appearance(ObjectTypeId(3031)).expect("gold");
        assert!(gold.has_count);
        assert!(!gold.is_ground);
        assert_eq!(gold.minimap_color, None);
    }

    #[test]
    fn walk_cost_caps_and_blocks() {
        assert_eq!(AppearanceType::ground(1, 150).walk_cost(), 150);
        assert_eq!(AppearanceType::ground(2, 600).walk_cost(), 254);
        assert_eq!(AppearanceType::new(3).walk_cost(), COST_UNPASSABLE);
        let mut water = AppearanceType::ground(4, 100);
        water.is_unpassable = true;
        assert_eq!(water.walk_cost(), COST_UNPASSABLE);
    }
}
