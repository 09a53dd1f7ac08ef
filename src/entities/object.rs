use crate::entities::creature::CreatureId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectTypeId(pub u16);

/// Type ids announcing a creature instead of an item.
pub const CREATURE_MARKER_NEW: u16 = 0x0061;
pub const CREATURE_MARKER_KNOWN: u16 = 0x0062;
pub const CREATURE_MARKER_TURN: u16 = 0x0063;

/// Type ids from here on end a field; the low byte is the skip count.
pub const FIELD_END_MARKER: u16 = 0xff00;

pub fn is_creature_marker(type_or_id: u16) -> bool {
    matches!(
        type_or_id,
        CREATURE_MARKER_NEW | CREATURE_MARKER_KNOWN | CREATURE_MARKER_TURN
    )
}

/// Something stacked on a map field or held in a container slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Item {
        type_id: ObjectTypeId,
        /// Count, fluid type or charges, when the type carries one.
        data: Option<u8>,
        mark: Option<u8>,
        animation_phase: Option<u8>,
    },
    Creature(CreatureId),
}

impl Object {
    pub fn item(type_id: u16) -> Self {
        Object::Item {
            type_id: ObjectTypeId(type_id),
            data: None,
            mark: None,
            animation_phase: None,
        }
    }

    pub fn item_with_data(type_id: u16, data: u8) -> Self {
        Object::Item {
            type_id: ObjectTypeId(type_id),
            data: Some(data),
            mark: None,
            animation_phase: None,
        }
    }

    pub fn is_creature(&self) -> bool {
        matches!(self, Object::Creature(_))
    }

    pub fn creature_id(&self) -> Option<CreatureId> {
        match self {
            Object::Creature(id) => Some(*id),
            Object::Item { .. } => None,
        }
    }

    pub fn type_id(&self) -> Option<ObjectTypeId> {
        match self {
            Object::Item { type_id, .. } => Some(*type_id),
            Object::Creature(_) => None,
        }
    }
}
