use crate::entities::object::Object;
use crate::error::ProtocolError;
use crate::world::appearance::{AppearanceCatalog, COST_UNPASSABLE};
use crate::world::position::{Position, MAX_Z};

pub const MAP_SIZE_X: usize = 18;
pub const MAP_SIZE_Y: usize = 14;
pub const MAP_SIZE_Z: usize = 8;
/// Objects kept per field; the server never sends more.
pub const MAP_SIZE_W: usize = 10;

pub const PLAYER_OFFSET_X: usize = 8;
pub const PLAYER_OFFSET_Y: usize = 6;
pub const GROUND_LAYER: u8 = 7;
pub const UNDERGROUND_LAYER: u8 = 2;

const FIELD_COUNT: usize = MAP_SIZE_X * MAP_SIZE_Y * MAP_SIZE_Z;

/// Window-relative field address. Plane 0 is the lowest visible floor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapPosition {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl MapPosition {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    fn in_window(self) -> bool {
        self.x < MAP_SIZE_X && self.y < MAP_SIZE_Y && self.z < MAP_SIZE_Z
    }
}

/// Object stack of one field, topmost last.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapField {
    objects: Vec<Object>,
}

impl MapField {
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn get(&self, stack_pos: usize) -> Option<&Object> {
        self.objects.get(stack_pos)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.objects.len() >= MAP_SIZE_W
    }

    pub fn find_creature(&self, id: crate::entities::creature::CreatureId) -> Option<usize> {
        self.objects
            .iter()
            .position(|object| object.creature_id() == Some(id))
    }

    fn reset(&mut self) {
        self.objects.clear();
    }
}

/// Sliding replica of the fields around the player.
///
/// Storage is a torus: `origin` holds the storage offset of window cell
/// (0, 0, 0) per axis, so scrolling rewrites only the exposed edge.
#[derive(Debug)]
pub struct WorldMap {
    fields: Vec<MapField>,
    origin: [usize; 3],
    position: Position,
    valid: bool,
}

impl Default for WorldMap {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldMap {
    pub fn new() -> Self {
        Self {
            fields: vec![MapField::default(); FIELD_COUNT],
            origin: [0; 3],
            position: Position::default(),
            valid: false,
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Absolute position of the player, the anchor of the window.
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn player_z_plane(&self) -> usize {
        if self.position.z <= GROUND_LAYER {
            usize::from(GROUND_LAYER - self.position.z)
        } else {
            usize::from(UNDERGROUND_LAYER)
        }
    }

    pub fn reset_map(&mut self) {
        for field in &mut self.fields {
            field.reset();
        }
        self.origin = [0; 3];
        self.valid = false;
    }

    /// Window plane index of the lowest visible floor.
    fn plane_base(&self) -> i32 {
        if self.position.z <= GROUND_LAYER {
            i32::from(GROUND_LAYER)
        } else {
            i32::from(self.position.z) + i32::from(UNDERGROUND_LAYER)
        }
    }

    fn floor_visible(&self, z: i32) -> bool {
        let player_z = i32::from(self.position.z);
        if !(0..=i32::from(MAX_Z)).contains(&z) {
            return false;
        }
        if self.position.z <= GROUND_LAYER {
            z <= i32::from(GROUND_LAYER)
        } else {
            (z - player_z).abs() <= i32::from(UNDERGROUND_LAYER)
        }
    }

    /// Window cell of `absolute`, floors shifted by their height difference
    /// to the player.
    fn project(&self, absolute: Position) -> (i32, i32, i32) {
        let offset = i32::from(self.position.z) - i32::from(absolute.z);
        let x = i32::from(absolute.x) - i32::from(self.position.x) + PLAYER_OFFSET_X as i32 - offset;
        let y = i32::from(absolute.y) - i32::from(self.position.y) + PLAYER_OFFSET_Y as i32 - offset;
        let z = self.plane_base() - i32::from(absolute.z);
        (x, y, z)
    }

    pub fn is_visible(&self, absolute: Position, strict: bool) -> bool {
        let (x, y, _) = self.project(absolute);
        let inside = (0..MAP_SIZE_X as i32).contains(&x) && (0..MAP_SIZE_Y as i32).contains(&y);
        if strict {
            inside && self.floor_visible(i32::from(absolute.z))
        } else {
            inside && absolute.z <= MAX_Z
        }
    }

    pub fn to_map(&self, absolute: Position) -> Result<MapPosition, ProtocolError> {
        if !self.is_visible(absolute, true) {
            return Err(ProtocolError::OutOfRangeCoordinate(absolute));
        }
        let (x, y, z) = self.project(absolute);
        Ok(MapPosition::new(x as usize, y as usize, z as usize))
    }

    pub fn to_absolute(&self, map: MapPosition) -> Result<Position, ProtocolError> {
        let z = self.plane_base() - map.z as i32;
        let offset = i32::from(self.position.z) - z;
        let x = i32::from(self.position.x) - PLAYER_OFFSET_X as i32 + map.x as i32 + offset;
        let y = i32::from(self.position.y) - PLAYER_OFFSET_Y as i32 + map.y as i32 + offset;
        let clamp16 = |value: i32| value.clamp(0, i32::from(u16::MAX)) as u16;
        let absolute = Position::new(clamp16(x), clamp16(y), z.clamp(0, i32::from(u8::MAX)) as u8);
        let representable = (0..=i32::from(u16::MAX)).contains(&x) && (0..=i32::from(u16::MAX)).contains(&y);
        if !map.in_window() || !representable || !self.floor_visible(z) {
            return Err(ProtocolError::OutOfRangeCoordinate(absolute));
        }
        Ok(absolute)
    }

    fn slot(&self, map: MapPosition) -> Result<usize, ProtocolError> {
        if !map.in_window() {
            return Err(ProtocolError::InvariantViolation(format!(
                "map position ({}, {}, {}) outside the window",
                map.x, map.y, map.z
            )));
        }
        let x = (map.x + self.origin[0]) % MAP_SIZE_X;
        let y = (map.y + self.origin[1]) % MAP_SIZE_Y;
        let z = (map.z + self.origin[2]) % MAP_SIZE_Z;
        Ok((z * MAP_SIZE_Y + y) * MAP_SIZE_X + x)
    }

    pub fn field(&self, map: MapPosition) -> Result<&MapField, ProtocolError> {
        let slot = self.slot(map)?;
        Ok(&self.fields[slot])
    }

    fn field_mut(&mut self, map: MapPosition) -> Result<&mut MapField, ProtocolError> {
        let slot = self.slot(map)?;
        Ok(&mut self.fields[slot])
    }

    pub fn reset_field(&mut self, map: MapPosition) -> Result<(), ProtocolError> {
        self.field_mut(map)?.reset();
        Ok(())
    }

    pub fn get_object(&self, map: MapPosition, stack_pos: usize) -> Option<&Object> {
        self.field(map).ok()?.get(stack_pos)
    }

    fn object_not_found(&self, map: MapPosition, stack_pos: usize) -> ProtocolError {
        ProtocolError::ObjectNotFound {
            position: self.to_absolute(map).unwrap_or(self.position),
            stack_pos: stack_pos.min(usize::from(u8::MAX)) as u8,
        }
    }

    /// Appends below the cap; returns false when the field is full.
    pub fn append_object(&mut self, map: MapPosition, object: Object) -> Result<bool, ProtocolError> {
        let field = self.field_mut(map)?;
        if field.is_full() {
            return Ok(false);
        }
        field.objects.push(object);
        Ok(true)
    }

    /// Places `object` on top of the stack. A full stack loses its topmost
    /// object. Returns the stack position used.
    pub fn put_object(&mut self, map: MapPosition, object: Object) -> Result<usize, ProtocolError> {
        let field = self.field_mut(map)?;
        if field.is_full() {
            field.objects.truncate(MAP_SIZE_W - 1);
        }
        field.objects.push(object);
        Ok(field.objects.len() - 1)
    }

    /// Inserts at `stack_pos`, pushing later objects up; anything pushed past
    /// the cap is dropped.
    pub fn insert_object(
        &mut self,
        map: MapPosition,
        stack_pos: usize,
        object: Object,
    ) -> Result<(), ProtocolError> {
        if stack_pos >= MAP_SIZE_W {
            return Err(self.object_not_found(map, stack_pos));
        }
        let field = self.field_mut(map)?;
        let index = stack_pos.min(field.objects.len());
        field.objects.insert(index, object);
        field.objects.truncate(MAP_SIZE_W);
        Ok(())
    }

    /// Replaces the object at `stack_pos`, returning the old one.
    pub fn change_object(
        &mut self,
        map: MapPosition,
        stack_pos: usize,
        object: Object,
    ) -> Result<Object, ProtocolError> {
        if self.get_object(map, stack_pos).is_none() {
            return Err(self.object_not_found(map, stack_pos));
        }
        let field = self.field_mut(map)?;
        Ok(std::mem::replace(&mut field.objects[stack_pos], object))
    }

    pub fn delete_object(&mut self, map: MapPosition, stack_pos: usize) -> Result<Object, ProtocolError> {
        if self.get_object(map, stack_pos).is_none() {
            return Err(self.object_not_found(map, stack_pos));
        }
        let field = self.field_mut(map)?;
        Ok(field.objects.remove(stack_pos))
    }

    /// Shifts window content by (dx, dy, dz) cells and clears the fields the
    /// shift exposed.
    pub fn scroll(&mut self, dx: i32, dy: i32, dz: i32) {
        let extents = [MAP_SIZE_X, MAP_SIZE_Y, MAP_SIZE_Z];
        let deltas = [dx, dy, dz];
        if deltas
            .iter()
            .zip(extents)
            .any(|(delta, extent)| delta.unsigned_abs() as usize >= extent)
        {
            for field in &mut self.fields {
                field.reset();
            }
            return;
        }
        for axis in 0..3 {
            let extent = extents[axis] as i32;
            self.origin[axis] = (self.origin[axis] as i32 - deltas[axis]).rem_euclid(extent) as usize;
        }
        for axis in 0..3 {
            let delta = deltas[axis];
            let extent = extents[axis] as i32;
            let exposed = if delta > 0 {
                0..delta
            } else {
                extent + delta..extent
            };
            for index in exposed {
                self.clear_slab(axis, index as usize);
            }
        }
    }

    fn clear_slab(&mut self, axis: usize, index: usize) {
        let extents = [MAP_SIZE_X, MAP_SIZE_Y, MAP_SIZE_Z];
        let (first, second) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        for a in 0..extents[first] {
            for b in 0..extents[second] {
                let mut coordinate = [0usize; 3];
                coordinate[axis] = index;
                coordinate[first] = a;
                coordinate[second] = b;
                let map = MapPosition::new(coordinate[0], coordinate[1], coordinate[2]);
                if let Ok(slot) = self.slot(map) {
                    self.fields[slot].reset();
                }
            }
        }
    }

    /// Colour of the topmost object that has one; 0 when none does.
    pub fn minimap_colour(&self, map: MapPosition, catalog: &dyn AppearanceCatalog) -> u8 {
        let Ok(field) = self.field(map) else {
            return 0;
        };
        field
            .objects
            .iter()
            .rev()
            .filter_map(|object| object.type_id())
            .filter_map(|type_id| catalog.appearance(type_id))
            .find_map(|appearance| appearance.minimap_color)
            .unwrap_or(0)
    }

    /// Ground speed capped below the unpassable marker; unpassable when there
    /// is no ground or anything on the field blocks.
    pub fn minimap_cost(&self, map: MapPosition, catalog: &dyn AppearanceCatalog) -> u8 {
        let Ok(field) = self.field(map) else {
            return COST_UNPASSABLE;
        };
        let ground = field
            .objects
            .first()
            .and_then(|object| object.type_id())
            .and_then(|type_id| catalog.appearance(type_id))
            .filter(|appearance| appearance.is_ground);
        let Some(ground) = ground else {
            return COST_UNPASSABLE;
        };
        let blocked = field
            .objects
            .iter()
            .filter_map(|object| object.type_id())
            .filter_map(|type_id| catalog.appearance(type_id))
            .any(|appearance| appearance.is_unpassable);
        if blocked {
            COST_UNPASSABLE
        } else {
            ground.walk_cost()
        }
    }
}
