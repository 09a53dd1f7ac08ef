use crate::entities::buddy::{Buddy, BuddyGroup, BuddyStatus};
use crate::entities::container::ContainerView;
use crate::entities::creature::{
    Creature, CreatureId, CreatureKind, Light, Outfit, PartyFlag, PkFlag, SummonType,
};
use crate::entities::object::{
    is_creature_marker, Object, ObjectTypeId, CREATURE_MARKER_KNOWN, CREATURE_MARKER_NEW,
    CREATURE_MARKER_TURN, FIELD_END_MARKER,
};
use crate::error::ProtocolError;
use crate::net::features::FeatureGate;
use crate::net::outgoing::{write_cancel, write_pong};
use crate::net::packet::PacketReader;
use crate::world::appearance::AppearanceCatalog;
use crate::world::map::{MapPosition, MAP_SIZE_W, MAP_SIZE_X, MAP_SIZE_Y};
use crate::world::position::{Direction, Position, PositionDelta, MAX_Z};
use crate::world::state::{GameState, MinimapUpdate};
use tracing::{debug, error, trace, warn};

pub const OPCODE_INIT_GAME: u8 = 0x0a;
pub const OPCODE_PING: u8 = 0x1e;
pub const OPCODE_FULL_MAP: u8 = 0x64;
pub const OPCODE_TOP_ROW: u8 = 0x65;
pub const OPCODE_RIGHT_ROW: u8 = 0x66;
pub const OPCODE_BOTTOM_ROW: u8 = 0x67;
pub const OPCODE_LEFT_ROW: u8 = 0x68;
pub const OPCODE_FIELD_DATA: u8 = 0x69;
pub const OPCODE_CREATE_ON_MAP: u8 = 0x6a;
pub const OPCODE_CHANGE_ON_MAP: u8 = 0x6b;
pub const OPCODE_DELETE_ON_MAP: u8 = 0x6c;
pub const OPCODE_CREATURE_MOVE: u8 = 0x6d;
pub const OPCODE_OPEN_CONTAINER: u8 = 0x6e;
pub const OPCODE_CLOSE_CONTAINER: u8 = 0x6f;
pub const OPCODE_CREATE_IN_CONTAINER: u8 = 0x70;
pub const OPCODE_CHANGE_IN_CONTAINER: u8 = 0x71;
pub const OPCODE_DELETE_IN_CONTAINER: u8 = 0x72;
pub const OPCODE_CREATURE_MARK: u8 = 0x86;
pub const OPCODE_CREATURE_HEALTH: u8 = 0x8c;
pub const OPCODE_CREATURE_LIGHT: u8 = 0x8d;
pub const OPCODE_CREATURE_OUTFIT: u8 = 0x8e;
pub const OPCODE_CREATURE_SPEED: u8 = 0x8f;
pub const OPCODE_CREATURE_SKULL: u8 = 0x90;
pub const OPCODE_CREATURE_PARTY: u8 = 0x91;
pub const OPCODE_CLEAR_TARGET: u8 = 0xa3;
pub const OPCODE_CANCEL_WALK: u8 = 0xb5;
pub const OPCODE_WAIT: u8 = 0xb6;
pub const OPCODE_FLOOR_UP: u8 = 0xbe;
pub const OPCODE_FLOOR_DOWN: u8 = 0xbf;
pub const OPCODE_BUDDY_ADD: u8 = 0xd2;
pub const OPCODE_BUDDY_STATE: u8 = 0xd3;
pub const OPCODE_BUDDY_LOGOUT: u8 = 0xd4;
pub const OPCODE_BUDDY_GROUP_DATA: u8 = 0xd5;
pub const OPCODE_AUTOMAP_FLAG: u8 = 0xdd;

/// x co-ordinate that addresses a creature by id instead of a field.
const CREATURE_BY_ID: u16 = 0xffff;
/// Create-on-map stack position meaning "on top".
const STACK_POS_TOP: u8 = 0xff;

/// Something a UI layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    GameStarted { player_id: CreatureId },
    MapLoaded(Position),
    MapScrolled(Position),
    FloorChanged(Position),
    FieldChanged(Position),
    MinimapField(MinimapUpdate),
    CreatureChanged(CreatureId),
    CreatureMoved {
        id: CreatureId,
        from: Position,
        to: Position,
    },
    TargetsCleared,
    WalkCancelled(Direction),
    ContainerOpened(u8),
    ContainerClosed(u8),
    ContainerChanged(u8),
    BuddyChanged(CreatureId),
    BuddyGroupsChanged,
    AutomapMarkChanged(Position),
}

/// Result of decoding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub opcode: u8,
    pub events: Vec<GameEvent>,
    /// Packets the client must send back, already encoded.
    pub outgoing: Vec<Vec<u8>>,
}

impl DecodeOutcome {
    fn new(opcode: u8) -> Self {
        Self {
            opcode,
            events: Vec::new(),
            outgoing: Vec::new(),
        }
    }
}

/// Decodes exactly one message from `reader` and applies it to `state`.
///
/// On error the reader is left wherever decoding stopped and `state` may
/// hold the effects of the fields read so far; the stream is
/// desynchronised and the caller must not continue with the same buffer.
pub fn decode_message(
    state: &mut GameState,
    gate: &FeatureGate,
    catalog: &dyn AppearanceCatalog,
    reader: &mut PacketReader<'_>,
) -> Result<DecodeOutcome, ProtocolError> {
    let opcode = reader.read_u8()?;
    let mut context = MessageContext {
        state,
        gate,
        catalog,
        reader,
        outcome: DecodeOutcome::new(opcode),
    };
    trace!(opcode = format_args!("0x{opcode:02x}"), "decoding message");

    match opcode {
        OPCODE_INIT_GAME => context.parse_init_game()?,
        OPCODE_PING => context.outcome.outgoing.push(write_pong()),
        OPCODE_FULL_MAP => context.parse_full_map()?,
        OPCODE_TOP_ROW => context.parse_map_row(0, -1)?,
        OPCODE_RIGHT_ROW => context.parse_map_row(1, 0)?,
        OPCODE_BOTTOM_ROW => context.parse_map_row(0, 1)?,
        OPCODE_LEFT_ROW => context.parse_map_row(-1, 0)?,
        OPCODE_FIELD_DATA => context.parse_field_data()?,
        OPCODE_CREATE_ON_MAP => context.parse_create_on_map()?,
        OPCODE_CHANGE_ON_MAP => context.parse_change_on_map()?,
        OPCODE_DELETE_ON_MAP => context.parse_delete_on_map()?,
        OPCODE_CREATURE_MOVE => context.parse_creature_move()?,
        OPCODE_OPEN_CONTAINER => context.parse_open_container()?,
        OPCODE_CLOSE_CONTAINER => context.parse_close_container()?,
        OPCODE_CREATE_IN_CONTAINER => context.parse_create_in_container()?,
        OPCODE_CHANGE_IN_CONTAINER => context.parse_change_in_container()?,
        OPCODE_DELETE_IN_CONTAINER => context.parse_delete_in_container()?,
        OPCODE_CREATURE_MARK
        | OPCODE_CREATURE_HEALTH
        | OPCODE_CREATURE_LIGHT
        | OPCODE_CREATURE_OUTFIT
        | OPCODE_CREATURE_SPEED
        | OPCODE_CREATURE_SKULL
        | OPCODE_CREATURE_PARTY => context.parse_creature_update(opcode)?,
        OPCODE_CLEAR_TARGET => context.parse_clear_target()?,
        OPCODE_CANCEL_WALK => context.parse_cancel_walk()?,
        OPCODE_WAIT => {
            let ticks = context.reader.read_u16_le()?;
            context.state.player.add_wait(ticks);
        }
        OPCODE_FLOOR_UP => context.parse_floor_up()?,
        OPCODE_FLOOR_DOWN => context.parse_floor_down()?,
        OPCODE_BUDDY_ADD => context.parse_buddy_add()?,
        OPCODE_BUDDY_STATE => context.parse_buddy_state()?,
        OPCODE_BUDDY_LOGOUT => {
            let id = CreatureId(context.reader.read_u32_le()?);
            context.set_buddy_status(id, BuddyStatus::Offline);
        }
        OPCODE_BUDDY_GROUP_DATA => context.parse_buddy_groups()?,
        OPCODE_AUTOMAP_FLAG => context.parse_automap_flag()?,
        other => return Err(ProtocolError::UnknownOpcode(other)),
    }

    Ok(context.outcome)
}

/// Decodes messages until `data` is exhausted. The first error aborts the
/// packet; whatever follows it is dropped.
pub fn decode_packet(
    state: &mut GameState,
    gate: &FeatureGate,
    catalog: &dyn AppearanceCatalog,
    data: &[u8],
) -> Result<Vec<DecodeOutcome>, ProtocolError> {
    let mut reader = PacketReader::new(data);
    let mut outcomes = Vec::new();
    while !reader.is_empty() {
        match decode_message(state, gate, catalog, &mut reader) {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!(
                    offset = reader.position(),
                    dropped = reader.remaining(),
                    decoded = outcomes.len(),
                    "message aborted: {err}"
                );
                return Err(err);
            }
        }
    }
    Ok(outcomes)
}

/// Creature fields shared by the new and known creature encodings.
struct CreatureBody {
    health_percent: u8,
    direction: Direction,
    outfit: Outfit,
    mount: Option<u16>,
    light: Light,
    speed: u16,
    pk_flag: PkFlag,
    party_flag: PartyFlag,
    guild_flag: Option<u8>,
    icons: Option<u8>,
    mark: Option<u8>,
    unpassable: Option<bool>,
}

impl CreatureBody {
    fn apply(self, creature: &mut Creature) {
        creature.health_percent = self.health_percent;
        creature.direction = self.direction;
        creature.outfit = self.outfit;
        if let Some(mount) = self.mount {
            creature.mount = mount;
        }
        creature.light = self.light;
        creature.speed = self.speed;
        creature.pk_flag = self.pk_flag;
        creature.party_flag = self.party_flag;
        if let Some(guild_flag) = self.guild_flag {
            creature.guild_flag = guild_flag;
        }
        if let Some(icons) = self.icons {
            creature.icons = icons;
        }
        if self.mark.is_some() {
            creature.server_mark = self.mark;
        }
        if let Some(unpassable) = self.unpassable {
            creature.unpassable = unpassable;
        }
    }
}

/// Single-attribute creature change carried by the status opcodes.
enum CreatureUpdate {
    Mark(u8),
    Health(u8),
    Light(Light),
    Outfit(Outfit, Option<u16>),
    Speed { base_speed: Option<u16>, speed: u16 },
    Skull(PkFlag),
    Party(PartyFlag),
}

impl CreatureUpdate {
    fn affects_opponents(&self) -> bool {
        matches!(
            self,
            CreatureUpdate::Health(_) | CreatureUpdate::Skull(_) | CreatureUpdate::Party(_)
        )
    }

    fn apply(self, creature: &mut Creature) {
        match self {
            CreatureUpdate::Mark(mark) => creature.server_mark = Some(mark),
            CreatureUpdate::Health(health) => creature.health_percent = health,
            CreatureUpdate::Light(light) => creature.light = light,
            CreatureUpdate::Outfit(outfit, mount) => {
                creature.outfit = outfit;
                if let Some(mount) = mount {
                    creature.mount = mount;
                }
            }
            CreatureUpdate::Speed { base_speed, speed } => {
                if let Some(base_speed) = base_speed {
                    creature.base_speed = base_speed;
                }
                creature.speed = speed;
            }
            CreatureUpdate::Skull(pk_flag) => creature.pk_flag = pk_flag,
            CreatureUpdate::Party(party_flag) => creature.party_flag = party_flag,
        }
    }
}

struct MessageContext<'a, 'r> {
    state: &'a mut GameState,
    gate: &'a FeatureGate,
    catalog: &'a dyn AppearanceCatalog,
    reader: &'a mut PacketReader<'r>,
    outcome: DecodeOutcome,
}

impl MessageContext<'_, '_> {
    fn parse_init_game(&mut self) -> Result<(), ProtocolError> {
        let player_id = CreatureId(self.reader.read_u32_le()?);
        self.state.beat_duration = self.reader.read_u16_le()?;
        self.state.can_report_bugs = self.reader.read_bool()?;
        self.state.creatures.set_player_id(player_id);
        debug!(%player_id, beat = self.state.beat_duration, "game started");
        self.outcome.events.push(GameEvent::GameStarted { player_id });
        Ok(())
    }

    // --- things -----------------------------------------------------------

    fn read_item(&mut self, type_id: u16) -> Result<Object, ProtocolError> {
        let catalog = self.catalog;
        let appearance = catalog
            .appearance(ObjectTypeId(type_id))
            .ok_or(ProtocolError::UnknownAppearance(type_id))?;
        let mark = if self.gate.object_has_mark() {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        let data = if appearance.has_count {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        let animation_phase = if self.gate.object_has_animation_phase() && appearance.is_animated {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        Ok(Object::Item {
            type_id: ObjectTypeId(type_id),
            data,
            mark,
            animation_phase,
        })
    }

    /// Reads the body of a thing whose type id was already consumed.
    fn read_thing_with_type(
        &mut self,
        type_or_id: u16,
        position: Option<Position>,
    ) -> Result<Object, ProtocolError> {
        if is_creature_marker(type_or_id) {
            let id = self.read_creature(type_or_id, position)?;
            Ok(Object::Creature(id))
        } else {
            self.read_item(type_or_id)
        }
    }

    fn read_thing(&mut self, position: Option<Position>) -> Result<Object, ProtocolError> {
        let type_or_id = self.reader.read_u16_le()?;
        self.read_thing_with_type(type_or_id, position)
    }

    fn read_container_item_with_type(&mut self, type_id: u16) -> Result<Object, ProtocolError> {
        if is_creature_marker(type_id) {
            return Err(ProtocolError::InvalidMessage(format!(
                "creature marker 0x{type_id:04x} inside a container"
            )));
        }
        self.read_item(type_id)
    }

    fn read_container_item(&mut self) -> Result<Object, ProtocolError> {
        let type_id = self.reader.read_u16_le()?;
        self.read_container_item_with_type(type_id)
    }

    fn read_outfit(&mut self) -> Result<(Outfit, Option<u16>), ProtocolError> {
        let look_type = if self.gate.outfit_look_type_u16() {
            self.reader.read_u16_le()?
        } else {
            u16::from(self.reader.read_u8()?)
        };
        let outfit = if look_type != 0 {
            Outfit {
                look_type,
                head: self.reader.read_u8()?,
                body: self.reader.read_u8()?,
                legs: self.reader.read_u8()?,
                feet: self.reader.read_u8()?,
                addons: if self.gate.outfit_has_addons() {
                    self.reader.read_u8()?
                } else {
                    0
                },
                look_item: 0,
            }
        } else {
            Outfit {
                look_item: self.reader.read_u16_le()?,
                ..Outfit::default()
            }
        };
        let mount = if self.gate.outfit_has_mount() {
            Some(self.reader.read_u16_le()?)
        } else {
            None
        };
        Ok((outfit, mount))
    }

    fn read_creature_body(&mut self, is_new: bool) -> Result<CreatureBody, ProtocolError> {
        let health_percent = self.reader.read_u8()?;
        let direction = Direction::from_u8(self.reader.read_u8()?);
        let (outfit, mount) = self.read_outfit()?;
        let light = Light {
            intensity: self.reader.read_u8()?,
            color: self.reader.read_u8()?,
        };
        let speed = self.reader.read_u16_le()?;
        let pk_flag = PkFlag::from_u8(self.reader.read_u8()?);
        let party_flag = PartyFlag::from_u8(self.reader.read_u8()?);
        let guild_flag = if self.gate.creature_has_emblem() && is_new {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        let icons = if self.gate.creature_has_icons() {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        let mark = if self.gate.object_has_mark() {
            Some(self.reader.read_u8()?)
        } else {
            None
        };
        let unpassable = if self.gate.creature_has_unpassable() {
            Some(self.reader.read_bool()?)
        } else {
            None
        };
        Ok(CreatureBody {
            health_percent,
            direction,
            outfit,
            mount,
            light,
            speed,
            pk_flag,
            party_flag,
            guild_flag,
            icons,
            mark,
            unpassable,
        })
    }

    /// Reads a creature introduced by one of the creature markers and
    /// applies it to the registry. `position` is set when the creature is
    /// being placed on a field.
    fn read_creature(
        &mut self,
        marker: u16,
        position: Option<Position>,
    ) -> Result<CreatureId, ProtocolError> {
        let id = match marker {
            CREATURE_MARKER_TURN => {
                let id = CreatureId(self.reader.read_u32_le()?);
                let direction = Direction::from_u8(self.reader.read_u8()?);
                let unpassable = if self.gate.creature_has_unpassable() {
                    Some(self.reader.read_bool()?)
                } else {
                    None
                };
                let creature = self
                    .state
                    .creatures
                    .get_mut(id)
                    .ok_or(ProtocolError::CreatureNotFound(id))?;
                creature.direction = direction;
                if let Some(unpassable) = unpassable {
                    creature.unpassable = unpassable;
                }
                id
            }
            CREATURE_MARKER_NEW => {
                let removed = CreatureId(self.reader.read_u32_le()?);
                let id = CreatureId(self.reader.read_u32_le()?);
                let (kind, summon_type) = if self.gate.creature_has_type() {
                    CreatureKind::from_wire(self.reader.read_u8()?)
                } else {
                    (CreatureKind::from_legacy_id(id), SummonType::None)
                };
                let master_id = if self.gate.creature_has_summon_master()
                    && kind == CreatureKind::Summon
                {
                    Some(CreatureId(self.reader.read_u32_le()?))
                } else {
                    None
                };
                let name = self.reader.read_string()?;
                let body = self.read_creature_body(true)?;

                if removed.0 != 0 {
                    self.forget_creature(removed)?;
                }
                let creature = self
                    .state
                    .creatures
                    .insert_or_get(Creature::new(id, name.as_str(), kind))?;
                creature.name = name;
                creature.kind = kind;
                creature.summon_type = summon_type;
                creature.master_id = master_id.filter(|master| master.0 != 0);
                body.apply(creature);
                self.state.creatures.invalidate_opponents();
                id
            }
            CREATURE_MARKER_KNOWN => {
                let id = CreatureId(self.reader.read_u32_le()?);
                let body = self.read_creature_body(false)?;
                let creature = self
                    .state
                    .creatures
                    .get_mut(id)
                    .ok_or(ProtocolError::CreatureNotFound(id))?;
                body.apply(creature);
                self.state.creatures.invalidate_opponents();
                id
            }
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "0x{other:04x} is not a creature marker"
                )))
            }
        };

        if let Some(position) = position {
            if let Some(creature) = self.state.creatures.get_mut(id) {
                creature.position = position;
            }
        }
        self.outcome.events.push(GameEvent::CreatureChanged(id));
        Ok(id)
    }

    /// Drops a creature the server replaced with a new one.
    fn forget_creature(&mut self, id: CreatureId) -> Result<(), ProtocolError> {
        match self.state.creatures.remove(id) {
            Ok(_) => Ok(()),
            Err(ProtocolError::InvariantViolation(reason)) => {
                warn!(%id, "creature replacement rejected: {reason}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // --- bulk load --------------------------------------------------------

    /// Reads things into an already reset field until the end marker and
    /// returns the number of fields to skip afterwards.
    fn read_field(&mut self, map: MapPosition) -> Result<u16, ProtocolError> {
        let absolute = self.state.map.to_absolute(map)?;
        loop {
            let type_or_id = self.reader.read_u16_le()?;
            if type_or_id >= FIELD_END_MARKER {
                return Ok(type_or_id - FIELD_END_MARKER);
            }
            let object = self.read_thing_with_type(type_or_id, Some(absolute))?;
            if let Some(id) = object.creature_id() {
                self.state.creatures.mark_opponent_visible(id, true);
            }
            if !self.state.map.append_object(map, object)? {
                trace!(%absolute, "field full, object dropped");
            }
        }
    }

    fn read_floor(
        &mut self,
        z: usize,
        (x0, y0): (usize, usize),
        (x1, y1): (usize, usize),
        mut skip: u16,
    ) -> Result<u16, ProtocolError> {
        for x in x0..=x1 {
            for y in y0..=y1 {
                let map = MapPosition::new(x, y, z);
                self.state.map.reset_field(map)?;
                if skip > 0 {
                    skip -= 1;
                } else {
                    skip = self.read_field(map)?;
                }
                self.refresh_minimap_at(map)?;
            }
        }
        Ok(skip)
    }

    fn read_whole_floor(&mut self, z: usize, skip: u16) -> Result<u16, ProtocolError> {
        self.read_floor(z, (0, 0), (MAP_SIZE_X - 1, MAP_SIZE_Y - 1), skip)
    }

    /// Reads a window rectangle on every floor visible from the player's
    /// level, the skip count carrying from one floor to the next.
    fn read_area(&mut self, from: (usize, usize), to: (usize, usize)) -> Result<(), ProtocolError> {
        let player_z = usize::from(self.state.map.position().z);
        let planes: Vec<usize> = if player_z <= 7 {
            (0..=7).collect()
        } else {
            let lowest = (player_z + 2).saturating_sub(usize::from(MAX_Z));
            (lowest..=4).rev().collect()
        };
        let mut skip = 0;
        for z in planes {
            skip = self.read_floor(z, from, to, skip)?;
        }
        Ok(())
    }

    // --- minimap ----------------------------------------------------------

    fn refresh_minimap_at(&mut self, map: MapPosition) -> Result<(), ProtocolError> {
        if let Some(update) = self.state.update_minimap_at(map, self.catalog)? {
            self.outcome.events.push(GameEvent::MinimapField(update));
        }
        Ok(())
    }

    fn refresh_minimap(&mut self, absolute: Position) -> Result<(), ProtocolError> {
        if let Some(update) = self.state.update_minimap(absolute, self.catalog)? {
            self.outcome.events.push(GameEvent::MinimapField(update));
        }
        Ok(())
    }

    fn refresh_minimap_plane(&mut self) -> Result<(), ProtocolError> {
        let z = self.state.map.player_z_plane();
        for x in 0..MAP_SIZE_X {
            for y in 0..MAP_SIZE_Y {
                self.refresh_minimap_at(MapPosition::new(x, y, z))?;
            }
        }
        Ok(())
    }

    // --- map --------------------------------------------------------------

    fn move_to(&mut self, position: Position) {
        self.state.map.set_position(position);
        self.state.minimap.set_position(position);
    }

    fn shifted_position(&self, dx: i16, dy: i16, dz: i8) -> Result<Position, ProtocolError> {
        let current = self.state.map.position();
        current
            .offset(PositionDelta { dx, dy, dz })
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!(
                    "cannot shift {current} by ({dx}, {dy}, {dz})"
                ))
            })
    }

    fn parse_full_map(&mut self) -> Result<(), ProtocolError> {
        let position = self.reader.read_position()?;
        if position.z > MAX_Z {
            return Err(ProtocolError::OutOfRangeCoordinate(position));
        }
        self.state.player.stop_autowalk();
        self.state.creatures.mark_all_opponents_visible(false);
        self.state.map.reset_map();
        self.move_to(position);
        self.read_area((0, 0), (MAP_SIZE_X - 1, MAP_SIZE_Y - 1))?;
        self.state.map.set_valid(true);
        debug!(%position, "full map loaded");
        self.outcome.events.push(GameEvent::MapLoaded(position));
        Ok(())
    }

    /// One of the four single row/column updates; (dx, dy) is the player's
    /// step.
    fn parse_map_row(&mut self, dx: i16, dy: i16) -> Result<(), ProtocolError> {
        let position = self.shifted_position(dx, dy, 0)?;
        self.move_to(position);
        self.state.map.scroll(-i32::from(dx), -i32::from(dy), 0);
        let (from, to) = match (dx, dy) {
            (0, -1) => ((0, 0), (MAP_SIZE_X - 1, 0)),
            (1, 0) => ((MAP_SIZE_X - 1, 0), (MAP_SIZE_X - 1, MAP_SIZE_Y - 1)),
            (0, 1) => ((0, MAP_SIZE_Y - 1), (MAP_SIZE_X - 1, MAP_SIZE_Y - 1)),
            _ => ((0, 0), (0, MAP_SIZE_Y - 1)),
        };
        self.read_area(from, to)?;
        self.outcome.events.push(GameEvent::MapScrolled(position));
        Ok(())
    }

    fn parse_field_data(&mut self) -> Result<(), ProtocolError> {
        let absolute = self.reader.read_position()?;
        let map = self.state.map.to_map(absolute)?;
        self.state.map.reset_field(map)?;
        self.read_field(map)?;
        self.refresh_minimap(absolute)?;
        self.outcome.events.push(GameEvent::FieldChanged(absolute));
        Ok(())
    }

    fn parse_create_on_map(&mut self) -> Result<(), ProtocolError> {
        let absolute = self.reader.read_position()?;
        let map = self.state.map.to_map(absolute)?;
        let stack_pos = if self.gate.create_has_stack_pos() {
            self.reader.read_u8()?
        } else {
            STACK_POS_TOP
        };
        let object = self.read_thing(Some(absolute))?;

        if let Some(id) = object.creature_id() {
            if self.state.creatures.is_player(id) {
                self.state.player.stop_autowalk();
            }
            self.state.creatures.mark_opponent_visible(id, true);
        }

        if stack_pos == STACK_POS_TOP {
            self.state.map.put_object(map, object)?;
        } else if usize::from(stack_pos) > MAP_SIZE_W {
            return Err(ProtocolError::InvalidMessage(format!(
                "stack position {stack_pos} beyond field capacity"
            )));
        } else {
            self.state.map.insert_object(map, usize::from(stack_pos), object)?;
        }

        self.refresh_minimap(absolute)?;
        self.outcome.events.push(GameEvent::FieldChanged(absolute));
        Ok(())
    }

    /// Looks up a creature object at `map`/`stack_pos`, requiring it to be
    /// registered.
    fn creature_at(
        &self,
        absolute: Position,
        map: MapPosition,
        stack_pos: u8,
    ) -> Result<Option<CreatureId>, ProtocolError> {
        let object = self
            .state
            .map
            .get_object(map, usize::from(stack_pos))
            .ok_or(ProtocolError::ObjectNotFound {
                position: absolute,
                stack_pos,
            })?;
        match object.creature_id() {
            Some(id) if self.state.creatures.get(id).is_none() => {
                Err(ProtocolError::CreatureNotFound(id))
            }
            other => Ok(other),
        }
    }

    fn creature_position(&self, id: CreatureId) -> Result<Position, ProtocolError> {
        self.state
            .creatures
            .get(id)
            .map(|creature| creature.position)
            .ok_or(ProtocolError::CreatureNotFound(id))
    }

    fn parse_change_on_map(&mut self) -> Result<(), ProtocolError> {
        let x = self.reader.read_u16_le()?;
        let absolute = if x != CREATURE_BY_ID {
            let absolute = self.reader.read_position_with_x(x)?;
            let map = self.state.map.to_map(absolute)?;
            let stack_pos = self.reader.read_u8()?;
            if let Some(id) = self.creature_at(absolute, map, stack_pos)? {
                self.state.creatures.mark_opponent_visible(id, false);
            }
            let object = self.read_thing(Some(absolute))?;
            if let Some(id) = object.creature_id() {
                self.state.creatures.mark_opponent_visible(id, true);
            }
            self.state.map.change_object(map, usize::from(stack_pos), object)?;
            absolute
        } else {
            let id = CreatureId(self.reader.read_u32_le()?);
            let absolute = self.creature_position(id)?;
            self.state.map.to_map(absolute)?;
            self.state.creatures.mark_opponent_visible(id, false);
            let marker = self.reader.read_u16_le()?;
            if !is_creature_marker(marker) {
                return Err(ProtocolError::InvalidMessage(format!(
                    "creature {id} changed into non-creature 0x{marker:04x}"
                )));
            }
            let changed = self.read_creature(marker, None)?;
            self.state.creatures.mark_opponent_visible(changed, true);
            absolute
        };
        self.refresh_minimap(absolute)?;
        self.outcome.events.push(GameEvent::FieldChanged(absolute));
        Ok(())
    }

    fn parse_delete_on_map(&mut self) -> Result<(), ProtocolError> {
        let x = self.reader.read_u16_le()?;
        let (absolute, creature) = if x != CREATURE_BY_ID {
            let absolute = self.reader.read_position_with_x(x)?;
            let map = self.state.map.to_map(absolute)?;
            let stack_pos = self.reader.read_u8()?;
            let creature = self.creature_at(absolute, map, stack_pos)?;
            self.state.map.delete_object(map, usize::from(stack_pos))?;
            (absolute, creature)
        } else {
            let id = CreatureId(self.reader.read_u32_le()?);
            let absolute = self.creature_position(id)?;
            let map = self.state.map.to_map(absolute)?;
            if let Some(stack_pos) = self.state.map.field(map)?.find_creature(id) {
                self.state.map.delete_object(map, stack_pos)?;
            }
            (absolute, Some(id))
        };
        if let Some(id) = creature {
            self.state.creatures.mark_opponent_visible(id, false);
        }
        self.refresh_minimap(absolute)?;
        self.outcome.events.push(GameEvent::FieldChanged(absolute));
        Ok(())
    }

    fn parse_creature_move(&mut self) -> Result<(), ProtocolError> {
        let x = self.reader.read_u16_le()?;
        let (id, from, from_map, from_stack) = if x != CREATURE_BY_ID {
            let from = self.reader.read_position_with_x(x)?;
            let from_map = self.state.map.to_map(from)?;
            let stack_pos = self.reader.read_u8()?;
            let id = self.creature_at(from, from_map, stack_pos)?.ok_or_else(|| {
                ProtocolError::InvalidMessage(format!(
                    "object at stack position {stack_pos} of {from} is not a creature"
                ))
            })?;
            (id, from, from_map, Some(usize::from(stack_pos)))
        } else {
            let id = CreatureId(self.reader.read_u32_le()?);
            let from = self.creature_position(id)?;
            let from_map = self.state.map.to_map(from)?;
            (id, from, from_map, None)
        };
        let to = self.reader.read_position()?;
        let to_map = self.state.map.to_map(to)?;

        let dx = to_map.x as i32 - from_map.x as i32;
        let dy = to_map.y as i32 - from_map.y as i32;
        let dz = to_map.z as i32 - from_map.z as i32;
        let push = dz != 0 || dx.abs() > 1 || dy.abs() > 1;

        let ground_speed = if push {
            None
        } else {
            let catalog = self.catalog;
            let ground = self
                .state
                .map
                .get_object(to_map, 0)
                .and_then(Object::type_id)
                .and_then(|type_id| catalog.appearance(type_id))
                .filter(|appearance| appearance.is_ground)
                .ok_or_else(|| {
                    ProtocolError::InvalidMessage(format!("creature {id} steps onto {to} without ground"))
                })?;
            Some(ground.ground_speed)
        };

        match from_stack {
            Some(stack_pos) => {
                self.state.map.delete_object(from_map, stack_pos)?;
            }
            None => {
                if let Some(stack_pos) = self.state.map.field(from_map)?.find_creature(id) {
                    self.state.map.delete_object(from_map, stack_pos)?;
                }
            }
        }
        self.state.map.put_object(to_map, Object::Creature(id))?;

        let is_player = self.state.creatures.is_player(id);
        if push && is_player {
            self.state.player.stop_autowalk();
        }
        let creature = self
            .state
            .creatures
            .get_mut(id)
            .ok_or(ProtocolError::CreatureNotFound(id))?;
        creature.position = to;
        match ground_speed {
            Some(speed) => {
                if let Some(direction) = Direction::from_step(dx, dy) {
                    creature.direction = direction;
                }
                creature.start_movement(dx, dy, speed);
            }
            None => {
                if let Some(direction) = Direction::from_push(dx, dy) {
                    creature.direction = direction;
                }
                if !is_player {
                    creature.stop_movement();
                }
            }
        }
        self.state.creatures.mark_opponent_visible(id, true);
        self.state.creatures.invalidate_opponents();

        trace!(%id, %from, %to, push, "creature moved");
        self.outcome.events.push(GameEvent::CreatureMoved { id, from, to });
        self.refresh_minimap(from)?;
        self.refresh_minimap(to)?;
        Ok(())
    }

    fn parse_floor_up(&mut self) -> Result<(), ProtocolError> {
        let position = self.shifted_position(1, 1, -1)?;
        self.move_to(position);
        if position.z > 7 {
            self.state.map.scroll(0, 0, -1);
            self.read_whole_floor(4, 0)?;
        } else if position.z == 7 {
            self.state.map.scroll(0, 0, -3);
            let mut skip = 0;
            for z in 2..=7 {
                skip = self.read_whole_floor(z, skip)?;
            }
        }
        self.finish_floor_change(position)
    }

    fn parse_floor_down(&mut self) -> Result<(), ProtocolError> {
        let position = self.shifted_position(-1, -1, 1)?;
        self.move_to(position);
        if position.z > 8 {
            self.state.map.scroll(0, 0, 1);
            if position.z <= MAX_Z - 2 {
                self.read_whole_floor(0, 0)?;
            }
        } else if position.z == 8 {
            self.state.map.scroll(0, 0, 3);
            let mut skip = 0;
            for z in (0..=2).rev() {
                skip = self.read_whole_floor(z, skip)?;
            }
        }
        self.finish_floor_change(position)
    }

    fn finish_floor_change(&mut self, position: Position) -> Result<(), ProtocolError> {
        self.state.player.stop_autowalk();
        self.refresh_minimap_plane()?;
        debug!(%position, "floor changed");
        self.outcome.events.push(GameEvent::FloorChanged(position));
        Ok(())
    }

    fn parse_automap_flag(&mut self) -> Result<(), ProtocolError> {
        let position = self.reader.read_position()?;
        let icon = self.reader.read_u8()?;
        let description = self.reader.read_string()?;
        let remove = if self.gate.automap_has_remove() {
            self.reader.read_bool()?
        } else {
            false
        };
        if remove {
            self.state.minimap.remove_mark(position);
        } else {
            self.state.minimap.add_mark(position, icon, description);
        }
        self.outcome.events.push(GameEvent::AutomapMarkChanged(position));
        Ok(())
    }

    // --- creatures ----------------------------------------------------------

    fn parse_creature_update(&mut self, opcode: u8) -> Result<(), ProtocolError> {
        let id = CreatureId(self.reader.read_u32_le()?);
        let update = match opcode {
            OPCODE_CREATURE_MARK => CreatureUpdate::Mark(self.reader.read_u8()?),
            OPCODE_CREATURE_HEALTH => CreatureUpdate::Health(self.reader.read_u8()?),
            OPCODE_CREATURE_LIGHT => CreatureUpdate::Light(Light {
                intensity: self.reader.read_u8()?,
                color: self.reader.read_u8()?,
            }),
            OPCODE_CREATURE_OUTFIT => {
                let (outfit, mount) = self.read_outfit()?;
                CreatureUpdate::Outfit(outfit, mount)
            }
            OPCODE_CREATURE_SPEED => {
                let base_speed = if self.gate.speed_has_base() {
                    Some(self.reader.read_u16_le()?)
                } else {
                    None
                };
                CreatureUpdate::Speed {
                    base_speed,
                    speed: self.reader.read_u16_le()?,
                }
            }
            OPCODE_CREATURE_SKULL => CreatureUpdate::Skull(PkFlag::from_u8(self.reader.read_u8()?)),
            _ => CreatureUpdate::Party(PartyFlag::from_u8(self.reader.read_u8()?)),
        };

        let Some(creature) = self.state.creatures.get_mut(id) else {
            debug!(%id, opcode = format_args!("0x{opcode:02x}"), "update for unknown creature ignored");
            return Ok(());
        };
        let invalidates = update.affects_opponents();
        update.apply(creature);
        if invalidates {
            self.state.creatures.invalidate_opponents();
        }
        self.outcome.events.push(GameEvent::CreatureChanged(id));
        Ok(())
    }

    fn parse_clear_target(&mut self) -> Result<(), ProtocolError> {
        let id = if self.gate.clear_target_has_id() {
            Some(CreatureId(self.reader.read_u32_le()?)).filter(|id| id.0 != 0)
        } else {
            None
        };
        self.state.creatures.clear_targets(id);
        self.outcome.events.push(GameEvent::TargetsCleared);
        Ok(())
    }

    fn parse_cancel_walk(&mut self) -> Result<(), ProtocolError> {
        let direction = Direction::from_u8(self.reader.read_u8()?);
        let position = self
            .state
            .creatures
            .player()
            .map(|player| player.position)
            .unwrap_or_else(|| self.state.map.position());
        if self.state.player.record_snapback(position) {
            self.state.player.stop_autowalk();
            if let Err(err) = self.state.creatures.set_attack_target(None) {
                warn!("clearing attack target failed: {err}");
            }
            self.outcome.outgoing.push(write_cancel());
        }
        self.state.player.abort_autowalk(direction);
        let player_id = self.state.creatures.player_id();
        if let Some(player) = self.state.creatures.get_mut(player_id) {
            player.direction = direction;
        }
        self.outcome.events.push(GameEvent::WalkCancelled(direction));
        Ok(())
    }

    // --- containers -------------------------------------------------------

    fn parse_open_container(&mut self) -> Result<(), ProtocolError> {
        let id = self.reader.read_u8()?;
        let icon = self.read_container_item()?;
        let name = self.reader.read_string()?;
        let slots = self.reader.read_u8()?;
        let is_sub_container = self.reader.read_bool()?;

        let mut view = ContainerView::new(id, icon, name, slots);
        view.is_sub_container = is_sub_container;
        let count = if self.gate.container_paginated() {
            view.drag_and_drop = self.reader.read_bool()?;
            view.pagination = self.reader.read_bool()?;
            view.total_objects = self.reader.read_u16_le()?;
            view.first_index = self.reader.read_u16_le()?;
            let count = self.reader.read_u8()?;
            if u16::from(count) > view.total_objects {
                return Err(ProtocolError::InvalidMessage(format!(
                    "container {id} sends {count} objects of {} total",
                    view.total_objects
                )));
            }
            count
        } else {
            let count = self.reader.read_u8()?;
            view.total_objects = u16::from(count);
            count
        };
        if count > slots {
            return Err(ProtocolError::InvalidMessage(format!(
                "container {id} sends {count} objects for {slots} slots"
            )));
        }
        for _ in 0..count {
            let object = self.read_container_item()?;
            view.objects.push(object);
        }

        if self.state.containers.open(view).is_some() {
            debug!(id, "container replaced");
        }
        self.outcome.events.push(GameEvent::ContainerOpened(id));
        Ok(())
    }

    fn parse_close_container(&mut self) -> Result<(), ProtocolError> {
        let id = self.reader.read_u8()?;
        if self.state.containers.close(id).is_some() {
            self.outcome.events.push(GameEvent::ContainerClosed(id));
        }
        Ok(())
    }

    fn read_container_slot(&mut self) -> Result<u16, ProtocolError> {
        if self.gate.container_paginated() {
            self.reader.read_u16_le()
        } else {
            Ok(u16::from(self.reader.read_u8()?))
        }
    }

    fn parse_create_in_container(&mut self) -> Result<(), ProtocolError> {
        let id = self.reader.read_u8()?;
        let slot = if self.gate.container_paginated() {
            self.reader.read_u16_le()?
        } else {
            0
        };
        let object = self.read_container_item()?;
        if self.state.containers.add_object(id, slot, object) {
            self.outcome.events.push(GameEvent::ContainerChanged(id));
        }
        Ok(())
    }

    fn parse_change_in_container(&mut self) -> Result<(), ProtocolError> {
        let id = self.reader.read_u8()?;
        let slot = self.read_container_slot()?;
        let object = self.read_container_item()?;
        if self.state.containers.change_object(id, slot, object) {
            self.outcome.events.push(GameEvent::ContainerChanged(id));
        }
        Ok(())
    }

    fn parse_delete_in_container(&mut self) -> Result<(), ProtocolError> {
        let id = self.reader.read_u8()?;
        let slot = self.read_container_slot()?;
        let append = if self.gate.container_paginated() {
            match self.reader.read_u16_le()? {
                0 => None,
                type_id => Some(self.read_container_item_with_type(type_id)?),
            }
        } else {
            None
        };
        if self.state.containers.remove_object(id, slot, append) {
            self.outcome.events.push(GameEvent::ContainerChanged(id));
        }
        Ok(())
    }

    // --- buddies ------------------------------------------------------------

    fn parse_buddy_add(&mut self) -> Result<(), ProtocolError> {
        let id = CreatureId(self.reader.read_u32_le()?);
        let name = self.reader.read_string()?;
        let (description, icon, notify_login) = if self.gate.buddy_has_extended_info() {
            (
                self.reader.read_string()?,
                self.reader.read_u32_le()?,
                self.reader.read_bool()?,
            )
        } else {
            (String::new(), 0, false)
        };
        let status = BuddyStatus::from_u8(self.reader.read_u8()?);
        let mut groups = Vec::new();
        if self.gate.buddy_has_groups() {
            let count = self.reader.read_u8()?;
            for _ in 0..count {
                groups.push(self.reader.read_u8()?);
            }
        }
        self.state.buddies.add(Buddy {
            id,
            name,
            description,
            icon,
            notify_login,
            status,
            groups,
        });
        self.outcome.events.push(GameEvent::BuddyChanged(id));
        Ok(())
    }

    fn parse_buddy_state(&mut self) -> Result<(), ProtocolError> {
        let id = CreatureId(self.reader.read_u32_le()?);
        let status = if self.gate.buddy_state_has_status() {
            BuddyStatus::from_u8(self.reader.read_u8()?)
        } else {
            BuddyStatus::Online
        };
        self.set_buddy_status(id, status);
        Ok(())
    }

    fn set_buddy_status(&mut self, id: CreatureId, status: BuddyStatus) {
        if self.state.buddies.set_status(id, status) {
            self.outcome.events.push(GameEvent::BuddyChanged(id));
        } else {
            debug!(%id, "status for unknown buddy ignored");
        }
    }

    fn parse_buddy_groups(&mut self) -> Result<(), ProtocolError> {
        let count = self.reader.read_u8()?;
        let mut groups = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            groups.push(BuddyGroup {
                id: self.reader.read_u8()?,
                name: self.reader.read_string()?,
                removable: self.reader.read_bool()?,
            });
        }
        let free_group_limit = self.reader.read_u8()?;
        self.state.buddies.set_groups(groups, free_group_limit);
        self.outcome.events.push(GameEvent::BuddyGroupsChanged);
        Ok(())
    }
}
