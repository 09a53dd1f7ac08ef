use crate::world::position::{Direction, Position};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

impl std::fmt::Display for CreatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatureKind {
    #[default]
    Player,
    Monster,
    Npc,
    Summon,
}

// Legacy servers encode the kind in the id range.
const MONSTER_ID_START: u32 = 0x4000_0000;
const NPC_ID_START: u32 = 0x8000_0000;

impl CreatureKind {
    pub fn from_legacy_id(id: CreatureId) -> Self {
        if id.0 >= NPC_ID_START {
            CreatureKind::Npc
        } else if id.0 >= MONSTER_ID_START {
            CreatureKind::Monster
        } else {
            CreatureKind::Player
        }
    }

    /// Wire kind byte; the summon flag comes back alongside.
    pub fn from_wire(value: u8) -> (Self, SummonType) {
        match value {
            1 => (CreatureKind::Monster, SummonType::None),
            2 => (CreatureKind::Npc, SummonType::None),
            3 => (CreatureKind::Summon, SummonType::Own),
            4 => (CreatureKind::Summon, SummonType::Other),
            _ => (CreatureKind::Player, SummonType::None),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SummonType {
    #[default]
    None,
    Own,
    Other,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PkFlag {
    #[default]
    None,
    Yellow,
    Green,
    White,
    Red,
    Black,
    Orange,
}

impl PkFlag {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PkFlag::Yellow,
            2 => PkFlag::Green,
            3 => PkFlag::White,
            4 => PkFlag::Red,
            5 => PkFlag::Black,
            6 => PkFlag::Orange,
            _ => PkFlag::None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PartyFlag {
    #[default]
    None,
    Inviter,
    Invitee,
    Member,
    Leader,
    MemberSharedXp,
    LeaderSharedXp,
    MemberSharedXpInactive,
    LeaderSharedXpInactive,
    MemberNoSharedXp,
    LeaderNoSharedXp,
    Other,
}

impl PartyFlag {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PartyFlag::None,
            1 => PartyFlag::Inviter,
            2 => PartyFlag::Invitee,
            3 => PartyFlag::Member,
            4 => PartyFlag::Leader,
            5 => PartyFlag::MemberSharedXp,
            6 => PartyFlag::LeaderSharedXp,
            7 => PartyFlag::MemberSharedXpInactive,
            8 => PartyFlag::LeaderSharedXpInactive,
            9 => PartyFlag::MemberNoSharedXp,
            10 => PartyFlag::LeaderNoSharedXp,
            _ => PartyFlag::Other,
        }
    }
}

/// Client-side highlight drawn around a creature.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedMark {
    #[default]
    Unmarked,
    Aim,
    Attack,
    Follow,
    AimAttack,
    AimFollow,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Marks {
    pub map_window: ExtendedMark,
    pub battle_list: ExtendedMark,
}

impl Marks {
    pub fn set(&mut self, mark: ExtendedMark) {
        self.map_window = mark;
        self.battle_list = mark;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outfit {
    pub look_type: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
    pub addons: u8,
    pub look_item: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Light {
    pub intensity: u8,
    pub color: u8,
}

/// Step the renderer should animate; None once the creature stands still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementStep {
    pub dx: i32,
    pub dy: i32,
    pub ground_speed: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub position: Position,
    pub direction: Direction,
    pub health_percent: u8,
    pub outfit: Outfit,
    pub mount: u16,
    pub light: Light,
    pub speed: u16,
    pub base_speed: u16,
    pub pk_flag: PkFlag,
    pub party_flag: PartyFlag,
    pub guild_flag: u8,
    pub summon_type: SummonType,
    pub master_id: Option<CreatureId>,
    pub icons: u8,
    pub unpassable: bool,
    pub server_mark: Option<u8>,
    /// Registry insertion sequence; ties in opponent ordering break on it.
    pub known_since: u64,
    pub visible: bool,
    pub trapper: bool,
    pub marks: Marks,
    pub movement: Option<MovementStep>,
}

impl Creature {
    pub fn new(id: CreatureId, name: impl Into<String>, kind: CreatureKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position: Position::default(),
            direction: Direction::South,
            health_percent: 100,
            outfit: Outfit::default(),
            mount: 0,
            light: Light::default(),
            speed: 0,
            base_speed: 0,
            pk_flag: PkFlag::None,
            party_flag: PartyFlag::None,
            guild_flag: 0,
            summon_type: SummonType::None,
            master_id: None,
            icons: 0,
            unpassable: true,
            server_mark: None,
            known_since: 0,
            visible: false,
            trapper: false,
            marks: Marks::default(),
            movement: None,
        }
    }

    pub fn start_movement(&mut self, dx: i32, dy: i32, ground_speed: u16) {
        self.movement = Some(MovementStep {
            dx,
            dy,
            ground_speed,
        });
    }

    pub fn stop_movement(&mut self) {
        self.movement = None;
    }

    /// Clears per-session client state when the creature leaves the registry.
    pub fn reset(&mut self) {
        self.visible = false;
        self.trapper = false;
        self.marks = Marks::default();
        self.movement = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_id_ranges_pick_kind() {
        assert_eq!(CreatureKind::from_legacy_id(CreatureId(0x1000_0001)), CreatureKind::Player);
        assert_eq!(CreatureKind::from_legacy_id(CreatureId(0x4000_0010)), CreatureKind::Monster);
        assert_eq!(CreatureKind::from_legacy_id(CreatureId(0x8000_0002)), CreatureKind::Npc);
    }

    #[test]
    fn wire_kind_carries_summon_owner() {
        assert_eq!(CreatureKind::from_wire(3), (CreatureKind::Summon, SummonType::Own));
        assert_eq!(CreatureKind::from_wire(4), (CreatureKind::Summon, SummonType::Other));
        assert_eq!(CreatureKind::from_wire(2), (CreatureKind::Npc, SummonType::None));
        assert_eq!(CreatureKind::from_wire(0), (CreatureKind::Player, SummonType::None));
    }

    #[test]
    fn reset_clears_client_state_only() {
        let mut creature = Creature::new(CreatureId(7), "Rat", CreatureKind::Monster);
        creature.visible = true;
        creature.trapper = true;
        creature.marks.set(ExtendedMark::Attack);
        creature.start_movement(1, 0, 150);
        creature.reset();
        assert!(!creature.visible);
        assert!(!creature.trapper);
        assert_eq!(creature.marks, Marks::default());
        assert_eq!(creature.movement, None);
        assert_eq!(creature.name, "Rat");
    }
}
