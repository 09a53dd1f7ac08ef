use crate::entities::creature::{Creature, CreatureId, CreatureKind, ExtendedMark, PartyFlag, PkFlag, SummonType};
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub const DEFAULT_CREATURE_CAPACITY: usize = 1300;

/// Horizontal and vertical reach of the opponents list around the player.
pub const OPPONENT_RANGE_X: u16 = 7;
pub const OPPONENT_RANGE_Y: u16 = 5;

/// Groups hidden from the opponents list. Every flag set excludes its group.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpponentFilter {
    pub players: bool,
    pub npcs: bool,
    pub monsters: bool,
    pub non_skulled: bool,
    pub party: bool,
    pub summons: bool,
}

impl OpponentFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn admits(&self, creature: &Creature) -> bool {
        if self.players && creature.kind == CreatureKind::Player {
            return false;
        }
        if self.npcs && creature.kind == CreatureKind::Npc {
            return false;
        }
        if self.monsters && creature.kind == CreatureKind::Monster {
            return false;
        }
        if self.non_skulled && creature.kind == CreatureKind::Player && creature.pk_flag == PkFlag::None {
            return false;
        }
        if self.party && creature.party_flag != PartyFlag::None {
            return false;
        }
        if self.summons && creature.summon_type != SummonType::None {
            return false;
        }
        true
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentSortKey {
    #[default]
    Distance,
    Hitpoints,
    Name,
    KnownSince,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpponentSort {
    pub key: OpponentSortKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OpponentState {
    NoAction,
    Refresh,
    Rebuild,
}

/// Notification handed to the battle list after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpponentsChange {
    Refreshed(Vec<CreatureId>),
    Rebuilt(Vec<CreatureId>),
}

/// Known creatures ordered by id, plus the derived opponents list.
#[derive(Debug)]
pub struct CreatureRegistry {
    creatures: Vec<Creature>,
    capacity: usize,
    next_sequence: u64,
    player_id: CreatureId,
    aim: Option<CreatureId>,
    attack_target: Option<CreatureId>,
    follow_target: Option<CreatureId>,
    trappers: Vec<CreatureId>,
    opponents: Vec<CreatureId>,
    opponent_state: OpponentState,
    filter: OpponentFilter,
    sort: OpponentSort,
}

impl Default for CreatureRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CREATURE_CAPACITY)
    }
}

impl CreatureRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            creatures: Vec::new(),
            capacity,
            next_sequence: 0,
            player_id: CreatureId(0),
            aim: None,
            attack_target: None,
            follow_target: None,
            trappers: Vec::new(),
            opponents: Vec::new(),
            opponent_state: OpponentState::NoAction,
            filter: OpponentFilter::default(),
            sort: OpponentSort::default(),
        }
    }

    fn index_of(&self, id: CreatureId) -> Result<usize, usize> {
        self.creatures.binary_search_by_key(&id, |creature| creature.id)
    }

    pub fn len(&self) -> usize {
        self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.iter()
    }

    /// Returns the stored creature with this id, inserting `creature` first
    /// when none is known.
    pub fn insert_or_get(&mut self, mut creature: Creature) -> Result<&mut Creature, ProtocolError> {
        let index = match self.index_of(creature.id) {
            Ok(index) => index,
            Err(index) => {
                if self.creatures.len() >= self.capacity {
                    return Err(ProtocolError::CapacityExceeded {
                        limit: self.capacity,
                    });
                }
                self.next_sequence += 1;
                creature.known_since = self.next_sequence;
                self.creatures.insert(index, creature);
                self.opponent_state = OpponentState::Rebuild;
                index
            }
        };
        Ok(&mut self.creatures[index])
    }

    pub fn remove(&mut self, id: CreatureId) -> Result<Creature, ProtocolError> {
        if id == self.player_id {
            return Err(ProtocolError::InvariantViolation(format!(
                "cannot remove the player ({})",
                id
            )));
        }
        let index = self
            .index_of(id)
            .map_err(|_| ProtocolError::CreatureNotFound(id))?;
        if self.aim == Some(id) {
            self.aim = None;
        }
        if self.attack_target == Some(id) {
            self.attack_target = None;
        }
        if self.follow_target == Some(id) {
            self.follow_target = None;
        }
        self.trappers.retain(|trapper| *trapper != id);
        let mut creature = self.creatures.remove(index);
        creature.reset();
        self.opponent_state = OpponentState::Rebuild;
        Ok(creature)
    }

    pub fn get(&self, id: CreatureId) -> Option<&Creature> {
        self.index_of(id).ok().map(|index| &self.creatures[index])
    }

    pub fn get_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        match self.index_of(id) {
            Ok(index) => Some(&mut self.creatures[index]),
            Err(_) => None,
        }
    }

    pub fn set_player_id(&mut self, id: CreatureId) {
        self.player_id = id;
        self.opponent_state = OpponentState::Rebuild;
    }

    pub fn player_id(&self) -> CreatureId {
        self.player_id
    }

    pub fn is_player(&self, id: CreatureId) -> bool {
        id == self.player_id
    }

    pub fn player(&self) -> Option<&Creature> {
        self.get(self.player_id)
    }

    pub fn aim(&self) -> Option<CreatureId> {
        self.aim
    }

    pub fn attack_target(&self) -> Option<CreatureId> {
        self.attack_target
    }

    pub fn follow_target(&self) -> Option<CreatureId> {
        self.follow_target
    }

    pub fn trappers(&self) -> &[CreatureId] {
        &self.trappers
    }

    pub fn set_opponent_options(&mut self, filter: OpponentFilter, sort: OpponentSort) {
        self.filter = filter;
        self.sort = sort;
        self.opponent_state = OpponentState::Rebuild;
    }

    pub fn invalidate_opponents(&mut self) {
        if self.opponent_state < OpponentState::Refresh {
            self.opponent_state = OpponentState::Refresh;
        }
    }

    pub fn needs_refresh(&self) -> bool {
        self.opponent_state != OpponentState::NoAction
    }

    pub fn mark_opponent_visible(&mut self, id: CreatureId, visible: bool) {
        if let Some(creature) = self.get_mut(id) {
            creature.visible = visible;
            self.invalidate_opponents();
        }
    }

    pub fn mark_all_opponents_visible(&mut self, visible: bool) {
        let ids = self.opponents.clone();
        for id in &ids {
            if let Some(creature) = self.get_mut(*id) {
                creature.visible = visible;
            }
        }
        if !ids.is_empty() {
            self.invalidate_opponents();
        }
    }

    /// Materialises the opponents list if anything dirtied it.
    pub fn refresh_opponents(&mut self) -> Option<OpponentsChange> {
        let state = self.opponent_state;
        if state == OpponentState::NoAction {
            return None;
        }
        let mut opponents: Vec<&Creature> = self
            .creatures
            .iter()
            .filter(|creature| self.is_opponent(creature))
            .collect();
        opponents.sort_by(|a, b| self.compare_opponents(a, b));
        self.opponents = opponents.into_iter().map(|creature| creature.id).collect();
        self.opponent_state = OpponentState::NoAction;
        debug!(count = self.opponents.len(), "opponents refreshed");
        let ids = self.opponents.clone();
        Some(match state {
            OpponentState::Rebuild => OpponentsChange::Rebuilt(ids),
            _ => OpponentsChange::Refreshed(ids),
        })
    }

    /// Current opponents list; only as fresh as the last refresh.
    pub fn opponents(&self) -> &[CreatureId] {
        &self.opponents
    }

    fn is_opponent(&self, creature: &Creature) -> bool {
        if creature.id == self.player_id {
            return false;
        }
        let Some(player) = self.player() else {
            return false;
        };
        let here = player.position;
        let there = creature.position;
        if there.z != here.z
            || here.x.abs_diff(there.x) > OPPONENT_RANGE_X
            || here.y.abs_diff(there.y) > OPPONENT_RANGE_Y
        {
            return false;
        }
        self.filter.is_empty() || self.filter.admits(creature)
    }

    fn compare_opponents(&self, a: &Creature, b: &Creature) -> Ordering {
        let by_key = match self.sort.key {
            OpponentSortKey::Distance => match self.player() {
                Some(player) => player
                    .position
                    .chebyshev_distance(a.position)
                    .cmp(&player.position.chebyshev_distance(b.position)),
                None => Ordering::Equal,
            },
            OpponentSortKey::Hitpoints => a.health_percent.cmp(&b.health_percent),
            OpponentSortKey::Name => a.name.cmp(&b.name),
            OpponentSortKey::KnownSince => a.known_since.cmp(&b.known_since),
        };
        let by_key = match self.sort.direction {
            SortDirection::Ascending => by_key,
            SortDirection::Descending => by_key.reverse(),
        };
        by_key.then(a.known_since.cmp(&b.known_since))
    }

    /// Walks the opponents list from the attack target, skipping NPCs.
    pub fn next_opponent(&self, step: i32) -> Option<CreatureId> {
        let total = self.opponents.len() as isize;
        if total == 0 {
            return None;
        }
        let step: isize = if step < 0 { -1 } else { 1 };
        let mut index = self
            .attack_target
            .and_then(|target| self.opponents.iter().position(|id| *id == target))
            .map(|index| index as isize)
            .unwrap_or(-1);
        for _ in 0..total {
            index += step;
            if index >= total {
                index = 0;
            } else if index < 0 {
                index = total - 1;
            }
            let id = self.opponents[index as usize];
            match self.get(id) {
                Some(creature) if creature.kind != CreatureKind::Npc => return Some(id),
                _ => {}
            }
        }
        None
    }

    pub fn set_aim(&mut self, aim: Option<CreatureId>) {
        if self.aim != aim {
            let previous = self.aim;
            self.aim = aim;
            self.update_mark(previous);
            self.update_mark(aim);
        }
    }

    pub fn set_attack_target(&mut self, target: Option<CreatureId>) -> Result<(), ProtocolError> {
        self.reject_player(target, "attack")?;
        let previous = self.attack_target;
        if previous != target {
            self.attack_target = target;
            self.update_mark(previous);
            self.update_mark(target);
        }
        self.drop_follow_target();
        Ok(())
    }

    pub fn toggle_attack_target(&mut self, target: CreatureId) -> Result<(), ProtocolError> {
        self.reject_player(Some(target), "attack")?;
        let previous = self.attack_target;
        self.attack_target = if previous == Some(target) {
            None
        } else {
            Some(target)
        };
        self.update_mark(previous);
        self.update_mark(self.attack_target);
        self.drop_follow_target();
        Ok(())
    }

    pub fn set_follow_target(&mut self, target: Option<CreatureId>) -> Result<(), ProtocolError> {
        self.reject_player(target, "follow")?;
        let previous = self.follow_target;
        if previous != target {
            self.follow_target = target;
            self.update_mark(previous);
            self.update_mark(target);
        }
        self.drop_attack_target();
        Ok(())
    }

    pub fn toggle_follow_target(&mut self, target: CreatureId) -> Result<(), ProtocolError> {
        self.reject_player(Some(target), "follow")?;
        let previous = self.follow_target;
        self.follow_target = if previous == Some(target) {
            None
        } else {
            Some(target)
        };
        self.update_mark(previous);
        self.update_mark(self.follow_target);
        self.drop_attack_target();
        Ok(())
    }

    /// Server-side target loss: drops attack and follow targets matching
    /// `id`, or both when `id` is absent.
    pub fn clear_targets(&mut self, id: Option<CreatureId>) {
        let matches = |target: Option<CreatureId>| match (target, id) {
            (Some(_), None) => true,
            (Some(target), Some(id)) => target == id,
            (None, _) => false,
        };
        if matches(self.attack_target) {
            self.drop_attack_target();
        }
        if matches(self.follow_target) {
            self.drop_follow_target();
        }
    }

    pub fn set_trappers(&mut self, trappers: Vec<CreatureId>) {
        for id in std::mem::take(&mut self.trappers) {
            if let Some(creature) = self.get_mut(id) {
                creature.trapper = false;
            }
        }
        for id in &trappers {
            if let Some(creature) = self.get_mut(*id) {
                creature.trapper = true;
            }
        }
        self.trappers = trappers;
    }

    /// Forgets every creature. With `keep_player` the player record survives
    /// and is re-registered as the first known creature.
    pub fn reset(&mut self, keep_player: bool) {
        let player = match self.index_of(self.player_id) {
            Ok(index) if keep_player => Some(self.creatures.remove(index)),
            _ => None,
        };
        for creature in &mut self.creatures {
            creature.reset();
        }
        self.creatures.clear();
        self.aim = None;
        self.attack_target = None;
        self.follow_target = None;
        self.trappers.clear();
        self.opponents.clear();
        self.opponent_state = OpponentState::NoAction;
        if !keep_player {
            self.player_id = CreatureId(0);
        }
        if let Some(mut player) = player {
            player.reset();
            self.next_sequence += 1;
            player.known_since = self.next_sequence;
            self.creatures.push(player);
        }
    }

    fn reject_player(&self, target: Option<CreatureId>, action: &str) -> Result<(), ProtocolError> {
        match target {
            Some(id) if id == self.player_id => Err(ProtocolError::InvariantViolation(format!(
                "cannot {} the player",
                action
            ))),
            _ => Ok(()),
        }
    }

    fn drop_attack_target(&mut self) {
        if let Some(previous) = self.attack_target.take() {
            self.update_mark(Some(previous));
        }
    }

    fn drop_follow_target(&mut self) {
        if let Some(previous) = self.follow_target.take() {
            self.update_mark(Some(previous));
        }
    }

    fn update_mark(&mut self, id: Option<CreatureId>) {
        let Some(id) = id else {
            return;
        };
        let aimed = self.aim == Some(id);
        let attacked = self.attack_target == Some(id);
        let followed = self.follow_target == Some(id);
        let mark = match (aimed, attacked, followed) {
            (true, true, _) => ExtendedMark::AimAttack,
            (true, false, true) => ExtendedMark::AimFollow,
            (true, false, false) => ExtendedMark::Aim,
            (false, true, _) => ExtendedMark::Attack,
            (false, false, true) => ExtendedMark::Follow,
            (false, false, false) => ExtendedMark::Unmarked,
        };
        if let Some(creature) = self.get_mut(id) {
            creature.marks.set(mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::position::Position;

    fn lcg_next(state: &mut u64) -> u32 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (*state >> 32) as u32
    }

    fn monster(id: u32, x: u16, y: u16, z: u8) -> Creature {
        let mut creature = Creature::new(CreatureId(id), format!("m{}", id), CreatureKind::Monster);
        creature.position = Position::new(x, y, z);
        creature
    }

    fn with_player() -> CreatureRegistry {
        let mut registry = CreatureRegistry::default();
        let mut player = Creature::new(CreatureId(0x1000_0000), "Hero", CreatureKind::Player);
        player.position = Position::new(100, 100, 7);
        registry.insert_or_get(player).expect("player");
        registry.set_player_id(CreatureId(0x1000_0000));
        registry
    }

    #[test]
    fn random_inserts_and_removes_keep_ids_sorted_and_unique() {
        let mut registry = CreatureRegistry::default();
        let mut state = 0x5eed_u64;
        for _ in 0..2000 {
            let id = CreatureId(1 + lcg_next(&mut state) % 300);
            if lcg_next(&mut state) % 3 == 0 {
                let _ = registry.remove(id);
                assert!(registry.get(id).is_none());
            } else {
                registry
                    .insert_or_get(Creature::new(id, "x", CreatureKind::Monster))
                    .expect("insert");
                assert_eq!(registry.get(id).map(|creature| creature.id), Some(id));
            }
            let ids: Vec<u32> = registry.iter().map(|creature| creature.id.0).collect();
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn insert_or_get_returns_existing_and_keeps_sequence() {
        let mut registry = CreatureRegistry::default();
        let first = registry
            .insert_or_get(Creature::new(CreatureId(5), "Rat", CreatureKind::Monster))
            .expect("insert")
            .known_since;
        registry
            .insert_or_get(Creature::new(CreatureId(9), "Bat", CreatureKind::Monster))
            .expect("insert");
        let again = registry
            .insert_or_get(Creature::new(CreatureId(5), "Other", CreatureKind::Npc))
            .expect("get");
        assert_eq!(again.name, "Rat");
        assert_eq!(again.known_since, first);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn sequence_numbers_are_never_reused() {
        let mut registry = CreatureRegistry::default();
        let a = registry.insert_or_get(monster(1, 0, 0, 7)).expect("a").known_since;
        registry.remove(CreatureId(1)).expect("remove");
        let b = registry.insert_or_get(monster(1, 0, 0, 7)).expect("b").known_since;
        assert!(b > a);
    }

    #[test]
    fn capacity_is_enforced_on_new_ids_only() {
        let mut registry = CreatureRegistry::with_capacity(2);
        registry.insert_or_get(monster(1, 0, 0, 7)).expect("1");
        registry.insert_or_get(monster(2, 0, 0, 7)).expect("2");
        assert_eq!(
            registry.insert_or_get(monster(3, 0, 0, 7)).err(),
            Some(ProtocolError::CapacityExceeded { limit: 2 })
        );
        assert!(registry.insert_or_get(monster(2, 0, 0, 7)).is_ok());
    }

    #[test]
    fn removing_the_player_is_rejected() {
        let mut registry = with_player();
        let err = registry.remove(CreatureId(0x1000_0000)).expect_err("player");
        assert!(matches!(err, ProtocolError::InvariantViolation(_)));
        assert!(registry.player().is_some());
        assert_eq!(
            registry.remove(CreatureId(77)).err(),
            Some(ProtocolError::CreatureNotFound(CreatureId(77)))
        );
    }

    #[test]
    fn remove_clears_target_references() {
        let mut registry = with_player();
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        registry.insert_or_get(monster(0x4000_0002, 102, 100, 7)).expect("m");
        registry.set_aim(Some(CreatureId(0x4000_0001)));
        registry.set_attack_target(Some(CreatureId(0x4000_0001))).expect("attack");
        registry.set_trappers(vec![CreatureId(0x4000_0001), CreatureId(0x4000_0002)]);
        registry.remove(CreatureId(0x4000_0001)).expect("remove");
        assert_eq!(registry.aim(), None);
        assert_eq!(registry.attack_target(), None);
        assert_eq!(registry.trappers(), &[CreatureId(0x4000_0002)]);
    }

    #[test]
    fn membership_requires_floor_and_radius() {
        let mut registry = with_player();
        let mut state = 42u64;
        for id in 1..200u32 {
            let x = 90 + (lcg_next(&mut state) % 21) as u16;
            let y = 90 + (lcg_next(&mut state) % 21) as u16;
            let z = 6 + (lcg_next(&mut state) % 3) as u8;
            registry.insert_or_get(monster(0x4000_0000 + id, x, y, z)).expect("m");
        }
        for filter in [OpponentFilter::default(), OpponentFilter { players: true, ..Default::default() }] {
            registry.set_opponent_options(filter, OpponentSort::default());
            registry.refresh_opponents();
            for id in registry.opponents() {
                let creature = registry.get(*id).expect("opponent");
                assert_eq!(creature.position.z, 7);
                assert!(creature.position.x.abs_diff(100) <= OPPONENT_RANGE_X);
                assert!(creature.position.y.abs_diff(100) <= OPPONENT_RANGE_Y);
            }
            let expected = registry
                .iter()
                .filter(|c| c.kind == CreatureKind::Monster)
                .filter(|c| c.position.z == 7)
                .filter(|c| c.position.x.abs_diff(100) <= 7 && c.position.y.abs_diff(100) <= 5)
                .count();
            assert_eq!(registry.opponents().len(), expected);
        }
    }

    #[test]
    fn filter_excludes_selected_groups() {
        let mut registry = with_player();
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        registry
            .insert_or_get({
                let mut npc = Creature::new(CreatureId(0x8000_0001), "Sam", CreatureKind::Npc);
                npc.position = Position::new(99, 100, 7);
                npc
            })
            .expect("npc");
        registry.set_opponent_options(
            OpponentFilter {
                npcs: true,
                ..Default::default()
            },
            OpponentSort::default(),
        );
        registry.refresh_opponents();
        assert_eq!(registry.opponents(), &[CreatureId(0x4000_0001)]);
    }

    #[test]
    fn equal_keys_order_by_known_since_in_both_directions() {
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let mut registry = with_player();
            // Inserted out of id order so known_since differs from id order.
            registry.insert_or_get(monster(0x4000_0009, 102, 100, 7)).expect("m");
            registry.insert_or_get(monster(0x4000_0003, 100, 102, 7)).expect("m");
            registry.insert_or_get(monster(0x4000_0005, 98, 98, 7)).expect("m");
            registry.set_opponent_options(
                OpponentFilter::default(),
                OpponentSort {
                    key: OpponentSortKey::Distance,
                    direction,
                },
            );
            registry.refresh_opponents();
            assert_eq!(
                registry.opponents(),
                &[
                    CreatureId(0x4000_0009),
                    CreatureId(0x4000_0003),
                    CreatureId(0x4000_0005)
                ]
            );
        }
    }

    #[test]
    fn descending_hitpoints_reverses_key_only() {
        let mut registry = with_player();
        for (id, health) in [(1u32, 50u8), (2, 90), (3, 50)] {
            let mut creature = monster(0x4000_0000 + id, 101, 101, 7);
            creature.health_percent = health;
            registry.insert_or_get(creature).expect("m");
        }
        registry.set_opponent_options(
            OpponentFilter::default(),
            OpponentSort {
                key: OpponentSortKey::Hitpoints,
                direction: SortDirection::Descending,
            },
        );
        registry.refresh_opponents();
        assert_eq!(
            registry.opponents(),
            &[
                CreatureId(0x4000_0002),
                CreatureId(0x4000_0001),
                CreatureId(0x4000_0003)
            ]
        );
    }

    #[test]
    fn refresh_reports_state_then_goes_quiet() {
        let mut registry = with_player();
        assert!(matches!(registry.refresh_opponents(), Some(OpponentsChange::Rebuilt(_))));
        assert_eq!(registry.refresh_opponents(), None);
        registry.invalidate_opponents();
        assert!(matches!(registry.refresh_opponents(), Some(OpponentsChange::Refreshed(_))));
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        registry.invalidate_opponents();
        assert_eq!(
            registry.refresh_opponents(),
            Some(OpponentsChange::Rebuilt(vec![CreatureId(0x4000_0001)]))
        );
    }

    #[test]
    fn next_opponent_cycles_and_skips_npcs() {
        let mut registry = with_player();
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        let mut npc = Creature::new(CreatureId(0x8000_0001), "Sam", CreatureKind::Npc);
        npc.position = Position::new(102, 100, 7);
        registry.insert_or_get(npc).expect("npc");
        registry.insert_or_get(monster(0x4000_0002, 103, 100, 7)).expect("m");
        registry.refresh_opponents();

        assert_eq!(registry.next_opponent(1), Some(CreatureId(0x4000_0001)));
        registry.set_attack_target(Some(CreatureId(0x4000_0001))).expect("attack");
        assert_eq!(registry.next_opponent(1), Some(CreatureId(0x4000_0002)));
        assert_eq!(registry.next_opponent(-1), Some(CreatureId(0x4000_0002)));
        registry.set_attack_target(Some(CreatureId(0x4000_0002))).expect("attack");
        assert_eq!(registry.next_opponent(1), Some(CreatureId(0x4000_0001)));
    }

    #[test]
    fn next_opponent_backward_without_target_picks_last() {
        let mut registry = with_player();
        for (id, x) in [(0x4000_0001, 101), (0x4000_0002, 102), (0x4000_0003, 103)] {
            registry.insert_or_get(monster(id, x, 100, 7)).expect("m");
        }
        registry.refresh_opponents();
        assert_eq!(
            registry.opponents(),
            &[CreatureId(0x4000_0001), CreatureId(0x4000_0002), CreatureId(0x4000_0003)][..]
        );

        assert_eq!(registry.next_opponent(-1), Some(CreatureId(0x4000_0003)));
        assert_eq!(registry.next_opponent(1), Some(CreatureId(0x4000_0001)));
        registry.set_attack_target(Some(CreatureId(0x4000_0001))).expect("attack");
        assert_eq!(registry.next_opponent(-1), Some(CreatureId(0x4000_0003)));
    }

    #[test]
    fn next_opponent_on_empty_or_npc_only_list() {
        let mut registry = with_player();
        assert_eq!(registry.next_opponent(1), None);
        let mut npc = Creature::new(CreatureId(0x8000_0001), "Sam", CreatureKind::Npc);
        npc.position = Position::new(101, 100, 7);
        registry.insert_or_get(npc).expect("npc");
        registry.refresh_opponents();
        assert_eq!(registry.next_opponent(1), None);
    }

    #[test]
    fn attack_and_follow_are_exclusive_and_marked() {
        let mut registry = with_player();
        let id = CreatureId(0x4000_0001);
        registry.insert_or_get(monster(id.0, 101, 100, 7)).expect("m");
        registry.set_aim(Some(id));
        registry.set_attack_target(Some(id)).expect("attack");
        assert_eq!(registry.get(id).expect("m").marks.map_window, ExtendedMark::AimAttack);
        registry.set_follow_target(Some(id)).expect("follow");
        assert_eq!(registry.attack_target(), None);
        assert_eq!(registry.get(id).expect("m").marks.battle_list, ExtendedMark::AimFollow);
        registry.set_aim(None);
        assert_eq!(registry.get(id).expect("m").marks.map_window, ExtendedMark::Follow);
        registry.toggle_follow_target(id).expect("toggle");
        assert_eq!(registry.follow_target(), None);
        assert_eq!(registry.get(id).expect("m").marks.map_window, ExtendedMark::Unmarked);
        assert!(matches!(
            registry.toggle_attack_target(registry.player_id()),
            Err(ProtocolError::InvariantViolation(_))
        ));
    }

    #[test]
    fn clear_targets_matches_id_when_given() {
        let mut registry = with_player();
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        registry.set_attack_target(Some(CreatureId(0x4000_0001))).expect("attack");
        registry.clear_targets(Some(CreatureId(0x4000_0002)));
        assert_eq!(registry.attack_target(), Some(CreatureId(0x4000_0001)));
        registry.clear_targets(None);
        assert_eq!(registry.attack_target(), None);
    }

    #[test]
    fn reset_can_keep_the_player() {
        let mut registry = with_player();
        registry.insert_or_get(monster(0x4000_0001, 101, 100, 7)).expect("m");
        registry.reset(true);
        assert_eq!(registry.len(), 1);
        let player_since = registry.player().map(|p| p.known_since).expect("player");
        assert_eq!(player_since, 3);
        let later = registry
            .insert_or_get(monster(0x4000_0002, 102, 100, 7))
            .expect("m")
            .known_since;
        assert!(later > player_since);
        registry.reset(false);
        assert!(registry.is_empty());
        assert_eq!(registry.player_id(), CreatureId(0));
    }
}
