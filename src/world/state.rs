use crate::entities::buddy::BuddyList;
use crate::entities::container::ContainerTracker;
use crate::entities::player::PlayerState;
use crate::entities::registry::{CreatureRegistry, OpponentsChange, DEFAULT_CREATURE_CAPACITY};
use crate::error::ProtocolError;
use crate::world::appearance::AppearanceCatalog;
use crate::world::map::{MapPosition, WorldMap};
use crate::world::minimap::{MiniMap, DEFAULT_SECTOR_CAPACITY};
use crate::world::position::Position;

/// Minimap values recomputed for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimapUpdate {
    pub position: Position,
    pub colour: u8,
    pub cost: u8,
}

/// Everything the client replicates from the server. Handlers receive it by
/// `&mut` one message at a time.
#[derive(Debug)]
pub struct GameState {
    pub map: WorldMap,
    pub minimap: MiniMap,
    pub creatures: CreatureRegistry,
    pub containers: ContainerTracker,
    pub buddies: BuddyList,
    pub player: PlayerState,
    pub beat_duration: u16,
    pub can_report_bugs: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(DEFAULT_CREATURE_CAPACITY, DEFAULT_SECTOR_CAPACITY)
    }
}

impl GameState {
    pub fn new(creature_capacity: usize, minimap_sectors: usize) -> Self {
        Self {
            map: WorldMap::new(),
            minimap: MiniMap::new(minimap_sectors),
            creatures: CreatureRegistry::with_capacity(creature_capacity),
            containers: ContainerTracker::default(),
            buddies: BuddyList::default(),
            player: PlayerState::default(),
            beat_duration: 0,
            can_report_bugs: false,
        }
    }

    /// Recomputes the minimap entry of a visible field when it lies on the
    /// displayed floor.
    pub fn update_minimap(
        &mut self,
        absolute: Position,
        catalog: &dyn AppearanceCatalog,
    ) -> Result<Option<MinimapUpdate>, ProtocolError> {
        if absolute.z != self.minimap.position().z {
            return Ok(None);
        }
        let map = self.map.to_map(absolute)?;
        Ok(Some(self.store_minimap(absolute, map, catalog)))
    }

    /// Same as `update_minimap` for a field addressed by window position.
    pub fn update_minimap_at(
        &mut self,
        map: MapPosition,
        catalog: &dyn AppearanceCatalog,
    ) -> Result<Option<MinimapUpdate>, ProtocolError> {
        let absolute = self.map.to_absolute(map)?;
        if absolute.z != self.minimap.position().z {
            return Ok(None);
        }
        Ok(Some(self.store_minimap(absolute, map, catalog)))
    }

    fn store_minimap(
        &mut self,
        absolute: Position,
        map: MapPosition,
        catalog: &dyn AppearanceCatalog,
    ) -> MinimapUpdate {
        let colour = self.map.minimap_colour(map, catalog);
        let cost = self.map.minimap_cost(map, catalog);
        self.minimap.update_field(absolute, colour, cost);
        MinimapUpdate {
            position: absolute,
            colour,
            cost,
        }
    }

    pub fn refresh_opponents(&mut self) -> Option<OpponentsChange> {
        self.creatures.refresh_opponents()
    }

    /// Drops all session state, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.map.reset_map();
        self.minimap.clear();
        self.creatures.reset(false);
        self.containers.clear();
        self.buddies.clear();
        self.player.reset();
    }
}
