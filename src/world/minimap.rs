use crate::world::appearance::COST_UNPASSABLE;
use crate::world::position::Position;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use tracing::trace;

pub const SECTOR_SIZE: u16 = 256;
pub const DEFAULT_SECTOR_CAPACITY: usize = 64;

const SECTOR_FIELDS: usize = SECTOR_SIZE as usize * SECTOR_SIZE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorKey {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl From<Position> for SectorKey {
    fn from(position: Position) -> Self {
        SectorKey {
            x: position.x / SECTOR_SIZE,
            y: position.y / SECTOR_SIZE,
            z: position.z,
        }
    }
}

#[derive(Debug, Clone)]
struct Sector {
    colours: Vec<u8>,
    costs: Vec<u8>,
}

impl Sector {
    fn new() -> Self {
        Sector {
            colours: vec![0; SECTOR_FIELDS],
            costs: vec![COST_UNPASSABLE; SECTOR_FIELDS],
        }
    }

    fn index(position: Position) -> usize {
        let x = usize::from(position.x % SECTOR_SIZE);
        let y = usize::from(position.y % SECTOR_SIZE);
        y * usize::from(SECTOR_SIZE) + x
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64)
        }
    }
}

/// Automap flag placed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimapMark {
    pub icon: u8,
    pub description: String,
}

/// Colour and walk cost per field, kept in 256x256 sectors with LRU
/// eviction.
pub struct MiniMap {
    sectors: LruCache<SectorKey, Sector>,
    position: Position,
    marks: BTreeMap<Position, MinimapMark>,
    stats: CacheStats,
}

impl Default for MiniMap {
    fn default() -> Self {
        Self::new(DEFAULT_SECTOR_CAPACITY)
    }
}

impl std::fmt::Debug for MiniMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniMap")
            .field("sectors", &self.sectors.len())
            .field("position", &self.position)
            .field("marks", &self.marks.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl MiniMap {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        MiniMap {
            sectors: LruCache::new(capacity),
            position: Position::default(),
            marks: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Centre of the displayed minimap; `position.z` is the displayed floor.
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    fn sector_mut(&mut self, key: SectorKey) -> &mut Sector {
        if self.sectors.contains(&key) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            if let Some((evicted, _)) = self.sectors.push(key, Sector::new()) {
                self.stats.evictions += 1;
                trace!(x = evicted.x, y = evicted.y, z = evicted.z, "minimap sector evicted");
            }
        }
        self.sectors.get_or_insert_mut(key, Sector::new)
    }

    /// Stores the derived values for one field. Returns true when anything
    /// changed.
    pub fn update_field(&mut self, position: Position, colour: u8, cost: u8) -> bool {
        let index = Sector::index(position);
        let sector = self.sector_mut(SectorKey::from(position));
        let changed = sector.colours[index] != colour || sector.costs[index] != cost;
        sector.colours[index] = colour;
        sector.costs[index] = cost;
        changed
    }

    pub fn colour(&mut self, position: Position) -> Option<u8> {
        let index = Sector::index(position);
        match self.sectors.get(&SectorKey::from(position)) {
            Some(sector) => {
                self.stats.hits += 1;
                Some(sector.colours[index])
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn cost(&mut self, position: Position) -> Option<u8> {
        let index = Sector::index(position);
        match self.sectors.get(&SectorKey::from(position)) {
            Some(sector) => {
                self.stats.hits += 1;
                Some(sector.costs[index])
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn add_mark(&mut self, position: Position, icon: u8, description: String) {
        self.marks.insert(position, MinimapMark { icon, description });
    }

    pub fn remove_mark(&mut self, position: Position) -> Option<MinimapMark> {
        self.marks.remove(&position)
    }

    pub fn mark(&self, position: Position) -> Option<&MinimapMark> {
        self.marks.get(&position)
    }

    pub fn marks(&self) -> impl Iterator<Item = (&Position, &MinimapMark)> {
        self.marks.iter()
    }

    pub fn clear(&mut self) {
        self.sectors.clear();
        self.marks.clear();
    }
}
