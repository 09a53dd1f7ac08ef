/// Highest floor index; floor 0 is the sky, 7 the ground layer.
pub const MAX_Z: u8 = 15;

/// Absolute world co-ordinate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    #[default]
    South,
    West,
    Northeast,
    Southeast,
    Southwest,
    Northwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i16,
    pub dy: i16,
    pub dz: i8,
}

impl Position {
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + i32::from(delta.dx);
        let y = i32::from(self.y) + i32::from(delta.dy);
        let z = i16::from(self.z) + i16::from(delta.dz);

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z > i16::from(MAX_Z) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction.delta())
    }

    /// Chebyshev distance on the horizontal plane.
    pub fn chebyshev_distance(self, other: Position) -> u16 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        dx.max(dy).min(u32::from(u16::MAX)) as u16
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub fn delta(self) -> PositionDelta {
        match self {
            Direction::North => PositionDelta { dx: 0, dy: -1, dz: 0 },
            Direction::East => PositionDelta { dx: 1, dy: 0, dz: 0 },
            Direction::South => PositionDelta { dx: 0, dy: 1, dz: 0 },
            Direction::West => PositionDelta { dx: -1, dy: 0, dz: 0 },
            Direction::Northeast => PositionDelta { dx: 1, dy: -1, dz: 0 },
            Direction::Southeast => PositionDelta { dx: 1, dy: 1, dz: 0 },
            Direction::Southwest => PositionDelta { dx: -1, dy: 1, dz: 0 },
            Direction::Northwest => PositionDelta { dx: -1, dy: -1, dz: 0 },
        }
    }

    /// Wire byte; unknown values fall back to south like the client does.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            3 => Direction::West,
            4 => Direction::Northeast,
            5 => Direction::Southeast,
            6 => Direction::Southwest,
            7 => Direction::Northwest,
            _ => Direction::South,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::Northeast => 4,
            Direction::Southeast => 5,
            Direction::Southwest => 6,
            Direction::Northwest => 7,
        }
    }

    /// Facing for a walk step, diagonals included.
    pub fn from_step(dx: i32, dy: i32) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, 1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            (1, -1) => Some(Direction::Northeast),
            (1, 1) => Some(Direction::Southeast),
            (-1, 1) => Some(Direction::Southwest),
            (-1, -1) => Some(Direction::Northwest),
            _ => None,
        }
    }

    /// Facing after a push or teleport, x axis taking precedence.
    pub fn from_push(dx: i32, dy: i32) -> Option<Self> {
        if dx > 0 {
            Some(Direction::East)
        } else if dx < 0 {
            Some(Direction::West)
        } else if dy < 0 {
            Some(Direction::North)
        } else if dy > 0 {
            Some(Direction::South)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opposite(direction: Direction) -> Direction {
        match direction {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Northeast => Direction::Southwest,
            Direction::Northwest => Direction::Southeast,
            Direction::Southeast => Direction::Northwest,
            Direction::Southwest => Direction::Northeast,
        }
    }

    #[test]
    fn step_roundtrip_with_opposites() {
        let origin = Position { x: 100, y: 100, z: 7 };
        for value in 0..8u8 {
            let direction = Direction::from_u8(value);
            assert_eq!(direction.to_u8(), value);
            let next = origin.step(direction).expect("step");
            let back = next.step(opposite(direction)).expect("step back");
            assert_eq!(back, origin);
        }
    }

    #[test]
    fn offset_rejects_floors_past_max() {
        let origin = Position { x: 10, y: 10, z: MAX_Z };
        assert!(origin.offset(PositionDelta { dx: 0, dy: 0, dz: 1 }).is_none());
        assert!(Position { x: 0, y: 0, z: 0 }
            .offset(PositionDelta { dx: -1, dy: 0, dz: 0 })
            .is_none());
    }

    #[test]
    fn chebyshev_takes_larger_axis() {
        let a = Position { x: 100, y: 100, z: 7 };
        assert_eq!(a.chebyshev_distance(Position { x: 103, y: 98, z: 7 }), 3);
        assert_eq!(a.chebyshev_distance(Position { x: 99, y: 95, z: 7 }), 5);
        assert_eq!(a.chebyshev_distance(a), 0);
    }

    #[test]
    fn push_direction_prefers_x_axis() {
        assert_eq!(Direction::from_push(2, -3), Some(Direction::East));
        assert_eq!(Direction::from_push(-1, 1), Some(Direction::West));
        assert_eq!(Direction::from_push(0, -2), Some(Direction::North));
        assert_eq!(Direction::from_push(0, 1), Some(Direction::South));
        assert_eq!(Direction::from_push(0, 0), None);
    }

    #[test]
    fn step_direction_matches_delta() {
        for value in 0..8u8 {
            let direction = Direction::from_u8(value);
            let delta = direction.delta();
            assert_eq!(
                Direction::from_step(i32::from(delta.dx), i32::from(delta.dy)),
                Some(direction)
            );
        }
        assert_eq!(Direction::from_step(0, 0), None);
    }
}
