use crate::world::position::{Direction, Position};
use tracing::{debug, warn};

/// Snapbacks on one spot before the client gives up and cancels.
pub const SNAPBACK_LIMIT: u32 = 16;

/// Local movement bookkeeping for the player's own character.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlayerState {
    /// Queued path steps still to be sent.
    pub autowalk: Vec<Direction>,
    pub earliest_move_time: u64,
    pub last_snapback: Option<Position>,
    pub snapback_count: u32,
    /// Facing the player should adopt after the server rejects a step.
    pub facing: Direction,
}

impl PlayerState {
    pub fn stop_autowalk(&mut self) {
        if !self.autowalk.is_empty() {
            debug!(steps = self.autowalk.len(), "autowalk stopped");
        }
        self.autowalk.clear();
    }

    pub fn abort_autowalk(&mut self, direction: Direction) {
        self.stop_autowalk();
        self.facing = direction;
    }

    pub fn add_wait(&mut self, ticks: u16) {
        self.earliest_move_time = self.earliest_move_time.saturating_add(u64::from(ticks));
    }

    /// Counts repeated snapbacks on the same field; the first one on a field
    /// counts as zero. Returns true once the count reaches the limit, after
    /// which the counter starts over.
    pub fn record_snapback(&mut self, position: Position) -> bool {
        if self.last_snapback == Some(position) {
            self.snapback_count += 1;
        } else {
            self.last_snapback = Some(position);
            self.snapback_count = 0;
        }
        if self.snapback_count >= SNAPBACK_LIMIT {
            warn!(%position, "repeated snapback, cancelling");
            self.last_snapback = None;
            self.snapback_count = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapback_limit_trips_once_then_restarts() {
        let mut state = PlayerState::default();
        let here = Position::new(100, 100, 7);
        for _ in 0..SNAPBACK_LIMIT {
            assert!(!state.record_snapback(here));
        }
        assert_eq!(state.snapback_count, SNAPBACK_LIMIT - 1);
        assert!(state.record_snapback(here));
        assert_eq!(state.snapback_count, 0);
        assert!(!state.record_snapback(here));
        assert!(!state.record_snapback(here));
        assert_eq!(state.snapback_count, 1);
    }

    #[test]
    fn snapback_elsewhere_restarts_count() {
        let mut state = PlayerState::default();
        for _ in 0..10 {
            state.record_snapback(Position::new(1, 1, 7));
        }
        assert!(!state.record_snapback(Position::new(2, 1, 7)));
        assert_eq!(state.snapback_count, 0);
    }

    #[test]
    fn abort_clears_path_and_turns() {
        let mut state = PlayerState {
            autowalk: vec![Direction::North, Direction::North],
            ..Default::default()
        };
        state.abort_autowalk(Direction::West);
        assert!(state.autowalk.is_empty());
        assert_eq!(state.facing, Direction::West);
        state.add_wait(300);
        state.add_wait(200);
        assert_eq!(state.earliest_move_time, 500);
    }
}
