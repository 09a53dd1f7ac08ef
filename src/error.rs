use crate::entities::creature::CreatureId;
use crate::world::position::Position;

/// Failure while decoding or applying one server message.
///
/// Every variant except `InvariantViolation` is fatal for the message being
/// decoded: the caller must treat the stream as desynchronised and drop the
/// rest of the buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("message truncated at offset {offset}: needed {needed} bytes, {remaining} left")]
    TruncatedMessage {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("co-ordinate ({}, {}, {}) is out of range", .0.x, .0.y, .0.z)]
    OutOfRangeCoordinate(Position),

    #[error("no object at stack position {stack_pos} of ({}, {}, {})", .position.x, .position.y, .position.z)]
    ObjectNotFound { position: Position, stack_pos: u8 },

    #[error("creature {0} not found")]
    CreatureNotFound(CreatureId),

    #[error("creature registry is full ({limit} entries)")]
    CapacityExceeded { limit: usize },

    /// Rejected at the call site; does not abort the surrounding message.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("unknown appearance type {0}")]
    UnknownAppearance(u16),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
