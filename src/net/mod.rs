pub mod features;
pub mod game;
pub mod outgoing;
pub mod packet;
