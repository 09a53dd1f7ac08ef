pub mod buddy;
pub mod container;
pub mod creature;
pub mod object;
pub mod player;
pub mod registry;
