pub mod appearance;
pub mod map;
pub mod minimap;
pub mod position;
pub mod state;
