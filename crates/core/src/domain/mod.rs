pub mod analysis;
pub mod building;
pub mod inflation;
pub mod market;
pub mod text;
pub mod trend;
