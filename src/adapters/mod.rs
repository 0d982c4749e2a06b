// Adapters layer: HTTP clients implementing the domain ports.

pub mod cartodb;
pub mod earth_engine;

pub use cartodb::CartoDbClient;
pub use earth_engine::EarthEngineClient;
