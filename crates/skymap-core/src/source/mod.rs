pub mod accumulate;
pub mod footprint;
pub mod map;
pub mod model;
pub mod sizing;
pub mod strategy;
pub mod sync;

pub use footprint::{FootprintModel, MemoryBudget, MemoryReport};
pub use map::{MapSettings, SourceMap};
pub use model::SourceModel;
pub use strategy::{PixelPlanes, PlaneLayout, PlaneStrategy, ScalarPlanes, SpectralPlanes};
