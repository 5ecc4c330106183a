pub mod grid2d;
pub mod index_cache;
pub mod projection;
pub mod spectral;

pub use grid2d::{Grid2D, IndexPacking, PixelIndex, Range};
pub use index_cache::IndexCache;
pub use projection::{Gnomonic, Offset2D, SphericalCoordinates};
pub use spectral::SpectralGrid;
