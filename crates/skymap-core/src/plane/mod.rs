pub mod accumulation;
pub mod fft;
pub mod filter;
pub mod mask;
pub mod ops;
pub mod peak;
pub mod smooth;
pub mod stats;

pub use accumulation::{pixel_flags, AccumulationPlane, BeamState};
pub use mask::{BlankingSign, Connectivity, Mask, MaskRule};
pub use peak::{Peak, PeakKind};
