pub mod engine;

pub use engine::{Accumulator, Partition, Reduced, ReductionEngine};
