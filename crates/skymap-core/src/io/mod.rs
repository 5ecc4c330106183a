pub mod plane_writer;
pub mod stream;
pub mod stream_writer;

pub use plane_writer::{write_model, PlaneHeader};
pub use stream::{ScanStreamReader, StreamHeader};
pub use stream_writer::{write_scan, ScanStreamWriter};
