pub mod consts;
pub mod error;
pub mod grid;
pub mod instrument;
pub mod io;
pub mod pipeline;
pub mod plane;
pub mod reduce;
pub mod scan;
pub mod source;
