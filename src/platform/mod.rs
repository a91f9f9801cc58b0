//! Host abstraction layer: permission gate and header metadata.

pub mod pal;
