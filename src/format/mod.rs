//! Line formatting: the log line codec, the session header and file reading.

pub mod header;
pub mod line;
pub mod reader;
