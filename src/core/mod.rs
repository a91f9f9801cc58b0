//! Core types: errors, configuration, default locations.

pub mod config;
pub mod errors;
pub mod paths;
