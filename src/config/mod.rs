//! Configuration module for EAR tools
//!
//! Provides CLI arguments and the typed settings each tool runs with.

mod settings;

pub use settings::*;
