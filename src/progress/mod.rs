//! Progress reporting module
//!
//! Provides a row counter shown while large loop files are read.

mod reporter;

pub use reporter::*;
