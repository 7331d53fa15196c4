//! Small helpers shared across the crate.

mod helpers;

pub use helpers::*;
