//! CLI command implementations.

pub mod records;
pub mod settings;
pub mod sync;
