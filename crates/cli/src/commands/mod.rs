//! Subcommand implementations

pub mod build;
pub mod normalize;
pub mod split;
