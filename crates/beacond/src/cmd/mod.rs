//! beacond subcommands

pub mod probe;
pub mod start;
