//! CLI subcommands

pub mod eval;
pub mod run;
