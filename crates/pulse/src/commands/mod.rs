//! Command implementations for pulse CLI.
//!
//! Each submodule implements the logic for one command.

pub mod replay;
pub mod state;
