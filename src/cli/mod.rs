//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{parse_gamma, parse_resolution, parse_scene, Args, Command, ConfigAction, SceneSpec};
pub use commands::{dispatch, handle_config_action, self_test, setup_ctrlc_handler, CommandError};
pub use enums::{Algorithm, Mode};
