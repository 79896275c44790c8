//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{parse_grid, parse_scale, parse_volume, Args, Command, ConfigAction};
pub use commands::{
    audio_test, cameras, capture, check, convert, deck, handle_config_action, headshots, rename, CaptureOptions,
};
pub use enums::{BackendArg, DeckKind};
