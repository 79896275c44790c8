//! rollcam library crate.
//!
//! Roster-driven classroom capture: load class rosters from spreadsheets,
//! record a video or photo per student through ffmpeg, check which students
//! are missing, normalize media file names, build per-class slide decks and
//! extract headshots.

pub mod camera;
pub mod cli;
pub mod config;
pub mod console;
pub mod convert;
pub mod deck;
pub mod error;
pub mod ffmpeg;
pub mod headshot;
pub mod matcher;
pub mod recording;
pub mod rename;
pub mod report;
pub mod roster;
pub mod session;

pub use error::{Error, Result};
