//! # IRI Common Library
//!
//! Shared code for the IRI profile retrieval workspace including:
//! - Error type shared by configuration and time helpers
//! - Configuration loading (CLI → ENV → TOML → compiled defaults)
//! - Time conversion between Unix seconds and UTC calendar time
//! - Human-readable elapsed time for progress lines

pub mod config;
pub mod error;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
