//! Parsing and validation of `kiln.toml` merge configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`KilnConfig`] describing the merge output, the archive cache, and the
//! ordered list of input containers.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_inputs, ResolvedInput, ResolvedPaths};
pub use types::*;
