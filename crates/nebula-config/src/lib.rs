//! Configuration for the Nebula world baker.
//!
//! Settings persist to disk as RON files. CLI options parsed with clap
//! override whatever was loaded, and missing sections fall back to defaults.

mod cli;
mod config;
mod error;

pub use cli::{AxisArg, CliArgs, ModeArg};
pub use config::{BakeConfig, Config, DebugConfig};
pub use error::ConfigError;
