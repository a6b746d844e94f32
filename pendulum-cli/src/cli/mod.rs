//! CLI command implementations.
//!
//! - `run` - simulate headless and write the plots (optionally JSON)
//! - `config` - YAML configuration shared by the TUI and `run`

pub mod common;
pub mod config;
pub mod run;

pub use config::SimConfig;
pub use run::cmd_run;
