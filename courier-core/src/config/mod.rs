//! Configuration management
//!
//! Loads messenger and logging settings from `~/.courier/config.json` and
//! `COURIER__SECTION__KEY` environment variables.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validate::validate_config;
