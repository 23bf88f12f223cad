//! CLI command implementations.

pub mod deliver;
pub mod paginate;
pub mod show_config;
