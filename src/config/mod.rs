//! Configuration management for the rendezvous service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values for the director and match function.

pub mod app;

// Re-export commonly used types
pub use app::{
    parse_regions, validate_config, AllocatorSettings, AppConfig, DirectorSettings,
    MatchFunctionSettings, MatchSourceKind, OpenMatchSettings, ServiceSettings,
};
