// src/config/mod.rs

//! Configuration: TOML model, loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use model::{
    ConfigFile, LibrarySection, OrchestratorSection, PackagingSection, PoolConfig,
    RawConfigFile, RemoteSection, RetrySection, SchedulerSection,
};
