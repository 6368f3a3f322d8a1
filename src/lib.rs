// sqmpatch - Assigns roster personnel to the player slots of Arma missions
//
// This is the library crate containing the patching pipeline and its data model.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{MissionPatchingReport, MissionPatchingResult, PatcherConfig, PatcherSettings};
pub use services::{MissionPatchingService, PatchError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
