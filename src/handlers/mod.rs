//! HTTP API Handlers - Modular organization of the REST API
//!
//! Each submodule handles a specific domain of functionality.

// Core modules
pub mod router;
pub mod state;

// Health and utilities
pub mod health;

// Experimentation
pub mod experiments;

// Behavioral rules, profiles and events
pub mod rules;

// Re-export commonly used items
pub use router::{build_protected_routes, build_public_routes, build_router};
pub use state::{AppState, EngineState};
