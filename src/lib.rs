//! Nudge-Engine Library
//!
//! Experimentation and behavioral engagement core for client applications.
//!
//! # Key Features
//! - Deterministic A/B variant assignment (same user always gets the same
//!   variant, survives restarts and config changes)
//! - Two-proportion significance testing with confidence intervals and lift
//! - Rule-based engagement triggers over psychographic, behavioral and
//!   timing conditions
//! - Sliding-window frequency caps so users are never spammed
//!
//! Storage is abstracted behind narrow entity-store traits; the bundled
//! in-memory implementation is the default and a database-backed store is a
//! drop-in replacement.

pub mod analysis;
pub mod assignment;
pub mod auth;
pub mod conditions;
pub mod config;
pub mod errors;
pub mod frequency;
pub mod handlers;
pub mod hashing;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod rules;
pub mod stats;
pub mod store;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
