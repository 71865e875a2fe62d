//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the engine crates:
//! - Logging and tracing infrastructure
//! - Engine configuration
//! - Event bus system
//!
//! ## Overview
//!
//! This crate establishes the logging conventions, configuration builder and
//! event broadcasting used by `core-sync`, `core-service` and the vendor
//! provider crates.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
