//! Common types for the virtual instrument workspace.
//!
//! This crate provides:
//! - [`DeviceError`] / [`DeviceResult`] error types shared by every crate
//! - [`DeviceConfig`] TOML configuration with identity, sync, and
//!   transport sections

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;
