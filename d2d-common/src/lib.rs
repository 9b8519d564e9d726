//! # door2door common library
//!
//! Shared code for the door2door collection service:
//! - Error type
//! - Configuration loading (TOML + environment overrides)
//! - Database pool initialization and the collection record model
//! - Local calendar-day helpers used for date filtering

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
