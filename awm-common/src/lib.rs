//! # AWM Common Library
//!
//! Shared code for the Academic Workload Manager services including:
//! - Database schema, models and initialization
//! - Academic year registry (active/staging year handling)
//! - Profile/instance split model and the profile migration engine
//! - Referential integrity guard for shared reference tables
//! - API authentication helpers
//! - Configuration loading

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod integrity;
pub mod migration;
pub mod profiles;
pub mod years;

pub use error::{Error, Result};
