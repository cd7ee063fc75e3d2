//! Database layer
//!
//! Schema creation, connection pool initialization and domain models.

pub mod init;
pub mod models;

pub use init::init_database;
