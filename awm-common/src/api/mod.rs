//! API types and helpers shared across AWM services

pub mod auth;
