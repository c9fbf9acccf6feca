//! # Mise Common Library
//!
//! Shared code for the Mise recipe service:
//! - Configuration loading and root folder resolution
//! - Database initialization and row models
//! - Password hashing and access tokens
//! - Input validation helpers

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod validation;

pub use error::{Error, Result};
