//! Core data models for tierpoint.
//!
//! - `report`: participant reports, checkpoint identities, status codes
//! - `config`: TOML configuration
//! - `error`: error taxonomy

mod config;
mod error;
mod report;

pub use config::*;
pub use error::*;
pub use report::*;
