//! Deskline core: error type, budget policy, configuration.

pub mod config;
pub mod error;

pub use config::{BudgetPolicy, DataPaths, DeskConfig};
pub use error::{Error, Result};
