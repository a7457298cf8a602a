pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod settings;
pub mod time;

pub use error::{EavlogError, Result};
