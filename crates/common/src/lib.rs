//! Common utilities and types shared across meshprobe crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
