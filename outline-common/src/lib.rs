//! Common utilities for the outline tracing toolkit

pub mod error;

pub use error::{Error, Result};
