//! Utilities

pub mod logging;
