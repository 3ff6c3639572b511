/// Logging utilities
pub mod logging;
