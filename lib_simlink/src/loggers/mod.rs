/// Sets up the `tracing` subscriber for console and rolling file output.
pub mod tracing_setup;

pub use tracing_setup::{setup_logging, LogOptions, LoggingError};
