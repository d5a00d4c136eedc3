//! Internal error types for the faultline pipeline
//!
//! The pipeline is itself an error-handling facility, so these errors never
//! escape the public reporting/routing entry points. They exist for sink
//! delivery, configuration validation, and handler invocation, and are
//! converted to the default-handler result at the router boundary.

use std::time::Duration;
use thiserror::Error;

/// Errors internal to the faultline pipeline
#[derive(Error, Debug)]
pub enum FaultlineError {
    #[error("Configuration error in '{field}': {message}")]
    Configuration { field: String, message: String },

    #[error("Report sink '{sink}' failed: {message}")]
    SinkFailure { sink: String, message: String },

    #[error("Handler '{handler}' exceeded its {timeout:?} invocation budget")]
    HandlerTimeout { handler: String, timeout: Duration },

    #[error("Handler '{handler}' panicked during invocation")]
    HandlerPanicked { handler: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type alias for pipeline-internal operations
pub type FaultlineResult<T> = Result<T, FaultlineError>;
