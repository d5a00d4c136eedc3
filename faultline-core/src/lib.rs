//! Faultline: in-process error classification, correlation, and dispatch.
//!
//! A best-effort triage layer that normalizes heterogeneous failures into a
//! common model, maintains bounded in-memory retention, and routes each
//! error to a domain handler that produces a structured remediation result.
//! It guarantees nothing about delivery to external backends and never lets
//! its own failures propagate into application code that is already handling
//! an error.

pub mod breadcrumb;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod types;

pub use breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
pub use config::PipelineConfig;
pub use error::{FaultlineError, FaultlineResult};
pub use export::{FlushHandle, NoopSink, RecordingSink, ReportSink};
pub use handlers::ErrorHandler;
pub use registry::{ErrorAnalytics, ErrorQuery, ErrorRegistry, ErrorReport};
pub use router::{ErrorRouter, RouteOptions, RoutingDecision, RoutingRule};
pub use types::{
    ActionKind, ActionPriority, CapturedError, EnhancedError, ErrorAction, ErrorCategory,
    ErrorContext, ErrorHandlerResult, ErrorSeverity, ErrorSource, RuntimeMode,
};
