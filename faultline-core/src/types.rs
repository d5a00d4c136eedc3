//! Core data model for the error triage pipeline
//!
//! Failures enter as a [`CapturedError`] (message plus whatever classification
//! the call site already knows), are enriched into an [`EnhancedError`] where
//! every classification field is concrete, and leave the router as an
//! [`ErrorHandlerResult`] the caller can act on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Where in the system a failure originated. Drives routing and inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSource {
    Api,
    AiService,
    UiComponent,
    Network,
    Database,
    System,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSource::Api => "api",
            ErrorSource::AiService => "ai-service",
            ErrorSource::UiComponent => "ui-component",
            ErrorSource::Network => "network",
            ErrorSource::Database => "database",
            ErrorSource::System => "system",
        };
        f.write_str(s)
    }
}

/// Error classification for routing, analytics, and retry decisions.
///
/// This is the complete, closed taxonomy; handlers and inference never
/// produce values outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Authentication,
    Authorization,
    Validation,
    DataIntegrity,
    ExternalService,
    Performance,
    UserInput,
    System,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Validation => "validation",
            ErrorCategory::DataIntegrity => "data_integrity",
            ErrorCategory::ExternalService => "external_service",
            ErrorCategory::Performance => "performance",
            ErrorCategory::UserInput => "user_input",
            ErrorCategory::System => "system",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Severity levels for monitoring and alerting
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Runtime mode captured into every report's environment block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Development,
    Test,
    Production,
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Test => "test",
            RuntimeMode::Production => "production",
        };
        f.write_str(s)
    }
}

/// Describes where and why a failure occurred
///
/// Constructed fresh at each call site; the registry copies what it needs
/// into the report, nothing aliases back into pipeline internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Failure origin, required, drives routing
    pub source: ErrorSource,
    /// Free-text feature label (e.g. "document-analysis")
    pub feature: Option<String>,
    /// User attribution
    pub user_id: Option<String>,
    /// Tenant attribution
    pub organization_id: Option<String>,
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    /// UI component stack, when the failure came from the rendering layer
    pub component_stack: Option<String>,
    /// Open key-value map for domain-specific details (provider, HTTP status, model, cost)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new(source: ErrorSource) -> Self {
        Self {
            source,
            feature: None,
            user_id: None,
            organization_id: None,
            request_id: None,
            session_id: None,
            user_agent: None,
            url: None,
            component_stack: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_component_stack(mut self, stack: impl Into<String>) -> Self {
        self.component_stack = Some(stack.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// HTTP status code from metadata, when a collaborator recorded one
    pub fn status_code(&self) -> Option<u16> {
        self.metadata
            .get("status")
            .and_then(|v| v.as_u64())
            .and_then(|n| u16::try_from(n).ok())
    }

    /// Boolean flag from metadata, absent or non-boolean reads as false
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// A raw failure value as handed to the pipeline
///
/// Classification fields are optional here; call sites that already know the
/// category or severity pre-set them and enhancement leaves them untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedError {
    pub message: String,
    pub stack: Option<String>,
    pub error_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub category: Option<ErrorCategory>,
    pub severity: Option<ErrorSeverity>,
    pub retryable: Option<bool>,
    pub user_message: Option<String>,
    pub feature: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl CapturedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Capture a failure from any `std::error::Error`, folding its source
    /// chain into the stack so fingerprinting sees the cause trail.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut frames = Vec::new();
        let mut cause = err.source();
        while let Some(c) = cause {
            frames.push(c.to_string());
            cause = c.source();
        }
        Self {
            message: err.to_string(),
            stack: if frames.is_empty() {
                None
            } else {
                Some(frames.join("\n"))
            },
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }
}

impl From<String> for CapturedError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CapturedError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Re-enhancement goes through this conversion: every already-set field is
/// preserved, which makes enhancement idempotent.
impl From<EnhancedError> for CapturedError {
    fn from(error: EnhancedError) -> Self {
        Self {
            message: error.message,
            stack: error.stack,
            error_id: Some(error.error_id),
            timestamp: Some(error.timestamp),
            category: Some(error.category),
            severity: Some(error.severity),
            retryable: Some(error.retryable),
            user_message: error.user_message,
            feature: error.feature,
            user_id: error.user_id,
            organization_id: error.organization_id,
        }
    }
}

/// A failure value after enhancement: every classification field is concrete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedError {
    /// Globally unique id, `err_<millis>_<suffix>` when generated
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub stack: Option<String>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    /// Human-readable override supplied by the call site
    pub user_message: Option<String>,
    pub feature: Option<String>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}/{})",
            self.error_id, self.message, self.category, self.severity
        )
    }
}

impl std::error::Error for EnhancedError {}

/// Environment block captured at report time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub mode: RuntimeMode,
    /// Only present when a browser-like context supplied one
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Kind of recovery step a handler can propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Retry,
    Fallback,
    Redirect,
    Notify,
    Recover,
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

/// A concrete recovery step proposed to the caller
///
/// The caller owns execution; redirects carry their destination in `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAction {
    pub kind: ActionKind,
    pub label: String,
    pub priority: ActionPriority,
    pub target: Option<String>,
}

impl ErrorAction {
    pub fn new(kind: ActionKind, label: impl Into<String>, priority: ActionPriority) -> Self {
        Self {
            kind,
            label: label.into(),
            priority,
            target: None,
        }
    }

    pub fn retry(label: impl Into<String>) -> Self {
        Self::new(ActionKind::Retry, label, ActionPriority::High)
    }

    pub fn fallback(label: impl Into<String>) -> Self {
        Self::new(ActionKind::Fallback, label, ActionPriority::Medium)
    }

    pub fn redirect(label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Redirect,
            label: label.into(),
            priority: ActionPriority::High,
            target: Some(target.into()),
        }
    }

    pub fn notify(label: impl Into<String>) -> Self {
        Self::new(ActionKind::Notify, label, ActionPriority::Low)
    }

    pub fn escalate(label: impl Into<String>) -> Self {
        Self::new(ActionKind::Escalate, label, ActionPriority::High)
    }
}

/// The router's output contract, returned synchronously to the caller
///
/// `user_message` is a `String` on purpose: every path through the router,
/// including the double-fallback path, must yield a non-empty human-readable
/// message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlerResult {
    pub handled: bool,
    pub should_retry: bool,
    #[serde(default, with = "humantime_serde::option")]
    pub retry_delay: Option<Duration>,
    pub user_message: String,
    pub actions: Vec<ErrorAction>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorHandlerResult {
    /// A handled, non-retryable result with no proposed actions
    pub fn terminal(user_message: impl Into<String>) -> Self {
        Self {
            handled: true,
            should_retry: false,
            retry_delay: None,
            user_message: user_message.into(),
            actions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_retry(mut self, delay: Duration) -> Self {
        self.should_retry = true;
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_action(mut self, action: ErrorAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_category_display_match_wire_names() {
        assert_eq!(ErrorSource::AiService.to_string(), "ai-service");
        assert_eq!(ErrorSource::UiComponent.to_string(), "ui-component");
        assert_eq!(ErrorCategory::ExternalService.to_string(), "external_service");
        assert_eq!(ErrorCategory::DataIntegrity.to_string(), "data_integrity");
    }

    #[test]
    fn severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::High);
        assert!(ErrorSeverity::High > ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium > ErrorSeverity::Low);
    }

    #[test]
    fn context_metadata_accessors() {
        let ctx = ErrorContext::new(ErrorSource::Api)
            .with_metadata("status", serde_json::json!(401))
            .with_metadata("offline", serde_json::json!(true));
        assert_eq!(ctx.status_code(), Some(401));
        assert!(ctx.flag("offline"));
        assert!(!ctx.flag("quota_exceeded"));
    }

    #[test]
    fn captured_error_folds_source_chain_into_stack() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let captured = CapturedError::from_error(&io);
        assert_eq!(captured.message, "socket closed");
        assert!(captured.stack.is_none());
    }
}
