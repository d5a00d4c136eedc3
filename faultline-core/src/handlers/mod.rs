//! Handler adapters: one strategy per failure domain
//!
//! Each handler converts a classified error into a structured remediation
//! result. Handlers never fail: `handle` is total, and the router's timeout
//! plus default fallback is the safety net for anything pathological.

use crate::breadcrumb::BreadcrumbTrail;
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorContext, ErrorHandlerResult};
use async_trait::async_trait;
use std::sync::Arc;

mod ai_service;
mod api;
mod authentication;
mod database;
mod default;
mod network;
mod ui_component;

pub use ai_service::AiServiceHandler;
pub use api::ApiHandler;
pub use authentication::AuthenticationHandler;
pub use database::DatabaseHandler;
pub use default::DefaultHandler;
pub use network::NetworkHandler;
pub use ui_component::UiComponentHandler;

/// A named strategy that converts a classified error into a user-facing
/// remediation result
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Capability-search rank; higher wins. Ties break on name.
    fn priority(&self) -> u32;

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool;

    async fn handle(&self, error: &EnhancedError, context: &ErrorContext) -> ErrorHandlerResult;
}

/// The call site's user-facing override wins over the handler's own wording
pub(crate) fn resolve_user_message(error: &EnhancedError, fallback: &str) -> String {
    match &error.user_message {
        Some(message) if !message.is_empty() => message.clone(),
        _ => fallback.to_string(),
    }
}

/// The six built-in domain handlers, in no particular order. The default
/// handler is held separately by the router.
pub fn builtin_handlers(
    config: &PipelineConfig,
    trail: Arc<BreadcrumbTrail>,
) -> Vec<Arc<dyn ErrorHandler>> {
    vec![
        Arc::new(AuthenticationHandler::new(trail.clone())),
        Arc::new(AiServiceHandler::new(config, trail.clone())),
        Arc::new(DatabaseHandler::new(config, trail.clone())),
        Arc::new(NetworkHandler::new(config, trail.clone())),
        Arc::new(ApiHandler::new(config, trail.clone())),
        Arc::new(UiComponentHandler::new(config, trail)),
    ]
}
