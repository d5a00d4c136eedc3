//! Handler for generic API request failures

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult, ErrorSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct ApiHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
}

impl ApiHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
        }
    }
}

#[async_trait]
impl ErrorHandler for ApiHandler {
    fn name(&self) -> &'static str {
        "api"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.source == ErrorSource::Api {
            return true;
        }
        let msg = error.message.to_lowercase();
        msg.contains("fetch") || msg.contains("http") || msg.contains("api")
    }

    async fn handle(&self, error: &EnhancedError, context: &ErrorContext) -> ErrorHandlerResult {
        let status = context.status_code();

        self.trail.add(
            BreadcrumbEntry::new(
                BreadcrumbCategory::Network,
                BreadcrumbLevel::Warning,
                format!("api request failure: {}", error.error_id),
            )
            .with_data(serde_json::json!({ "status": status })),
        );

        if status == Some(401) {
            return ErrorHandlerResult::terminal(resolve_user_message(
                error,
                "Your session has expired. Please sign in again.",
            ))
            .with_action(ErrorAction::redirect("Sign in", "/sign-in"));
        }

        let msg = error.message.to_lowercase();
        let network_like =
            msg.contains("fetch") || msg.contains("network") || msg.contains("connection");
        let server_side = status.map_or(false, |s| s >= 500);

        if network_like || server_side {
            return ErrorHandlerResult::terminal(resolve_user_message(
                error,
                "The request failed. Please try again in a moment.",
            ))
            .with_retry(self.base_delay)
            .with_action(ErrorAction::retry("Try again"));
        }

        ErrorHandlerResult::terminal(resolve_user_message(
            error,
            "The request could not be completed. Please check your input and try again.",
        ))
    }
}
