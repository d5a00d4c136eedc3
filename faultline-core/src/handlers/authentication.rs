//! Handler for authentication failures: always a forced re-sign-in

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::types::{
    EnhancedError, ErrorAction, ErrorCategory, ErrorContext, ErrorHandlerResult,
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct AuthenticationHandler {
    trail: Arc<BreadcrumbTrail>,
}

impl AuthenticationHandler {
    pub fn new(trail: Arc<BreadcrumbTrail>) -> Self {
        Self { trail }
    }
}

#[async_trait]
impl ErrorHandler for AuthenticationHandler {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn priority(&self) -> u32 {
        90
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if error.category == ErrorCategory::Authentication {
            return true;
        }
        if context.status_code() == Some(401) {
            return true;
        }
        let msg = error.message.to_lowercase();
        msg.contains("unauthorized") || msg.contains("authentication")
    }

    async fn handle(&self, error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        self.trail.add(BreadcrumbEntry::new(
            BreadcrumbCategory::StateChange,
            BreadcrumbLevel::Warning,
            format!("authentication failure, forcing re-sign-in: {}", error.error_id),
        ));

        // Exactly one redirect action; the caller must also drop any cached
        // auth state before following it.
        ErrorHandlerResult::terminal(resolve_user_message(
            error,
            "Your session has expired. Please sign in again.",
        ))
        .with_action(ErrorAction::redirect("Sign in again", "/sign-in"))
        .with_metadata("clear_auth_state", serde_json::json!(true))
    }
}
