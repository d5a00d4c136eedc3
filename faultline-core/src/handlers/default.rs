//! Last-resort handler; matches everything, mirrors the error's own
//! retryability

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct DefaultHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
}

impl DefaultHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
        }
    }
}

#[async_trait]
impl ErrorHandler for DefaultHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn can_handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> bool {
        true
    }

    async fn handle(&self, error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        self.trail.add(BreadcrumbEntry::new(
            BreadcrumbCategory::Error,
            BreadcrumbLevel::Warning,
            format!("default handler invoked: {}", error.error_id),
        ));

        let mut result = ErrorHandlerResult::terminal(resolve_user_message(
            error,
            if error.retryable {
                "Something went wrong. Please try again."
            } else {
                "Something went wrong. If the problem persists, contact support."
            },
        ));
        if error.retryable {
            result = result
                .with_retry(self.base_delay)
                .with_action(ErrorAction::retry("Try again"));
        }
        result
    }
}
