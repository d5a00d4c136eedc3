//! Handler for rendering-layer failures

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult, ErrorSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct UiComponentHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
}

impl UiComponentHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
        }
    }
}

#[async_trait]
impl ErrorHandler for UiComponentHandler {
    fn name(&self) -> &'static str {
        "ui-component"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.source == ErrorSource::UiComponent {
            return true;
        }
        if context.component_stack.is_some() {
            return true;
        }
        let msg = error.message.to_lowercase();
        msg.contains("render") || msg.contains("component") || msg.contains("hydration")
    }

    async fn handle(&self, error: &EnhancedError, context: &ErrorContext) -> ErrorHandlerResult {
        self.trail.add(
            BreadcrumbEntry::new(
                BreadcrumbCategory::StateChange,
                BreadcrumbLevel::Warning,
                format!("ui component failure: {}", error.error_id),
            )
            .with_data(serde_json::json!({
                "has_component_stack": context.component_stack.is_some(),
            })),
        );

        ErrorHandlerResult::terminal(resolve_user_message(
            error,
            "Part of the page failed to display. Reloading it usually helps.",
        ))
        .with_retry(self.base_delay)
        .with_action(ErrorAction::retry("Reload component"))
        .with_action(ErrorAction::fallback("Refresh the page"))
    }
}
