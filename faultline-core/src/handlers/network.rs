//! Handler for connectivity failures

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult, ErrorSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct NetworkHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
    max_delay: Duration,
    escalation_multiplier: u32,
}

impl NetworkHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            escalation_multiplier: config.rate_limit_multiplier,
        }
    }
}

#[async_trait]
impl ErrorHandler for NetworkHandler {
    fn name(&self) -> &'static str {
        "network"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.source == ErrorSource::Network {
            return true;
        }
        let msg = error.message.to_lowercase();
        msg.contains("fetch") || msg.contains("network") || msg.contains("connection")
    }

    async fn handle(&self, error: &EnhancedError, context: &ErrorContext) -> ErrorHandlerResult {
        let offline = context.flag("offline");

        self.trail.add(
            BreadcrumbEntry::new(
                BreadcrumbCategory::Network,
                BreadcrumbLevel::Warning,
                format!("network failure: {}", error.error_id),
            )
            .with_data(serde_json::json!({ "offline": offline })),
        );

        // Connectivity problems are always worth retrying; give an offline
        // client a longer breather before the probe.
        let delay = if offline {
            std::cmp::min(
                self.base_delay.saturating_mul(self.escalation_multiplier),
                self.max_delay,
            )
        } else {
            self.base_delay
        };

        let mut result = ErrorHandlerResult::terminal(resolve_user_message(
            error,
            if offline {
                "You appear to be offline. Check your connection and try again."
            } else {
                "A network problem interrupted the request. Please try again."
            },
        ))
        .with_retry(delay)
        .with_action(ErrorAction::retry("Try again"));

        if offline {
            result = result.with_action(ErrorAction::fallback("Work offline"));
        }
        result
    }
}
