//! Handler for persistence-layer failures

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel, BreadcrumbTrail};
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult, ErrorSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const ORM_FRAMES: &[&str] = &["prisma", "sqlx", "postgres"];
const CONSTRAINT_MARKERS: &[&str] = &["constraint", "unique", "duplicate", "foreign key"];

pub struct DatabaseHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
}

impl DatabaseHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
        }
    }

    fn constraint_violation(message: &str) -> bool {
        CONSTRAINT_MARKERS.iter().any(|m| message.contains(m))
    }

    fn connection_related(message: &str) -> bool {
        message.contains("connection") || message.contains("connect") || message.contains("timeout")
    }
}

#[async_trait]
impl ErrorHandler for DatabaseHandler {
    fn name(&self) -> &'static str {
        "database"
    }

    fn priority(&self) -> u32 {
        70
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.source == ErrorSource::Database {
            return true;
        }
        if let Some(stack) = &error.stack {
            let stack = stack.to_lowercase();
            if ORM_FRAMES.iter().any(|f| stack.contains(f)) {
                return true;
            }
        }
        let msg = error.message.to_lowercase();
        msg.contains("database") || msg.contains("connection")
    }

    async fn handle(&self, error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        let msg = error.message.to_lowercase();
        let constraint = Self::constraint_violation(&msg);
        // Constraint violations never resolve by retrying; transient
        // connection loss usually does.
        let retryable = Self::connection_related(&msg) && !constraint;

        self.trail.add(
            BreadcrumbEntry::new(
                BreadcrumbCategory::Error,
                BreadcrumbLevel::Error,
                format!("database failure: {}", error.error_id),
            )
            .with_data(serde_json::json!({ "constraint_violation": constraint })),
        );

        if retryable {
            return ErrorHandlerResult::terminal(resolve_user_message(
                error,
                "We had trouble reaching the database. Please try again.",
            ))
            .with_retry(self.base_delay)
            .with_action(ErrorAction::retry("Retry the operation"));
        }

        ErrorHandlerResult::terminal(resolve_user_message(
            error,
            "We could not save your changes. If the problem persists, contact support.",
        ))
    }
}
