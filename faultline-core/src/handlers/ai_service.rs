//! Handler for AI-provider failures (rate limits, quotas, provider outages)

use super::{resolve_user_message, ErrorHandler};
use crate::breadcrumb::{BreadcrumbCategory, BreadcrumbEntry, BreadcrumbLevel};
use crate::breadcrumb::BreadcrumbTrail;
use crate::config::PipelineConfig;
use crate::types::{EnhancedError, ErrorAction, ErrorContext, ErrorHandlerResult, ErrorSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_MARKERS: &[&str] = &["openai", "anthropic", "claude", "gpt", "rate limit", "quota"];

pub struct AiServiceHandler {
    trail: Arc<BreadcrumbTrail>,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_multiplier: u32,
}

impl AiServiceHandler {
    pub fn new(config: &PipelineConfig, trail: Arc<BreadcrumbTrail>) -> Self {
        Self {
            trail,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            rate_limit_multiplier: config.rate_limit_multiplier,
        }
    }

    /// Quota exhaustion: the structured flag is authoritative, the message
    /// substrings are kept as a fallback for callers that do not set it.
    fn quota_exceeded(error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.flag("quota_exceeded") {
            return true;
        }
        let msg = error.message.to_lowercase();
        msg.contains("quota") || msg.contains("credit balance")
    }

    fn rate_limited(error: &EnhancedError, context: &ErrorContext) -> bool {
        context.flag("rate_limited")
            || error.message.to_lowercase().contains("rate limit")
            || context.status_code() == Some(429)
    }
}

#[async_trait]
impl ErrorHandler for AiServiceHandler {
    fn name(&self) -> &'static str {
        "ai-service"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn can_handle(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        if context.source == ErrorSource::AiService {
            return true;
        }
        let msg = error.message.to_lowercase();
        PROVIDER_MARKERS.iter().any(|m| msg.contains(m))
    }

    async fn handle(&self, error: &EnhancedError, context: &ErrorContext) -> ErrorHandlerResult {
        let quota = Self::quota_exceeded(error, context);
        let rate_limited = Self::rate_limited(error, context);
        let fallback_allowed = !context.flag("fallback_disabled");

        self.trail.add(
            BreadcrumbEntry::new(
                BreadcrumbCategory::Error,
                BreadcrumbLevel::Warning,
                format!("ai-service failure: {}", error.error_id),
            )
            .with_data(serde_json::json!({
                "quota_exceeded": quota,
                "rate_limited": rate_limited,
            })),
        );

        if quota {
            let mut result = ErrorHandlerResult::terminal(resolve_user_message(
                error,
                "Your AI usage limit has been reached. Upgrade your plan or wait for the limit to reset.",
            ));
            if fallback_allowed {
                result = result.with_action(ErrorAction::fallback("Switch to another AI provider"));
            }
            return result.with_action(ErrorAction::notify("Notify your workspace admin"));
        }

        let delay = if rate_limited {
            // Rate limits back off harder: base delay scaled, capped at max.
            std::cmp::min(
                self.base_delay.saturating_mul(self.rate_limit_multiplier),
                self.max_delay,
            )
        } else {
            self.base_delay
        };

        let mut result = ErrorHandlerResult::terminal(resolve_user_message(
            error,
            "The AI service had a temporary problem. Please try again.",
        ))
        .with_retry(delay)
        .with_action(ErrorAction::retry("Try the request again"));
        if fallback_allowed {
            result = result.with_action(ErrorAction::fallback("Switch to another AI provider"));
        }
        result
    }
}
