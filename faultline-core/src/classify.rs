//! Shared enrichment logic: classification, fingerprinting, tag derivation
//!
//! Both the registry and the router lean on this module so that a routing
//! decision and the persisted report always agree on classification.

use crate::types::{
    CapturedError, EnhancedError, ErrorCategory, ErrorContext, ErrorSeverity, ErrorSource,
    RuntimeMode,
};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of leading stack lines that participate in the fingerprint
const FINGERPRINT_STACK_LINES: usize = 3;

/// Hex characters kept from the fingerprint digest
const FINGERPRINT_LEN: usize = 16;

/// Generate a fresh error id: `err_<millis>_<suffix>`
pub fn generate_error_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("err_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Infer the category of a failure.
///
/// Precedence: explicit source mapping, then message keywords, then stack
/// frame sniffing, then [`ErrorCategory::Unknown`].
pub fn infer_category(
    message: &str,
    stack: Option<&str>,
    source: ErrorSource,
) -> ErrorCategory {
    match source {
        ErrorSource::Network => return ErrorCategory::Network,
        ErrorSource::Database => return ErrorCategory::DataIntegrity,
        ErrorSource::AiService => return ErrorCategory::ExternalService,
        _ => {}
    }

    let msg = message.to_lowercase();
    if msg.contains("fetch") || msg.contains("network") || msg.contains("connection") {
        return ErrorCategory::Network;
    }
    if msg.contains("unauthorized") || msg.contains("authentication") {
        return ErrorCategory::Authentication;
    }
    if msg.contains("forbidden") || msg.contains("permission") {
        return ErrorCategory::Authorization;
    }
    if msg.contains("validation") || msg.contains("invalid") {
        return ErrorCategory::Validation;
    }
    if msg.contains("timeout") || msg.contains("slow") {
        return ErrorCategory::Performance;
    }
    if msg.contains("api") || msg.contains("service") {
        return ErrorCategory::ExternalService;
    }

    if let Some(stack) = stack {
        let stack = stack.to_lowercase();
        if stack.contains("prisma") || stack.contains("sqlx") || stack.contains("postgres") {
            return ErrorCategory::DataIntegrity;
        }
        if stack.contains("clerk") || stack.contains("oauth") || stack.contains("auth") {
            return ErrorCategory::Authentication;
        }
    }

    ErrorCategory::Unknown
}

/// Infer severity. Database and system sources force High regardless of
/// category; everything else is assessed by category.
pub fn infer_severity(category: ErrorCategory, source: ErrorSource) -> ErrorSeverity {
    if matches!(source, ErrorSource::Database | ErrorSource::System) {
        return ErrorSeverity::High;
    }
    match category {
        ErrorCategory::DataIntegrity | ErrorCategory::System => ErrorSeverity::Critical,
        ErrorCategory::Authentication | ErrorCategory::Authorization => ErrorSeverity::High,
        ErrorCategory::Network | ErrorCategory::ExternalService | ErrorCategory::Performance => {
            ErrorSeverity::Medium
        }
        ErrorCategory::Validation | ErrorCategory::UserInput => ErrorSeverity::Low,
        ErrorCategory::Unknown => ErrorSeverity::Medium,
    }
}

/// Infer whether a failure is worth retrying
pub fn infer_retryable(category: ErrorCategory, source: ErrorSource) -> bool {
    match category {
        ErrorCategory::Network | ErrorCategory::Performance | ErrorCategory::ExternalService => {
            true
        }
        ErrorCategory::Authentication
        | ErrorCategory::Authorization
        | ErrorCategory::DataIntegrity
        | ErrorCategory::Validation
        | ErrorCategory::UserInput => false,
        // UI errors default non-retryable, everything else optimistic
        ErrorCategory::System | ErrorCategory::Unknown => source != ErrorSource::UiComponent,
    }
}

/// Enhance a raw failure: classify, stamp, and backfill from context.
///
/// Total and idempotent: pre-set fields are never changed, missing fields are
/// always filled, so every field of the result is concrete.
pub fn enhance(raw: CapturedError, context: &ErrorContext) -> EnhancedError {
    let category = raw
        .category
        .unwrap_or_else(|| infer_category(&raw.message, raw.stack.as_deref(), context.source));
    let severity = raw
        .severity
        .unwrap_or_else(|| infer_severity(category, context.source));
    let retryable = raw
        .retryable
        .unwrap_or_else(|| infer_retryable(category, context.source));

    EnhancedError {
        error_id: raw.error_id.unwrap_or_else(generate_error_id),
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        message: raw.message,
        stack: raw.stack,
        category,
        severity,
        retryable,
        user_message: raw.user_message,
        feature: raw.feature.or_else(|| context.feature.clone()),
        user_id: raw.user_id.or_else(|| context.user_id.clone()),
        organization_id: raw.organization_id.or_else(|| context.organization_id.clone()),
    }
}

/// Deterministic fingerprint over the error-identifying fields: message,
/// category, source, feature, and the first three stack lines.
pub fn fingerprint(error: &EnhancedError, context: &ErrorContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(error.message.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(error.category.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(context.source.to_string().as_bytes());
    hasher.update(b"\x1f");
    if let Some(feature) = &error.feature {
        hasher.update(feature.as_bytes());
    }
    hasher.update(b"\x1f");
    if let Some(stack) = &error.stack {
        for line in stack.lines().take(FINGERPRINT_STACK_LINES) {
            hasher.update(line.trim().as_bytes());
            hasher.update(b"\n");
        }
    }
    let digest = hasher.finalize();
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Derive `key:value` tags for a report
pub fn derive_tags(
    error: &EnhancedError,
    context: &ErrorContext,
    mode: RuntimeMode,
) -> Vec<String> {
    let mut tags = vec![
        format!("category:{}", error.category),
        format!("severity:{}", error.severity),
        format!("source:{}", context.source),
        format!("retryable:{}", error.retryable),
        format!("env:{}", mode),
    ];
    if let Some(feature) = &error.feature {
        tags.push(format!("feature:{}", feature));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(source: ErrorSource) -> ErrorContext {
        ErrorContext::new(source)
    }

    #[test]
    fn source_mapping_beats_message_keywords() {
        // "network" in the message would sniff to Network, but the database
        // source mapping takes precedence.
        let category = infer_category("network hiccup while saving", None, ErrorSource::Database);
        assert_eq!(category, ErrorCategory::DataIntegrity);
    }

    #[test]
    fn message_keywords_beat_stack_sniffing() {
        let category = infer_category(
            "validation failed for field",
            Some("at prisma.client.query"),
            ErrorSource::Api,
        );
        assert_eq!(category, ErrorCategory::Validation);
    }

    #[test]
    fn stack_sniffing_is_the_last_resort() {
        let category = infer_category(
            "something odd happened",
            Some("at prisma.client.query\nat handler"),
            ErrorSource::Api,
        );
        assert_eq!(category, ErrorCategory::DataIntegrity);

        let category = infer_category("something odd happened", None, ErrorSource::Api);
        assert_eq!(category, ErrorCategory::Unknown);
    }

    #[test]
    fn database_and_system_sources_force_high_severity() {
        assert_eq!(
            infer_severity(ErrorCategory::Validation, ErrorSource::Database),
            ErrorSeverity::High
        );
        assert_eq!(
            infer_severity(ErrorCategory::Network, ErrorSource::System),
            ErrorSeverity::High
        );
        // Without the forcing source, validation stays low.
        assert_eq!(
            infer_severity(ErrorCategory::Validation, ErrorSource::Api),
            ErrorSeverity::Low
        );
    }

    #[test]
    fn ui_unknown_errors_are_not_retryable() {
        assert!(!infer_retryable(ErrorCategory::Unknown, ErrorSource::UiComponent));
        assert!(infer_retryable(ErrorCategory::Unknown, ErrorSource::Api));
    }

    #[test]
    fn enhancement_is_idempotent() {
        let context = ctx(ErrorSource::AiService).with_feature("document-analysis");
        let first = enhance(CapturedError::new("model call failed"), &context);
        let second = enhance(first.clone().into(), &context);

        assert_eq!(first.error_id, second.error_id);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(first.category, second.category);
        assert_eq!(first.severity, second.severity);
        assert_eq!(first.retryable, second.retryable);
        assert_eq!(first.feature, second.feature);
    }

    #[test]
    fn enhancement_backfills_context_attribution() {
        let context = ctx(ErrorSource::Api)
            .with_feature("billing")
            .with_user("user_1")
            .with_organization("org_1");
        let error = enhance(CapturedError::new("boom"), &context);
        assert_eq!(error.feature.as_deref(), Some("billing"));
        assert_eq!(error.user_id.as_deref(), Some("user_1"));
        assert_eq!(error.organization_id.as_deref(), Some("org_1"));
    }

    #[test]
    fn error_id_format() {
        let id = generate_error_id();
        assert!(id.starts_with("err_"));
        assert_eq!(id.split('_').count(), 3);
    }

    #[test]
    fn fingerprint_ignores_stack_lines_beyond_the_third() {
        let context = ctx(ErrorSource::Api);
        let base = enhance(
            CapturedError::new("boom").with_stack("a\nb\nc\nd"),
            &context,
        );
        let mut other = base.clone();
        other.stack = Some("a\nb\nc\nDIFFERENT".to_string());
        assert_eq!(fingerprint(&base, &context), fingerprint(&other, &context));

        let mut changed = base.clone();
        changed.stack = Some("a\nb\nCHANGED\nd".to_string());
        assert_ne!(fingerprint(&base, &context), fingerprint(&changed, &context));
    }

    #[test]
    fn fingerprint_changes_with_each_identifying_field() {
        let context = ctx(ErrorSource::Api);
        let base = enhance(CapturedError::new("boom").with_stack("a\nb\nc"), &context);
        let fp = fingerprint(&base, &context);

        let mut changed = base.clone();
        changed.message = "bang".to_string();
        assert_ne!(fingerprint(&changed, &context), fp);

        let mut changed = base.clone();
        changed.category = ErrorCategory::Network;
        assert_ne!(fingerprint(&changed, &context), fp);

        let mut changed = base.clone();
        changed.feature = Some("billing".to_string());
        assert_ne!(fingerprint(&changed, &context), fp);

        assert_ne!(fingerprint(&base, &ctx(ErrorSource::Network)), fp);
    }

    #[test]
    fn tags_cover_classification_axes() {
        let context = ctx(ErrorSource::Network).with_feature("upload");
        let error = enhance(CapturedError::new("connection reset"), &context);
        let tags = derive_tags(&error, &context, RuntimeMode::Development);
        assert!(tags.contains(&"category:network".to_string()));
        assert!(tags.contains(&"severity:medium".to_string()));
        assert!(tags.contains(&"source:network".to_string()));
        assert!(tags.contains(&"retryable:true".to_string()));
        assert!(tags.contains(&"env:development".to_string()));
        assert!(tags.contains(&"feature:upload".to_string()));
    }
}
