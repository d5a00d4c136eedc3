use async_trait::async_trait;
use faultline_core::{
    ActionKind, BreadcrumbTrail, EnhancedError, ErrorContext, ErrorHandler, ErrorHandlerResult,
    ErrorQuery, ErrorRegistry, ErrorRouter, ErrorSource, PipelineConfig, RouteOptions,
    RoutingRule, RuntimeMode,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> PipelineConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let mut config = PipelineConfig::default();
    config.runtime_mode = RuntimeMode::Test;
    config
}

fn new_router(config: PipelineConfig) -> (ErrorRouter, Arc<ErrorRegistry>, Arc<BreadcrumbTrail>) {
    let trail = Arc::new(BreadcrumbTrail::new(config.breadcrumb_limit));
    let registry = ErrorRegistry::new(config.clone(), trail.clone(), vec![]);
    let router = ErrorRouter::with_builtin_handlers(config, registry.clone(), trail.clone());
    (router, registry, trail)
}

/// Handler that always claims capability and answers with its own name
struct NamedHandler {
    name: &'static str,
    priority: u32,
}

#[async_trait]
impl ErrorHandler for NamedHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> bool {
        true
    }

    async fn handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        ErrorHandlerResult::terminal(format!("handled by {}", self.name))
    }
}

/// Handler that never finishes within any reasonable budget
struct StallingHandler;

#[async_trait]
impl ErrorHandler for StallingHandler {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn can_handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> bool {
        true
    }

    async fn handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        ErrorHandlerResult::terminal("never reached")
    }
}

/// Handler that crashes instead of answering
struct CrashingHandler;

#[async_trait]
impl ErrorHandler for CrashingHandler {
    fn name(&self) -> &'static str {
        "crashing"
    }

    fn priority(&self) -> u32 {
        150
    }

    fn can_handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> bool {
        true
    }

    async fn handle(&self, _error: &EnhancedError, _context: &ErrorContext) -> ErrorHandlerResult {
        panic!("handler bug")
    }
}

#[tokio::test]
async fn router_always_resolves_even_with_no_handlers() {
    let config = test_config();
    let trail = Arc::new(BreadcrumbTrail::new(config.breadcrumb_limit));
    let registry = ErrorRegistry::new(config.clone(), trail.clone(), vec![]);
    let router = ErrorRouter::new(config, registry, trail);

    let context = ErrorContext::new(ErrorSource::System);
    let result = router
        .route_error("completely inscrutable failure", &context, RouteOptions::default())
        .await;

    assert!(result.handled);
    assert!(!result.user_message.is_empty());
    assert_eq!(result.metadata["handler"], serde_json::json!("default"));
}

#[tokio::test]
async fn routing_records_a_report_and_attaches_its_id() {
    let (router, registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::Api);

    let result = router
        .route_error("validation failed", &context, RouteOptions::default())
        .await;

    let history = registry.get_errors(&ErrorQuery::new());
    assert_eq!(history.len(), 1);
    assert_eq!(
        result.metadata["report_id"],
        serde_json::json!(history[0].id)
    );
    assert!(result.metadata.contains_key("elapsed_ms"));
}

#[tokio::test]
async fn skip_registry_leaves_history_untouched() {
    let (router, registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::Api);

    let options = RouteOptions {
        skip_registry: true,
        ..Default::default()
    };
    let result = router.route_error("boom", &context, options).await;

    assert!(registry.get_errors(&ErrorQuery::new()).is_empty());
    assert!(!result.metadata.contains_key("report_id"));
}

#[tokio::test]
async fn breadcrumb_added_unless_skipped() {
    let (router, _registry, trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::System);

    router
        .route_error("observable failure", &context, RouteOptions::default())
        .await;
    assert!(trail
        .snapshot()
        .iter()
        .any(|b| b.message.contains("error received: observable failure")));

    let before = trail.len();
    router
        .route_error(
            "quiet failure",
            &context,
            RouteOptions {
                skip_breadcrumbs: true,
                skip_registry: true,
                ..Default::default()
            },
        )
        .await;
    // Only the handler's own breadcrumb may have been added.
    assert!(!trail
        .snapshot()
        .iter()
        .any(|b| b.message.contains("error received: quiet failure")));
    assert!(trail.len() >= before);
}

#[tokio::test]
async fn higher_priority_rule_wins_and_dry_run_agrees() {
    let (router, _registry, _trail) = new_router(test_config());
    router.register_handler(Arc::new(NamedHandler { name: "alpha", priority: 1 }));
    router.register_handler(Arc::new(NamedHandler { name: "beta", priority: 1 }));

    router.add_routing_rule(RoutingRule::new(
        "rule-low",
        "everything to alpha",
        10,
        "alpha",
        |_, _| true,
    ));
    router.add_routing_rule(RoutingRule::new(
        "rule-high",
        "everything to beta",
        20,
        "beta",
        |_, _| true,
    ));

    let context = ErrorContext::new(ErrorSource::System);
    let decision = router.test_routing("anything", &context);
    assert_eq!(decision.matching_rules, vec!["rule-high", "rule-low"]);
    assert_eq!(decision.selected_handler, "beta");
    assert!(!decision.would_use_default);

    let result = router
        .route_error("anything", &context, RouteOptions::default())
        .await;
    assert_eq!(result.metadata["handler"], serde_json::json!("beta"));
}

#[tokio::test]
async fn removed_rule_no_longer_matches() {
    let (router, _registry, _trail) = new_router(test_config());
    router.register_handler(Arc::new(NamedHandler { name: "alpha", priority: 1 }));
    router.add_routing_rule(RoutingRule::new(
        "rule-1",
        "everything to alpha",
        10,
        "alpha",
        |_, _| true,
    ));

    assert!(router.remove_routing_rule("rule-1"));
    assert!(!router.remove_routing_rule("rule-1"));

    let context = ErrorContext::new(ErrorSource::System);
    let decision = router.test_routing("anything", &context);
    assert!(decision.matching_rules.is_empty());
}

#[tokio::test]
async fn custom_handler_option_bypasses_rules() {
    let (router, _registry, _trail) = new_router(test_config());
    router.register_handler(Arc::new(NamedHandler { name: "special", priority: 1 }));

    let context = ErrorContext::new(ErrorSource::Api);
    let options = RouteOptions {
        custom_handler: Some("special".to_string()),
        ..Default::default()
    };
    let result = router.route_error("anything", &context, options).await;
    assert_eq!(result.metadata["handler"], serde_json::json!("special"));
    assert_eq!(result.user_message, "handled by special");
}

#[tokio::test]
async fn quota_exceeded_is_never_retried() {
    let (router, _registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::AiService);

    let result = router
        .route_error(
            "quota exceeded for gpt-4o",
            &context,
            RouteOptions::default(),
        )
        .await;
    assert_eq!(result.metadata["handler"], serde_json::json!("ai-service"));
    assert!(!result.should_retry);

    // The structured flag works without any message heuristics.
    let flagged = ErrorContext::new(ErrorSource::AiService)
        .with_metadata("quota_exceeded", serde_json::json!(true));
    let result = router
        .route_error("provider refused the request", &flagged, RouteOptions::default())
        .await;
    assert!(!result.should_retry);
}

#[tokio::test]
async fn rate_limits_back_off_harder() {
    let (router, _registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::AiService);

    let result = router
        .route_error("rate limit reached, slow down", &context, RouteOptions::default())
        .await;
    assert!(result.should_retry);
    // Base delay 1s scaled by the rate-limit multiplier of 5.
    assert_eq!(result.retry_delay, Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn authentication_failure_yields_exactly_one_redirect() {
    let (router, _registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::Api)
        .with_metadata("status", serde_json::json!(401));

    let result = router
        .route_error("Unauthorized: token expired", &context, RouteOptions::default())
        .await;

    assert!(!result.should_retry);
    let redirects: Vec<_> = result
        .actions
        .iter()
        .filter(|a| a.kind == ActionKind::Redirect)
        .collect();
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].target.as_deref(), Some("/sign-in"));
    assert_eq!(result.actions.len(), 1);
    assert_eq!(result.metadata["handler"], serde_json::json!("authentication"));
}

#[tokio::test]
async fn offline_network_failure_offers_offline_fallback() {
    let (router, _registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::Network)
        .with_metadata("offline", serde_json::json!(true));

    let result = router
        .route_error("fetch failed", &context, RouteOptions::default())
        .await;
    assert!(result.should_retry);
    assert!(result
        .actions
        .iter()
        .any(|a| a.kind == ActionKind::Fallback && a.label.contains("offline")));
    // Default escalation multiplier of 5 over the 1s base delay.
    assert_eq!(result.retry_delay, Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn offline_backoff_scales_with_the_configured_multiplier() {
    let mut config = test_config();
    config.rate_limit_multiplier = 3;
    let (router, _registry, _trail) = new_router(config);
    let context = ErrorContext::new(ErrorSource::Network)
        .with_metadata("offline", serde_json::json!(true));

    let result = router
        .route_error("fetch failed", &context, RouteOptions::default())
        .await;
    assert_eq!(result.retry_delay, Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn constraint_violations_are_not_retried() {
    let (router, _registry, _trail) = new_router(test_config());
    let context = ErrorContext::new(ErrorSource::Database);

    let result = router
        .route_error(
            "unique constraint violated on documents.slug",
            &context,
            RouteOptions::default(),
        )
        .await;
    assert_eq!(result.metadata["handler"], serde_json::json!("database"));
    assert!(!result.should_retry);
    assert!(result.actions.is_empty());

    let result = router
        .route_error("connection to database lost", &context, RouteOptions::default())
        .await;
    assert!(result.should_retry);
}

#[tokio::test]
async fn stalled_handler_degrades_to_the_default_result() {
    let mut config = test_config();
    config.handler_timeout = Duration::from_millis(50);
    let (router, _registry, _trail) = new_router(config);
    router.register_handler(Arc::new(StallingHandler));

    let context = ErrorContext::new(ErrorSource::System);
    let options = RouteOptions {
        custom_handler: Some("stalling".to_string()),
        ..Default::default()
    };
    let result = router.route_error("wedged", &context, options).await;

    assert!(result.handled);
    assert!(!result.user_message.is_empty());
    assert_eq!(result.metadata["handler"], serde_json::json!("default"));
}

#[tokio::test]
async fn panicking_handler_degrades_to_the_default_result() {
    let (router, _registry, _trail) = new_router(test_config());
    router.register_handler(Arc::new(CrashingHandler));

    let context = ErrorContext::new(ErrorSource::System);
    let result = router
        .route_error("wedged", &context, RouteOptions::default())
        .await;

    assert!(result.handled);
    assert!(!result.user_message.is_empty());
    assert_eq!(result.metadata["handler"], serde_json::json!("default"));
}

#[tokio::test]
async fn source_inference_wins_inside_routing_too() {
    let (router, registry, _trail) = new_router(test_config());
    // Message says network, source says database: classification must pick
    // the source mapping and the database handler must win selection.
    let context = ErrorContext::new(ErrorSource::Database);
    let result = router
        .route_error("network wobble while writing", &context, RouteOptions::default())
        .await;

    assert_eq!(result.metadata["handler"], serde_json::json!("database"));
    let history = registry.get_errors(&ErrorQuery::new());
    assert_eq!(
        history[0].error.category,
        faultline_core::ErrorCategory::DataIntegrity
    );
    assert_eq!(history[0].error.severity, faultline_core::ErrorSeverity::High);
}

#[tokio::test]
async fn dry_run_and_live_routing_agree_on_builtin_selection() {
    let (router, _registry, _trail) = new_router(test_config());
    let cases = [
        ("rate limit reached", ErrorSource::AiService),
        ("fetch failed", ErrorSource::Network),
        ("unauthorized access", ErrorSource::Api),
        ("render crashed", ErrorSource::UiComponent),
    ];

    for (message, source) in cases {
        let context = ErrorContext::new(source);
        let decision = router.test_routing(message, &context);
        let result = router
            .route_error(message, &context, RouteOptions::default())
            .await;
        assert_eq!(
            result.metadata["handler"],
            serde_json::json!(decision.selected_handler),
            "selection diverged for {message:?}"
        );
    }
}
