//! Stateful error router: rules, handler selection, dispatch
//!
//! The router holds a priority-ordered rule list and a named handler set. A
//! routing call enriches the error, records it with the registry, selects a
//! handler, invokes it under a timeout, and always returns a usable result:
//! any failure past enhancement degrades to the default handler's result for
//! the original error.

use crate::breadcrumb::{BreadcrumbEntry, BreadcrumbTrail};
use crate::classify;
use crate::config::PipelineConfig;
use crate::error::{FaultlineError, FaultlineResult};
use crate::handlers::{builtin_handlers, DefaultHandler, ErrorHandler};
use crate::registry::ErrorRegistry;
use crate::types::{CapturedError, EnhancedError, ErrorContext, ErrorHandlerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Predicate deciding whether a rule applies to an enhanced error
pub type RuleMatcher = Arc<dyn Fn(&EnhancedError, &ErrorContext) -> bool + Send + Sync>;

/// A priority-ordered predicate mapping error shape to a named handler
#[derive(Clone)]
pub struct RoutingRule {
    pub id: String,
    pub description: String,
    /// Higher evaluates first; insertion order breaks ties
    pub priority: u32,
    /// Name of the target handler
    pub handler: String,
    matcher: RuleMatcher,
}

impl RoutingRule {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: u32,
        handler: impl Into<String>,
        matcher: impl Fn(&EnhancedError, &ErrorContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority,
            handler: handler.into(),
            matcher: Arc::new(matcher),
        }
    }

    pub fn matches(&self, error: &EnhancedError, context: &ErrorContext) -> bool {
        (self.matcher)(error, context)
    }
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("priority", &self.priority)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

/// Per-call options for [`ErrorRouter::route_error`]
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub skip_breadcrumbs: bool,
    pub skip_registry: bool,
    /// Route to this registered handler directly, bypassing rules
    pub custom_handler: Option<String>,
}

/// Dry-run output of [`ErrorRouter::test_routing`]
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Ids of rules whose matcher fired, in evaluation order
    pub matching_rules: Vec<String>,
    pub selected_handler: String,
    pub would_use_default: bool,
}

/// Process-wide error dispatcher. Holds handlers and rules only; per-call
/// state never outlives the call.
pub struct ErrorRouter {
    config: PipelineConfig,
    registry: Arc<ErrorRegistry>,
    trail: Arc<BreadcrumbTrail>,
    handlers: RwLock<HashMap<String, Arc<dyn ErrorHandler>>>,
    rules: RwLock<Vec<RoutingRule>>,
    default_handler: Arc<dyn ErrorHandler>,
}

impl ErrorRouter {
    /// A router with no domain handlers registered; only the default handler
    /// is available until `register_handler` is called.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ErrorRegistry>,
        trail: Arc<BreadcrumbTrail>,
    ) -> Self {
        let default_handler: Arc<dyn ErrorHandler> =
            Arc::new(DefaultHandler::new(&config, trail.clone()));
        Self {
            config,
            registry,
            trail,
            handlers: RwLock::new(HashMap::new()),
            rules: RwLock::new(Vec::new()),
            default_handler,
        }
    }

    /// A router with the six built-in domain handlers registered
    pub fn with_builtin_handlers(
        config: PipelineConfig,
        registry: Arc<ErrorRegistry>,
        trail: Arc<BreadcrumbTrail>,
    ) -> Self {
        let router = Self::new(config, registry, trail.clone());
        for handler in builtin_handlers(&router.config, trail) {
            router.register_handler(handler);
        }
        router
    }

    /// Add or replace a handler by name
    pub fn register_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.handlers
            .write()
            .insert(handler.name().to_string(), handler);
    }

    pub fn unregister_handler(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    /// Add a rule; the list is re-sorted descending by priority on every add,
    /// stable for equal priorities.
    pub fn add_routing_rule(&self, rule: RoutingRule) {
        let mut rules = self.rules.write();
        rules.push(rule);
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn remove_routing_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        rules.len() != before
    }

    /// Classify, record, select, and dispatch. Always resolves to a result
    /// with `handled: true` and a non-empty user message; internal failures
    /// degrade to the default handler's result for the original error.
    pub async fn route_error(
        &self,
        raw: impl Into<CapturedError>,
        context: &ErrorContext,
        options: RouteOptions,
    ) -> ErrorHandlerResult {
        let started = Instant::now();
        let raw = raw.into();

        if !options.skip_breadcrumbs {
            self.trail
                .add(BreadcrumbEntry::error(format!("error received: {}", raw.message)));
        }

        let error = classify::enhance(raw, context);

        let report_id = if options.skip_registry {
            None
        } else {
            Some(
                self.registry
                    .report_error(CapturedError::from(error.clone()), context)
                    .id
                    .clone(),
            )
        };

        let handler = self.select_handler(&error, context, options.custom_handler.as_deref());
        debug!(
            error_id = %error.error_id,
            handler = handler.name(),
            "routing error"
        );

        let (mut result, handler_name) = match self.invoke(&handler, &error, context).await {
            Ok(result) => (result, handler.name()),
            Err(e) => {
                warn!(
                    error_id = %error.error_id,
                    handler = handler.name(),
                    error = %e,
                    "handler failed, degrading to default"
                );
                (
                    self.default_handler.handle(&error, context).await,
                    self.default_handler.name(),
                )
            }
        };

        result.metadata.insert(
            "handler".to_string(),
            serde_json::json!(handler_name),
        );
        result.metadata.insert(
            "elapsed_ms".to_string(),
            serde_json::json!(started.elapsed().as_millis() as u64),
        );
        if let Some(id) = report_id {
            result
                .metadata
                .insert("report_id".to_string(), serde_json::json!(id));
        }
        result
    }

    /// Dry-run selection: which rules match and which handler would run,
    /// without invoking anything or touching breadcrumbs and history.
    pub fn test_routing(
        &self,
        raw: impl Into<CapturedError>,
        context: &ErrorContext,
    ) -> RoutingDecision {
        let error = classify::enhance(raw.into(), context);
        let rules = self.rules.read();
        let handlers = self.handlers.read();

        let matching_rules: Vec<String> = rules
            .iter()
            .filter(|r| r.matches(&error, context))
            .map(|r| r.id.clone())
            .collect();

        let selected = Self::select_locked(&rules, &handlers, &error, context, None);
        match selected {
            Some(handler) => RoutingDecision {
                matching_rules,
                selected_handler: handler.name().to_string(),
                would_use_default: false,
            },
            None => RoutingDecision {
                matching_rules,
                selected_handler: self.default_handler.name().to_string(),
                would_use_default: true,
            },
        }
    }

    fn select_handler(
        &self,
        error: &EnhancedError,
        context: &ErrorContext,
        custom: Option<&str>,
    ) -> Arc<dyn ErrorHandler> {
        let rules = self.rules.read();
        let handlers = self.handlers.read();
        Self::select_locked(&rules, &handlers, error, context, custom)
            .unwrap_or_else(|| self.default_handler.clone())
    }

    /// Selection order: explicit custom handler, first matching rule whose
    /// target is also capable, then capability search over all handlers
    /// (priority descending, name ascending for determinism).
    fn select_locked(
        rules: &[RoutingRule],
        handlers: &HashMap<String, Arc<dyn ErrorHandler>>,
        error: &EnhancedError,
        context: &ErrorContext,
        custom: Option<&str>,
    ) -> Option<Arc<dyn ErrorHandler>> {
        if let Some(name) = custom {
            match handlers.get(name) {
                Some(handler) => return Some(handler.clone()),
                None => warn!(handler = name, "custom handler not registered, falling through"),
            }
        }

        for rule in rules {
            if rule.matches(error, context) {
                if let Some(handler) = handlers.get(&rule.handler) {
                    if handler.can_handle(error, context) {
                        return Some(handler.clone());
                    }
                }
            }
        }

        let mut capable: Vec<&Arc<dyn ErrorHandler>> = handlers
            .values()
            .filter(|h| h.can_handle(error, context))
            .collect();
        capable.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        capable.first().map(|h| Arc::clone(h))
    }

    /// Run the handler on its own task so a panic is contained, bounded by
    /// the configured invocation budget.
    async fn invoke(
        &self,
        handler: &Arc<dyn ErrorHandler>,
        error: &EnhancedError,
        context: &ErrorContext,
    ) -> FaultlineResult<ErrorHandlerResult> {
        let name = handler.name();
        let task_handler = Arc::clone(handler);
        let task_error = error.clone();
        let task_context = context.clone();
        let mut task =
            tokio::spawn(async move { task_handler.handle(&task_error, &task_context).await });

        match tokio::time::timeout(self.config.handler_timeout, &mut task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(FaultlineError::HandlerPanicked {
                handler: name.to_string(),
            }),
            Err(_) => {
                task.abort();
                Err(FaultlineError::HandlerTimeout {
                    handler: name.to_string(),
                    timeout: self.config.handler_timeout,
                })
            }
        }
    }
}
