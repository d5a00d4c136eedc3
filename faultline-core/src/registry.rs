//! Central error registry: history, fingerprinting, correlation, analytics
//!
//! The registry is the single authority for error retention. It accepts raw
//! failures plus context, enhances and fingerprints them, keeps a bounded
//! FIFO history, maintains correlation pattern buckets, and queues reports
//! for best-effort export. Every public method is infallible from the
//! caller's perspective; reporting is advisory, never critical path.

use crate::breadcrumb::{BreadcrumbEntry, BreadcrumbTrail};
use crate::classify;
use crate::config::PipelineConfig;
use crate::export::ReportSink;
use crate::types::{
    CapturedError, EnhancedError, EnvironmentInfo, ErrorCategory, ErrorContext, ErrorSeverity,
    ErrorSource,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cap on reports re-queued at the front after a failed flush
const RETRY_REQUEUE_LIMIT: usize = 50;

/// Hard cap on the export queue under sustained sink failure
const QUEUE_HARD_CAP: usize = 100;

/// The persisted record of one reported failure. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Same value as `error.error_id`
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub error: EnhancedError,
    pub context: ErrorContext,
    /// Deterministic digest for deduplication and grouping
    pub fingerprint: String,
    pub tags: Vec<String>,
    /// Snapshot of the breadcrumb trail at report time
    pub breadcrumbs: Vec<BreadcrumbEntry>,
    pub environment: EnvironmentInfo,
}

/// Filter criteria for [`ErrorRegistry::get_errors`]
#[derive(Debug, Clone, Default)]
pub struct ErrorQuery {
    pub severities: Option<Vec<ErrorSeverity>>,
    pub categories: Option<Vec<ErrorCategory>>,
    pub sources: Option<Vec<ErrorSource>>,
    pub feature: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ErrorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn severities(mut self, severities: Vec<ErrorSeverity>) -> Self {
        self.severities = Some(severities);
        self
    }

    pub fn categories(mut self, categories: Vec<ErrorCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn sources(mut self, sources: Vec<ErrorSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, report: &ErrorReport) -> bool {
        if let Some(severities) = &self.severities {
            if !severities.contains(&report.error.severity) {
                return false;
            }
        }
        if let Some(categories) = &self.categories {
            if !categories.contains(&report.error.category) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&report.context.source) {
                return false;
            }
        }
        if let Some(feature) = &self.feature {
            if report.error.feature.as_deref() != Some(feature.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if report.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if report.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Rolling counts measured from "now", independent of any query range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendCounts {
    pub last_24h: usize,
    pub last_7d: usize,
    pub last_30d: usize,
}

/// One fingerprint group in the top-errors ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopError {
    pub fingerprint: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
    /// Message of the most recent member, for display
    pub message: String,
}

/// A correlation bucket summarized for analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    pub key: String,
    pub count: usize,
    /// Maximum severity among the bucket's members
    pub max_severity: ErrorSeverity,
}

/// Aggregate view over the (optionally range-filtered) history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalytics {
    pub total_errors: usize,
    pub errors_by_category: HashMap<ErrorCategory, usize>,
    pub errors_by_severity: HashMap<ErrorSeverity, usize>,
    pub errors_by_source: HashMap<ErrorSource, usize>,
    pub errors_by_feature: HashMap<String, usize>,
    /// Errors per hour over the range (denominator floored at one hour)
    pub error_rate_per_hour: f64,
    pub trends: TrendCounts,
    /// Top 10 fingerprints by frequency, ties broken by most recent
    pub top_errors: Vec<TopError>,
    /// Active correlation patterns with at least two members
    pub patterns: Vec<PatternSummary>,
    /// Reports dropped by the history bound since construction
    pub evicted_reports: u64,
}

struct RegistryState {
    history: VecDeque<Arc<ErrorReport>>,
    patterns: HashMap<String, Vec<Arc<ErrorReport>>>,
    queue: Vec<Arc<ErrorReport>>,
    evicted: u64,
}

/// Process-wide error store. One instance per process by convention,
/// constructed by the host's startup routine and passed by handle.
pub struct ErrorRegistry {
    config: PipelineConfig,
    trail: Arc<BreadcrumbTrail>,
    sinks: Vec<Arc<dyn ReportSink>>,
    state: Mutex<RegistryState>,
}

impl ErrorRegistry {
    pub fn new(
        config: PipelineConfig,
        trail: Arc<BreadcrumbTrail>,
        sinks: Vec<Arc<dyn ReportSink>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            trail,
            sinks,
            state: Mutex::new(RegistryState {
                history: VecDeque::new(),
                patterns: HashMap::new(),
                queue: Vec::new(),
                evicted: 0,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Enhance, fingerprint, and persist a failure. Never fails; internal
    /// problems are logged and swallowed because the caller is already
    /// handling an error of its own.
    pub fn report_error(
        self: &Arc<Self>,
        raw: impl Into<CapturedError>,
        context: &ErrorContext,
    ) -> Arc<ErrorReport> {
        let error = classify::enhance(raw.into(), context);
        let fingerprint = classify::fingerprint(&error, context);
        let tags = classify::derive_tags(&error, context, self.config.runtime_mode);

        let report = Arc::new(ErrorReport {
            id: error.error_id.clone(),
            timestamp: error.timestamp,
            environment: EnvironmentInfo {
                mode: self.config.runtime_mode,
                user_agent: context.user_agent.clone(),
                url: context.url.clone(),
                captured_at: Utc::now(),
            },
            fingerprint,
            tags,
            breadcrumbs: self.trail.snapshot(),
            context: context.clone(),
            error,
        });

        self.log_report(&report);

        let flush_now = {
            let mut state = self.state.lock();
            state.history.push_back(report.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
                state.evicted += 1;
            }

            Self::update_correlations(
                &mut state,
                &report,
                self.config.correlation_window,
                self.config.burst_threshold,
            );

            // Export only when a reporting capability is wired in.
            if self.sinks.is_empty() {
                false
            } else {
                state.queue.push(report.clone());
                state.queue.len() >= self.config.batch_size
            }
        };

        if flush_now {
            self.spawn_flush();
        }

        report
    }

    /// Append a breadcrumb to the shared trail
    pub fn add_breadcrumb(&self, entry: BreadcrumbEntry) {
        self.trail.add(entry);
    }

    pub fn breadcrumbs(&self) -> Arc<BreadcrumbTrail> {
        self.trail.clone()
    }

    /// Filter history by any combination of criteria, newest first
    pub fn get_errors(&self, query: &ErrorQuery) -> Vec<Arc<ErrorReport>> {
        let state = self.state.lock();
        let mut matched: Vec<Arc<ErrorReport>> = state
            .history
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Current correlation pattern map: key to member reports
    pub fn get_correlation_patterns(&self) -> HashMap<String, Vec<Arc<ErrorReport>>> {
        self.state.lock().patterns.clone()
    }

    /// Aggregate analytics over the history, optionally bounded to a range.
    /// Pure read; trend counts are always measured from now over the whole
    /// history regardless of the range.
    pub fn get_analytics(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> ErrorAnalytics {
        let state = self.state.lock();
        let now = Utc::now();

        let in_range: Vec<&Arc<ErrorReport>> = state
            .history
            .iter()
            .filter(|r| match range {
                Some((start, end)) => r.timestamp >= start && r.timestamp <= end,
                None => true,
            })
            .collect();

        let mut by_category: HashMap<ErrorCategory, usize> = HashMap::new();
        let mut by_severity: HashMap<ErrorSeverity, usize> = HashMap::new();
        let mut by_source: HashMap<ErrorSource, usize> = HashMap::new();
        let mut by_feature: HashMap<String, usize> = HashMap::new();
        for report in &in_range {
            *by_category.entry(report.error.category).or_insert(0) += 1;
            *by_severity.entry(report.error.severity).or_insert(0) += 1;
            *by_source.entry(report.context.source).or_insert(0) += 1;
            if let Some(feature) = &report.error.feature {
                *by_feature.entry(feature.clone()).or_insert(0) += 1;
            }
        }

        let span_hours = match range {
            Some((start, end)) => (end - start).num_minutes() as f64 / 60.0,
            None => in_range
                .first()
                .map(|oldest| (now - oldest.timestamp).num_minutes() as f64 / 60.0)
                .unwrap_or(0.0),
        };
        let error_rate_per_hour = in_range.len() as f64 / span_hours.max(1.0);

        let trends = TrendCounts {
            last_24h: Self::count_since(&state.history, now - ChronoDuration::hours(24)),
            last_7d: Self::count_since(&state.history, now - ChronoDuration::days(7)),
            last_30d: Self::count_since(&state.history, now - ChronoDuration::days(30)),
        };

        // Top fingerprints: frequency descending, last-seen breaks ties.
        let mut groups: HashMap<&str, TopError> = HashMap::new();
        for report in &in_range {
            let entry = groups
                .entry(report.fingerprint.as_str())
                .or_insert_with(|| TopError {
                    fingerprint: report.fingerprint.clone(),
                    count: 0,
                    last_seen: report.timestamp,
                    message: report.error.message.clone(),
                });
            entry.count += 1;
            if report.timestamp >= entry.last_seen {
                entry.last_seen = report.timestamp;
                entry.message = report.error.message.clone();
            }
        }
        let mut top_errors: Vec<TopError> = groups.into_values().collect();
        top_errors.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        top_errors.truncate(10);

        let mut patterns: Vec<PatternSummary> = state
            .patterns
            .iter()
            .filter(|(_, reports)| reports.len() >= 2)
            .map(|(key, reports)| PatternSummary {
                key: key.clone(),
                count: reports.len(),
                max_severity: reports
                    .iter()
                    .map(|r| r.error.severity)
                    .max()
                    .unwrap_or(ErrorSeverity::Low),
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

        ErrorAnalytics {
            total_errors: in_range.len(),
            errors_by_category: by_category,
            errors_by_severity: by_severity,
            errors_by_source: by_source,
            errors_by_feature: by_feature,
            error_rate_per_hour,
            trends,
            top_errors,
            patterns,
            evicted_reports: state.evicted,
        }
    }

    fn count_since(history: &VecDeque<Arc<ErrorReport>>, cutoff: DateTime<Utc>) -> usize {
        history.iter().filter(|r| r.timestamp >= cutoff).count()
    }

    /// Approximate burst detection, not exact clustering. When the recent
    /// window holds at least `burst_threshold` reports, up to three candidate
    /// keys are derived from the new report and each matching bucket is
    /// overwritten with the freshly computed related set (overwrite, not
    /// merge: the newest view of a burst wins).
    fn update_correlations(
        state: &mut RegistryState,
        report: &Arc<ErrorReport>,
        window: std::time::Duration,
        burst_threshold: usize,
    ) {
        let window_start = report.timestamp
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(0));
        let recent: Vec<Arc<ErrorReport>> = state
            .history
            .iter()
            .filter(|r| r.timestamp >= window_start)
            .cloned()
            .collect();
        if recent.len() < burst_threshold {
            return;
        }

        let category = report.error.category;
        let source = report.context.source;
        let severity = report.error.severity;

        let mut candidates: Vec<(String, Box<dyn Fn(&ErrorReport) -> bool>)> = vec![(
            format!("{}_{}", category, source),
            Box::new(move |r| r.error.category == category && r.context.source == source),
        )];
        if let Some(feature) = report.error.feature.clone() {
            candidates.push((
                format!("{}_errors", feature),
                Box::new(move |r| r.error.feature.as_deref() == Some(feature.as_str())),
            ));
        }
        candidates.push((
            format!("{}_burst", severity),
            Box::new(move |r| r.error.severity == severity),
        ));

        for (key, related_to) in candidates {
            let related: Vec<Arc<ErrorReport>> = recent
                .iter()
                .filter(|r| related_to(r))
                .cloned()
                .collect();
            if related.len() >= 2 {
                debug!(pattern = %key, members = related.len(), "correlation pattern updated");
                state.patterns.insert(key, related);
            }
        }
    }

    fn log_report(&self, report: &ErrorReport) {
        match report.error.severity {
            ErrorSeverity::Critical => error!(
                error_id = %report.id,
                fingerprint = %report.fingerprint,
                category = %report.error.category,
                source = %report.context.source,
                "error reported: {}", report.error.message
            ),
            ErrorSeverity::High => warn!(
                error_id = %report.id,
                fingerprint = %report.fingerprint,
                category = %report.error.category,
                source = %report.context.source,
                "error reported: {}", report.error.message
            ),
            ErrorSeverity::Medium => info!(
                error_id = %report.id,
                fingerprint = %report.fingerprint,
                category = %report.error.category,
                source = %report.context.source,
                "error reported: {}", report.error.message
            ),
            ErrorSeverity::Low => debug!(
                error_id = %report.id,
                fingerprint = %report.fingerprint,
                category = %report.error.category,
                source = %report.context.source,
                "error reported: {}", report.error.message
            ),
        }
    }

    /// Hand the queued batch to every sink. Any sink failure re-queues a
    /// bounded prefix of the batch rather than retrying indefinitely.
    pub async fn flush(&self) {
        let batch: Vec<Arc<ErrorReport>> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return;
        }

        let outcomes =
            futures::future::join_all(self.sinks.iter().map(|sink| sink.send(&batch))).await;
        let mut delivered = true;
        for (sink, outcome) in self.sinks.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(sink = sink.name(), error = %e, "report sink delivery failed");
                delivered = false;
            }
        }

        if delivered {
            debug!(count = batch.len(), "report batch flushed");
            return;
        }

        // Bounded retry buffer: first 50 of the failed batch go back to the
        // front, total queue capped at 100, oldest dropped beyond the cap.
        let mut state = self.state.lock();
        let mut requeue: Vec<Arc<ErrorReport>> =
            batch.into_iter().take(RETRY_REQUEUE_LIMIT).collect();
        requeue.append(&mut state.queue);
        if requeue.len() > QUEUE_HARD_CAP {
            let dropped = requeue.len() - QUEUE_HARD_CAP;
            requeue.drain(..dropped);
            warn!(dropped, "export queue over cap, dropping oldest reports");
        }
        state.queue = requeue;
    }

    /// Fire-and-forget flush, used when the batch size threshold is reached.
    /// A missing runtime is tolerated; the periodic timer or a manual flush
    /// picks the queue up later.
    fn spawn_flush(self: &Arc<Self>) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let registry = Arc::clone(self);
            handle.spawn(async move { registry.flush().await });
        }
    }

    /// Current export queue depth, for tests and introspection
    pub fn queued_reports(&self) -> usize {
        self.state.lock().queue.len()
    }
}
