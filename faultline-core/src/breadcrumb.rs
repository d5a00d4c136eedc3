//! Bounded FIFO of recent application events
//!
//! The trail is shared by the registry (report snapshots), the router, and
//! every handler. Appends are lock-protected and never fail; the oldest
//! entries beyond capacity are dropped silently.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreadcrumbCategory {
    Navigation,
    UserAction,
    Network,
    StateChange,
    Error,
}

impl fmt::Display for BreadcrumbCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreadcrumbCategory::Navigation => "navigation",
            BreadcrumbCategory::UserAction => "user-action",
            BreadcrumbCategory::Network => "network",
            BreadcrumbCategory::StateChange => "state-change",
            BreadcrumbCategory::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbLevel {
    Info,
    Warning,
    Error,
}

/// A timestamped record of a preceding event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreadcrumbEntry {
    pub timestamp: DateTime<Utc>,
    pub category: BreadcrumbCategory,
    pub message: String,
    pub level: BreadcrumbLevel,
    pub data: Option<serde_json::Value>,
}

impl BreadcrumbEntry {
    pub fn new(
        category: BreadcrumbCategory,
        level: BreadcrumbLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            message: message.into(),
            level,
            data: None,
        }
    }

    pub fn info(category: BreadcrumbCategory, message: impl Into<String>) -> Self {
        Self::new(category, BreadcrumbLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(BreadcrumbCategory::Error, BreadcrumbLevel::Error, message)
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

struct TrailInner {
    entries: VecDeque<BreadcrumbEntry>,
    dropped: u64,
}

/// Bounded ring buffer of breadcrumbs, insertion-ordered
pub struct BreadcrumbTrail {
    limit: usize,
    inner: Mutex<TrailInner>,
}

impl BreadcrumbTrail {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inner: Mutex::new(TrailInner {
                entries: VecDeque::with_capacity(limit),
                dropped: 0,
            }),
        }
    }

    /// Append an entry, evicting the oldest beyond capacity
    pub fn add(&self, entry: BreadcrumbEntry) {
        let mut inner = self.inner.lock();
        inner.entries.push_back(entry);
        while inner.entries.len() > self.limit {
            inner.entries.pop_front();
            inner.dropped += 1;
        }
    }

    /// Read-only snapshot in insertion order
    pub fn snapshot(&self) -> Vec<BreadcrumbEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Total entries dropped by the capacity bound
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}
