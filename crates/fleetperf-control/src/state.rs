//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::collector::Collector;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    pub collector: Arc<Collector>,
    /// Identifier of the current campaign run.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(collector: Arc<Collector>, run_id: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                collector,
                run_id,
                started_at: Utc::now(),
            }),
        }
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.inner.collector
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }
}
