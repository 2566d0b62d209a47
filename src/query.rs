//! # External query client seam.
//!
//! Scripts may ask a history store for the last value seen at an addressable
//! path, or for an aggregate over a time window. The engine only forwards the
//! call; results come back to the script through the invocation wrapper, and
//! failures land in the script's error log.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last value recorded at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValue {
    /// Raw value.
    pub value: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// Aggregation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Arithmetic mean.
    Avg,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sum.
    Sum,
    /// Number of samples.
    Count,
}

/// History store used by script convenience methods.
#[async_trait]
pub trait QueryClient: Send + Sync + 'static {
    /// Last value at `path`, if any was recorded.
    async fn last_value(&self, path: &str) -> anyhow::Result<Option<QueryValue>>;

    /// Aggregate of the values recorded at `path` during the last `window`.
    async fn aggregate(
        &self,
        path: &str,
        func: Aggregate,
        window: Duration,
    ) -> anyhow::Result<Option<f64>>;
}
