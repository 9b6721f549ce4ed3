//! Evaluation configuration.

use std::time::Duration;

/// Knobs for a contract evaluation pass.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Upper bound on each oracle call. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    /// Maximum clause nesting (including named-reference hops) before the
    /// pass is aborted. Guards against self-referencing definitions.
    pub max_depth: usize,
}

impl EvaluationConfig {
    /// Default nesting bound.
    pub const DEFAULT_MAX_DEPTH: usize = 256;

    /// Sets the per-query timeout.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Sets the nesting bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            query_timeout: None,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}
