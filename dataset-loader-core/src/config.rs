use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::feature_set::{ConflictPolicy, FeatureSetSpec};

/// Upper bound on the default worker count.
const MAX_DEFAULT_WORKERS: usize = 32;

/// Knobs for one upload run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoadOptions {
    /// Maximum number of items uploaded at once. `None` picks [`default_concurrency`].
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub feature_set: FeatureSetSpec,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Hide the console progress bar (tests, non-interactive runs).
    #[serde(default)]
    pub quiet: bool,
}

impl LoadOptions {
    pub fn workers(&self) -> usize {
        self.concurrency.filter(|n| *n > 0).unwrap_or_else(default_concurrency)
    }

    pub fn trace_loaded(&self) {
        info!(
            workers = self.workers(),
            feature_set = %self.feature_set.name,
            feature_size = self.feature_set.size,
            "Loaded upload options"
        );
        debug!(?self, "Upload options (full debug)");
    }
}

/// `min(32, cpus + 4)`, the usual sizing for I/O-bound worker pools.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 4).min(MAX_DEFAULT_WORKERS)
}
