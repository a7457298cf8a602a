use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

pub const DEFAULT_DROP_FIELDS: &[&str] = &[
    "stack_info",
    "funcName",
    "created",
    "msecs",
    "module",
    "thread",
    "threadName",
    "processName",
];

/// Settings the pipeline re-reads on every iteration. Updated wholesale by
/// the configuration refresh loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
    pub drop_fields: Vec<String>,
    pub max_pending: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_age: Duration::from_secs(5),
            drop_fields: DEFAULT_DROP_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_pending: 100_000,
        }
    }
}

impl RuntimeSettings {
    /// Lists `(key, old, new)` for every setting that differs in `next`.
    pub fn diff(&self, next: &Self) -> Vec<(&'static str, String, String)> {
        let mut out = Vec::new();
        if self.max_batch_size != next.max_batch_size {
            out.push((
                "max_batch_size",
                self.max_batch_size.to_string(),
                next.max_batch_size.to_string(),
            ));
        }
        if self.max_batch_age != next.max_batch_age {
            out.push((
                "max_batch_age",
                humantime::format_duration(self.max_batch_age).to_string(),
                humantime::format_duration(next.max_batch_age).to_string(),
            ));
        }
        if self.drop_fields != next.drop_fields {
            out.push((
                "drop_fields",
                self.drop_fields.join(","),
                next.drop_fields.join(","),
            ));
        }
        if self.max_pending != next.max_pending {
            out.push((
                "max_pending",
                self.max_pending.to_string(),
                next.max_pending.to_string(),
            ));
        }
        out
    }
}

/// Cheaply cloneable handle to the current [`RuntimeSettings`] snapshot.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<ArcSwap<RuntimeSettings>>,
}

impl SharedSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn load(&self) -> Arc<RuntimeSettings> {
        self.inner.load_full()
    }

    /// Replaces the snapshot and returns what changed. Nothing is stored when
    /// the settings are identical.
    pub fn update(&self, next: RuntimeSettings) -> Vec<(&'static str, String, String)> {
        let current = self.inner.load_full();
        let changes = current.diff(&next);
        if !changes.is_empty() {
            self.inner.store(Arc::new(next));
        }
        changes
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(RuntimeSettings::default())
    }
}
