//! Typed per-kind job logic.
//!
//! The registry maps a job kind onto its executor, with a fixed-curve
//! fallback for unknown kinds.

pub mod download;
pub mod fallback;
pub mod noop;
pub mod sleep;
pub mod spawn;
pub mod traits;
pub mod wait;

pub use traits::{ErrorCode, ExecEnv, ExecError, ExecResult, JobExecutor};

use std::collections::HashMap;
use std::sync::Arc;

/// Registry of executors by job kind.
pub struct ExecutorRegistry {
    by_kind: HashMap<String, Arc<dyn JobExecutor>>,
    fallback: Arc<dyn JobExecutor>,
}

impl ExecutorRegistry {
    /// Registry with all built-in executors.
    pub fn default_registry() -> Self {
        let mut by_kind: HashMap<String, Arc<dyn JobExecutor>> = HashMap::new();
        by_kind.insert("noop".to_string(), Arc::new(noop::NoopExecutor));
        by_kind.insert("sleep".to_string(), Arc::new(sleep::SleepExecutor));
        by_kind.insert(
            "download".to_string(),
            Arc::new(download::DownloadExecutor::new()),
        );
        by_kind.insert("spawn".to_string(), Arc::new(spawn::SpawnExecutor));
        by_kind.insert("wait".to_string(), Arc::new(wait::WaitExecutor));

        Self {
            by_kind,
            fallback: Arc::new(fallback::DefaultExecutor),
        }
    }

    /// Executor for a kind; unknown kinds get the fallback.
    pub fn get(&self, kind: &str) -> Arc<dyn JobExecutor> {
        self.by_kind
            .get(kind)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::default_registry()
    }
}
