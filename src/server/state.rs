use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::EntityCatalog;
use crate::cluster::ClusterStore;
use crate::config::ServerConfig;
use crate::task::{TaskRegistry, TaskScheduler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: EntityCatalog,
    pub clusters: ClusterStore,
    pub scheduler: Arc<TaskScheduler>,
    cluster_sequence: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let registry = TaskRegistry::new();
        let scheduler = TaskScheduler::new(registry, config.task.retry.clone());

        Self {
            catalog: EntityCatalog::new(),
            clusters: ClusterStore::new(),
            scheduler: Arc::new(scheduler),
            cluster_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.scheduler.registry()
    }

    /// Next cluster id, zero-padded so ids sort lexicographically in the
    /// order they were created. Hostnames strip the leading zeros.
    pub fn next_cluster_id(&self) -> String {
        let seq = self.cluster_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{:08}", seq)
    }
}
