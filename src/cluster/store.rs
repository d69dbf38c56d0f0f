//! In-memory cluster store with per-cluster exclusivity
//!
//! Solve-and-commit sequences for one cluster id must be serialized: a
//! resize has to observe the prior solve's committed node set. The store
//! hands out a per-cluster `tokio::sync::Mutex` for callers to hold around
//! those sequences. Different clusters proceed concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use super::types::{Cluster, Node};

#[derive(Error, Debug)]
pub enum ClusterStoreError {
    #[error("Cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("Cluster '{0}' already exists")]
    ClusterExists(String),
}

/// Clusters and their nodes, indexed by id.
#[derive(Clone, Default)]
pub struct ClusterStore {
    clusters: Arc<DashMap<String, Cluster>>,
    nodes: Arc<DashMap<String, Node>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exclusivity lock for one cluster id. Hold the guard across a
    /// solve-and-commit sequence.
    pub fn lock_for(&self, cluster_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(cluster_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn insert_cluster(&self, cluster: Cluster) -> Result<(), ClusterStoreError> {
        if self.clusters.contains_key(&cluster.id) {
            return Err(ClusterStoreError::ClusterExists(cluster.id.clone()));
        }
        self.clusters.insert(cluster.id.clone(), cluster);
        Ok(())
    }

    pub fn update_cluster(&self, cluster: Cluster) {
        self.clusters.insert(cluster.id.clone(), cluster);
    }

    pub fn get_cluster(&self, id: &str) -> Option<Cluster> {
        self.clusters.get(id).map(|r| r.clone())
    }

    pub fn list_clusters(&self) -> Vec<Cluster> {
        self.clusters.iter().map(|r| r.clone()).collect()
    }

    /// Replace the node set of a cluster with a freshly solved layout.
    pub fn commit_nodes(&self, cluster_id: &str, nodes: &BTreeMap<String, Node>) {
        // Drop nodes from a previous solve that are no longer present.
        let stale: Vec<String> = self
            .nodes
            .iter()
            .filter(|r| r.cluster_id == cluster_id && !nodes.contains_key(&r.id))
            .map(|r| r.id.clone())
            .collect();
        for id in stale {
            self.nodes.remove(&id);
        }
        for node in nodes.values() {
            self.nodes.insert(node.id.clone(), node.clone());
        }
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|r| r.clone())
    }

    pub fn list_nodes(&self, cluster_id: &str) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|r| r.cluster_id == cluster_id)
            .map(|r| r.clone())
            .collect()
    }

    /// Remove a cluster and all its nodes.
    pub fn delete_cluster(&self, id: &str) -> Result<Cluster, ClusterStoreError> {
        let (_, cluster) = self
            .clusters
            .remove(id)
            .ok_or_else(|| ClusterStoreError::ClusterNotFound(id.to_string()))?;
        let node_ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|r| r.cluster_id == id)
            .map(|r| r.id.clone())
            .collect();
        for node_id in node_ids {
            self.nodes.remove(&node_id);
        }
        self.locks.remove(id);
        Ok(cluster)
    }
}
