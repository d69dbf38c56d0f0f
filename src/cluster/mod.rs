//! Cluster domain types and store
//!
//! A [`Cluster`] is created from a [`ClusterRequest`] resolved against a
//! template by the layout solver, yielding one [`Node`] per requested
//! machine slot.

pub mod store;
pub mod types;

pub use store::{ClusterStore, ClusterStoreError};
pub use types::{properties, Cluster, ClusterRequest, LayoutStrategy, Node};
