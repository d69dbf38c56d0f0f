//! corral - a cluster provisioning control plane
//!
//! Administrators register providers, hardware types, image types,
//! services and cluster templates in a catalog. A cluster request is
//! resolved against a template by the layout solver into a concrete set
//! of nodes, which the task planner turns into provisioning tasks.
//! External provisioner workers poll the HTTP surface for tasks and
//! report results; the scheduler retries failures, falls back to rollback
//! tasks, and abandons what it cannot repair.

pub mod catalog;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod layout;
pub mod server;
pub mod task;
