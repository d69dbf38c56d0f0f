//! Layout solving: services onto nodes, nodes onto hardware and images
//!
//! The solver is a pure function over a catalog snapshot; the hostname
//! generator is a pure function over the cluster identity. Neither does
//! I/O, so both are safe to call from any worker thread.

pub mod archetype;
pub mod hostname;
pub mod solver;

pub use hostname::{create_hostname, DOMAIN_SUFFIX, MAX_LABEL_LEN};
pub use solver::{solve_cluster_nodes, SolverError};
