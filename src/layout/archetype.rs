//! Affinity grouping and per-archetype node counts
//!
//! An archetype is a set of services that always land on the same node,
//! derived from the template's must-coexist sets. Each archetype then gets
//! a node-count envelope: a hard minimum, a soft target (from quantum
//! constraints) and a hard maximum (explicit maxima and ratio caps),
//! combined so every member service's constraint holds simultaneously.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::template::{LayoutConstraint, ServiceConstraint};

use super::solver::SolverError;

/// An archetype together with its resolved node-count envelope for a
/// cluster of a given total size.
#[derive(Debug, Clone)]
pub struct ResolvedArchetype {
    /// Services co-located on every node of this archetype
    pub services: BTreeSet<String>,

    /// Hard minimum node count
    pub min: u32,

    /// Soft target the allocator scales toward when slots allow
    pub target: u32,

    /// Hard maximum node count
    pub max: u32,
}

impl ResolvedArchetype {
    /// A fixed archetype has no room to grow; fixed archetypes are
    /// candidates for co-location onto shared slots.
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// Stable identity used for deterministic ordering.
    pub fn key(&self) -> String {
        self.services
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Partition the effective service set into disjoint archetypes using the
/// template's must-coexist sets, then cross-check the partition against the
/// cannot-coexist sets.
///
/// Must-coexist sets only bind services actually present on the cluster;
/// absent members are ignored rather than pulled in.
pub fn group_archetypes(
    effective: &BTreeSet<String>,
    layout: &LayoutConstraint,
) -> Result<Vec<BTreeSet<String>>, SolverError> {
    let mut groups: Vec<BTreeSet<String>> = effective
        .iter()
        .map(|s| [s.clone()].into_iter().collect())
        .collect();

    for must_set in &layout.must_coexist {
        let present: BTreeSet<String> = must_set
            .iter()
            .filter(|s| effective.contains(*s))
            .cloned()
            .collect();
        if present.len() < 2 {
            continue;
        }

        // Merge every group touching this set into one.
        let (touching, rest): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|g| g.iter().any(|s| present.contains(s)));
        let mut merged = BTreeSet::new();
        for group in touching {
            merged.extend(group);
        }
        groups = rest;
        groups.push(merged);
    }

    // A must-coexist group that trips a cannot-coexist rule is a template
    // authoring error, surfaced at solve time.
    for group in &groups {
        if layout.violates_cannot_coexist(group) {
            return Err(SolverError::ConflictingConstraints(format!(
                "services {:?} must coexist but are also forbidden from sharing a node",
                group
            )));
        }
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    Ok(groups)
}

/// Resolve the node-count envelope for one archetype in a cluster of
/// `total` nodes.
pub fn resolve_counts(
    services: BTreeSet<String>,
    constraints: &BTreeMap<String, ServiceConstraint>,
    total: u32,
) -> Result<ResolvedArchetype, SolverError> {
    let mut min = 1u32;
    let mut max = total;
    let mut target = 0u32;

    for service in &services {
        let Some(constraint) = constraints.get(service) else {
            continue;
        };

        if let Some(service_min) = constraint.min_count {
            min = min.max(service_min);
        }
        if let Some(service_max) = constraint.max_count {
            max = max.min(service_max);
        }
        if let Some(ratio) = constraint.ratio {
            max = max.min(ratio.cap(total));
        }
        if let Some(quantum) = constraint.quantum {
            if quantum > 0 {
                target = target.max(total.div_ceil(quantum));
            }
        }
    }

    if max < min {
        return Err(SolverError::UnsatisfiableCount(format!(
            "services {:?} require at least {} node(s) but are capped at {} for a {}-node cluster",
            services, min, max, total
        )));
    }

    let target = target.clamp(min, max);

    Ok(ResolvedArchetype {
        services,
        min,
        target,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::template::Ratio;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn layout(must: &[&[&str]], cannot: &[&[&str]]) -> LayoutConstraint {
        LayoutConstraint {
            must_coexist: must.iter().map(|s| set(s)).collect(),
            cannot_coexist: cannot.iter().map(|s| set(s)).collect(),
        }
    }

    #[test]
    fn test_singletons_without_affinity() {
        let groups = group_archetypes(&set(&["a", "b", "c"]), &layout(&[], &[])).unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn test_must_coexist_grouping() {
        let effective = set(&["datanode", "nodemanager", "regionserver", "zookeeper"]);
        let constraints = layout(&[&["datanode", "nodemanager", "regionserver"]], &[]);

        let groups = group_archetypes(&effective, &constraints).unwrap();
        assert_eq!(groups.len(), 2);
        // Largest group first.
        assert_eq!(groups[0], set(&["datanode", "nodemanager", "regionserver"]));
        assert_eq!(groups[1], set(&["zookeeper"]));
    }

    #[test]
    fn test_overlapping_must_sets_merge() {
        let effective = set(&["a", "b", "c"]);
        let constraints = layout(&[&["a", "b"], &["b", "c"]], &[]);

        let groups = group_archetypes(&effective, &constraints).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0], set(&["a", "b", "c"]));
    }

    #[test]
    fn test_absent_members_ignored() {
        // "ghost" is not on the cluster, so the set binds nothing.
        let effective = set(&["a", "b"]);
        let constraints = layout(&[&["a", "ghost"]], &[]);

        let groups = group_archetypes(&effective, &constraints).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_conflicting_rules_rejected() {
        let effective = set(&["a", "b"]);
        let constraints = layout(&[&["a", "b"]], &[&["a", "b"]]);

        let result = group_archetypes(&effective, &constraints);
        assert!(matches!(result, Err(SolverError::ConflictingConstraints(_))));
    }

    #[test]
    fn test_count_envelope_from_min_max() {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            "namenode".to_string(),
            ServiceConstraint {
                min_count: Some(1),
                max_count: Some(1),
                ..Default::default()
            },
        );

        let resolved = resolve_counts(set(&["namenode"]), &constraints, 5).unwrap();
        assert_eq!((resolved.min, resolved.target, resolved.max), (1, 1, 1));
        assert!(resolved.is_fixed());
    }

    #[test]
    fn test_ratio_caps_quantum_target() {
        // Quantum alone would ask for ceil(5/2) = 3 nodes, but the 1:20
        // ratio caps the service at a single instance on a 5-node cluster.
        let mut constraints = BTreeMap::new();
        constraints.insert(
            "zookeeper".to_string(),
            ServiceConstraint {
                min_count: Some(1),
                max_count: Some(5),
                quantum: Some(2),
                ratio: Some(Ratio {
                    numerator: 1,
                    denominator: 20,
                }),
                ..Default::default()
            },
        );

        let resolved = resolve_counts(set(&["zookeeper"]), &constraints, 5).unwrap();
        assert_eq!((resolved.min, resolved.target, resolved.max), (1, 1, 1));
    }

    #[test]
    fn test_archetype_takes_strictest_member() {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            "a".to_string(),
            ServiceConstraint {
                min_count: Some(2),
                ..Default::default()
            },
        );
        constraints.insert(
            "b".to_string(),
            ServiceConstraint {
                max_count: Some(3),
                ..Default::default()
            },
        );

        let resolved = resolve_counts(set(&["a", "b"]), &constraints, 10).unwrap();
        assert_eq!(resolved.min, 2);
        assert_eq!(resolved.max, 3);
    }

    #[test]
    fn test_unsatisfiable_envelope() {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            "a".to_string(),
            ServiceConstraint {
                min_count: Some(4),
                ..Default::default()
            },
        );
        constraints.insert(
            "b".to_string(),
            ServiceConstraint {
                max_count: Some(2),
                ..Default::default()
            },
        );

        let result = resolve_counts(set(&["a", "b"]), &constraints, 10);
        assert!(matches!(result, Err(SolverError::UnsatisfiableCount(_))));
    }

    #[test]
    fn test_unconstrained_service_defaults() {
        let resolved = resolve_counts(set(&["hosts"]), &BTreeMap::new(), 7).unwrap();
        assert_eq!((resolved.min, resolved.target, resolved.max), (1, 1, 7));
        assert!(!resolved.is_fixed());
    }
}
