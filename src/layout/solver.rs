//! Layout solver
//!
//! Pure constraint-based assignment of services to nodes, hardware and
//! images. Called once per cluster create/resize request with an immutable
//! catalog snapshot; no I/O, deterministic output for identical inputs.
//!
//! The solve pipeline:
//! 1. resolve the effective service set and validate it against template
//!    compatibilities
//! 2. check the dependency closure (missing dependencies are an error,
//!    never silently added)
//! 3. partition services into archetypes from must-coexist sets
//! 4. resolve each archetype's node-count envelope
//! 5. allocate archetypes onto exactly N node slots, co-locating fixed
//!    archetypes where rules allow and growing the rest toward their
//!    targets
//! 6. pick hardware and image types per node from the intersection of all
//!    applicable allowed sets
//! 7. assign generated hostnames

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::catalog::store::CatalogSnapshot;
use crate::catalog::template::ClusterTemplate;
use crate::cluster::types::{properties, Cluster, ClusterRequest, Node};

use super::archetype::{group_archetypes, resolve_counts, ResolvedArchetype};
use super::hostname::create_hostname;

/// Solver failures. All of these reject the request synchronously; no
/// partial cluster is ever produced.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Unknown cluster template '{0}'")]
    UnknownTemplate(String),

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Services not allowed by template '{template}': {services:?}")]
    DisallowedServices {
        template: String,
        services: Vec<String>,
    },

    #[error("Unknown service '{0}'")]
    UnknownService(String),

    #[error("Service '{service}' depends on {missing:?}, which the request does not include")]
    MissingDependencies {
        service: String,
        missing: Vec<String>,
    },

    #[error("Conflicting layout constraints: {0}")]
    ConflictingConstraints(String),

    #[error("Unsatisfiable node counts: {0}")]
    UnsatisfiableCount(String),

    #[error("No hardware type satisfies all constraints for services {0:?}")]
    NoSatisfiableHardware(Vec<String>),

    #[error("No image type satisfies all constraints for services {0:?}")]
    NoSatisfiableImage(Vec<String>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A set of identical node slots: the same services, hardware and image.
#[derive(Debug, Clone)]
struct NodeGroup {
    services: BTreeSet<String>,
    count: u32,
}

/// Resolve a cluster request into a concrete node layout.
///
/// Returns exactly `request.num_machines` nodes keyed by node id, or a
/// classified error and zero nodes.
pub fn solve_cluster_nodes(
    cluster: &Cluster,
    request: &ClusterRequest,
    snapshot: &CatalogSnapshot,
) -> Result<BTreeMap<String, Node>, SolverError> {
    let total = request.num_machines;
    if total == 0 {
        return Err(SolverError::InvalidRequest(
            "requested node count must be positive".to_string(),
        ));
    }

    let template = snapshot
        .template(&request.cluster_template)
        .map_err(|_| SolverError::UnknownTemplate(request.cluster_template.clone()))?;

    let provider_name = request
        .provider
        .clone()
        .or_else(|| template.defaults.provider.clone())
        .ok_or_else(|| {
            SolverError::InvalidRequest(
                "neither the request nor the template names a provider".to_string(),
            )
        })?;
    snapshot
        .provider(&provider_name)
        .map_err(|_| SolverError::UnknownProvider(provider_name.clone()))?;

    let effective = resolve_effective_services(template, request, snapshot)?;
    check_dependency_closure(&effective, snapshot)?;

    debug!(
        cluster = %cluster.id,
        template = %template.name,
        provider = %provider_name,
        services = effective.len(),
        nodes = total,
        "solving cluster layout"
    );

    // Affinity grouping and count envelopes.
    let groups = group_archetypes(&effective, &template.constraints.layout)?;
    let mut resolved = Vec::with_capacity(groups.len());
    for services in groups {
        resolved.push(resolve_counts(
            services,
            &template.constraints.services,
            total,
        )?);
    }

    let node_groups = allocate(resolved, total, template, request, snapshot, &provider_name)?;

    materialize(cluster, request, snapshot, template, &provider_name, &node_groups)
}

/// Step 1: the request's explicit services, or template defaults; must be a
/// subset of the template's compatible services and exist in the catalog.
fn resolve_effective_services(
    template: &ClusterTemplate,
    request: &ClusterRequest,
    snapshot: &CatalogSnapshot,
) -> Result<BTreeSet<String>, SolverError> {
    let effective = match &request.services {
        Some(services) => services.clone(),
        None => template.defaults.services.clone(),
    };
    if effective.is_empty() {
        return Err(SolverError::InvalidRequest(
            "no services requested and the template has no defaults".to_string(),
        ));
    }

    let disallowed: Vec<String> = effective
        .iter()
        .filter(|s| !template.compatibilities.compatible_with_service(s))
        .cloned()
        .collect();
    if !disallowed.is_empty() {
        return Err(SolverError::DisallowedServices {
            template: template.name.clone(),
            services: disallowed,
        });
    }

    for service in &effective {
        if snapshot.service(service).is_err() {
            return Err(SolverError::UnknownService(service.clone()));
        }
    }

    Ok(effective)
}

/// Step 2: every dependency of every effective service must itself be in
/// the effective set.
fn check_dependency_closure(
    effective: &BTreeSet<String>,
    snapshot: &CatalogSnapshot,
) -> Result<(), SolverError> {
    for service in effective {
        let definition = snapshot
            .service(service)
            .map_err(|_| SolverError::UnknownService(service.clone()))?;
        let missing: Vec<String> = definition
            .dependencies
            .iter()
            .filter(|dep| !effective.contains(*dep))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SolverError::MissingDependencies {
                service: service.clone(),
                missing,
            });
        }
    }
    Ok(())
}

/// Hardware and image candidates for a node hosting `services`: the
/// intersection of every service's allowed types, the template
/// compatibilities, the request-level required types and the provider's
/// compatible sets.
fn type_candidates(
    services: &BTreeSet<String>,
    template: &ClusterTemplate,
    request: &ClusterRequest,
    snapshot: &CatalogSnapshot,
    provider: &str,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut hardware: BTreeSet<String> = snapshot
        .hardware_for_provider(provider)
        .keys()
        .filter(|name| template.compatibilities.compatible_with_hardware(name))
        .cloned()
        .collect();
    let mut images: BTreeSet<String> = snapshot
        .images_for_provider(provider)
        .keys()
        .filter(|name| template.compatibilities.compatible_with_image(name))
        .cloned()
        .collect();

    for service in services {
        if let Some(constraint) = template.constraints.services.get(service) {
            hardware.retain(|hw| constraint.allows_hardware(hw));
            images.retain(|img| constraint.allows_image(img));
        }
    }

    if let Some(required) = &request.hardware_type {
        hardware.retain(|hw| hw == required);
    }
    if let Some(required) = &request.image_type {
        images.retain(|img| img == required);
    }

    (hardware, images)
}

/// Step 5: turn count envelopes into node groups summing to exactly
/// `total` slots.
///
/// Fixed archetypes are placed first, largest first, and co-located onto a
/// shared group when counts match and no cannot-coexist rule or empty type
/// intersection forbids the union. Growable archetypes then take their
/// minima and absorb leftover slots, first toward their quantum targets,
/// then toward their maxima (most room first). Any residue becomes bare
/// base nodes.
fn allocate(
    resolved: Vec<ResolvedArchetype>,
    total: u32,
    template: &ClusterTemplate,
    request: &ClusterRequest,
    snapshot: &CatalogSnapshot,
    provider: &str,
) -> Result<Vec<NodeGroup>, SolverError> {
    let can_merge = |a: &BTreeSet<String>, b: &BTreeSet<String>| -> bool {
        let union: BTreeSet<String> = a.union(b).cloned().collect();
        if template.constraints.layout.violates_cannot_coexist(&union) {
            return false;
        }
        let (hardware, images) = type_candidates(&union, template, request, snapshot, provider);
        !hardware.is_empty() && !images.is_empty()
    };

    let (fixed, mut growable): (Vec<_>, Vec<_>) =
        resolved.into_iter().partition(ResolvedArchetype::is_fixed);

    let mut node_groups: Vec<NodeGroup> = Vec::new();
    let mut used = 0u32;

    for archetype in fixed {
        let merged = node_groups.iter_mut().find(|group| {
            group.count == archetype.min && can_merge(&group.services, &archetype.services)
        });
        match merged {
            Some(group) => {
                debug!(
                    host = %group.services.iter().next().map(String::as_str).unwrap_or(""),
                    guest = %archetype.key(),
                    "co-locating fixed archetypes"
                );
                group.services.extend(archetype.services);
            }
            None => {
                used += archetype.min;
                node_groups.push(NodeGroup {
                    services: archetype.services,
                    count: archetype.min,
                });
            }
        }
    }

    if used > total {
        return Err(SolverError::UnsatisfiableCount(format!(
            "fixed service placements need {} nodes but only {} were requested",
            used, total
        )));
    }

    // Minimum viable placement for every growable archetype.
    growable.sort_by(|a, b| {
        b.services
            .len()
            .cmp(&a.services.len())
            .then_with(|| a.key().cmp(&b.key()))
    });
    let mut assigned: Vec<u32> = Vec::with_capacity(growable.len());
    for archetype in &growable {
        used += archetype.min;
        assigned.push(archetype.min);
    }
    if used > total {
        return Err(SolverError::UnsatisfiableCount(format!(
            "service minimums need {} nodes but only {} were requested",
            used, total
        )));
    }
    let mut leftover = total - used;

    // Scale toward quantum targets, largest target first.
    let mut order: Vec<usize> = (0..growable.len()).collect();
    order.sort_by(|&i, &j| {
        growable[j]
            .target
            .cmp(&growable[i].target)
            .then_with(|| growable[i].key().cmp(&growable[j].key()))
    });
    for &i in &order {
        if leftover == 0 {
            break;
        }
        let want = growable[i].target.saturating_sub(assigned[i]);
        let take = want.min(leftover);
        assigned[i] += take;
        leftover -= take;
    }

    // Then toward maxima, most generic (most headroom) first.
    order.sort_by(|&i, &j| {
        growable[j]
            .max
            .cmp(&growable[i].max)
            .then_with(|| growable[i].key().cmp(&growable[j].key()))
    });
    for &i in &order {
        if leftover == 0 {
            break;
        }
        let want = growable[i].max.saturating_sub(assigned[i]);
        let take = want.min(leftover);
        assigned[i] += take;
        leftover -= take;
    }

    for (archetype, count) in growable.into_iter().zip(assigned) {
        node_groups.push(NodeGroup {
            services: archetype.services,
            count,
        });
    }

    // Slots nobody can absorb become bare base nodes.
    if leftover > 0 {
        debug!(count = leftover, "filling remaining slots with base nodes");
        node_groups.push(NodeGroup {
            services: BTreeSet::new(),
            count: leftover,
        });
    }

    Ok(node_groups)
}

/// Steps 6 and 7: pick types for each group and mint the nodes.
fn materialize(
    cluster: &Cluster,
    request: &ClusterRequest,
    snapshot: &CatalogSnapshot,
    template: &ClusterTemplate,
    provider: &str,
    node_groups: &[NodeGroup],
) -> Result<BTreeMap<String, Node>, SolverError> {
    let mut nodes = BTreeMap::new();
    let mut index = 0u32;

    for group in node_groups {
        let (hardware, images) = type_candidates(&group.services, template, request, snapshot, provider);

        let services: Vec<String> = group.services.iter().cloned().collect();
        let hardware_type = pick_type(&hardware, template.defaults.hardware_type.as_deref())
            .ok_or_else(|| SolverError::NoSatisfiableHardware(services.clone()))?;
        let image_type = pick_type(&images, template.defaults.image_type.as_deref())
            .ok_or_else(|| SolverError::NoSatisfiableImage(services.clone()))?;

        let flavor = snapshot
            .hardware_types
            .get(&hardware_type)
            .and_then(|hw| hw.flavor_for(provider))
            .map(str::to_string);
        let image = snapshot
            .image_types
            .get(&image_type)
            .and_then(|img| img.image_for(provider))
            .map(str::to_string);

        for _ in 0..group.count {
            index += 1;
            let node_id = format!("{}-{}", cluster.id, index);
            let mut node = Node::new(node_id.clone(), cluster.id.clone());
            node.services = group.services.clone();
            node.properties
                .insert(properties::HARDWARE_TYPE.to_string(), hardware_type.clone());
            node.properties
                .insert(properties::IMAGE_TYPE.to_string(), image_type.clone());
            if let Some(flavor) = &flavor {
                node.properties
                    .insert(properties::FLAVOR.to_string(), flavor.clone());
            }
            if let Some(image) = &image {
                node.properties
                    .insert(properties::IMAGE.to_string(), image.clone());
            }
            node.properties.insert(
                properties::HOSTNAME.to_string(),
                create_hostname(&cluster.name, &cluster.id, index),
            );
            nodes.insert(node_id, node);
        }
    }

    Ok(nodes)
}

/// Deterministic pick: the template default when the candidate set allows
/// it, otherwise the lexicographically first candidate.
fn pick_type(candidates: &BTreeSet<String>, preferred: Option<&str>) -> Option<String> {
    if let Some(preferred) = preferred {
        if candidates.contains(preferred) {
            return Some(preferred.to_string());
        }
    }
    candidates.iter().next().cloned()
}
