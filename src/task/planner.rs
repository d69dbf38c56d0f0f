//! Turns a solved layout into an ordered list of provisioning tasks
//!
//! For every node: CREATE then CONFIRM the machine, each backed by a
//! DELETE rollback task so a half-created machine can be torn down when
//! attempts run out. Then, for every service on the node: INSTALL,
//! CONFIGURE, START. Software-level actions leave nothing at the provider
//! to undo, so they carry no rollback.
//!
//! Tasks come back in execution order per node; cross-task gating beyond
//! that order is up to the consumer feeding the scheduler.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use crate::catalog::{CatalogError, CatalogSnapshot, ProvisionerAction};
use crate::cluster::{Cluster, Node};

use super::registry::TaskRegistry;
use super::{ClusterTask, TaskError};

/// Everything a worker needs to act on a node, independent of which action
/// it is running.
fn node_payload(cluster: &Cluster, node: &Node, snapshot: &CatalogSnapshot) -> serde_json::Value {
    let provider = cluster
        .provider
        .as_deref()
        .and_then(|name| snapshot.provider(name).ok());

    json!({
        "clusterId": cluster.id,
        "nodeId": node.id,
        "hostname": node.hostname(),
        "provider": provider.map(|p| json!({
            "name": p.name,
            "providerType": p.provider_type,
            "properties": p.properties,
        })),
        "nodeProperties": node.properties,
    })
}

fn service_payload(
    base: &serde_json::Value,
    service: &str,
    action: ProvisionerAction,
    snapshot: &CatalogSnapshot,
) -> Result<serde_json::Value, CatalogError> {
    let definition = snapshot.service(service)?;
    let mut payload = base.clone();
    if let Some(map) = payload.as_object_mut() {
        map.insert("service".to_string(), json!(service));
        if let Some(service_action) = definition.provisioner_actions.get(&action) {
            map.insert(
                "serviceAction".to_string(),
                json!({
                    "type": service_action.action_type,
                    "fields": service_action.fields,
                }),
            );
        }
    }
    Ok(payload)
}

/// Errors while planning tasks for a solved layout.
#[derive(thiserror::Error, Debug)]
pub enum PlannerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Create the full provisioning task list for a freshly solved cluster.
/// Returns the tasks to enqueue, in execution order; rollback tasks are
/// registered and linked but not returned, since they only run when their
/// origin task exhausts its attempts.
pub fn plan_provision_tasks(
    cluster: &Cluster,
    nodes: &BTreeMap<String, Node>,
    snapshot: &CatalogSnapshot,
    registry: &TaskRegistry,
) -> Result<Vec<ClusterTask>, PlannerError> {
    let mut planned = Vec::new();

    for node in nodes.values() {
        let base = node_payload(cluster, node, snapshot);

        for action in [ProvisionerAction::Create, ProvisionerAction::Confirm] {
            let task = registry.create_task(&cluster.id, &node.id, None, action, base.clone());
            registry.create_attempt(&task.id)?;

            if let Some(rollback_action) = action.rollback() {
                let rollback = registry.create_task(
                    &cluster.id,
                    &node.id,
                    None,
                    rollback_action,
                    base.clone(),
                );
                registry.link_rollback(&task.id, &rollback.id)?;
            }

            planned.push(task);
        }

        // Ordered pass over all services per action keeps the per-node
        // action sequence the workers expect.
        for action in [
            ProvisionerAction::Install,
            ProvisionerAction::Configure,
            ProvisionerAction::Start,
        ] {
            for service in &node.services {
                let payload = service_payload(&base, service, action, snapshot)?;
                let task = registry.create_task(
                    &cluster.id,
                    &node.id,
                    Some(service.clone()),
                    action,
                    payload,
                );
                registry.create_attempt(&task.id)?;
                planned.push(task);
            }
        }

        debug!(cluster = %cluster.id, node = %node.id, "Planned node tasks");
    }

    // Attempts created above carry the task payload; refresh the returned
    // copies so callers see the linked rollback ids.
    let planned = planned
        .into_iter()
        .map(|t| registry.get(&t.id).unwrap_or(t))
        .collect();
    Ok(planned)
}
