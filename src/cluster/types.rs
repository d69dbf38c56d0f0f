//! Cluster, node and request value types

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How hard the solver should try when a first layout pass fails.
/// Currently only the balanced single-pass strategy is implemented; the
/// variant carrying an attempt count is accepted for forward
/// compatibility with request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStrategy {
    #[default]
    Balanced,
    Attempts(u32),
}

/// A user request to create (or resize) a cluster from a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRequest {
    /// Requested cluster name, also the hostname seed
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Template the request resolves against
    #[serde(rename = "clusterTemplate")]
    pub cluster_template: String,

    /// Total number of nodes to lay out
    #[serde(rename = "numMachines")]
    pub num_machines: u32,

    /// Provider override; template default applies when absent
    #[serde(default)]
    pub provider: Option<String>,

    /// Explicit service subset; template defaults apply when absent
    #[serde(default)]
    pub services: Option<BTreeSet<String>>,

    /// Require every node to use this hardware type
    #[serde(rename = "hardwaretype")]
    #[serde(default)]
    pub hardware_type: Option<String>,

    /// Require every node to use this image type
    #[serde(rename = "imagetype")]
    #[serde(default)]
    pub image_type: Option<String>,

    /// Layout strategy flag
    #[serde(default)]
    pub strategy: LayoutStrategy,
}

impl ClusterRequest {
    pub fn new(
        name: impl Into<String>,
        cluster_template: impl Into<String>,
        num_machines: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cluster_template: cluster_template.into(),
            num_machines,
            provider: None,
            services: None,
            hardware_type: None,
            image_type: None,
            strategy: LayoutStrategy::Balanced,
        }
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.services = Some(services.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_hardware_type(mut self, hardware_type: impl Into<String>) -> Self {
        self.hardware_type = Some(hardware_type.into());
        self
    }

    pub fn with_image_type(mut self, image_type: impl Into<String>) -> Self {
        self.image_type = Some(image_type.into());
        self
    }
}

/// A provisioned (or being-provisioned) cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique cluster id
    pub id: String,

    /// Who requested the cluster
    pub owner: String,

    /// Cluster name (hostname seed)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Creation timestamp
    #[serde(rename = "createTime")]
    pub create_time: DateTime<Utc>,

    /// Chosen provider name
    #[serde(default)]
    pub provider: Option<String>,

    /// Template the cluster was created from
    #[serde(rename = "clusterTemplate")]
    #[serde(default)]
    pub cluster_template: Option<String>,

    /// Resolved services running on the cluster
    #[serde(default)]
    pub services: BTreeSet<String>,

    /// Ids of the cluster's nodes
    #[serde(default)]
    pub nodes: BTreeSet<String>,
}

impl Cluster {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
            description: String::new(),
            create_time: Utc::now(),
            provider: None,
            cluster_template: None,
            services: BTreeSet::new(),
            nodes: BTreeSet::new(),
        }
    }
}

/// Well-known node property keys written by the solver.
pub mod properties {
    pub const HARDWARE_TYPE: &str = "hardwaretype";
    pub const FLAVOR: &str = "flavor";
    pub const IMAGE_TYPE: &str = "imagetype";
    pub const IMAGE: &str = "image";
    pub const HOSTNAME: &str = "hostname";
}

/// One machine slot in a cluster, as resolved by the layout solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id, stable across solver runs for the same inputs
    pub id: String,

    /// Owning cluster id
    #[serde(rename = "clusterId")]
    pub cluster_id: String,

    /// Services assigned to this node
    #[serde(default)]
    pub services: BTreeSet<String>,

    /// Property bag: hardware/image identifiers, hostname, plus any
    /// provider-specific keys
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_id: cluster_id.into(),
            services: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.properties.get(properties::HOSTNAME).map(String::as_str)
    }

    pub fn hardware_type(&self) -> Option<&str> {
        self.properties
            .get(properties::HARDWARE_TYPE)
            .map(String::as_str)
    }

    pub fn image_type(&self) -> Option<&str> {
        self.properties
            .get(properties::IMAGE_TYPE)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ClusterRequest::new("mycluster", "reactor-medium", 5)
            .with_provider("joyent")
            .with_services(["namenode", "datanode"]);

        assert_eq!(request.num_machines, 5);
        assert_eq!(request.provider.as_deref(), Some("joyent"));
        assert_eq!(request.services.as_ref().unwrap().len(), 2);
        assert_eq!(request.strategy, LayoutStrategy::Balanced);
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "name": "mycluster",
            "clusterTemplate": "reactor-medium",
            "numMachines": 5,
            "provider": "joyent"
        }"#;

        let request: ClusterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.cluster_template, "reactor-medium");
        assert!(request.services.is_none());
    }

    #[test]
    fn test_node_properties() {
        let mut node = Node::new("c1-1", "c1");
        node.properties
            .insert(properties::HOSTNAME.to_string(), "host-1-1.local".to_string());
        node.properties
            .insert(properties::HARDWARE_TYPE.to_string(), "medium".to_string());

        assert_eq!(node.hostname(), Some("host-1-1.local"));
        assert_eq!(node.hardware_type(), Some("medium"));
        assert_eq!(node.image_type(), None);
    }
}
