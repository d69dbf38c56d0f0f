//! Admin-defined catalog entities
//!
//! Providers, hardware types, image types and services are registered by
//! administrators and referenced by name from cluster templates. The layout
//! solver only ever sees immutable snapshots of these entities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A cloud or bare-metal provider that provisioning workers know how to
/// drive (e.g. "joyent", "rackspace", "openstack").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Unique provider name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Which worker plugin handles this provider
    #[serde(rename = "providerType")]
    pub provider_type: String,

    /// Provider-specific settings passed through to workers (credentials,
    /// endpoints, regions)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Provider {
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider_type: provider_type.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// An abstract hardware flavor ("small", "medium", "large-mem") mapped per
/// provider onto the provider's native flavor identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareType {
    /// Unique hardware type name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Provider name -> provider-specific properties. The "flavor" key is
    /// what workers pass to the provider API.
    #[serde(rename = "providerMap")]
    #[serde(default)]
    pub provider_map: BTreeMap<String, BTreeMap<String, String>>,
}

impl HardwareType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider_map: BTreeMap::new(),
        }
    }

    /// Map this hardware type onto a provider flavor
    pub fn with_flavor(mut self, provider: &str, flavor: &str) -> Self {
        self.provider_map
            .entry(provider.to_string())
            .or_default()
            .insert("flavor".to_string(), flavor.to_string());
        self
    }

    /// Whether this type can be provisioned on the given provider
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.provider_map.contains_key(provider)
    }

    /// The provider-native flavor identifier, if mapped
    pub fn flavor_for(&self, provider: &str) -> Option<&str> {
        self.provider_map
            .get(provider)
            .and_then(|m| m.get("flavor"))
            .map(String::as_str)
    }
}

/// An abstract machine image ("centos6", "ubuntu12") mapped per provider
/// onto the provider's native image identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageType {
    /// Unique image type name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Provider name -> provider-specific properties. The "image" key is
    /// what workers pass to the provider API.
    #[serde(rename = "providerMap")]
    #[serde(default)]
    pub provider_map: BTreeMap<String, BTreeMap<String, String>>,
}

impl ImageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider_map: BTreeMap::new(),
        }
    }

    /// Map this image type onto a provider image id
    pub fn with_image(mut self, provider: &str, image: &str) -> Self {
        self.provider_map
            .entry(provider.to_string())
            .or_default()
            .insert("image".to_string(), image.to_string());
        self
    }

    /// Whether this type can be provisioned on the given provider
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.provider_map.contains_key(provider)
    }

    /// The provider-native image identifier, if mapped
    pub fn image_for(&self, provider: &str) -> Option<&str> {
        self.provider_map
            .get(provider)
            .and_then(|m| m.get("image"))
            .map(String::as_str)
    }
}

/// Remote actions a provisioning worker can execute against a node or a
/// service on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProvisionerAction {
    /// Request the machine from the provider
    Create,
    /// Confirm the machine came up and is reachable
    Confirm,
    /// Bootstrap base tooling onto the machine
    Bootstrap,
    /// Install a service's software
    Install,
    /// Write a service's configuration
    Configure,
    /// One-time service initialization
    Initialize,
    /// Start a service
    Start,
    /// Stop a service
    Stop,
    /// Remove a service's software
    Remove,
    /// Tear the machine down at the provider
    Delete,
}

impl ProvisionerAction {
    /// The compensating action to run if this action's task ultimately
    /// fails, if any. Only machine-creating actions leave state behind that
    /// must be undone.
    pub fn rollback(&self) -> Option<ProvisionerAction> {
        match self {
            ProvisionerAction::Create | ProvisionerAction::Confirm => {
                Some(ProvisionerAction::Delete)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ProvisionerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionerAction::Create => "CREATE",
            ProvisionerAction::Confirm => "CONFIRM",
            ProvisionerAction::Bootstrap => "BOOTSTRAP",
            ProvisionerAction::Install => "INSTALL",
            ProvisionerAction::Configure => "CONFIGURE",
            ProvisionerAction::Initialize => "INITIALIZE",
            ProvisionerAction::Start => "START",
            ProvisionerAction::Stop => "STOP",
            ProvisionerAction::Remove => "REMOVE",
            ProvisionerAction::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

/// How a worker carries out one provisioner action for a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAction {
    /// Which automator plugin runs the action (e.g. "chef", "shell")
    #[serde(rename = "type")]
    pub action_type: String,

    /// Plugin-specific fields (script path, recipe name, arguments)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// A deployable service definition ("namenode", "zookeeper").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Names of services this service depends on. The solver requires the
    /// full dependency closure to be present in a cluster request.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Action payloads keyed by provisioner action
    #[serde(rename = "provisionerActions")]
    #[serde(default)]
    pub provisioner_actions: BTreeMap<ProvisionerAction, ServiceAction>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            dependencies: BTreeSet::new(),
            provisioner_actions: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }
}
