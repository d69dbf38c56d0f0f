//! Cluster templates
//!
//! A template is the admin-authored blueprint a cluster request is resolved
//! against: default services and types, the compatibility supersets a
//! request may draw from, and the placement constraints the layout solver
//! enforces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Immutable blueprint for a family of clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTemplate {
    /// Unique template name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Defaults applied when a request leaves fields unspecified
    pub defaults: ClusterDefaults,

    /// Supersets of what a request may ask for
    #[serde(default)]
    pub compatibilities: Compatibilities,

    /// Placement constraints enforced by the solver
    #[serde(default)]
    pub constraints: Constraints,
}

/// Defaults a request inherits when it does not specify its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterDefaults {
    /// Services deployed when a request names none
    #[serde(default)]
    pub services: BTreeSet<String>,

    /// Default provider name
    #[serde(default)]
    pub provider: Option<String>,

    /// Preferred hardware type when a node's candidate set allows it
    #[serde(rename = "hardwaretype")]
    #[serde(default)]
    pub hardware_type: Option<String>,

    /// Preferred image type when a node's candidate set allows it
    #[serde(rename = "imagetype")]
    #[serde(default)]
    pub image_type: Option<String>,

    /// Baseline configuration blob handed to provisioning workers
    #[serde(default)]
    pub config: serde_json::Value,
}

/// The supersets a request may draw from. Empty sets mean "anything in the
/// catalog".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Compatibilities {
    /// Allowed hardware type names
    #[serde(rename = "hardwaretypes")]
    #[serde(default)]
    pub hardware_types: BTreeSet<String>,

    /// Allowed image type names
    #[serde(rename = "imagetypes")]
    #[serde(default)]
    pub image_types: BTreeSet<String>,

    /// Allowed service names
    #[serde(default)]
    pub services: BTreeSet<String>,
}

impl Compatibilities {
    /// Whether the given service may be placed on clusters of this template
    pub fn compatible_with_service(&self, service: &str) -> bool {
        self.services.is_empty() || self.services.contains(service)
    }

    pub fn compatible_with_hardware(&self, hardware_type: &str) -> bool {
        self.hardware_types.is_empty() || self.hardware_types.contains(hardware_type)
    }

    pub fn compatible_with_image(&self, image_type: &str) -> bool {
        self.image_types.is_empty() || self.image_types.contains(image_type)
    }
}

/// All placement constraints of a template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    /// Per-service cardinality and type restrictions, keyed by service name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConstraint>,

    /// Cross-service co-location rules
    #[serde(default)]
    pub layout: LayoutConstraint,
}

/// Bounded numerator/denominator pair: at most `numerator` service
/// instances per `denominator` cluster nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    /// Maximum instance count this ratio allows for a cluster of `total`
    /// nodes, rounded up so small clusters still get one instance.
    pub fn cap(&self, total: u32) -> u32 {
        if self.denominator == 0 {
            return total;
        }
        (total * self.numerator).div_ceil(self.denominator)
    }
}

/// Cardinality and type restrictions for a single service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConstraint {
    /// Hardware types the service may run on. `None` means all.
    #[serde(rename = "hardwaretypes")]
    #[serde(default)]
    pub hardware_types: Option<BTreeSet<String>>,

    /// Image types the service may run on. `None` means all.
    #[serde(rename = "imagetypes")]
    #[serde(default)]
    pub image_types: Option<BTreeSet<String>>,

    /// Minimum number of nodes running the service
    #[serde(rename = "minCount")]
    #[serde(default)]
    pub min_count: Option<u32>,

    /// Maximum number of nodes running the service
    #[serde(rename = "maxCount")]
    #[serde(default)]
    pub max_count: Option<u32>,

    /// Target of roughly one instance per `quantum` cluster nodes
    #[serde(default)]
    pub quantum: Option<u32>,

    /// Upper bound on instances relative to cluster size
    #[serde(default)]
    pub ratio: Option<Ratio>,
}

impl ServiceConstraint {
    /// Checks internal consistency: `min <= max` and, when a ratio is
    /// present, a non-zero denominator.
    pub fn is_valid(&self) -> bool {
        if let (Some(min), Some(max)) = (self.min_count, self.max_count) {
            if min > max {
                return false;
            }
        }
        if let Some(ratio) = self.ratio {
            if ratio.denominator == 0 {
                return false;
            }
        }
        true
    }

    /// Whether the service may run on the named hardware type
    pub fn allows_hardware(&self, hardware_type: &str) -> bool {
        match &self.hardware_types {
            Some(set) => set.contains(hardware_type),
            None => true,
        }
    }

    /// Whether the service may run on the named image type
    pub fn allows_image(&self, image_type: &str) -> bool {
        match &self.image_types {
            Some(set) => set.contains(image_type),
            None => true,
        }
    }
}

/// Co-location rules across services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConstraint {
    /// If a node hosts any service of such a set, it hosts them all
    #[serde(rename = "mustcoexist")]
    #[serde(default)]
    pub must_coexist: BTreeSet<BTreeSet<String>>,

    /// No single node may host two services of the same set
    #[serde(rename = "cantcoexist")]
    #[serde(default)]
    pub cannot_coexist: BTreeSet<BTreeSet<String>>,
}

impl LayoutConstraint {
    /// Whether a node hosting exactly `services` violates any
    /// cannot-coexist rule.
    pub fn violates_cannot_coexist(&self, services: &BTreeSet<String>) -> bool {
        self.cannot_coexist
            .iter()
            .any(|set| set.iter().filter(|s| services.contains(*s)).count() > 1)
    }
}
