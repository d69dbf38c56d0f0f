//! In-memory entity catalog
//!
//! The catalog is the live, admin-mutable registry of provisioning
//! entities. The solver never reads it directly: callers take a
//! [`CatalogSnapshot`] first so concurrent catalog edits cannot produce an
//! inconsistent assignment mid-solve.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use super::entities::{HardwareType, ImageType, Provider, Service};
use super::template::ClusterTemplate;

/// Errors from catalog lookups and writes
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("Hardware type '{0}' not found")]
    HardwareTypeNotFound(String),

    #[error("Image type '{0}' not found")]
    ImageTypeNotFound(String),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Cluster template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),
}

/// Live catalog of admin-defined entities, indexed by name.
#[derive(Clone, Default)]
pub struct EntityCatalog {
    providers: Arc<DashMap<String, Provider>>,
    hardware_types: Arc<DashMap<String, HardwareType>>,
    image_types: Arc<DashMap<String, ImageType>>,
    services: Arc<DashMap<String, Service>>,
    templates: Arc<DashMap<String, ClusterTemplate>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Writes (create or replace by name)
    // =========================================================================

    pub fn write_provider(&self, provider: Provider) {
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn write_hardware_type(&self, hardware_type: HardwareType) {
        self.hardware_types
            .insert(hardware_type.name.clone(), hardware_type);
    }

    pub fn write_image_type(&self, image_type: ImageType) {
        self.image_types.insert(image_type.name.clone(), image_type);
    }

    pub fn write_service(&self, service: Service) {
        self.services.insert(service.name.clone(), service);
    }

    /// Store a template after checking its constraints are well-formed.
    pub fn write_template(&self, template: ClusterTemplate) -> Result<(), CatalogError> {
        for (name, constraint) in &template.constraints.services {
            if !constraint.is_valid() {
                return Err(CatalogError::InvalidEntity(format!(
                    "service constraint for '{}' in template '{}' is inconsistent",
                    name, template.name
                )));
            }
        }
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_provider(&self, name: &str) -> Option<Provider> {
        self.providers.get(name).map(|r| r.clone())
    }

    pub fn get_hardware_type(&self, name: &str) -> Option<HardwareType> {
        self.hardware_types.get(name).map(|r| r.clone())
    }

    pub fn get_image_type(&self, name: &str) -> Option<ImageType> {
        self.image_types.get(name).map(|r| r.clone())
    }

    pub fn get_service(&self, name: &str) -> Option<Service> {
        self.services.get(name).map(|r| r.clone())
    }

    pub fn get_template(&self, name: &str) -> Option<ClusterTemplate> {
        self.templates.get(name).map(|r| r.clone())
    }

    pub fn list_providers(&self) -> Vec<Provider> {
        self.providers.iter().map(|r| r.clone()).collect()
    }

    pub fn list_hardware_types(&self) -> Vec<HardwareType> {
        self.hardware_types.iter().map(|r| r.clone()).collect()
    }

    pub fn list_image_types(&self) -> Vec<ImageType> {
        self.image_types.iter().map(|r| r.clone()).collect()
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.services.iter().map(|r| r.clone()).collect()
    }

    pub fn list_templates(&self) -> Vec<ClusterTemplate> {
        self.templates.iter().map(|r| r.clone()).collect()
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    pub fn delete_provider(&self, name: &str) -> Result<Provider, CatalogError> {
        self.providers
            .remove(name)
            .map(|(_, p)| p)
            .ok_or_else(|| CatalogError::ProviderNotFound(name.to_string()))
    }

    pub fn delete_hardware_type(&self, name: &str) -> Result<HardwareType, CatalogError> {
        self.hardware_types
            .remove(name)
            .map(|(_, h)| h)
            .ok_or_else(|| CatalogError::HardwareTypeNotFound(name.to_string()))
    }

    pub fn delete_image_type(&self, name: &str) -> Result<ImageType, CatalogError> {
        self.image_types
            .remove(name)
            .map(|(_, i)| i)
            .ok_or_else(|| CatalogError::ImageTypeNotFound(name.to_string()))
    }

    pub fn delete_service(&self, name: &str) -> Result<Service, CatalogError> {
        self.services
            .remove(name)
            .map(|(_, s)| s)
            .ok_or_else(|| CatalogError::ServiceNotFound(name.to_string()))
    }

    pub fn delete_template(&self, name: &str) -> Result<ClusterTemplate, CatalogError> {
        self.templates
            .remove(name)
            .map(|(_, t)| t)
            .ok_or_else(|| CatalogError::TemplateNotFound(name.to_string()))
    }

    /// Take a consistent point-in-time copy for a solve call.
    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            providers: self
                .providers
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
            hardware_types: self
                .hardware_types
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
            image_types: self
                .image_types
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
            services: self
                .services
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
            templates: self
                .templates
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        }
    }
}

/// Immutable point-in-time view of the catalog. The solver reads only from
/// snapshots, which also makes it trivially testable with synthetic
/// catalogs.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub providers: BTreeMap<String, Provider>,
    pub hardware_types: BTreeMap<String, HardwareType>,
    pub image_types: BTreeMap<String, ImageType>,
    pub services: BTreeMap<String, Service>,
    pub templates: BTreeMap<String, ClusterTemplate>,
}

impl CatalogSnapshot {
    pub fn provider(&self, name: &str) -> Result<&Provider, CatalogError> {
        self.providers
            .get(name)
            .ok_or_else(|| CatalogError::ProviderNotFound(name.to_string()))
    }

    pub fn service(&self, name: &str) -> Result<&Service, CatalogError> {
        self.services
            .get(name)
            .ok_or_else(|| CatalogError::ServiceNotFound(name.to_string()))
    }

    pub fn template(&self, name: &str) -> Result<&ClusterTemplate, CatalogError> {
        self.templates
            .get(name)
            .ok_or_else(|| CatalogError::TemplateNotFound(name.to_string()))
    }

    /// Hardware type names usable on the given provider
    pub fn hardware_for_provider(&self, provider: &str) -> BTreeMap<String, &HardwareType> {
        self.hardware_types
            .iter()
            .filter(|(_, hw)| hw.supports_provider(provider))
            .map(|(name, hw)| (name.clone(), hw))
            .collect()
    }

    /// Image type names usable on the given provider
    pub fn images_for_provider(&self, provider: &str) -> BTreeMap<String, &ImageType> {
        self.image_types
            .iter()
            .filter(|(_, img)| img.supports_provider(provider))
            .map(|(name, img)| (name.clone(), img))
            .collect()
    }
}
