//! Entity catalog: the admin-defined vocabulary of provisioning
//!
//! Providers, hardware types, image types, services and cluster templates
//! live here. The layout solver consumes read-only [`CatalogSnapshot`]s;
//! the HTTP layer mutates the live [`EntityCatalog`].

pub mod entities;
pub mod store;
pub mod template;

pub use entities::{
    HardwareType, ImageType, Provider, ProvisionerAction, Service, ServiceAction,
};
pub use store::{CatalogError, CatalogSnapshot, EntityCatalog};
pub use template::{
    ClusterDefaults, ClusterTemplate, Compatibilities, Constraints, LayoutConstraint, Ratio,
    ServiceConstraint,
};
