//! End-to-end layout solving for a realistic multi-service template
//!
//! Builds the full catalog for a Hadoop/HBase stack with an application
//! layer on top, then solves a five-node cluster and checks the exact
//! grouping, type selection and hostnames that fall out.

use std::collections::{BTreeMap, BTreeSet};

use corral::catalog::{
    ClusterDefaults, ClusterTemplate, Compatibilities, Constraints, EntityCatalog, HardwareType,
    ImageType, LayoutConstraint, Provider, Ratio, Service, ServiceConstraint,
};
use corral::cluster::{Cluster, ClusterRequest, Node};
use corral::layout::{solve_cluster_nodes, SolverError};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn constraint(
    hardware: Option<&[&str]>,
    images: Option<&[&str]>,
    min: u32,
    max: u32,
    quantum: u32,
    ratio: Option<(u32, u32)>,
) -> ServiceConstraint {
    ServiceConstraint {
        hardware_types: hardware.map(set),
        image_types: images.map(set),
        min_count: Some(min),
        max_count: Some(max),
        quantum: Some(quantum),
        ratio: ratio.map(|(numerator, denominator)| Ratio {
            numerator,
            denominator,
        }),
    }
}

/// The full catalog behind the reactor-medium template: one provider, four
/// hardware types, two images, and a Hadoop/HBase service stack with an
/// application tier on top.
fn reactor_catalog() -> EntityCatalog {
    let catalog = EntityCatalog::new();

    catalog.write_provider(Provider::new("joyent", "joyent"));

    catalog.write_hardware_type(HardwareType::new("small").with_flavor("joyent", "Small 2GB"));
    catalog.write_hardware_type(HardwareType::new("medium").with_flavor("joyent", "Medium 4GB"));
    catalog
        .write_hardware_type(HardwareType::new("large-mem").with_flavor("joyent", "Large 32GB"));
    catalog
        .write_hardware_type(HardwareType::new("large-cpu").with_flavor("joyent", "Large 16GB"));

    catalog
        .write_image_type(ImageType::new("centos6").with_image("joyent", "joyent-hash-of-centos6.4"));
    catalog
        .write_image_type(ImageType::new("ubuntu12").with_image("joyent", "joyent-hash-of-ubuntu12"));

    catalog.write_service(Service::new("zookeeper"));
    catalog.write_service(Service::new("namenode"));
    catalog.write_service(Service::new("datanode").with_dependency("namenode"));
    catalog.write_service(Service::new("resourcemanager").with_dependency("datanode"));
    catalog.write_service(Service::new("nodemanager").with_dependency("resourcemanager"));
    catalog.write_service(
        Service::new("hbasemaster")
            .with_dependency("zookeeper")
            .with_dependency("datanode"),
    );
    catalog.write_service(Service::new("regionserver").with_dependency("hbasemaster"));
    catalog.write_service(
        Service::new("reactor")
            .with_dependency("zookeeper")
            .with_dependency("regionserver")
            .with_dependency("nodemanager"),
    );

    let mut constraints = Constraints::default();
    constraints.services.insert(
        "namenode".to_string(),
        constraint(
            Some(&["large-mem"]),
            Some(&["centos6", "ubuntu12"]),
            1,
            1,
            1,
            None,
        ),
    );
    constraints.services.insert(
        "datanode".to_string(),
        constraint(
            Some(&["medium", "large-cpu"]),
            Some(&["centos6", "ubuntu12"]),
            1,
            50,
            1,
            None,
        ),
    );
    constraints.services.insert(
        "zookeeper".to_string(),
        constraint(
            Some(&["small", "medium"]),
            Some(&["centos6"]),
            1,
            5,
            2,
            Some((1, 20)),
        ),
    );
    constraints.services.insert(
        "reactor".to_string(),
        constraint(Some(&["medium", "large-mem"]), None, 1, 5, 1, Some((1, 10))),
    );
    constraints.layout = LayoutConstraint {
        must_coexist: [
            set(&["datanode", "nodemanager", "regionserver"]),
            set(&["namenode", "resourcemanager", "hbasemaster"]),
        ]
        .into_iter()
        .collect(),
        cannot_coexist: [
            set(&["datanode", "namenode"]),
            set(&["datanode", "zookeeper"]),
            set(&["namenode", "zookeeper"]),
            set(&["datanode", "reactor"]),
            set(&["namenode", "reactor"]),
        ]
        .into_iter()
        .collect(),
    };

    let all_services = set(&[
        "zookeeper",
        "namenode",
        "datanode",
        "resourcemanager",
        "nodemanager",
        "hbasemaster",
        "regionserver",
        "reactor",
    ]);

    catalog
        .write_template(ClusterTemplate {
            name: "reactor-medium".to_string(),
            description: "medium reactor cluster".to_string(),
            defaults: ClusterDefaults {
                services: all_services.clone(),
                provider: Some("joyent".to_string()),
                hardware_type: Some("medium".to_string()),
                image_type: Some("centos6".to_string()),
                config: serde_json::Value::Null,
            },
            compatibilities: Compatibilities {
                hardware_types: set(&["small", "medium", "large-mem", "large-cpu"]),
                image_types: set(&["centos6", "ubuntu12"]),
                services: all_services,
            },
            constraints,
        })
        .unwrap();

    catalog
}

fn solve_five_nodes() -> BTreeMap<String, Node> {
    let catalog = reactor_catalog();
    let request = ClusterRequest::new("mycluster", "reactor-medium", 5);
    let mut cluster = Cluster::new("00000001", "admin", "mycluster");
    cluster.provider = Some("joyent".to_string());

    solve_cluster_nodes(&cluster, &request, &catalog.snapshot()).unwrap()
}

/// Counts how many nodes host exactly the given service set.
fn count_nodes_with(nodes: &BTreeMap<String, Node>, services: &[&str]) -> usize {
    let expected = set(services);
    nodes.values().filter(|n| n.services == expected).count()
}

#[test]
fn test_reactor_medium_five_node_layout() {
    let nodes = solve_five_nodes();

    assert_eq!(nodes.len(), 5);
    assert_eq!(
        count_nodes_with(&nodes, &["hbasemaster", "namenode", "resourcemanager"]),
        1
    );
    assert_eq!(
        count_nodes_with(&nodes, &["datanode", "nodemanager", "regionserver"]),
        3
    );
    assert_eq!(count_nodes_with(&nodes, &["reactor", "zookeeper"]), 1);
}

#[test]
fn test_reactor_medium_type_selection() {
    let nodes = solve_five_nodes();

    for node in nodes.values() {
        if node.services.contains("namenode") {
            // Only large-mem satisfies the namenode.
            assert_eq!(node.hardware_type(), Some("large-mem"));
            assert_eq!(node.properties.get("flavor").map(String::as_str), Some("Large 32GB"));
        } else if node.services.contains("datanode") {
            // Template default "medium" is within the datanode's allowed set.
            assert_eq!(node.hardware_type(), Some("medium"));
        } else if node.services.contains("zookeeper") {
            // reactor {medium, large-mem} x zookeeper {small, medium}.
            assert_eq!(node.hardware_type(), Some("medium"));
        }
        // zookeeper forces centos6 on its node; everything else gets the
        // template default, which is also centos6.
        assert_eq!(node.image_type(), Some("centos6"));
        assert_eq!(
            node.properties.get("image").map(String::as_str),
            Some("joyent-hash-of-centos6.4")
        );
    }
}

#[test]
fn test_reactor_medium_hostnames() {
    let nodes = solve_five_nodes();

    let mut hostnames: Vec<&str> = nodes.values().filter_map(|n| n.hostname()).collect();
    hostnames.sort_unstable();
    assert_eq!(
        hostnames,
        vec![
            "mycluster1-1.local",
            "mycluster1-2.local",
            "mycluster1-3.local",
            "mycluster1-4.local",
            "mycluster1-5.local",
        ]
    );
}

#[test]
fn test_solver_is_deterministic() {
    let first = solve_five_nodes();
    let second = solve_five_nodes();

    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    for (id, node) in &first {
        assert_eq!(node.services, second[id].services);
        assert_eq!(node.properties, second[id].properties);
    }
}

#[test]
fn test_unknown_template_fails_with_zero_nodes() {
    let catalog = reactor_catalog();
    let request = ClusterRequest::new("mycluster", "no-such-template", 5);
    let cluster = Cluster::new("1", "admin", "mycluster");

    let result = solve_cluster_nodes(&cluster, &request, &catalog.snapshot());
    assert!(matches!(result, Err(SolverError::UnknownTemplate(_))));
}

#[test]
fn test_disallowed_service_rejected() {
    let catalog = reactor_catalog();
    catalog.write_service(Service::new("mysql"));
    let request =
        ClusterRequest::new("mycluster", "reactor-medium", 5).with_services(["mysql"]);
    let cluster = Cluster::new("1", "admin", "mycluster");

    let result = solve_cluster_nodes(&cluster, &request, &catalog.snapshot());
    match result {
        Err(SolverError::DisallowedServices { services, .. }) => {
            assert_eq!(services, vec!["mysql".to_string()]);
        }
        other => panic!("expected DisallowedServices, got {:?}", other.map(|n| n.len())),
    }
}

#[test]
fn test_missing_dependency_rejected_not_added() {
    let catalog = reactor_catalog();
    // datanode depends on namenode, which is not requested.
    let request =
        ClusterRequest::new("mycluster", "reactor-medium", 5).with_services(["datanode"]);
    let cluster = Cluster::new("1", "admin", "mycluster");

    let result = solve_cluster_nodes(&cluster, &request, &catalog.snapshot());
    match result {
        Err(SolverError::MissingDependencies { service, missing }) => {
            assert_eq!(service, "datanode");
            assert_eq!(missing, vec!["namenode".to_string()]);
        }
        other => panic!("expected MissingDependencies, got {:?}", other.map(|n| n.len())),
    }
}

#[test]
fn test_no_satisfiable_hardware_fails() {
    let catalog = reactor_catalog();
    let request = ClusterRequest::new("mycluster", "reactor-medium", 5)
        .with_hardware_type("small");
    let cluster = Cluster::new("1", "admin", "mycluster");

    // namenode only runs on large-mem, so forcing "small" cluster-wide
    // leaves its node without a candidate.
    let result = solve_cluster_nodes(&cluster, &request, &catalog.snapshot());
    assert!(matches!(result, Err(SolverError::NoSatisfiableHardware(_))));
}

#[test]
fn test_larger_cluster_scales_service_counts() {
    let catalog = reactor_catalog();
    let request = ClusterRequest::new("big", "reactor-medium", 20);
    let cluster = Cluster::new("2", "admin", "big");

    let nodes = solve_cluster_nodes(&cluster, &request, &catalog.snapshot()).unwrap();
    assert_eq!(nodes.len(), 20);

    // The master archetype stays fixed at one node however large the
    // cluster gets; the worker archetype absorbs the growth.
    let masters = nodes
        .values()
        .filter(|n| n.services.contains("namenode"))
        .count();
    assert_eq!(masters, 1);
    let workers = nodes
        .values()
        .filter(|n| n.services.contains("datanode"))
        .count();
    assert!(workers > 10, "workers = {}", workers);
}
