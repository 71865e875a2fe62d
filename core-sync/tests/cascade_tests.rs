//! CVM-with-related-resources syncs and EIP association flows.

mod common;

use bridge_traits::resource::ResourceKind;
use bridge_traits::vendor::EipAssociation;
use common::{
    cvm, disk, eip, huawei_eip, huawei_port, huawei_scope, huawei_server, huawei_volume, scope,
    Harness,
};
use core_inventory::RelationKind;
use core_sync::{SyncError, SyncOptions};

async fn seed(h: &Harness) {
    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &[]));
    h.cloud.put(ResourceKind::Eip, eip("eip-1", None));
    let options = SyncOptions::default();
    for kind in [ResourceKind::Cvm, ResourceKind::Eip] {
        h.orchestrator.sync(kind, &scope(), &options).await.unwrap();
    }
}

/// A HuaWei server with one port and an unbound EIP, stored by plain passes.
async fn seed_huawei(h: &Harness) {
    h.cloud.put(ResourceKind::Cvm, huawei_server("ecs-1", &[], &["port-1"]));
    h.cloud.put(ResourceKind::NetworkInterface, huawei_port("port-1", "ecs-1"));
    h.cloud.put(ResourceKind::Eip, huawei_eip("eip-1", None));
    let options = SyncOptions::default();
    for kind in [ResourceKind::Cvm, ResourceKind::NetworkInterface, ResourceKind::Eip] {
        h.orchestrator.sync(kind, &huawei_scope(), &options).await.unwrap();
    }
}

// ============================================================================
// Cascade
// ============================================================================

#[tokio::test]
async fn instance_reported_disks_are_synced_and_linked() {
    let h = Harness::new().await;
    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &["disk-1", "disk-2"]));
    h.cloud.put(ResourceKind::Disk, disk("disk-1", Some("ins-1")));
    h.cloud.put(ResourceKind::Disk, disk("disk-2", Some("ins-1")));
    h.cloud.put(ResourceKind::Disk, disk("disk-9", None));

    let report = h
        .cascade()
        .sync_with_related(&scope(), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats_of(ResourceKind::Disk).created, 2);
    assert_eq!(report.stats_of(ResourceKind::Cvm).created, 1);
    assert_eq!(report.edges[&ResourceKind::Disk].created, 2);

    // disk-9 is not related to any instance and stays out of the cascade.
    let disks: Vec<String> = h
        .stored(ResourceKind::Disk)
        .await
        .into_iter()
        .map(|d| d.cloud_id)
        .collect();
    assert_eq!(disks, vec!["disk-1".to_string(), "disk-2".to_string()]);
    assert_eq!(h.edges(RelationKind::DiskCvm).await.len(), 2);
}

#[tokio::test]
async fn detached_disk_loses_its_edge() {
    let h = Harness::new().await;
    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &["disk-1"]));
    h.cloud.put(ResourceKind::Disk, disk("disk-1", Some("ins-1")));
    let cascade = h.cascade();
    cascade
        .sync_with_related(&scope(), &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(h.edges(RelationKind::DiskCvm).await.len(), 1);

    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &[]));
    h.cloud.put(ResourceKind::Disk, disk("disk-1", None));
    let report = cascade
        .sync_with_related(&scope(), &SyncOptions::default())
        .await
        .unwrap();

    // The disk is still found through its old edge and re-synced.
    assert_eq!(report.stats_of(ResourceKind::Disk).updated, 1);
    assert!(h.edges(RelationKind::DiskCvm).await.is_empty());
    assert_eq!(h.stored(ResourceKind::Disk).await.len(), 1);
}

#[tokio::test]
async fn instances_are_listed_once_per_cascade() {
    let h = Harness::new().await;
    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &["disk-1"]));
    h.cloud.put(ResourceKind::Disk, disk("disk-1", Some("ins-1")));

    let report = h
        .cascade()
        .sync_with_related(&scope(), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats_of(ResourceKind::Cvm).created, 1);
    assert_eq!(h.cloud.listed(ResourceKind::Cvm), 1);
}

#[tokio::test]
async fn interface_vendor_cascade_links_volumes_and_ports() {
    let h = Harness::huawei().await;
    h.cloud.put(ResourceKind::Cvm, huawei_server("ecs-1", &["vol-1"], &["port-1"]));
    h.cloud.put(ResourceKind::Disk, huawei_volume("vol-1", "ecs-1"));
    h.cloud.put(ResourceKind::NetworkInterface, huawei_port("port-1", "ecs-1"));

    let report = h
        .cascade()
        .sync_with_related(&huawei_scope(), &SyncOptions::default())
        .await
        .unwrap();

    let kinds: Vec<ResourceKind> = report.passes.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![ResourceKind::Disk, ResourceKind::Cvm, ResourceKind::NetworkInterface]
    );
    assert_eq!(report.stats_of(ResourceKind::NetworkInterface).created, 1);
    assert_eq!(report.edges[&ResourceKind::Disk].created, 1);

    let cvm_id = h.stored_id(ResourceKind::Cvm, "ecs-1").await;
    let port_id = h.stored_id(ResourceKind::NetworkInterface, "port-1").await;
    assert_eq!(
        h.edges(RelationKind::NetworkInterfaceCvm).await,
        vec![(port_id, cvm_id)]
    );
    assert_eq!(h.edges(RelationKind::DiskCvm).await.len(), 1);
}

#[tokio::test]
async fn eip_follows_a_swapped_interface_in_one_cascade() {
    let h = Harness::huawei().await;
    seed_huawei(&h).await;
    h.cloud.put(ResourceKind::Eip, huawei_eip("eip-1", Some("port-1")));
    h.orchestrator
        .sync(ResourceKind::Eip, &huawei_scope(), &SyncOptions::default())
        .await
        .unwrap();
    let eip_id = h.stored_id(ResourceKind::Eip, "eip-1").await;
    let cvm_id = h.stored_id(ResourceKind::Cvm, "ecs-1").await;
    assert_eq!(
        h.edges(RelationKind::EipCvm).await,
        vec![(eip_id.clone(), cvm_id.clone())]
    );

    // port-1 is replaced by port-2 and the EIP is rebound to it. The EIP
    // status stays ACTIVE.
    h.cloud.remove(ResourceKind::NetworkInterface, "port-1");
    h.cloud.put(ResourceKind::NetworkInterface, huawei_port("port-2", "ecs-1"));
    h.cloud.put(ResourceKind::Cvm, huawei_server("ecs-1", &[], &["port-2"]));
    h.cloud.put(ResourceKind::Eip, huawei_eip("eip-1", Some("port-2")));

    let report = h
        .cascade()
        .sync_with_related(&huawei_scope(), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats_of(ResourceKind::Eip).unchanged, 1);
    assert_eq!(report.stats_of(ResourceKind::NetworkInterface).created, 1);
    assert_eq!(report.stats_of(ResourceKind::NetworkInterface).deleted, 1);
    assert_eq!(report.edges[&ResourceKind::Eip].created, 1);
    assert_eq!(h.edges(RelationKind::EipCvm).await, vec![(eip_id, cvm_id)]);

    let ports: Vec<String> = h
        .stored(ResourceKind::NetworkInterface)
        .await
        .into_iter()
        .map(|p| p.cloud_id)
        .collect();
    assert_eq!(ports, vec!["port-2".to_string()]);
}

#[tokio::test]
async fn empty_instance_snapshot_runs_plain_cvm_sync() {
    let h = Harness::new().await;
    h.cloud.put(ResourceKind::Cvm, cvm("ins-1", &[]));
    h.orchestrator
        .sync(ResourceKind::Cvm, &scope(), &SyncOptions::default())
        .await
        .unwrap();

    h.cloud.remove(ResourceKind::Cvm, "ins-1");
    let report = h
        .cascade()
        .sync_with_related(&scope(), &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.stats_of(ResourceKind::Cvm).deleted, 1);
    assert!(report.edges.is_empty());
}

// ============================================================================
// EIP association
// ============================================================================

#[tokio::test]
async fn confirmed_association_keeps_edge() {
    let h = Harness::new().await;
    seed(&h).await;

    h.cascade()
        .associate_eip(
            &scope(),
            &EipAssociation::new("eip-1", "ins-1"),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    let eip_id = h.stored_id(ResourceKind::Eip, "eip-1").await;
    let cvm_id = h.stored_id(ResourceKind::Cvm, "ins-1").await;
    assert_eq!(h.edges(RelationKind::EipCvm).await, vec![(eip_id, cvm_id)]);

    let stored = h.stored(ResourceKind::Eip).await;
    assert_eq!(stored[0].status, "BIND");
}

#[tokio::test]
async fn unconfirmed_association_is_rolled_back_by_resync() {
    let h = Harness::new().await;
    seed(&h).await;
    h.cloud.ignore_associations();

    h.cascade()
        .associate_eip(
            &scope(),
            &EipAssociation::new("eip-1", "ins-1"),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert!(h.edges(RelationKind::EipCvm).await.is_empty());
    assert_eq!(h.stored(ResourceKind::Eip).await[0].status, "UNBIND");
}

#[tokio::test]
async fn disassociation_removes_edge() {
    let h = Harness::new().await;
    seed(&h).await;
    let cascade = h.cascade();
    let request = EipAssociation::new("eip-1", "ins-1");
    cascade
        .associate_eip(&scope(), &request, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(h.edges(RelationKind::EipCvm).await.len(), 1);

    cascade
        .disassociate_eip(&scope(), &request, &SyncOptions::default())
        .await
        .unwrap();

    assert!(h.edges(RelationKind::EipCvm).await.is_empty());
    assert_eq!(h.stored(ResourceKind::Eip).await[0].status, "UNBIND");
}

#[tokio::test]
async fn confirmed_interface_association_keeps_edge() {
    let h = Harness::huawei().await;
    seed_huawei(&h).await;
    assert!(h.edges(RelationKind::EipCvm).await.is_empty());

    let report = h
        .cascade()
        .associate_eip(
            &huawei_scope(),
            &EipAssociation::new("eip-1", "ecs-1").with_network_interface("port-1"),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.stats_of(ResourceKind::Eip).updated, 1);
    assert!(report
        .passes
        .iter()
        .any(|p| p.kind == ResourceKind::NetworkInterface));

    let eip_id = h.stored_id(ResourceKind::Eip, "eip-1").await;
    let cvm_id = h.stored_id(ResourceKind::Cvm, "ecs-1").await;
    assert_eq!(h.edges(RelationKind::EipCvm).await, vec![(eip_id, cvm_id)]);
    assert_eq!(h.stored(ResourceKind::Eip).await[0].status, "ACTIVE");
    assert_eq!(h.edges(RelationKind::NetworkInterfaceCvm).await.len(), 1);
}

#[tokio::test]
async fn unconfirmed_interface_association_is_rolled_back() {
    let h = Harness::huawei().await;
    seed_huawei(&h).await;
    h.cloud.ignore_associations();

    h.cascade()
        .associate_eip(
            &huawei_scope(),
            &EipAssociation::new("eip-1", "ecs-1").with_network_interface("port-1"),
            &SyncOptions::default(),
        )
        .await
        .unwrap();

    assert!(h.edges(RelationKind::EipCvm).await.is_empty());
    assert_eq!(h.stored(ResourceKind::Eip).await[0].status, "DOWN");
}

#[tokio::test]
async fn interface_association_without_a_port_is_rejected() {
    let h = Harness::huawei().await;
    seed_huawei(&h).await;

    let result = h
        .cascade()
        .associate_eip(
            &huawei_scope(),
            &EipAssociation::new("eip-1", "ecs-1"),
            &SyncOptions::default(),
        )
        .await;

    assert!(result.is_err());
    assert!(h.edges(RelationKind::EipCvm).await.is_empty());
}

#[tokio::test]
async fn association_needs_a_registered_client() {
    let h = Harness::new().await;
    let scope = bridge_traits::resource::SyncScope::new(
        bridge_traits::resource::Vendor::Aws,
        "acct-1",
        "us-east-1",
    );

    let result = h
        .cascade()
        .associate_eip(
            &scope,
            &EipAssociation::new("eipalloc-1", "i-1"),
            &SyncOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(SyncError::UnsupportedResource { .. })));
}
