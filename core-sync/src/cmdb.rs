//! # CMDB Bridge
//!
//! Mirrors converged CVM records into the CMDB as cloud hosts of their
//! business. Records that have not been assigned a business are never sent.

use std::collections::BTreeMap;
use std::sync::Arc;

use bridge_traits::cmdb::{
    cmdb_vendor_code, AddCloudHostRequest, CmdbClient, CmdbHost, CmdbHostStatus,
    DeleteCloudHostRequest, CMDB_HOST_BATCH_LIMIT,
};
use bridge_traits::resource::{ResourceKind, Vendor, UNASSIGNED_BUSINESS};
use core_inventory::repositories::{PageRequest, MAX_PAGE_SIZE};
use core_inventory::{ResourceFilter, ResourceRecord, ResourceStore};
use core_runtime::events::{CmdbEvent, CoreEvent, EventBus};
use tracing::{info, instrument, warn};

use crate::{Result, SyncError};

/// CMDB host status of a vendor instance status.
pub fn host_status(vendor: Vendor, status: &str) -> CmdbHostStatus {
    use CmdbHostStatus::*;

    match (vendor, status) {
        (Vendor::TCloud, "RUNNING") => Running,
        (Vendor::TCloud, "STOPPED" | "SHUTDOWN") => Stopped,
        (Vendor::TCloud, "STARTING") => Starting,
        (Vendor::TCloud, "STOPPING") => Stopping,
        (Vendor::TCloud, "TERMINATING") => Terminated,

        (Vendor::Aws, "running") => Running,
        (Vendor::Aws, "shutting-down" | "stopping") => Stopping,
        (Vendor::Aws, "stopped") => Stopped,
        (Vendor::Aws, "terminated") => Terminated,

        (Vendor::Gcp, "STAGING") => Starting,
        (Vendor::Gcp, "RUNNING") => Running,
        (Vendor::Gcp, "STOPPING" | "SUSPENDING") => Stopping,
        (Vendor::Gcp, "SUSPENDED") => Stopped,
        (Vendor::Gcp, "TERMINATED") => Terminated,

        (Vendor::Azure, "PowerState/running") => Running,
        (Vendor::Azure, "PowerState/stopped" | "PowerState/deallocated") => Stopped,
        (Vendor::Azure, "PowerState/deallocating") => Stopping,

        (Vendor::HuaWei, "ACTIVE") => Running,
        (Vendor::HuaWei, "SHUTOFF") => Stopped,
        (Vendor::HuaWei, "DELETED") => Terminated,

        _ => Unknown,
    }
}

/// CMDB host payload of a CVM record.
pub fn to_host(record: &ResourceRecord) -> CmdbHost {
    CmdbHost {
        bk_cloud_vendor: cmdb_vendor_code(record.vendor).to_string(),
        bk_cloud_inst_id: record.cloud_id.clone(),
        bk_cloud_host_status: host_status(record.vendor, &record.status).code().to_string(),
        bk_cloud_id: 0,
        bk_cloud_region: record.region.clone(),
        bk_host_innerip: record.extension.private_ips().join(","),
        bk_host_outerip: record.extension.public_ips().join(","),
        bk_host_name: record.name.clone().unwrap_or_default(),
    }
}

pub struct CmdbBridge {
    client: Arc<dyn CmdbClient>,
    resources: Arc<dyn ResourceStore>,
    event_bus: EventBus,
}

impl CmdbBridge {
    pub fn new(
        client: Arc<dyn CmdbClient>,
        resources: Arc<dyn ResourceStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            client,
            resources,
            event_bus,
        }
    }

    /// Register or refresh CVM records as hosts of `business_id`.
    ///
    /// Returns the number of hosts sent. Non-CVM records are ignored.
    #[instrument(skip(self, records), fields(vendor = %vendor, count = records.len()))]
    pub async fn upsert(
        &self,
        business_id: i64,
        vendor: Vendor,
        records: &[ResourceRecord],
    ) -> Result<u64> {
        if business_id == UNASSIGNED_BUSINESS {
            return Ok(0);
        }

        let hosts: Vec<CmdbHost> = records
            .iter()
            .filter(|r| r.kind == ResourceKind::Cvm && r.vendor == vendor)
            .map(to_host)
            .collect();
        if hosts.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        for chunk in hosts.chunks(CMDB_HOST_BATCH_LIMIT) {
            self.client
                .add_cloud_host_to_biz(AddCloudHostRequest {
                    bk_biz_id: business_id,
                    host_info: chunk.to_vec(),
                })
                .await
                .map_err(|e| self.forward_failed(vendor, e.to_string()))?;
            sent += chunk.len() as u64;
        }

        info!(count = sent, "[{}] upsert cmdb hosts success", vendor);
        self.event_bus
            .emit(CoreEvent::Cmdb(CmdbEvent::HostsUpserted {
                business_id,
                vendor: vendor.to_string(),
                count: sent,
            }))
            .ok();
        Ok(sent)
    }

    /// Remove hosts of `business_id` by cloud instance id.
    ///
    /// Instances the CMDB does not know are skipped.
    #[instrument(skip(self, cloud_ids), fields(vendor = %vendor, count = cloud_ids.len()))]
    pub async fn delete(&self, business_id: i64, vendor: Vendor, cloud_ids: &[String]) -> Result<u64> {
        if business_id == UNASSIGNED_BUSINESS || cloud_ids.is_empty() {
            return Ok(0);
        }

        let mut host_ids = Vec::new();
        for chunk in cloud_ids.chunks(CMDB_HOST_BATCH_LIMIT) {
            let hosts = self
                .client
                .list_biz_hosts(business_id, vendor, chunk)
                .await
                .map_err(|e| self.forward_failed(vendor, e.to_string()))?;
            host_ids.extend(hosts.into_iter().map(|h| h.bk_host_id));
        }

        let mut removed = 0;
        for chunk in host_ids.chunks(CMDB_HOST_BATCH_LIMIT) {
            self.client
                .delete_cloud_host_from_biz(DeleteCloudHostRequest {
                    bk_biz_id: business_id,
                    bk_host_ids: chunk.to_vec(),
                })
                .await
                .map_err(|e| self.forward_failed(vendor, e.to_string()))?;
            removed += chunk.len() as u64;
        }

        if removed > 0 {
            info!(count = removed, "[{}] delete cmdb hosts success", vendor);
            self.event_bus
                .emit(CoreEvent::Cmdb(CmdbEvent::HostsRemoved {
                    business_id,
                    vendor: vendor.to_string(),
                    count: removed,
                }))
                .ok();
        }
        Ok(removed)
    }

    /// Forward the outcome of a CVM pass: converged records are upserted and
    /// removed records deleted, grouped by business.
    pub async fn forward_pass(
        &self,
        vendor: Vendor,
        converged: &[ResourceRecord],
        removed: &[ResourceRecord],
    ) -> Result<()> {
        for (business_id, records) in group_by_business(converged) {
            let records: Vec<ResourceRecord> = records.into_iter().cloned().collect();
            self.upsert(business_id, vendor, &records).await?;
        }
        for (business_id, records) in group_by_business(removed) {
            let cloud_ids: Vec<String> = records.iter().map(|r| r.cloud_id.clone()).collect();
            self.delete(business_id, vendor, &cloud_ids).await?;
        }
        Ok(())
    }

    /// Assign CVM records to a business, then mirror them once.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn assign_business(&self, ids: &[String], business_id: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.resources
            .assign_business(ResourceKind::Cvm, ids, business_id)
            .await?;

        let mut records = Vec::new();
        for chunk in ids.chunks(MAX_PAGE_SIZE as usize) {
            let page = self
                .resources
                .list(
                    ResourceKind::Cvm,
                    &ResourceFilter::by_ids(chunk.to_vec()),
                    PageRequest::first(MAX_PAGE_SIZE),
                )
                .await?;
            records.extend(page.items);
        }

        let mut by_vendor: BTreeMap<Vendor, Vec<ResourceRecord>> = BTreeMap::new();
        for record in records {
            by_vendor.entry(record.vendor).or_default().push(record);
        }

        let mut sent = 0;
        for (vendor, records) in by_vendor {
            sent += self.upsert(business_id, vendor, &records).await?;
        }
        Ok(sent)
    }

    fn forward_failed(&self, vendor: Vendor, message: String) -> SyncError {
        warn!(error = %message, "[{}] cmdb request failed", vendor);
        self.event_bus
            .emit(CoreEvent::Cmdb(CmdbEvent::ForwardFailed {
                vendor: vendor.to_string(),
                message: message.clone(),
            }))
            .ok();
        SyncError::Cmdb(message)
    }
}

fn group_by_business(records: &[ResourceRecord]) -> BTreeMap<i64, Vec<&ResourceRecord>> {
    let mut groups: BTreeMap<i64, Vec<&ResourceRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_assigned()) {
        groups.entry(record.business_id).or_default().push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::cmdb::RegisteredHost;
    use bridge_traits::extension::{Extension, TCloudCvmExtension};
    use bridge_traits::resource::CloudResource;
    use core_inventory::db::create_test_pool;
    use core_inventory::{NewResource, SqliteResourceStore};
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        Cmdb {}

        #[async_trait]
        impl CmdbClient for Cmdb {
            async fn add_cloud_host_to_biz(&self, request: AddCloudHostRequest) -> bridge_traits::error::Result<Vec<i64>>;
            async fn delete_cloud_host_from_biz(&self, request: DeleteCloudHostRequest) -> bridge_traits::error::Result<()>;
            async fn list_biz_hosts(&self, bk_biz_id: i64, vendor: Vendor, cloud_inst_ids: &[String]) -> bridge_traits::error::Result<Vec<RegisteredHost>>;
        }
    }

    fn record(cloud_id: &str, business_id: i64) -> ResourceRecord {
        let extension = Extension::TCloudCvm(TCloudCvmExtension {
            private_ips: vec!["10.0.0.1".into()],
            public_ips: vec!["1.1.1.1".into()],
            ..Default::default()
        });
        ResourceRecord {
            id: format!("id-{}", cloud_id),
            vendor: Vendor::TCloud,
            kind: ResourceKind::Cvm,
            cloud_id: cloud_id.to_string(),
            name: Some("web".into()),
            account_id: "acct-1".into(),
            region: "ap-guangzhou".into(),
            zone: None,
            resource_group: None,
            status: "RUNNING".into(),
            attachment: None,
            business_id,
            extension,
            created_at: 0,
            updated_at: 0,
        }
    }

    async fn bridge(client: MockCmdb) -> CmdbBridge {
        let pool = create_test_pool().await.unwrap();
        CmdbBridge::new(
            Arc::new(client),
            Arc::new(SqliteResourceStore::new(pool)),
            EventBus::new(16),
        )
    }

    #[test]
    fn test_host_mapping() {
        let host = to_host(&record("ins-1", 7));
        assert_eq!(host.bk_cloud_vendor, "2");
        assert_eq!(host.bk_cloud_host_status, "3");
        assert_eq!(host.bk_host_innerip, "10.0.0.1");
        assert_eq!(host.bk_host_outerip, "1.1.1.1");
        assert_eq!(host.bk_host_name, "web");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(host_status(Vendor::Aws, "shutting-down"), CmdbHostStatus::Stopping);
        assert_eq!(host_status(Vendor::Azure, "PowerState/deallocated"), CmdbHostStatus::Stopped);
        assert_eq!(host_status(Vendor::HuaWei, "BUILD"), CmdbHostStatus::Unknown);
        assert_eq!(host_status(Vendor::Gcp, "TERMINATED"), CmdbHostStatus::Terminated);
    }

    #[tokio::test]
    async fn test_unassigned_records_are_not_sent() {
        let mut client = MockCmdb::new();
        client.expect_add_cloud_host_to_biz().never();
        let bridge = bridge(client).await;

        let sent = bridge
            .upsert(UNASSIGNED_BUSINESS, Vendor::TCloud, &[record("ins-1", -1)])
            .await
            .unwrap();
        assert_eq!(sent, 0);

        bridge
            .forward_pass(Vendor::TCloud, &[record("ins-1", -1)], &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_is_chunked() {
        let mut client = MockCmdb::new();
        client
            .expect_add_cloud_host_to_biz()
            .withf(|req| req.bk_biz_id == 9 && req.host_info.len() <= CMDB_HOST_BATCH_LIMIT)
            .times(2)
            .returning(|req| Ok((0..req.host_info.len() as i64).collect()));
        let bridge = bridge(client).await;

        let records: Vec<_> = (0..250).map(|i| record(&format!("ins-{i}"), 9)).collect();
        assert_eq!(bridge.upsert(9, Vendor::TCloud, &records).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_delete_resolves_host_ids() {
        let mut client = MockCmdb::new();
        client
            .expect_list_biz_hosts()
            .with(eq(9), eq(Vendor::TCloud), always())
            .times(1)
            .returning(|_, _, ids| {
                Ok(vec![RegisteredHost {
                    bk_host_id: 501,
                    bk_cloud_inst_id: ids[0].clone(),
                }])
            });
        client
            .expect_delete_cloud_host_from_biz()
            .withf(|req| req.bk_biz_id == 9 && req.bk_host_ids == vec![501])
            .times(1)
            .returning(|_| Ok(()));
        let bridge = bridge(client).await;

        let removed = bridge
            .delete(9, Vendor::TCloud, &["ins-1".to_string(), "ins-gone".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_client_failure_is_reported() {
        let mut client = MockCmdb::new();
        client
            .expect_add_cloud_host_to_biz()
            .returning(|_| Err(bridge_traits::BridgeError::OperationFailed("502".into())));
        let bridge = bridge(client).await;

        let result = bridge.upsert(9, Vendor::TCloud, &[record("ins-1", 9)]).await;
        assert!(matches!(result, Err(SyncError::Cmdb(_))));
    }

    #[tokio::test]
    async fn test_assign_business_upserts_once() {
        let mut client = MockCmdb::new();
        client
            .expect_add_cloud_host_to_biz()
            .withf(|req| req.bk_biz_id == 12 && req.host_info.len() == 2)
            .times(1)
            .returning(|_| Ok(vec![1, 2]));

        let pool = create_test_pool().await.unwrap();
        let store = Arc::new(SqliteResourceStore::new(pool));
        let cvms: Vec<_> = ["ins-1", "ins-2"]
            .iter()
            .map(|id| {
                let cvm = CloudResource::new(*id, "RUNNING", "ap-guangzhou", Extension::TCloudCvm(TCloudCvmExtension::default()));
                NewResource::from_cloud(Vendor::TCloud, "acct-1", UNASSIGNED_BUSINESS, &cvm)
            })
            .collect();
        let ids = store.batch_create(ResourceKind::Cvm, cvms).await.unwrap();

        let bridge = CmdbBridge::new(Arc::new(client), store.clone(), EventBus::new(16));
        assert_eq!(bridge.assign_business(&ids, 12).await.unwrap(), 2);

        let page = store
            .list(ResourceKind::Cvm, &ResourceFilter::default().with_business_id(12), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }
}
