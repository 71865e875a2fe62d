//! TencentCloud API connector
//!
//! Every call is a signed JSON POST to `https://{service}.tencentcloudapi.com/`
//! with the action, version and region carried in `X-TC-*` headers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::extension::{
    Extension, TCloudCvmExtension, TCloudDiskExtension, TCloudEipExtension,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::resource::{Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use bytes::Bytes;
use chrono::Utc;
use core_runtime::config::TCloudCredentials;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TCloudError};
use crate::signer::{Tc3Signer, CONTENT_TYPE};
use crate::types::{
    Address, AssociateAddressRequest, DescribeAddressesResponse, DescribeDisksResponse,
    DescribeInstancesResponse, DisassociateAddressRequest, Disk, Empty, Envelope, Instance,
    ListRequest,
};

/// Root domain of the public API endpoints
const DEFAULT_ROOT_DOMAIN: &str = "tencentcloudapi.com";

/// API version shared by the `vpc`, `cvm` and `cbs` services
const API_VERSION: &str = "2017-03-12";

/// Maximum `Limit` accepted by the Describe* actions
const PAGE_LIMIT: u64 = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Signed transport shared by the per-kind clients.
pub struct TCloudConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: TCloudCredentials,
    timeout: Duration,
}

impl TCloudConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: TCloudCredentials) -> Self {
        Self {
            http_client,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn host(&self, service: &str) -> String {
        let root = self
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ROOT_DOMAIN);
        format!("{}.{}", service, root)
    }

    /// Invoke one API action and unwrap its `Response` envelope.
    #[instrument(skip(self, body), fields(service = %service, action = %action, region = %region))]
    pub async fn call<B, T>(&self, service: &str, action: &str, region: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Default,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| TCloudError::Parse(format!("encode {} request: {}", action, e)))?;
        let host = self.host(service);
        let now = Utc::now();

        let authorization = Tc3Signer {
            secret_id: &self.credentials.secret_id,
            secret_key: &self.credentials.secret_key,
            service,
            host: &host,
        }
        .authorization(&payload, now)?;

        let request = HttpRequest::new(HttpMethod::Post, format!("https://{}/", host))
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", host.clone())
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", region)
            .body(Bytes::from(payload))
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        let envelope: Envelope<T> = match serde_json::from_slice(&response.body) {
            Ok(envelope) => envelope,
            Err(_) if !response.is_success() => {
                return Err(TCloudError::Http {
                    status: response.status,
                    body: String::from_utf8_lossy(&response.body).to_string(),
                });
            }
            Err(e) => {
                return Err(TCloudError::Parse(format!("{} response: {}", action, e)));
            }
        };

        if let Some(error) = envelope.response.error {
            warn!(
                "[tcloud] {} failed, code: {}, request: {}",
                action, error.code, envelope.response.request_id
            );
            return Err(TCloudError::Api {
                code: error.code,
                message: error.message,
                request_id: envelope.response.request_id,
            });
        }

        if !response.is_success() {
            return Err(TCloudError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        debug!("[tcloud] {} ok, request: {}", action, envelope.response.request_id);
        Ok(envelope.response.data.unwrap_or_default())
    }
}

/// Offset cursor of one listing call.
struct OffsetPage {
    request: ListRequest,
    filtered: bool,
}

impl OffsetPage {
    fn new(scope: &SyncScope, page: Option<PageToken>, id_key: &str) -> Result<Self> {
        if let Some(ids) = &scope.cloud_ids {
            let mut filter = serde_json::Map::new();
            filter.insert(id_key.to_string(), serde_json::json!(ids));
            return Ok(Self {
                request: ListRequest {
                    offset: 0,
                    limit: PAGE_LIMIT,
                    ids: filter,
                },
                filtered: true,
            });
        }

        let offset = match page {
            Some(token) => token
                .parse::<u64>()
                .map_err(|_| TCloudError::InvalidPageToken(token))?,
            None => 0,
        };

        Ok(Self {
            request: ListRequest {
                offset,
                limit: PAGE_LIMIT,
                ids: serde_json::Map::new(),
            },
            filtered: false,
        })
    }

    /// A short page ends the listing.
    fn next(&self, returned: usize) -> Option<PageToken> {
        if self.filtered || (returned as u64) < self.request.limit {
            None
        } else {
            Some((self.request.offset + self.request.limit).to_string())
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ============================================================================
// EIP
// ============================================================================

pub struct TCloudEipClient {
    connector: Arc<TCloudConnector>,
}

impl TCloudEipClient {
    pub fn new(connector: Arc<TCloudConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let cursor = OffsetPage::new(scope, page, "AddressIds")?;
        let response: DescribeAddressesResponse = self
            .connector
            .call("vpc", "DescribeAddresses", &scope.region, &cursor.request)
            .await?;

        let next = cursor.next(response.address_set.len());
        let items = response
            .address_set
            .into_iter()
            .map(|address| eip_resource(address, &scope.region))
            .collect();

        Ok(ResourcePage::with_next(items, next))
    }
}

fn eip_resource(address: Address, region: &str) -> CloudResource {
    let attachment = non_empty(address.instance_id).map(Attachment::instance);
    let extension = Extension::TCloudEip(TCloudEipExtension {
        public_ip: address.address_ip,
        address_type: address.address_type,
        bandwidth: address.bandwidth,
        internet_charge_type: address.internet_charge_type,
        internet_service_provider: address.internet_service_provider,
        network_interface_id: non_empty(address.network_interface_id),
    });

    CloudResource::new(address.address_id, address.address_status, region, extension)
        .with_name(address.address_name.unwrap_or_default())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for TCloudEipClient {
    fn vendor(&self) -> Vendor {
        Vendor::TCloud
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Eip
    }

    async fn list_page(
        &self,
        scope: &SyncScope,
        page: Option<PageToken>,
    ) -> VendorResult<ResourcePage> {
        Ok(self.list(scope, page).await?)
    }
}

// ============================================================================
// CVM
// ============================================================================

pub struct TCloudCvmClient {
    connector: Arc<TCloudConnector>,
}

impl TCloudCvmClient {
    pub fn new(connector: Arc<TCloudConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let cursor = OffsetPage::new(scope, page, "InstanceIds")?;
        let response: DescribeInstancesResponse = self
            .connector
            .call("cvm", "DescribeInstances", &scope.region, &cursor.request)
            .await?;

        let next = cursor.next(response.instance_set.len());
        let items = response
            .instance_set
            .into_iter()
            .map(|instance| cvm_resource(instance, &scope.region))
            .collect();

        Ok(ResourcePage::with_next(items, next))
    }
}

fn cvm_resource(instance: Instance, region: &str) -> CloudResource {
    let disk_ids: Vec<String> = instance
        .system_disk
        .iter()
        .chain(instance.data_disks.iter().flatten())
        .filter_map(|d| non_empty(d.disk_id.clone()))
        .collect();
    let vpc = instance.virtual_private_cloud.unwrap_or_default();

    let extension = Extension::TCloudCvm(TCloudCvmExtension {
        instance_type: instance.instance_type,
        image_id: instance.image_id,
        os_name: instance.os_name,
        vpc_id: vpc.vpc_id,
        subnet_id: vpc.subnet_id,
        private_ips: instance.private_ip_addresses.unwrap_or_default(),
        public_ips: instance.public_ip_addresses.unwrap_or_default(),
        charge_type: instance.instance_charge_type,
        created_time: instance.created_time,
        expired_time: instance.expired_time,
    });

    let mut resource =
        CloudResource::new(instance.instance_id, instance.instance_state, region, extension)
            .with_name(instance.instance_name.unwrap_or_default())
            .with_zone(instance.placement.zone.unwrap_or_default());
    for disk_id in disk_ids {
        resource = resource.with_related(ResourceKind::Disk, ResourceRef::CloudId(disk_id));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for TCloudCvmClient {
    fn vendor(&self) -> Vendor {
        Vendor::TCloud
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Cvm
    }

    async fn list_page(
        &self,
        scope: &SyncScope,
        page: Option<PageToken>,
    ) -> VendorResult<ResourcePage> {
        Ok(self.list(scope, page).await?)
    }
}

// ============================================================================
// Disk
// ============================================================================

pub struct TCloudDiskClient {
    connector: Arc<TCloudConnector>,
}

impl TCloudDiskClient {
    pub fn new(connector: Arc<TCloudConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let cursor = OffsetPage::new(scope, page, "DiskIds")?;
        let response: DescribeDisksResponse = self
            .connector
            .call("cbs", "DescribeDisks", &scope.region, &cursor.request)
            .await?;

        let next = cursor.next(response.disk_set.len());
        let items = response
            .disk_set
            .into_iter()
            .map(|disk| disk_resource(disk, &scope.region))
            .collect();

        Ok(ResourcePage::with_next(items, next))
    }
}

fn disk_resource(disk: Disk, region: &str) -> CloudResource {
    let attachment = if disk.attached {
        non_empty(disk.instance_id).map(Attachment::instance)
    } else {
        None
    };

    let extension = Extension::TCloudDisk(TCloudDiskExtension {
        disk_size_gb: disk.disk_size,
        disk_type: disk.disk_type,
        disk_usage: disk.disk_usage,
        charge_type: disk.disk_charge_type,
        encrypted: disk.encrypt,
    });

    CloudResource::new(disk.disk_id, disk.disk_state, region, extension)
        .with_name(disk.disk_name.unwrap_or_default())
        .with_zone(disk.placement.zone.unwrap_or_default())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for TCloudDiskClient {
    fn vendor(&self) -> Vendor {
        Vendor::TCloud
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Disk
    }

    async fn list_page(
        &self,
        scope: &SyncScope,
        page: Option<PageToken>,
    ) -> VendorResult<ResourcePage> {
        Ok(self.list(scope, page).await?)
    }
}

// ============================================================================
// EIP association
// ============================================================================

pub struct TCloudAssociationClient {
    connector: Arc<TCloudConnector>,
}

impl TCloudAssociationClient {
    pub fn new(connector: Arc<TCloudConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl EipAssociationClient for TCloudAssociationClient {
    fn vendor(&self) -> Vendor {
        Vendor::TCloud
    }

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let body = AssociateAddressRequest {
            address_id: &request.eip_cloud_id,
            instance_id: &request.cvm_cloud_id,
        };
        let _: Empty = self
            .connector
            .call("vpc", "AssociateAddress", &scope.region, &body)
            .await?;

        info!(
            "[tcloud] associate eip {} to cvm {} success, account: {}",
            request.eip_cloud_id, request.cvm_cloud_id, scope.account_id
        );
        Ok(())
    }

    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let body = DisassociateAddressRequest {
            address_id: &request.eip_cloud_id,
        };
        let _: Empty = self
            .connector
            .call("vpc", "DisassociateAddress", &scope.region, &body)
            .await?;

        info!(
            "[tcloud] disassociate eip {} from cvm {} success, account: {}",
            request.eip_cloud_id, request.cvm_cloud_id, scope.account_id
        );
        Ok(())
    }
}
