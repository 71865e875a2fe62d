//! Compute Engine REST connector

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::extension::{
    Extension, GcpCvmExtension, GcpDiskExtension, GcpEipExtension, GcpNetworkInterfaceExtension,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor,
};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use core_runtime::config::GcpCredentials;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{GcpError, Result};
use crate::types::{
    last_segment, AccessConfig, Address, Disk, ErrorResponse, Instance, ListResponse, Operation,
};

const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// `maxResults` for list calls (API maximum)
const PAGE_SIZE: u32 = 500;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Access config created when binding an address
const ACCESS_CONFIG_NAME: &str = "External NAT";

const DEFAULT_NIC: &str = "nic0";

/// Status given to flattened interfaces, which have no lifecycle of their own.
pub const NIC_STATUS: &str = "ATTACHED";

pub struct GcpConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: GcpCredentials,
    timeout: Duration,
}

impl GcpConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: GcpCredentials) -> Self {
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

    fn project_url(&self) -> String {
        let base = self
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{}/projects/{}", base, self.credentials.project_id)
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.project_url(), path);
        for (i, (key, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    #[instrument(skip(self, query), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, self.url(path, query))
            .bearer_token(self.credentials.access_token.clone())
            .header("Accept", "application/json")
            .timeout(self.timeout);
        self.send(request).await
    }

    #[instrument(skip(self, query, body), fields(path = %path))]
    pub async fn post<B, T>(&self, path: &str, query: &[(&str, String)], body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = HttpRequest::new(HttpMethod::Post, self.url(path, query))
            .bearer_token(self.credentials.access_token.clone())
            .header("Accept", "application/json")
            .json(body)?
            .timeout(self.timeout);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        if !response.is_success() {
            return Err(api_error(&response));
        }

        serde_json::from_slice(&response.body).map_err(|e| GcpError::Parse(e.to_string()))
    }

    /// Page of a listing, optionally narrowed to ids with a filter expression.
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        ids: Option<&[String]>,
        page: Option<PageToken>,
    ) -> Result<ListResponse<T>> {
        let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
        if let Some(ids) = ids {
            query.push(("filter", id_filter(ids)));
        }
        if let Some(token) = page {
            query.push(("pageToken", token));
        }
        self.get(path, &query).await
    }

    async fn find_address(&self, region: &str, id: &str) -> Result<Address> {
        let ids = [id.to_string()];
        let list: ListResponse<Address> = self
            .list(&format!("regions/{}/addresses", region), Some(&ids[..]), None)
            .await?;
        list.items
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| GcpError::NotFound(format!("address {}", id)))
    }

    async fn find_instance(&self, zone: &str, id: &str) -> Result<Instance> {
        let ids = [id.to_string()];
        let list: ListResponse<Instance> = self
            .list(&format!("zones/{}/instances", zone), Some(&ids[..]), None)
            .await?;
        list.items
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| GcpError::NotFound(format!("instance {}", id)))
    }
}

fn api_error(response: &HttpResponse) -> GcpError {
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(parsed) => {
            let reason = parsed
                .error
                .errors
                .into_iter()
                .next()
                .map(|d| d.reason)
                .unwrap_or_default();
            warn!(
                "[gcp] request failed, status: {}, reason: {}",
                response.status, reason
            );
            GcpError::Api {
                status: response.status,
                reason,
                message: parsed.error.message,
            }
        }
        Err(_) => GcpError::Api {
            status: response.status,
            reason: String::new(),
            message: String::from_utf8_lossy(&response.body).to_string(),
        },
    }
}

/// `(id = "1") OR (id = "2")`
fn id_filter(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("(id = \"{}\")", id))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn require_zone<'a>(scope: &'a SyncScope, kind: ResourceKind) -> Result<&'a str> {
    scope
        .zone
        .as_deref()
        .ok_or_else(|| GcpError::MissingZone(kind.to_string()))
}

fn network_interface_id(instance_id: &str, nic_name: &str) -> String {
    format!("{}_{}", instance_id, nic_name)
}

fn none_if_empty(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.is_empty()).collect()
}

// ============================================================================
// EIP
// ============================================================================

pub struct GcpEipClient {
    connector: Arc<GcpConnector>,
}

impl GcpEipClient {
    pub fn new(connector: Arc<GcpConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let path = format!("regions/{}/addresses", scope.region);
        let list: ListResponse<Address> = self
            .connector
            .list(&path, scope.cloud_ids.as_deref(), page)
            .await?;

        let items = list
            .items
            .into_iter()
            .map(|address| eip_resource(address, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, list.next_page_token))
    }
}

/// Addresses name their user instance by URL, so the binding is a name ref.
fn eip_resource(address: Address, region: &str) -> CloudResource {
    let attachment = address
        .users
        .iter()
        .find(|user| user.contains("/instances/"))
        .map(|user| Attachment::instance_named(last_segment(user)));

    let extension = Extension::GcpEip(GcpEipExtension {
        address: address.address,
        address_type: address.address_type,
        network_tier: address.network_tier,
        self_link: address.self_link,
        users: address.users,
    });

    CloudResource::new(address.id, address.status, region, extension)
        .with_name(address.name)
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for GcpEipClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
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

pub struct GcpCvmClient {
    connector: Arc<GcpConnector>,
}

impl GcpCvmClient {
    pub fn new(connector: Arc<GcpConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let zone = require_zone(scope, ResourceKind::Cvm)?;
        let list: ListResponse<Instance> = self
            .connector
            .list(
                &format!("zones/{}/instances", zone),
                scope.cloud_ids.as_deref(),
                page,
            )
            .await?;

        let items = list
            .items
            .into_iter()
            .map(|instance| cvm_resource(instance, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, list.next_page_token))
    }
}

fn cvm_resource(instance: Instance, region: &str) -> CloudResource {
    let private_ips = none_if_empty(
        instance
            .network_interfaces
            .iter()
            .filter_map(|nic| nic.network_ip.clone())
            .collect(),
    );
    let public_ips = none_if_empty(
        instance
            .network_interfaces
            .iter()
            .flat_map(|nic| nic.access_configs.iter())
            .filter_map(|config| config.nat_ip.clone())
            .collect(),
    );
    let disk_names: Vec<String> = instance
        .disks
        .iter()
        .filter_map(|d| d.source.as_deref())
        .map(|source| last_segment(source).to_string())
        .collect();
    let nic_ids: Vec<String> = instance
        .network_interfaces
        .iter()
        .map(|nic| network_interface_id(&instance.id, &nic.name))
        .collect();

    let extension = Extension::GcpCvm(GcpCvmExtension {
        machine_type: instance
            .machine_type
            .as_deref()
            .map(|t| last_segment(t).to_string()),
        self_link: instance.self_link,
        private_ips,
        public_ips,
        creation_timestamp: instance.creation_timestamp,
    });

    let mut resource = CloudResource::new(instance.id, instance.status, region, extension)
        .with_name(instance.name)
        .with_zone(last_segment(&instance.zone).to_string());
    for name in disk_names {
        resource = resource.with_related(ResourceKind::Disk, ResourceRef::Name(name));
    }
    for id in nic_ids {
        resource = resource.with_related(ResourceKind::NetworkInterface, ResourceRef::CloudId(id));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for GcpCvmClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Cvm
    }

    fn zonal(&self) -> bool {
        true
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

pub struct GcpDiskClient {
    connector: Arc<GcpConnector>,
}

impl GcpDiskClient {
    pub fn new(connector: Arc<GcpConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let zone = require_zone(scope, ResourceKind::Disk)?;
        let list: ListResponse<Disk> = self
            .connector
            .list(
                &format!("zones/{}/disks", zone),
                scope.cloud_ids.as_deref(),
                page,
            )
            .await?;

        let items = list
            .items
            .into_iter()
            .map(|disk| disk_resource(disk, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, list.next_page_token))
    }
}

fn disk_resource(disk: Disk, region: &str) -> CloudResource {
    let attachment = disk
        .users
        .first()
        .map(|user| Attachment::instance_named(last_segment(user)));

    let extension = Extension::GcpDisk(GcpDiskExtension {
        size_gb: disk
            .size_gb
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        disk_type: disk.disk_type.as_deref().map(|t| last_segment(t).to_string()),
        self_link: disk.self_link,
    });

    CloudResource::new(disk.id, disk.status, region, extension)
        .with_name(disk.name)
        .with_zone(last_segment(&disk.zone).to_string())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for GcpDiskClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Disk
    }

    fn zonal(&self) -> bool {
        true
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
// Network interface
// ============================================================================

/// Pages over instances and emits one item per interface.
pub struct GcpNetworkInterfaceClient {
    connector: Arc<GcpConnector>,
}

impl GcpNetworkInterfaceClient {
    pub fn new(connector: Arc<GcpConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let zone = require_zone(scope, ResourceKind::NetworkInterface)?;

        // Narrow the instance listing to the owners of the requested interfaces.
        let instance_ids: Option<Vec<String>> = scope.cloud_ids.as_ref().map(|ids| {
            ids.iter()
                .filter_map(|id| id.split_once('_').map(|(instance, _)| instance.to_string()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        });
        if matches!(&instance_ids, Some(ids) if ids.is_empty()) {
            return Ok(ResourcePage::last(Vec::new()));
        }

        let list: ListResponse<Instance> = self
            .connector
            .list(
                &format!("zones/{}/instances", zone),
                instance_ids.as_deref(),
                page,
            )
            .await?;

        let items = list
            .items
            .into_iter()
            .flat_map(|instance| nic_resources(instance, &scope.region))
            .filter(|nic| scope.admits(&nic.cloud_id))
            .collect();
        Ok(ResourcePage::with_next(items, list.next_page_token))
    }
}

fn nic_resources(instance: Instance, region: &str) -> Vec<CloudResource> {
    let zone = last_segment(&instance.zone).to_string();
    instance
        .network_interfaces
        .into_iter()
        .map(|nic| {
            let extension = Extension::GcpNetworkInterface(GcpNetworkInterfaceExtension {
                nic_name: nic.name.clone(),
                network: nic.network.as_deref().map(|n| last_segment(n).to_string()),
                subnetwork: nic.subnetwork.as_deref().map(|n| last_segment(n).to_string()),
                network_ip: nic.network_ip,
                nat_ips: nic
                    .access_configs
                    .into_iter()
                    .filter_map(|c| c.nat_ip)
                    .collect(),
            });

            CloudResource::new(
                network_interface_id(&instance.id, &nic.name),
                NIC_STATUS,
                region,
                extension,
            )
            .with_name(nic.name)
            .with_zone(zone.clone())
            .with_attachment(Some(Attachment::instance(instance.id.clone())))
        })
        .collect()
}

#[async_trait]
impl VendorResourceClient for GcpNetworkInterfaceClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::NetworkInterface
    }

    fn zonal(&self) -> bool {
        true
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

/// Binds an address by adding a one-to-one NAT access config to the
/// instance's interface, and unbinds by deleting that config.
pub struct GcpAssociationClient {
    connector: Arc<GcpConnector>,
}

impl GcpAssociationClient {
    pub fn new(connector: Arc<GcpConnector>) -> Self {
        Self { connector }
    }

    fn nic_name(request: &EipAssociation) -> String {
        request
            .network_interface_cloud_id
            .as_deref()
            .and_then(|id| id.split_once('_').map(|(_, nic)| nic.to_string()))
            .unwrap_or_else(|| DEFAULT_NIC.to_string())
    }

    async fn bind(&self, scope: &SyncScope, request: &EipAssociation) -> Result<()> {
        let zone = require_zone(scope, ResourceKind::Cvm)?;
        let address = self
            .connector
            .find_address(&scope.region, &request.eip_cloud_id)
            .await?;
        let instance = self
            .connector
            .find_instance(zone, &request.cvm_cloud_id)
            .await?;
        let nic = Self::nic_name(request);

        let body = AccessConfig {
            name: ACCESS_CONFIG_NAME.to_string(),
            config_type: Some("ONE_TO_ONE_NAT".to_string()),
            nat_ip: address.address,
        };
        let operation: Operation = self
            .connector
            .post(
                &format!("zones/{}/instances/{}/addAccessConfig", zone, instance.name),
                &[("networkInterface", nic.clone())],
                &body,
            )
            .await?;

        info!(
            "[gcp] associate eip {} to cvm {} ({}) submitted, operation: {}",
            request.eip_cloud_id, request.cvm_cloud_id, nic, operation.name
        );
        Ok(())
    }

    async fn unbind(&self, scope: &SyncScope, request: &EipAssociation) -> Result<()> {
        let zone = require_zone(scope, ResourceKind::Cvm)?;
        let address = self
            .connector
            .find_address(&scope.region, &request.eip_cloud_id)
            .await?;
        let instance = self
            .connector
            .find_instance(zone, &request.cvm_cloud_id)
            .await?;
        let nic = Self::nic_name(request);

        let config = instance
            .network_interfaces
            .iter()
            .find(|n| n.name == nic)
            .and_then(|n| {
                n.access_configs
                    .iter()
                    .find(|c| c.nat_ip.is_some() && c.nat_ip == address.address)
            })
            .map(|c| c.name.clone());
        let Some(config) = config else {
            info!(
                "[gcp] eip {} is not bound to cvm {}, skip disassociate",
                request.eip_cloud_id, request.cvm_cloud_id
            );
            return Ok(());
        };

        let operation: Operation = self
            .connector
            .post(
                &format!("zones/{}/instances/{}/deleteAccessConfig", zone, instance.name),
                &[("accessConfig", config), ("networkInterface", nic)],
                &serde_json::json!({}),
            )
            .await?;

        info!(
            "[gcp] disassociate eip {} from cvm {} submitted, operation: {}",
            request.eip_cloud_id, request.cvm_cloud_id, operation.name
        );
        Ok(())
    }
}

#[async_trait]
impl EipAssociationClient for GcpAssociationClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
    }

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        Ok(self.bind(scope, request).await?)
    }

    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        Ok(self.unbind(scope, request).await?)
    }
}
