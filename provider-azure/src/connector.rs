//! Azure Resource Manager connector

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::extension::{
    AzureCvmExtension, AzureDiskExtension, AzureEipExtension, AzureNetworkInterfaceExtension,
    Extension,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor,
};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use core_runtime::config::AzureCredentials;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{AzureError, Result};
use crate::types::{ArmList, ErrorResponse, ManagedDisk, NetworkInterface, PublicIpAddress, VirtualMachine};

const DEFAULT_BASE_URL: &str = "https://management.azure.com";

const NETWORK_API_VERSION: &str = "2023-05-01";
const COMPUTE_API_VERSION: &str = "2023-07-01";
const DISK_API_VERSION: &str = "2023-04-02";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status reported for public IPs, which carry no binding state of their own.
pub const STATUS_ASSOCIATED: &str = "BIND";
pub const STATUS_UNASSOCIATED: &str = "UNBIND";

const UNKNOWN_POWER_STATE: &str = "PowerState/unknown";

pub struct AzureConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: AzureCredentials,
    timeout: Duration,
}

/// One ARM resource type under a resource group.
struct ArmType {
    provider_path: &'static str,
    api_version: &'static str,
    expand: Option<&'static str>,
}

const PUBLIC_IPS: ArmType = ArmType {
    provider_path: "Microsoft.Network/publicIPAddresses",
    api_version: NETWORK_API_VERSION,
    expand: None,
};

const VIRTUAL_MACHINES: ArmType = ArmType {
    provider_path: "Microsoft.Compute/virtualMachines",
    api_version: COMPUTE_API_VERSION,
    expand: Some("instanceView"),
};

const DISKS: ArmType = ArmType {
    provider_path: "Microsoft.Compute/disks",
    api_version: DISK_API_VERSION,
    expand: None,
};

const NETWORK_INTERFACES: ArmType = ArmType {
    provider_path: "Microsoft.Network/networkInterfaces",
    api_version: NETWORK_API_VERSION,
    expand: None,
};

impl ArmType {
    fn query(&self) -> String {
        match self.expand {
            Some(expand) => format!("api-version={}&$expand={}", self.api_version, expand),
            None => format!("api-version={}", self.api_version),
        }
    }
}

impl AzureConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: AzureCredentials) -> Self {
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

    fn base_url(&self) -> &str {
        self.credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    fn collection_url(&self, resource_group: &str, arm: &ArmType) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}?{}",
            self.base_url(),
            self.credentials.subscription_id,
            resource_group,
            arm.provider_path,
            arm.query()
        )
    }

    fn resource_url(&self, id: &str, arm: &ArmType) -> String {
        format!("{}{}?{}", self.base_url(), id, arm.query())
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(self.credentials.access_token.clone())
            .header("Accept", "application/json")
            .timeout(self.timeout)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(api_error(&response))
        }
    }

    #[instrument(skip(self))]
    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.execute(self.request(HttpMethod::Get, url)).await?;
        serde_json::from_slice(&response.body).map_err(|e| AzureError::Parse(e.to_string()))
    }

    /// GET a single resource; `None` when ARM answers 404.
    async fn get_optional<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(AzureError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, body))]
    async fn put(&self, url: String, body: &Value) -> Result<()> {
        let request = self.request(HttpMethod::Put, url).json(body)?;
        self.execute(request).await?;
        Ok(())
    }

    /// A listing page, or the requested ids fetched one by one.
    async fn list<T: DeserializeOwned>(
        &self,
        scope: &SyncScope,
        arm: &ArmType,
        page: Option<PageToken>,
    ) -> Result<(Vec<T>, Option<PageToken>)> {
        let resource_group = scope
            .resource_group
            .as_deref()
            .ok_or(AzureError::MissingResourceGroup)?;

        if let Some(ids) = &scope.cloud_ids {
            let mut items = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(item) = self.get_optional(self.resource_url(id, arm)).await? {
                    items.push(item);
                } else {
                    debug!("[azure] {} not found", id);
                }
            }
            return Ok((items, None));
        }

        let url = page.unwrap_or_else(|| self.collection_url(resource_group, arm));
        let list: ArmList<T> = self.get(url).await?;
        Ok((list.value, list.next_link.filter(|link| !link.is_empty())))
    }
}

fn api_error(response: &HttpResponse) -> AzureError {
    let retry_after = response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let (code, message) = match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => (
            response.status.to_string(),
            String::from_utf8_lossy(&response.body).to_string(),
        ),
    };
    warn!("[azure] request failed, status: {}, code: {}", response.status, code);

    AzureError::Api {
        status: response.status,
        code,
        message,
        retry_after,
    }
}

fn lower(id: &str) -> String {
    id.to_lowercase()
}

/// NIC id of an ip configuration id (`.../networkInterfaces/nic/ipConfigurations/cfg`).
fn owning_network_interface(ip_configuration_id: &str) -> String {
    let lowered = lower(ip_configuration_id);
    match lowered.find("/ipconfigurations/") {
        Some(pos) => lowered[..pos].to_string(),
        None => lowered,
    }
}

fn in_region(location: &str, scope: &SyncScope) -> bool {
    location.eq_ignore_ascii_case(&scope.region)
}

// ============================================================================
// EIP
// ============================================================================

pub struct AzureEipClient {
    connector: Arc<AzureConnector>,
}

impl AzureEipClient {
    pub fn new(connector: Arc<AzureConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let (items, next) = self
            .connector
            .list::<PublicIpAddress>(scope, &PUBLIC_IPS, page)
            .await?;

        let items = items
            .into_iter()
            .filter(|ip| in_region(&ip.location, scope))
            .map(|ip| eip_resource(ip, scope))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn eip_resource(ip: PublicIpAddress, scope: &SyncScope) -> CloudResource {
    let ip_configuration_id = ip.properties.ip_configuration.map(|c| lower(&c.id));
    let attachment = ip_configuration_id
        .as_deref()
        .map(|id| Attachment::network_interface(owning_network_interface(id)));
    let status = if attachment.is_some() {
        STATUS_ASSOCIATED
    } else {
        STATUS_UNASSOCIATED
    };

    let extension = Extension::AzureEip(AzureEipExtension {
        ip_address: ip.properties.ip_address,
        allocation_method: ip.properties.allocation_method,
        sku: ip.sku.and_then(|s| s.name),
        ip_configuration_id,
        location: Some(ip.location),
    });

    let mut resource = CloudResource::new(lower(&ip.id), status, scope.region.clone(), extension)
        .with_name(ip.name)
        .with_zone(ip.zones.into_iter().next().unwrap_or_default())
        .with_attachment(attachment);
    if let Some(group) = &scope.resource_group {
        resource = resource.with_resource_group(lower(group));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for AzureEipClient {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
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

pub struct AzureCvmClient {
    connector: Arc<AzureConnector>,
}

impl AzureCvmClient {
    pub fn new(connector: Arc<AzureConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let (items, next) = self
            .connector
            .list::<VirtualMachine>(scope, &VIRTUAL_MACHINES, page)
            .await?;

        let items = items
            .into_iter()
            .filter(|vm| in_region(&vm.location, scope))
            .map(|vm| cvm_resource(vm, scope))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn cvm_resource(vm: VirtualMachine, scope: &SyncScope) -> CloudResource {
    let status = vm.power_state().unwrap_or(UNKNOWN_POWER_STATE).to_string();
    let storage = &vm.properties.storage_profile;
    let disk_ids: Vec<String> = storage
        .os_disk
        .iter()
        .filter_map(|d| d.managed_disk.as_ref())
        .chain(storage.data_disks.iter().filter_map(|d| d.managed_disk.as_ref()))
        .map(|d| lower(&d.id))
        .collect();
    let nic_ids: Vec<String> = vm
        .properties
        .network_profile
        .network_interfaces
        .iter()
        .map(|n| lower(&n.id))
        .collect();

    let extension = Extension::AzureCvm(AzureCvmExtension {
        vm_id: vm.properties.vm_id.clone(),
        vm_size: vm.properties.hardware_profile.vm_size.clone(),
        os_type: storage.os_disk.as_ref().and_then(|d| d.os_type.clone()),
        network_interface_ids: nic_ids.clone(),
    });

    let mut resource = CloudResource::new(lower(&vm.id), status, scope.region.clone(), extension)
        .with_name(vm.name.clone())
        .with_zone(vm.zones.first().cloned().unwrap_or_default());
    if let Some(group) = &scope.resource_group {
        resource = resource.with_resource_group(lower(group));
    }
    for id in disk_ids {
        resource = resource.with_related(ResourceKind::Disk, ResourceRef::CloudId(id));
    }
    for id in nic_ids {
        resource = resource.with_related(ResourceKind::NetworkInterface, ResourceRef::CloudId(id));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for AzureCvmClient {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
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

pub struct AzureDiskClient {
    connector: Arc<AzureConnector>,
}

impl AzureDiskClient {
    pub fn new(connector: Arc<AzureConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let (items, next) = self
            .connector
            .list::<ManagedDisk>(scope, &DISKS, page)
            .await?;

        let items = items
            .into_iter()
            .filter(|disk| in_region(&disk.location, scope))
            .map(|disk| disk_resource(disk, scope))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn disk_resource(disk: ManagedDisk, scope: &SyncScope) -> CloudResource {
    let attachment = disk
        .managed_by
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| Attachment::instance(lower(id)));

    let extension = Extension::AzureDisk(AzureDiskExtension {
        size_gb: disk.properties.disk_size_gb,
        sku: disk.sku.and_then(|s| s.name),
        os_type: disk.properties.os_type,
    });

    let mut resource = CloudResource::new(
        lower(&disk.id),
        disk.properties.disk_state,
        scope.region.clone(),
        extension,
    )
    .with_name(disk.name)
    .with_zone(disk.zones.into_iter().next().unwrap_or_default())
    .with_attachment(attachment);
    if let Some(group) = &scope.resource_group {
        resource = resource.with_resource_group(lower(group));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for AzureDiskClient {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
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
// Network interface
// ============================================================================

pub struct AzureNetworkInterfaceClient {
    connector: Arc<AzureConnector>,
}

impl AzureNetworkInterfaceClient {
    pub fn new(connector: Arc<AzureConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let (items, next) = self
            .connector
            .list::<NetworkInterface>(scope, &NETWORK_INTERFACES, page)
            .await?;

        let items = items
            .into_iter()
            .filter(|nic| in_region(&nic.location, scope))
            .map(|nic| nic_resource(nic, scope))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn nic_resource(nic: NetworkInterface, scope: &SyncScope) -> CloudResource {
    let properties = nic.properties;
    let attachment = properties
        .virtual_machine
        .as_ref()
        .map(|vm| Attachment::instance(lower(&vm.id)));

    let extension = Extension::AzureNetworkInterface(AzureNetworkInterfaceExtension {
        mac_address: properties.mac_address,
        primary: properties.primary.unwrap_or(false),
        private_ips: properties
            .ip_configurations
            .iter()
            .filter_map(|c| c.properties.private_ip_address.clone())
            .collect(),
        public_ip_ids: properties
            .ip_configurations
            .iter()
            .filter_map(|c| c.properties.public_ip_address.as_ref())
            .map(|p| lower(&p.id))
            .collect(),
    });

    let mut resource = CloudResource::new(
        lower(&nic.id),
        properties.provisioning_state,
        scope.region.clone(),
        extension,
    )
    .with_name(nic.name)
    .with_attachment(attachment);
    if let Some(group) = &scope.resource_group {
        resource = resource.with_resource_group(lower(group));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for AzureNetworkInterfaceClient {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::NetworkInterface
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

/// Binds a public IP by rewriting the NIC's primary ip configuration and
/// PUTting the whole NIC document back.
pub struct AzureAssociationClient {
    connector: Arc<AzureConnector>,
}

impl AzureAssociationClient {
    pub fn new(connector: Arc<AzureConnector>) -> Self {
        Self { connector }
    }

    /// Applies `edit` to the primary ip configuration; `edit` returns whether
    /// it changed anything, and an unchanged document is not written back.
    async fn rewrite_primary_configuration<F>(&self, nic_id: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>) -> bool,
    {
        let url = self.connector.resource_url(nic_id, &NETWORK_INTERFACES);
        let mut document: Value = self.connector.get(url.clone()).await?;

        let configurations = document
            .pointer_mut("/properties/ipConfigurations")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| AzureError::NoIpConfiguration(nic_id.to_string()))?;
        let index = configurations
            .iter()
            .position(|c| c.pointer("/properties/primary") == Some(&Value::Bool(true)))
            .unwrap_or(0);
        let properties = configurations
            .get_mut(index)
            .and_then(|c| c.get_mut("properties"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| AzureError::NoIpConfiguration(nic_id.to_string()))?;

        if !edit(properties) {
            return Ok(false);
        }

        self.connector.put(url, &document).await?;
        Ok(true)
    }
}

#[async_trait]
impl EipAssociationClient for AzureAssociationClient {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
    }

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let nic_id = request.require_network_interface(Vendor::Azure)?;
        let eip_id = request.eip_cloud_id.clone();

        self.rewrite_primary_configuration(nic_id, |properties| {
            properties.insert(
                "publicIPAddress".to_string(),
                serde_json::json!({ "id": eip_id }),
            );
            true
        })
        .await?;

        info!(
            "[azure] associate eip {} to nic {} success, account: {}",
            request.eip_cloud_id, nic_id, scope.account_id
        );
        Ok(())
    }

    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let nic_id = request.require_network_interface(Vendor::Azure)?;
        let eip_id = lower(&request.eip_cloud_id);

        let changed = self
            .rewrite_primary_configuration(nic_id, |properties| {
                let bound = properties
                    .get("publicIPAddress")
                    .and_then(|p| p.get("id"))
                    .and_then(Value::as_str)
                    .map(|id| lower(id) == eip_id)
                    .unwrap_or(false);
                if bound {
                    properties.remove("publicIPAddress");
                }
                bound
            })
            .await?;

        if changed {
            info!(
                "[azure] disassociate eip {} from nic {} success, account: {}",
                request.eip_cloud_id, nic_id, scope.account_id
            );
        } else {
            info!(
                "[azure] eip {} is not bound to nic {}, skip disassociate",
                request.eip_cloud_id, nic_id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::VendorError;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    const RG: &str = "/subscriptions/sub-1/resourceGroups/RG-Web";

    fn respond(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn connector(http: MockHttpClient) -> Arc<AzureConnector> {
        Arc::new(AzureConnector::new(
            Arc::new(http),
            AzureCredentials::new("sub-1", "arm-token"),
        ))
    }

    fn scope() -> SyncScope {
        SyncScope::new(Vendor::Azure, "sub-1", "eastus").with_resource_group("RG-Web")
    }

    #[tokio::test]
    async fn test_vm_listing_follows_next_link_and_lowercases_ids() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                req.url
                    == "https://management.azure.com/subscriptions/sub-1/resourceGroups/RG-Web/providers/Microsoft.Compute/virtualMachines?api-version=2023-07-01&$expand=instanceView"
            })
            .times(1)
            .returning(|_| {
                Ok(respond(
                    200,
                    serde_json::json!({
                        "value": [{
                            "id": format!("{RG}/providers/Microsoft.Compute/virtualMachines/VM-1"),
                            "name": "VM-1",
                            "location": "eastus",
                            "zones": ["1"],
                            "properties": {
                                "vmId": "uuid-1",
                                "hardwareProfile": {"vmSize": "Standard_B2s"},
                                "storageProfile": {
                                    "osDisk": {"osType": "Linux", "managedDisk": {"id": format!("{RG}/providers/Microsoft.Compute/disks/OS-1")}},
                                    "dataDisks": [{"managedDisk": {"id": format!("{RG}/providers/Microsoft.Compute/disks/DATA-1")}}]
                                },
                                "networkProfile": {"networkInterfaces": [{"id": format!("{RG}/providers/Microsoft.Network/networkInterfaces/NIC-1")}]},
                                "instanceView": {"statuses": [{"code": "PowerState/running"}]}
                            }
                        }, {
                            "id": format!("{RG}/providers/Microsoft.Compute/virtualMachines/VM-2"),
                            "name": "VM-2",
                            "location": "westus"
                        }],
                        "nextLink": "https://management.azure.com/next?page=2"
                    }),
                ))
            });

        let page = AzureCvmClient::new(connector(http))
            .list_page(&scope(), None)
            .await
            .unwrap();

        assert_eq!(page.next_page.as_deref(), Some("https://management.azure.com/next?page=2"));
        assert_eq!(page.items.len(), 1);
        let vm = &page.items[0];
        assert_eq!(
            vm.cloud_id,
            "/subscriptions/sub-1/resourcegroups/rg-web/providers/microsoft.compute/virtualmachines/vm-1"
        );
        assert_eq!(vm.status, "PowerState/running");
        assert_eq!(vm.resource_group.as_deref(), Some("rg-web"));
        assert_eq!(vm.related_of(ResourceKind::Disk).count(), 2);
        assert_eq!(vm.related_of(ResourceKind::NetworkInterface).count(), 1);
    }

    #[tokio::test]
    async fn test_public_ip_binds_to_owning_nic() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| req.url == "https://management.azure.com/next?page=2")
            .times(1)
            .returning(|_| {
                Ok(respond(
                    200,
                    serde_json::json!({"value": [{
                        "id": format!("{RG}/providers/Microsoft.Network/publicIPAddresses/IP-1"),
                        "name": "IP-1",
                        "location": "eastus",
                        "sku": {"name": "Standard"},
                        "properties": {
                            "ipAddress": "20.1.1.1",
                            "ipConfiguration": {"id": format!("{RG}/providers/Microsoft.Network/networkInterfaces/NIC-1/ipConfigurations/ipconfig1")}
                        }
                    }]}),
                ))
            });

        let page = AzureEipClient::new(connector(http))
            .list_page(&scope(), Some("https://management.azure.com/next?page=2".into()))
            .await
            .unwrap();

        let eip = &page.items[0];
        assert_eq!(eip.status, STATUS_ASSOCIATED);
        assert_eq!(
            eip.attachment,
            Some(Attachment::network_interface(
                "/subscriptions/sub-1/resourcegroups/rg-web/providers/microsoft.network/networkinterfaces/nic-1"
            ))
        );
        assert!(page.next_page.is_none());
    }

    #[tokio::test]
    async fn test_cloud_ids_are_fetched_individually() {
        let disk_id = "/subscriptions/sub-1/resourcegroups/rg-web/providers/microsoft.compute/disks/gone";
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(move |req| req.url.starts_with(&format!("https://management.azure.com{}?api-version=", disk_id)))
            .times(1)
            .returning(|_| {
                Ok(respond(
                    404,
                    serde_json::json!({"error": {"code": "ResourceNotFound", "message": "gone"}}),
                ))
            });

        let scope = scope().with_cloud_ids([disk_id]);
        let page = AzureDiskClient::new(connector(http))
            .list_page(&scope, None)
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_resource_group() {
        let scope = SyncScope::new(Vendor::Azure, "sub-1", "eastus");
        let err = AzureNetworkInterfaceClient::new(connector(MockHttpClient::new()))
            .list_page(&scope, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::InvalidScope(_)));
    }

    #[tokio::test]
    async fn test_associate_rewrites_primary_ip_configuration() {
        let nic_id = format!("{RG}/providers/Microsoft.Network/networkInterfaces/NIC-1");
        let mut http = MockHttpClient::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|req| req.method == HttpMethod::Get)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(respond(
                    200,
                    serde_json::json!({
                        "name": "NIC-1",
                        "location": "eastus",
                        "properties": {"ipConfigurations": [
                            {"name": "secondary", "properties": {"primary": false}},
                            {"name": "ipconfig1", "properties": {"primary": true, "privateIPAddress": "10.0.0.4"}}
                        ]}
                    }),
                ))
            });
        http.expect_execute()
            .withf(|req| {
                let body: Value = serde_json::from_slice(req.body_bytes()).unwrap();
                req.method == HttpMethod::Put
                    && body.pointer("/properties/ipConfigurations/1/properties/publicIPAddress/id")
                        == Some(&Value::String("ip-1".into()))
                    && body.pointer("/properties/ipConfigurations/0/properties/publicIPAddress").is_none()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(respond(200, serde_json::json!({}))));

        let request = EipAssociation::new("ip-1", "vm-1").with_network_interface(nic_id);
        AzureAssociationClient::new(connector(http))
            .associate(&scope(), &request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_associate_requires_nic() {
        let err = AzureAssociationClient::new(connector(MockHttpClient::new()))
            .associate(&scope(), &EipAssociation::new("ip-1", "vm-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::InvalidScope(_)));
    }
}
