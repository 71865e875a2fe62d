//! EC2 Query API connector

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::extension::{AwsCvmExtension, AwsDiskExtension, AwsEipExtension, Extension};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor,
};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use bytes::Bytes;
use chrono::Utc;
use core_runtime::config::AwsCredentials;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::error::{AwsError, Result};
use crate::signer::{SigV4, FORM_CONTENT_TYPE};
use crate::types::{
    name_tag, Address, DescribeAddressesResponse, DescribeInstancesResponse,
    DescribeVolumesResponse, ErrorResponse, Instance, ReturnResponse, Volume,
};

const API_VERSION: &str = "2016-11-15";

/// `MaxResults` for DescribeInstances/DescribeVolumes
const PAGE_LIMIT: u32 = 500;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status reported for addresses, which carry no state of their own.
pub const STATUS_ASSOCIATED: &str = "BIND";
pub const STATUS_UNASSOCIATED: &str = "UNBIND";

/// Query parameters of one action, in insertion order.
#[derive(Debug, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn action(action: &str) -> Self {
        let mut params = Self::default();
        params.push("Action", action);
        params.push("Version", API_VERSION);
        params
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// `Filter.N.Name` / `Filter.N.Value.M`; ids in a filter never fail the
    /// request when one of them is unknown.
    pub fn filter(&mut self, index: usize, name: &str, values: &[String]) {
        self.push(format!("Filter.{}.Name", index), name);
        for (i, value) in values.iter().enumerate() {
            self.push(format!("Filter.{}.Value.{}", index, i + 1), value.clone());
        }
    }

    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub struct AwsConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: AwsCredentials,
    timeout: Duration,
}

impl AwsConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: AwsCredentials) -> Self {
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

    /// Base URL and `Host` header for a region.
    fn endpoint(&self, region: &str) -> (String, String) {
        match &self.credentials.endpoint {
            Some(endpoint) => {
                let url = endpoint.trim_end_matches('/').to_string();
                let host = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                (url, host)
            }
            None => {
                let host = format!("ec2.{}.amazonaws.com", region);
                (format!("https://{}", host), host)
            }
        }
    }

    #[instrument(skip(self, params), fields(region = %region))]
    pub async fn call<T: DeserializeOwned>(&self, region: &str, params: QueryParams) -> Result<T> {
        let (url, host) = self.endpoint(region);
        let body = params.encode();
        let now = Utc::now();

        let signed = SigV4 {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            session_token: self.credentials.session_token.as_deref(),
            region,
            service: "ec2",
        }
        .sign(&host, body.as_bytes(), now)?;

        let mut request = HttpRequest::new(HttpMethod::Post, format!("{}/", url))
            .header("Authorization", signed.authorization)
            .header("Content-Type", FORM_CONTENT_TYPE)
            .header("Host", host)
            .header("X-Amz-Date", signed.amz_date)
            .body(Bytes::from(body))
            .timeout(self.timeout);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token.clone());
        }

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        let text = String::from_utf8_lossy(&response.body).to_string();

        if !response.is_success() {
            return Err(match quick_xml::de::from_str::<ErrorResponse>(&text) {
                Ok(parsed) if !parsed.errors.errors.is_empty() => {
                    let request_id = parsed.request_id;
                    let error = parsed.errors.errors.into_iter().next().unwrap_or_default();
                    warn!(
                        "[aws] ec2 call failed, code: {}, request: {}",
                        error.code, request_id
                    );
                    AwsError::Api {
                        code: error.code,
                        message: error.message,
                        request_id,
                    }
                }
                _ => AwsError::Http {
                    status: response.status,
                    body: text,
                },
            });
        }

        quick_xml::de::from_str(&text).map_err(|e| AwsError::Parse(e.to_string()))
    }

    pub(crate) async fn describe_addresses(
        &self,
        region: &str,
        allocation_ids: Option<&[String]>,
    ) -> Result<Vec<Address>> {
        let mut params = QueryParams::action("DescribeAddresses");
        if let Some(ids) = allocation_ids {
            params.filter(1, "allocation-id", ids);
        }

        let response: DescribeAddressesResponse = self.call(region, params).await?;
        debug!(
            "[aws] describe addresses, count: {}, request: {}",
            response.addresses_set.items.len(),
            response.request_id
        );
        Ok(response.addresses_set.items)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Token-paged query shared by instances and volumes.
fn paged_params(
    action: &str,
    id_filter: &str,
    scope: &SyncScope,
    page: Option<PageToken>,
) -> QueryParams {
    let mut params = QueryParams::action(action);
    params.push("MaxResults", PAGE_LIMIT.to_string());
    if let Some(ids) = &scope.cloud_ids {
        params.filter(1, id_filter, ids);
    }
    if let Some(token) = page {
        params.push("NextToken", token);
    }
    params
}

// ============================================================================
// EIP
// ============================================================================

pub struct AwsEipClient {
    connector: Arc<AwsConnector>,
}

impl AwsEipClient {
    pub fn new(connector: Arc<AwsConnector>) -> Self {
        Self { connector }
    }
}

fn eip_resource(address: Address, region: &str) -> CloudResource {
    let name = name_tag(&address.tag_set).unwrap_or_default();
    let association_id = non_empty(address.association_id);
    let status = if association_id.is_some() {
        STATUS_ASSOCIATED
    } else {
        STATUS_UNASSOCIATED
    };
    let attachment = non_empty(address.instance_id).map(Attachment::instance);

    let extension = Extension::AwsEip(AwsEipExtension {
        public_ip: address.public_ip,
        allocation_id: Some(address.allocation_id.clone()),
        association_id,
        domain: address.domain,
        network_interface_id: non_empty(address.network_interface_id),
        private_ip: non_empty(address.private_ip_address),
        network_border_group: address.network_border_group,
    });

    CloudResource::new(address.allocation_id, status, region, extension)
        .with_name(name)
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for AwsEipClient {
    fn vendor(&self) -> Vendor {
        Vendor::Aws
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Eip
    }

    /// DescribeAddresses is not paginated.
    async fn list_page(
        &self,
        scope: &SyncScope,
        _page: Option<PageToken>,
    ) -> VendorResult<ResourcePage> {
        let addresses = self
            .connector
            .describe_addresses(&scope.region, scope.cloud_ids.as_deref())
            .await?;

        let items = addresses
            .into_iter()
            .map(|address| eip_resource(address, &scope.region))
            .collect();
        Ok(ResourcePage::last(items))
    }
}

// ============================================================================
// CVM
// ============================================================================

pub struct AwsCvmClient {
    connector: Arc<AwsConnector>,
}

impl AwsCvmClient {
    pub fn new(connector: Arc<AwsConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let params = paged_params("DescribeInstances", "instance-id", scope, page);
        let response: DescribeInstancesResponse = self.connector.call(&scope.region, params).await?;

        let items = response
            .reservation_set
            .items
            .into_iter()
            .flat_map(|reservation| reservation.instances_set.items)
            .map(|instance| cvm_resource(instance, &scope.region))
            .collect();

        Ok(ResourcePage::with_next(items, non_empty(response.next_token)))
    }
}

fn cvm_resource(instance: Instance, region: &str) -> CloudResource {
    let name = name_tag(&instance.tag_set).unwrap_or_default();
    let volume_ids: Vec<String> = instance
        .block_device_mapping
        .items
        .iter()
        .filter_map(|device| device.ebs.as_ref())
        .map(|ebs| ebs.volume_id.clone())
        .filter(|id| !id.is_empty())
        .collect();

    let extension = Extension::AwsCvm(AwsCvmExtension {
        instance_type: instance.instance_type,
        image_id: instance.image_id,
        vpc_id: instance.vpc_id,
        subnet_id: instance.subnet_id,
        private_ip: non_empty(instance.private_ip_address),
        public_ip: non_empty(instance.ip_address),
        launch_time: instance.launch_time,
    });

    let mut resource = CloudResource::new(
        instance.instance_id,
        instance.instance_state.name,
        region,
        extension,
    )
    .with_name(name)
    .with_zone(instance.placement.availability_zone.unwrap_or_default());
    for volume_id in volume_ids {
        resource = resource.with_related(ResourceKind::Disk, ResourceRef::CloudId(volume_id));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for AwsCvmClient {
    fn vendor(&self) -> Vendor {
        Vendor::Aws
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

pub struct AwsDiskClient {
    connector: Arc<AwsConnector>,
}

impl AwsDiskClient {
    pub fn new(connector: Arc<AwsConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let params = paged_params("DescribeVolumes", "volume-id", scope, page);
        let response: DescribeVolumesResponse = self.connector.call(&scope.region, params).await?;

        let items = response
            .volume_set
            .items
            .into_iter()
            .map(|volume| disk_resource(volume, &scope.region))
            .collect();

        Ok(ResourcePage::with_next(items, non_empty(response.next_token)))
    }
}

fn disk_resource(volume: Volume, region: &str) -> CloudResource {
    let name = name_tag(&volume.tag_set).unwrap_or_default();
    let attachment = volume
        .attachment_set
        .items
        .iter()
        .find(|a| !a.instance_id.is_empty() && a.state.as_deref() != Some("detached"))
        .map(|a| Attachment::instance(a.instance_id.clone()));

    let extension = Extension::AwsDisk(AwsDiskExtension {
        size_gb: volume.size,
        volume_type: volume.volume_type,
        encrypted: volume.encrypted,
        create_time: volume.create_time,
    });

    CloudResource::new(volume.volume_id, volume.status, region, extension)
        .with_name(name)
        .with_zone(volume.availability_zone.unwrap_or_default())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for AwsDiskClient {
    fn vendor(&self) -> Vendor {
        Vendor::Aws
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

pub struct AwsAssociationClient {
    connector: Arc<AwsConnector>,
}

impl AwsAssociationClient {
    pub fn new(connector: Arc<AwsConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl EipAssociationClient for AwsAssociationClient {
    fn vendor(&self) -> Vendor {
        Vendor::Aws
    }

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let mut params = QueryParams::action("AssociateAddress");
        params.push("AllocationId", request.eip_cloud_id.clone());
        match &request.network_interface_cloud_id {
            Some(nic) => params.push("NetworkInterfaceId", nic.clone()),
            None => params.push("InstanceId", request.cvm_cloud_id.clone()),
        }

        let response: ReturnResponse = self.connector.call(&scope.region, params).await?;
        info!(
            "[aws] associate eip {} to cvm {} success, account: {}, request: {}",
            request.eip_cloud_id, request.cvm_cloud_id, scope.account_id, response.request_id
        );
        Ok(())
    }

    /// Looks up the current association id first; an unbound address is a no-op.
    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let ids = [request.eip_cloud_id.clone()];
        let addresses = self
            .connector
            .describe_addresses(&scope.region, Some(&ids[..]))
            .await?;

        let association_id = addresses
            .into_iter()
            .find(|a| a.allocation_id == request.eip_cloud_id)
            .and_then(|a| non_empty(a.association_id));
        let Some(association_id) = association_id else {
            info!(
                "[aws] eip {} has no association, skip disassociate",
                request.eip_cloud_id
            );
            return Ok(());
        };

        let mut params = QueryParams::action("DisassociateAddress");
        params.push("AssociationId", association_id);
        let response: ReturnResponse = self.connector.call(&scope.region, params).await?;

        info!(
            "[aws] disassociate eip {} from cvm {} success, account: {}, request: {}",
            request.eip_cloud_id, request.cvm_cloud_id, scope.account_id, response.request_id
        );
        Ok(())
    }
}
