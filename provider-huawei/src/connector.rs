//! HuaWei Cloud connector
//!
//! Regional endpoints are `https://{service}.{region}.myhuaweicloud.com`.
//! VPC and EVS page by marker (the last id of a full page); ECS pages by
//! page number starting at 1.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::extension::{
    Extension, HuaWeiCvmExtension, HuaWeiDiskExtension, HuaWeiEipExtension,
    HuaWeiNetworkInterfaceExtension,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, ResourceRef, SyncScope, Vendor,
};
use bridge_traits::vendor::{
    EipAssociation, EipAssociationClient, PageToken, ResourcePage, VendorResourceClient,
    VendorResult,
};
use bytes::Bytes;
use chrono::Utc;
use core_runtime::config::HuaWeiCredentials;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::error::{HuaWeiError, Result};
use crate::signer::{canonical_query, ApigSigner, Signable, CONTENT_TYPE};
use crate::types::{
    ErrorResponse, ListPortsResponse, ListPublicipsResponse, ListServersResponse,
    ListVolumesResponse, Port, Publicip, Server, UpdatePublicip, UpdatePublicipRequest, Volume,
};

const DEFAULT_ROOT_DOMAIN: &str = "myhuaweicloud.com";

const PAGE_LIMIT: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HuaWeiConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: HuaWeiCredentials,
    timeout: Duration,
}

type Query = Vec<(String, String)>;

impl HuaWeiConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: HuaWeiCredentials) -> Self {
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

    fn project_id(&self) -> &str {
        &self.credentials.project_id
    }

    fn host(&self, service: &str, region: &str) -> String {
        let root = self
            .credentials
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ROOT_DOMAIN);
        format!("{}.{}.{}", service, region, root)
    }

    #[instrument(skip(self, query, body), fields(service = %service, region = %region))]
    async fn send(
        &self,
        method: HttpMethod,
        service: &str,
        region: &str,
        path: &str,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let host = self.host(service, region);
        let canonical_query = canonical_query(query);

        let signed = ApigSigner {
            access_key: &self.credentials.access_key,
            secret_key: &self.credentials.secret_key,
            project_id: self.project_id(),
        }
        .sign(
            &Signable {
                method: method.as_str(),
                host: &host,
                path,
                canonical_query: &canonical_query,
                body: &body,
            },
            Utc::now(),
        )?;

        let url = if canonical_query.is_empty() {
            format!("https://{}{}", host, path)
        } else {
            format!("https://{}{}?{}", host, path, canonical_query)
        };

        let mut request = HttpRequest::new(method, url)
            .header("Authorization", signed.authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", host)
            .header("X-Project-Id", self.project_id())
            .header("X-Sdk-Date", signed.sdk_date)
            .timeout(self.timeout);
        if !body.is_empty() {
            request = request.body(Bytes::from(body));
        }

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        service: &str,
        region: &str,
        path: &str,
        query: Query,
    ) -> Result<T> {
        let response = self
            .send(HttpMethod::Get, service, region, path, &query, Vec::new())
            .await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| HuaWeiError::Parse(format!("{}: {}", path, e)))
    }

    async fn list_publicips(
        &self,
        region: &str,
        ids: Option<&[String]>,
        marker: Option<PageToken>,
    ) -> Result<Vec<Publicip>> {
        let mut query = limit_and_marker(marker);
        for id in ids.unwrap_or_default() {
            query.push(("id".to_string(), id.clone()));
        }
        let path = format!("/v2.0/{}/publicips", self.project_id());
        let response: ListPublicipsResponse =
            not_found_as_empty(self.get("vpc", region, &path, query).await)?;
        Ok(response.publicips)
    }
}

fn api_error(response: &HttpResponse) -> HuaWeiError {
    let parsed = serde_json::from_slice::<ErrorResponse>(&response.body)
        .ok()
        .and_then(ErrorResponse::into_parts);
    let (code, message) = parsed.unwrap_or_else(|| {
        (
            response.status.to_string(),
            String::from_utf8_lossy(&response.body).to_string(),
        )
    });
    warn!("[huawei] request failed, status: {}, code: {}", response.status, code);
    HuaWeiError::Api {
        status: response.status,
        code,
        message,
    }
}

/// Listing unknown ids answers 404 on some services; that is an empty result.
fn not_found_as_empty<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(HuaWeiError::Api { status: 404, .. }) => Ok(T::default()),
        other => other,
    }
}

fn limit_and_marker(marker: Option<PageToken>) -> Query {
    let mut query = vec![("limit".to_string(), PAGE_LIMIT.to_string())];
    if let Some(marker) = marker {
        query.push(("marker".to_string(), marker));
    }
    query
}

/// Marker for the page after one that ended with `last_id`.
fn next_marker(filtered: bool, returned: usize, last_id: Option<&str>) -> Option<PageToken> {
    if filtered || returned < PAGE_LIMIT {
        return None;
    }
    last_id.map(str::to_string)
}

// ============================================================================
// EIP
// ============================================================================

pub struct HuaWeiEipClient {
    connector: Arc<HuaWeiConnector>,
}

impl HuaWeiEipClient {
    pub fn new(connector: Arc<HuaWeiConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let ids = scope.cloud_ids.as_deref();
        let publicips = self
            .connector
            .list_publicips(&scope.region, ids, page)
            .await?;

        let next = next_marker(
            ids.is_some(),
            publicips.len(),
            publicips.last().map(|ip| ip.id.as_str()),
        );
        let items = publicips
            .into_iter()
            .map(|ip| eip_resource(ip, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn eip_resource(ip: Publicip, region: &str) -> CloudResource {
    let port_id = ip.port_id.filter(|p| !p.is_empty());
    let attachment = port_id.clone().map(Attachment::network_interface);

    let extension = Extension::HuaWeiEip(HuaWeiEipExtension {
        public_ip: ip.public_ip_address,
        private_ip: ip.private_ip_address,
        port_id,
        ip_type: ip.ip_type,
        bandwidth_size: ip.bandwidth_size,
        bandwidth_share_type: ip.bandwidth_share_type,
    });

    CloudResource::new(ip.id, ip.status, region, extension)
        .with_name(ip.alias.unwrap_or_default())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for HuaWeiEipClient {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
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

pub struct HuaWeiCvmClient {
    connector: Arc<HuaWeiConnector>,
}

impl HuaWeiCvmClient {
    pub fn new(connector: Arc<HuaWeiConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let page_number = match page {
            Some(token) => token
                .parse::<u64>()
                .map_err(|_| HuaWeiError::InvalidPageToken(token))?,
            None => 1,
        };

        let mut query = vec![
            ("limit".to_string(), PAGE_LIMIT.to_string()),
            ("offset".to_string(), page_number.to_string()),
        ];
        if let Some(ids) = &scope.cloud_ids {
            query.push(("server_id".to_string(), ids.join(",")));
        }

        let path = format!("/v1/{}/cloudservers/detail", self.connector.project_id());
        let response: ListServersResponse = not_found_as_empty(
            self.connector
                .get("ecs", &scope.region, &path, query)
                .await,
        )?;

        let next = if scope.cloud_ids.is_none()
            && !response.servers.is_empty()
            && page_number * (PAGE_LIMIT as u64) < response.count
        {
            Some((page_number + 1).to_string())
        } else {
            None
        };
        debug!(
            "[huawei] list servers page {}, got {} of {}",
            page_number,
            response.servers.len(),
            response.count
        );

        let items = response
            .servers
            .into_iter()
            .map(|server| cvm_resource(server, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn cvm_resource(server: Server, region: &str) -> CloudResource {
    let ports = server.port_ids();
    let extension = Extension::HuaWeiCvm(HuaWeiCvmExtension {
        flavor_id: server.flavor.as_ref().map(|f| f.id.clone()),
        image_id: server.image.as_ref().map(|i| i.id.clone()),
        vpc_id: server.metadata.get("vpc_id").cloned(),
        private_ips: server.ips_of_type("fixed").map(str::to_string).collect(),
        public_ips: server.ips_of_type("floating").map(str::to_string).collect(),
        created: server.created.clone(),
    });

    let mut resource = CloudResource::new(server.id, server.status, region, extension)
        .with_name(server.name)
        .with_zone(server.availability_zone.unwrap_or_default());
    for volume in server.volumes_attached {
        resource = resource.with_related(ResourceKind::Disk, ResourceRef::CloudId(volume.id));
    }
    for port in ports {
        resource = resource.with_related(ResourceKind::NetworkInterface, ResourceRef::CloudId(port));
    }
    resource
}

#[async_trait]
impl VendorResourceClient for HuaWeiCvmClient {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
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

pub struct HuaWeiDiskClient {
    connector: Arc<HuaWeiConnector>,
}

impl HuaWeiDiskClient {
    pub fn new(connector: Arc<HuaWeiConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let mut query = limit_and_marker(page);
        if let Some(ids) = &scope.cloud_ids {
            let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", id)).collect();
            query.push(("ids".to_string(), format!("[{}]", quoted.join(","))));
        }

        let path = format!("/v2/{}/cloudvolumes/detail", self.connector.project_id());
        let response: ListVolumesResponse = not_found_as_empty(
            self.connector
                .get("evs", &scope.region, &path, query)
                .await,
        )?;

        let next = next_marker(
            scope.cloud_ids.is_some(),
            response.volumes.len(),
            response.volumes.last().map(|v| v.id.as_str()),
        );
        let items = response
            .volumes
            .into_iter()
            .filter(|volume| scope.admits(&volume.id))
            .map(|volume| disk_resource(volume, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn disk_resource(volume: Volume, region: &str) -> CloudResource {
    let attachment = volume
        .attachments
        .iter()
        .map(|a| a.server_id.as_str())
        .find(|id| !id.is_empty())
        .map(Attachment::instance);

    let extension = Extension::HuaWeiDisk(HuaWeiDiskExtension {
        size_gb: volume.size,
        volume_type: volume.volume_type,
        bootable: volume.bootable.as_deref() == Some("true"),
        multiattach: volume.multiattach,
    });

    CloudResource::new(volume.id, volume.status, region, extension)
        .with_name(volume.name)
        .with_zone(volume.availability_zone.unwrap_or_default())
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for HuaWeiDiskClient {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
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
// Network interface (VPC ports)
// ============================================================================

pub struct HuaWeiNetworkInterfaceClient {
    connector: Arc<HuaWeiConnector>,
}

impl HuaWeiNetworkInterfaceClient {
    pub fn new(connector: Arc<HuaWeiConnector>) -> Self {
        Self { connector }
    }

    async fn list(&self, scope: &SyncScope, page: Option<PageToken>) -> Result<ResourcePage> {
        let mut query = limit_and_marker(page);
        for id in scope.cloud_ids.iter().flatten() {
            query.push(("id".to_string(), id.clone()));
        }

        let path = format!("/v1/{}/ports", self.connector.project_id());
        let response: ListPortsResponse = not_found_as_empty(
            self.connector
                .get("vpc", &scope.region, &path, query)
                .await,
        )?;

        let next = next_marker(
            scope.cloud_ids.is_some(),
            response.ports.len(),
            response.ports.last().map(|p| p.id.as_str()),
        );
        let items = response
            .ports
            .into_iter()
            .map(|port| nic_resource(port, &scope.region))
            .collect();
        Ok(ResourcePage::with_next(items, next))
    }
}

fn nic_resource(port: Port, region: &str) -> CloudResource {
    let attachment = port.instance_id().map(Attachment::instance);

    let extension = Extension::HuaWeiNetworkInterface(HuaWeiNetworkInterfaceExtension {
        mac_address: port.mac_address,
        network_id: port.network_id,
        device_owner: port.device_owner,
        fixed_ips: port.fixed_ips.into_iter().map(|ip| ip.ip_address).collect(),
    });

    CloudResource::new(port.id, port.status, region, extension)
        .with_name(port.name)
        .with_attachment(attachment)
}

#[async_trait]
impl VendorResourceClient for HuaWeiNetworkInterfaceClient {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
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

/// Binds an EIP to a port by updating the EIP's `port_id`.
pub struct HuaWeiAssociationClient {
    connector: Arc<HuaWeiConnector>,
}

impl HuaWeiAssociationClient {
    pub fn new(connector: Arc<HuaWeiConnector>) -> Self {
        Self { connector }
    }

    async fn update_port(&self, region: &str, eip_id: &str, port_id: Option<String>) -> Result<()> {
        let body = serde_json::to_vec(&UpdatePublicipRequest {
            publicip: UpdatePublicip { port_id },
        })
        .map_err(|e| HuaWeiError::Parse(format!("encode publicip update: {}", e)))?;

        let path = format!("/v2.0/{}/publicips/{}", self.connector.project_id(), eip_id);
        self.connector
            .send(HttpMethod::Put, "vpc", region, &path, &[], body)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EipAssociationClient for HuaWeiAssociationClient {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
    }

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let port_id = request.require_network_interface(Vendor::HuaWei)?;
        self.update_port(&scope.region, &request.eip_cloud_id, Some(port_id.to_string()))
            .await?;

        info!(
            "[huawei] associate eip {} to port {} success, account: {}",
            request.eip_cloud_id, port_id, scope.account_id
        );
        Ok(())
    }

    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()> {
        let ids = [request.eip_cloud_id.clone()];
        let current = self
            .connector
            .list_publicips(&scope.region, Some(&ids[..]), None)
            .await?;
        let bound = current
            .iter()
            .any(|ip| ip.port_id.as_deref().is_some_and(|p| !p.is_empty()));
        if !bound {
            info!(
                "[huawei] eip {} is not bound, skip disassociate",
                request.eip_cloud_id
            );
            return Ok(());
        }

        self.update_port(&scope.region, &request.eip_cloud_id, None)
            .await?;
        info!(
            "[huawei] disassociate eip {} success, account: {}",
            request.eip_cloud_id, scope.account_id
        );
        Ok(())
    }
}
