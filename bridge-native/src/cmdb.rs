//! CMDB client over the BlueKing API gateway.

use async_trait::async_trait;
use bridge_traits::{
    cmdb::{
        cmdb_vendor_code, AddCloudHostRequest, CmdbClient, DeleteCloudHostRequest,
        RegisteredHost, CMDB_HOST_BATCH_LIMIT,
    },
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy},
    resource::Vendor,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Gateway application credentials.
#[derive(Clone)]
pub struct GatewayAuth {
    pub app_code: String,
    pub app_secret: String,
    pub username: String,
}

impl std::fmt::Debug for GatewayAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayAuth")
            .field("app_code", &self.app_code)
            .field("app_secret", &"***")
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GatewayResponse<T> {
    result: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BatchCreateResult {
    #[serde(default)]
    ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ListHostResult {
    #[serde(default)]
    info: Vec<RegisteredHost>,
}

#[derive(Debug, Serialize)]
struct Page {
    start: usize,
    limit: usize,
}

pub struct GatewayCmdbClient {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    auth: GatewayAuth,
}

impl GatewayCmdbClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, auth: GatewayAuth) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn auth_header(&self) -> String {
        json!({
            "bk_app_code": self.auth.app_code,
            "bk_app_secret": self.auth.app_secret,
            "bk_username": self.auth.username,
        })
        .to_string()
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let request = HttpRequest::new(method, format!("{}{}", self.endpoint, path))
            .header("X-Bkapi-Authorization", self.auth_header())
            .json(body)?;

        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        if !response.is_success() {
            warn!(status = response.status, path, "CMDB request rejected");
            return Err(BridgeError::OperationFailed(format!(
                "cmdb {} returned HTTP {}",
                path, response.status
            )));
        }

        let parsed: GatewayResponse<T> = response.json()?;
        if !parsed.result {
            return Err(BridgeError::OperationFailed(format!(
                "cmdb {} failed, code: {}, message: {}",
                path, parsed.code, parsed.message
            )));
        }

        Ok(parsed.data)
    }
}

fn check_batch(len: usize) -> Result<()> {
    if len == 0 || len > CMDB_HOST_BATCH_LIMIT {
        return Err(BridgeError::OperationFailed(format!(
            "cmdb host batch must contain 1..={} hosts, got {}",
            CMDB_HOST_BATCH_LIMIT, len
        )));
    }
    Ok(())
}

#[async_trait]
impl CmdbClient for GatewayCmdbClient {
    #[instrument(skip(self, request), fields(bk_biz_id = request.bk_biz_id, count = request.host_info.len()))]
    async fn add_cloud_host_to_biz(&self, request: AddCloudHostRequest) -> Result<Vec<i64>> {
        check_batch(request.host_info.len())?;

        let result: Option<BatchCreateResult> = self
            .call(HttpMethod::Post, "/api/v3/createmany/cloudhost", &request)
            .await?;

        let ids = result.map(|r| r.ids).unwrap_or_default();
        debug!(created = ids.len(), "Added cloud hosts to business");
        Ok(ids)
    }

    #[instrument(skip(self, request), fields(bk_biz_id = request.bk_biz_id, count = request.bk_host_ids.len()))]
    async fn delete_cloud_host_from_biz(&self, request: DeleteCloudHostRequest) -> Result<()> {
        check_batch(request.bk_host_ids.len())?;

        let _: Option<serde_json::Value> = self
            .call(HttpMethod::Delete, "/api/v3/deletemany/cloudhost", &request)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, cloud_inst_ids), fields(count = cloud_inst_ids.len()))]
    async fn list_biz_hosts(
        &self,
        bk_biz_id: i64,
        vendor: Vendor,
        cloud_inst_ids: &[String],
    ) -> Result<Vec<RegisteredHost>> {
        if cloud_inst_ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "bk_biz_id": bk_biz_id,
            "fields": ["bk_host_id", "bk_cloud_inst_id"],
            "page": Page { start: 0, limit: CMDB_HOST_BATCH_LIMIT },
            "host_property_filter": {
                "condition": "AND",
                "rules": [
                    { "field": "bk_cloud_vendor", "operator": "equal", "value": cmdb_vendor_code(vendor) },
                    { "field": "bk_cloud_inst_id", "operator": "in", "value": cloud_inst_ids },
                ]
            }
        });

        let path = format!("/api/v3/hosts/app/{}/list_hosts", bk_biz_id);
        let result: Option<ListHostResult> = self.call(HttpMethod::Post, &path, &body).await?;
        Ok(result.map(|r| r.info).unwrap_or_default())
    }
}
