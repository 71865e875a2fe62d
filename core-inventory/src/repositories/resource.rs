//! Resource store trait and SQLite implementation

use std::collections::HashMap;

use async_trait::async_trait;
use bridge_traits::extension::ExtensionCodec;
use bridge_traits::resource::{ResourceKind, ResourceRef, Vendor};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::models::{
    encode_attachment, now_secs, resource_table, NewResource, RelationKind, ResourceFilter,
    ResourceRecord, ResourceRow, ResourceUpdate,
};
use crate::repositories::{push_in_str, Page, PageRequest, SQL_CHUNK};

const COLUMNS: &str = "id, vendor, cloud_id, name, account_id, region, zone, resource_group, \
                       status, attachment, business_id, extension, created_at, updated_at";

/// System-of-record access for resource records.
///
/// Each batch method is atomic: it either applies every item or none.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Records of `kind` matching `filter`, ordered by cloud id.
    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        page: PageRequest,
    ) -> Result<Page<ResourceRecord>>;

    /// Insert records, returning their generated ids in input order.
    ///
    /// # Errors
    /// - `Conflict` if a `(vendor, cloud_id)` already exists
    /// - `InvalidInput` if an extension does not belong to `(vendor, kind)`
    async fn batch_create(&self, kind: ResourceKind, items: Vec<NewResource>)
        -> Result<Vec<String>>;

    /// Overwrite mutable fields by internal id.
    ///
    /// # Errors
    /// - `NotFound` if any id does not exist
    async fn batch_update_by_id(&self, kind: ResourceKind, items: Vec<ResourceUpdate>)
        -> Result<()>;

    /// Delete matching records together with the edges that reference them.
    ///
    /// # Errors
    /// - `InvalidInput` for an unbounded filter
    async fn batch_delete_by_filter(&self, kind: ResourceKind, filter: &ResourceFilter)
        -> Result<u64>;

    /// Set the business id of records by internal id.
    async fn assign_business(&self, kind: ResourceKind, ids: &[String], business_id: i64)
        -> Result<u64>;

    /// Map vendor references (cloud id or name) to internal ids.
    ///
    /// Unknown references are absent from the result.
    async fn resolve_refs(
        &self,
        vendor: Vendor,
        kind: ResourceKind,
        account_id: &str,
        refs: &[ResourceRef],
    ) -> Result<HashMap<ResourceRef, String>>;
}

/// SQLite implementation of ResourceStore
pub struct SqliteResourceStore {
    pool: SqlitePool,
}

impl SqliteResourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a ResourceFilter) {
    if let Some(vendor) = filter.vendor {
        qb.push(" AND vendor = ").push_bind(vendor.as_str());
    }
    if let Some(account_id) = &filter.account_id {
        qb.push(" AND account_id = ").push_bind(account_id.as_str());
    }
    if let Some(region) = &filter.region {
        qb.push(" AND region = ").push_bind(region.as_str());
    }
    if let Some(zone) = &filter.zone {
        qb.push(" AND zone = ").push_bind(zone.as_str());
    }
    if let Some(group) = &filter.resource_group {
        qb.push(" AND resource_group = ").push_bind(group.as_str());
    }
    if let Some(business_id) = filter.business_id {
        qb.push(" AND business_id = ").push_bind(business_id);
    }
    if let Some(cloud_ids) = &filter.cloud_ids {
        push_in_str(qb, "cloud_id", cloud_ids);
    }
    if let Some(ids) = &filter.ids {
        push_in_str(qb, "id", ids);
    }
}

fn check_extension(kind: ResourceKind, item_kind: ResourceKind, cloud_id: &str) -> Result<()> {
    if item_kind != kind {
        return Err(InventoryError::invalid(
            "extension",
            format!("{} carries a {} schema, expected {}", cloud_id, item_kind, kind),
        ));
    }
    Ok(())
}

async fn delete_edges(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    kind: ResourceKind,
    ids: &[String],
) -> Result<u64> {
    let targets: Vec<(RelationKind, &str)> = match RelationKind::for_resource(kind) {
        Some(relation) => vec![(relation, "res_id")],
        None => RelationKind::ALL.iter().map(|r| (*r, "cvm_id")).collect(),
    };

    let mut removed = 0;
    for (relation, column) in targets {
        for chunk in ids.chunks(SQL_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "DELETE FROM {} WHERE 1 = 1",
                relation.table()
            ));
            push_in_str(&mut qb, column, chunk);
            removed += qb.build().execute(&mut **tx).await?.rows_affected();
        }
    }
    Ok(removed)
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    #[instrument(skip(self, filter), fields(kind = %kind, page = page.page))]
    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        page: PageRequest,
    ) -> Result<Page<ResourceRecord>> {
        if filter.matches_nothing() {
            return Ok(Page::empty(page));
        }
        let table = resource_table(kind);

        let mut count = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM {} WHERE 1 = 1",
            table
        ));
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            COLUMNS, table
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY cloud_id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<ResourceRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(|row| row.into_record(kind))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }

    #[instrument(skip(self, items), fields(kind = %kind, count = items.len()))]
    async fn batch_create(
        &self,
        kind: ResourceKind,
        items: Vec<NewResource>,
    ) -> Result<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let table = resource_table(kind);
        let now = now_secs();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            table, COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(items.len());

        for item in &items {
            let (vendor, item_kind) = item.extension.key();
            check_extension(kind, item_kind, &item.cloud_id)?;
            if vendor != item.vendor {
                return Err(InventoryError::invalid(
                    "extension",
                    format!("{} carries a {} schema for a {} record", item.cloud_id, vendor, item.vendor),
                ));
            }

            let id = Uuid::new_v4().to_string();
            sqlx::query(&sql)
                .bind(&id)
                .bind(item.vendor.as_str())
                .bind(&item.cloud_id)
                .bind(&item.name)
                .bind(&item.account_id)
                .bind(&item.region)
                .bind(&item.zone)
                .bind(&item.resource_group)
                .bind(&item.status)
                .bind(encode_attachment(&item.attachment)?)
                .bind(item.business_id)
                .bind(ExtensionCodec::encode(&item.extension)?)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| InventoryError::from_write(table, e))?;
            ids.push(id);
        }

        tx.commit().await?;
        debug!(created = ids.len(), "Batch created records");
        Ok(ids)
    }

    #[instrument(skip(self, items), fields(kind = %kind, count = items.len()))]
    async fn batch_update_by_id(
        &self,
        kind: ResourceKind,
        items: Vec<ResourceUpdate>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let table = resource_table(kind);
        let now = now_secs();
        let sql = format!(
            "UPDATE {} SET name = ?, zone = ?, resource_group = ?, status = ?, attachment = ?, \
             extension = ?, updated_at = ? WHERE id = ?",
            table
        );

        let mut tx = self.pool.begin().await?;

        for item in &items {
            check_extension(kind, item.extension.key().1, &item.id)?;

            let result = sqlx::query(&sql)
                .bind(&item.name)
                .bind(&item.zone)
                .bind(&item.resource_group)
                .bind(&item.status)
                .bind(encode_attachment(&item.attachment)?)
                .bind(ExtensionCodec::encode(&item.extension)?)
                .bind(now)
                .bind(&item.id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(InventoryError::NotFound {
                    entity_type: table.to_string(),
                    id: item.id.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, filter), fields(kind = %kind))]
    async fn batch_delete_by_filter(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<u64> {
        if filter.is_unbounded() {
            return Err(InventoryError::invalid(
                "filter",
                "refusing to delete with an empty filter",
            ));
        }
        if filter.matches_nothing() {
            return Ok(0);
        }
        let table = resource_table(kind);

        let mut tx = self.pool.begin().await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT id FROM {} WHERE 1 = 1", table));
        push_filter(&mut select, filter);
        let ids: Vec<String> = select.build_query_scalar().fetch_all(&mut *tx).await?;

        if ids.is_empty() {
            return Ok(0);
        }

        let edges = delete_edges(&mut tx, kind, &ids).await?;

        let mut deleted = 0;
        for chunk in ids.chunks(SQL_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE 1 = 1", table));
            push_in_str(&mut qb, "id", chunk);
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(deleted, edges, "Batch deleted records");
        Ok(deleted)
    }

    #[instrument(skip(self, ids), fields(kind = %kind, count = ids.len()))]
    async fn assign_business(
        &self,
        kind: ResourceKind,
        ids: &[String],
        business_id: i64,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = resource_table(kind);
        let now = now_secs();

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for chunk in ids.chunks(SQL_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET business_id = ", table));
            qb.push_bind(business_id)
                .push(", updated_at = ")
                .push_bind(now)
                .push(" WHERE 1 = 1");
            push_in_str(&mut qb, "id", chunk);
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(updated)
    }

    #[instrument(skip(self, refs), fields(vendor = %vendor, kind = %kind, count = refs.len()))]
    async fn resolve_refs(
        &self,
        vendor: Vendor,
        kind: ResourceKind,
        account_id: &str,
        refs: &[ResourceRef],
    ) -> Result<HashMap<ResourceRef, String>> {
        let table = resource_table(kind);
        let mut cloud_ids = Vec::new();
        let mut names = Vec::new();
        for reference in refs {
            match reference {
                ResourceRef::CloudId(id) => cloud_ids.push(id.clone()),
                ResourceRef::Name(name) => names.push(name.clone()),
            }
        }

        let mut resolved = HashMap::new();

        for (column, values) in [("cloud_id", &cloud_ids), ("name", &names)] {
            for chunk in values.chunks(SQL_CHUNK) {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT id, {} FROM {} WHERE vendor = ",
                    column, table
                ));
                qb.push_bind(vendor.as_str())
                    .push(" AND account_id = ")
                    .push_bind(account_id);
                push_in_str(&mut qb, column, chunk);

                let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
                for (id, value) in rows {
                    let key = if column == "cloud_id" {
                        ResourceRef::CloudId(value)
                    } else {
                        ResourceRef::Name(value)
                    };
                    resolved.insert(key, id);
                }
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::extension::{Extension, GcpCvmExtension, TCloudEipExtension};
    use bridge_traits::resource::{Attachment, CloudResource, UNASSIGNED_BUSINESS};

    fn eip(cloud_id: &str, status: &str) -> NewResource {
        let resource = CloudResource::new(
            cloud_id,
            status,
            "ap-guangzhou",
            Extension::TCloudEip(TCloudEipExtension::default()),
        )
        .with_attachment(Some(Attachment::instance("ins-1")));
        NewResource::from_cloud(Vendor::TCloud, "acct-1", UNASSIGNED_BUSINESS, &resource)
    }

    fn scope_filter() -> ResourceFilter {
        ResourceFilter {
            vendor: Some(Vendor::TCloud),
            account_id: Some("acct-1".into()),
            region: Some("ap-guangzhou".into()),
            ..Default::default()
        }
    }

    async fn setup() -> SqliteResourceStore {
        SqliteResourceStore::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = setup().await;
        let ids = store
            .batch_create(ResourceKind::Eip, vec![eip("eip-2", "BIND"), eip("eip-1", "UNBIND")])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let page = store
            .list(ResourceKind::Eip, &scope_filter(), PageRequest::first(10))
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].cloud_id, "eip-1");
        assert_eq!(page.items[1].id, ids[0]);
        assert_eq!(page.items[1].attachment, Some(Attachment::instance("ins-1")));
        assert_eq!(page.items[1].business_id, UNASSIGNED_BUSINESS);
    }

    #[tokio::test]
    async fn test_duplicate_cloud_id_is_conflict_and_rolls_back() {
        let store = setup().await;
        store
            .batch_create(ResourceKind::Eip, vec![eip("eip-1", "BIND")])
            .await
            .unwrap();

        let result = store
            .batch_create(ResourceKind::Eip, vec![eip("eip-9", "BIND"), eip("eip-1", "BIND")])
            .await;
        assert!(matches!(result, Err(InventoryError::Conflict { .. })));

        let page = store
            .list(ResourceKind::Eip, &scope_filter(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_extension_must_match_kind() {
        let store = setup().await;
        let result = store
            .batch_create(ResourceKind::Cvm, vec![eip("eip-1", "BIND")])
            .await;
        assert!(matches!(result, Err(InventoryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_update_by_id() {
        let store = setup().await;
        let ids = store
            .batch_create(ResourceKind::Eip, vec![eip("eip-1", "BIND")])
            .await
            .unwrap();

        let cloud = CloudResource::new(
            "eip-1",
            "UNBIND",
            "ap-guangzhou",
            Extension::TCloudEip(TCloudEipExtension::default()),
        );
        store
            .batch_update_by_id(ResourceKind::Eip, vec![ResourceUpdate::from_cloud(&ids[0], &cloud)])
            .await
            .unwrap();

        let page = store
            .list(ResourceKind::Eip, &ResourceFilter::by_ids(ids), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items[0].status, "UNBIND");
        assert_eq!(page.items[0].attachment, None);
        assert_eq!(page.items[0].cloud_id, "eip-1");
    }

    #[tokio::test]
    async fn test_update_missing_id_fails() {
        let store = setup().await;
        let cloud = CloudResource::new(
            "eip-1",
            "UNBIND",
            "ap-guangzhou",
            Extension::TCloudEip(TCloudEipExtension::default()),
        );
        let result = store
            .batch_update_by_id(ResourceKind::Eip, vec![ResourceUpdate::from_cloud("nope", &cloud)])
            .await;
        assert!(matches!(result, Err(InventoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_by_cloud_ids() {
        let store = setup().await;
        store
            .batch_create(
                ResourceKind::Eip,
                vec![eip("eip-1", "BIND"), eip("eip-2", "BIND"), eip("eip-3", "BIND")],
            )
            .await
            .unwrap();

        let deleted = store
            .batch_delete_by_filter(ResourceKind::Eip, &scope_filter().with_cloud_ids(["eip-1", "eip-3"]))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let page = store
            .list(ResourceKind::Eip, &scope_filter(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].cloud_id, "eip-2");
    }

    #[tokio::test]
    async fn test_unbounded_delete_is_refused() {
        let store = setup().await;
        let result = store
            .batch_delete_by_filter(ResourceKind::Eip, &ResourceFilter::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_cloud_ids_match_nothing() {
        let store = setup().await;
        store
            .batch_create(ResourceKind::Eip, vec![eip("eip-1", "BIND")])
            .await
            .unwrap();

        let filter = scope_filter().with_cloud_ids(Vec::<String>::new());
        assert_eq!(store.batch_delete_by_filter(ResourceKind::Eip, &filter).await.unwrap(), 0);
        let page = store
            .list(ResourceKind::Eip, &filter, PageRequest::first(10))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_assign_business() {
        let store = setup().await;
        let ids = store
            .batch_create(ResourceKind::Eip, vec![eip("eip-1", "BIND"), eip("eip-2", "BIND")])
            .await
            .unwrap();

        let updated = store
            .assign_business(ResourceKind::Eip, &ids[..1], 42)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let page = store
            .list(ResourceKind::Eip, &scope_filter().with_business_id(42), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_resolve_refs_by_id_and_name() {
        let store = setup().await;
        let cvm = CloudResource::new(
            "1234567890",
            "RUNNING",
            "us-central1",
            Extension::GcpCvm(GcpCvmExtension::default()),
        )
        .with_name("web-1");
        let ids = store
            .batch_create(
                ResourceKind::Cvm,
                vec![NewResource::from_cloud(Vendor::Gcp, "proj-1", UNASSIGNED_BUSINESS, &cvm)],
            )
            .await
            .unwrap();

        let refs = vec![
            ResourceRef::CloudId("1234567890".into()),
            ResourceRef::Name("web-1".into()),
            ResourceRef::Name("missing".into()),
        ];
        let resolved = store
            .resolve_refs(Vendor::Gcp, ResourceKind::Cvm, "proj-1", &refs)
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get(&refs[0]), Some(&ids[0]));
        assert_eq!(resolved.get(&refs[1]), Some(&ids[0]));

        let other_account = store
            .resolve_refs(Vendor::Gcp, ResourceKind::Cvm, "proj-2", &refs)
            .await
            .unwrap();
        assert!(other_account.is_empty());
    }

    #[tokio::test]
    async fn test_paging_is_stable() {
        let store = setup().await;
        let items = (0..25).map(|i| eip(&format!("eip-{:02}", i), "BIND")).collect();
        store.batch_create(ResourceKind::Eip, items).await.unwrap();

        let mut request = PageRequest::first(10);
        let mut seen = Vec::new();
        loop {
            let page = store
                .list(ResourceKind::Eip, &scope_filter(), request)
                .await
                .unwrap();
            let has_next = page.has_next();
            seen.extend(page.items.into_iter().map(|r| r.cloud_id));
            if !has_next {
                break;
            }
            request = request.next();
        }

        assert_eq!(seen.len(), 25);
        assert_eq!(seen[0], "eip-00");
        assert_eq!(seen[24], "eip-24");
    }
}
