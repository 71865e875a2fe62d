//! Relationship edge store

use async_trait::async_trait;
use bridge_traits::resource::ResourceKind;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::error::{InventoryError, Result};
use crate::models::{
    now_secs, resource_table, NewRelation, RelationFilter, RelationKind, RelationRecord,
    RelationRow,
};
use crate::repositories::{push_in_i64, push_in_str, SQL_CHUNK};

/// Storage of `(resource, cvm)` edges.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Insert edges. Existing pairs are left untouched.
    ///
    /// # Errors
    /// - `EndpointMissing` if either endpoint record does not exist. Nothing is
    ///   written in that case.
    async fn create(&self, edges: Vec<NewRelation>) -> Result<u64>;

    /// Delete edges matching `filter`.
    ///
    /// # Errors
    /// - `InvalidInput` for an unbounded filter
    async fn delete(&self, filter: &RelationFilter) -> Result<u64>;

    async fn list(&self, filter: &RelationFilter) -> Result<Vec<RelationRecord>>;

    /// Every edge touching a record. CVM ids are looked up in all families.
    async fn list_by_endpoint(&self, kind: ResourceKind, id: &str) -> Result<Vec<RelationRecord>>;
}

pub struct SqliteRelationStore {
    pool: SqlitePool,
}

impl SqliteRelationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a RelationFilter) {
    if let Some(ids) = &filter.ids {
        push_in_i64(qb, "id", ids);
    }
    if let Some(res_ids) = &filter.res_ids {
        push_in_str(qb, "res_id", res_ids);
    }
    if let Some(cvm_ids) = &filter.cvm_ids {
        push_in_str(qb, "cvm_id", cvm_ids);
    }
}

async fn endpoint_exists(
    conn: &mut sqlx::SqliteConnection,
    table: &str,
    id: &str,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT 1 FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

#[async_trait]
impl RelationStore for SqliteRelationStore {
    #[instrument(skip(self, edges), fields(count = edges.len()))]
    async fn create(&self, edges: Vec<NewRelation>) -> Result<u64> {
        if edges.is_empty() {
            return Ok(0);
        }
        let now = now_secs();
        let mut tx = self.pool.begin().await?;

        let cvm_table = resource_table(ResourceKind::Cvm);
        for edge in &edges {
            let res_table = resource_table(edge.kind.resource_kind());
            if !endpoint_exists(&mut *tx, res_table, &edge.res_id).await? {
                return Err(InventoryError::EndpointMissing {
                    table: res_table.to_string(),
                    id: edge.res_id.clone(),
                });
            }
            if !endpoint_exists(&mut *tx, cvm_table, &edge.cvm_id).await? {
                return Err(InventoryError::EndpointMissing {
                    table: cvm_table.to_string(),
                    id: edge.cvm_id.clone(),
                });
            }
        }

        let mut inserted = 0;
        for edge in &edges {
            let sql = format!(
                "INSERT INTO {} (res_id, cvm_id, creator, created_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(res_id, cvm_id) DO NOTHING",
                edge.kind.table()
            );
            inserted += sqlx::query(&sql)
                .bind(&edge.res_id)
                .bind(&edge.cvm_id)
                .bind(&edge.creator)
                .bind(now)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        debug!(inserted, "Created relation edges");
        Ok(inserted)
    }

    #[instrument(skip(self, filter), fields(relation = %filter.kind))]
    async fn delete(&self, filter: &RelationFilter) -> Result<u64> {
        if filter.is_unbounded() {
            return Err(InventoryError::invalid(
                "filter",
                "refusing to delete relations with an empty filter",
            ));
        }
        if filter.matches_nothing() {
            return Ok(0);
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE 1 = 1", filter.kind.table()));
        push_filter(&mut qb, filter);
        let deleted = qb.build().execute(&self.pool).await?.rows_affected();

        debug!(deleted, "Deleted relation edges");
        Ok(deleted)
    }

    #[instrument(skip(self, filter), fields(relation = %filter.kind))]
    async fn list(&self, filter: &RelationFilter) -> Result<Vec<RelationRecord>> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT id, res_id, cvm_id, creator, created_at FROM {} WHERE 1 = 1",
            filter.kind.table()
        ));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY id");

        let rows: Vec<RelationRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_record(filter.kind)).collect())
    }

    async fn list_by_endpoint(&self, kind: ResourceKind, id: &str) -> Result<Vec<RelationRecord>> {
        let ids = vec![id.to_string()];
        let filters: Vec<RelationFilter> = match RelationKind::for_resource(kind) {
            Some(relation) => vec![RelationFilter::new(relation).with_res_ids(ids)],
            None => RelationKind::ALL
                .iter()
                .map(|relation| RelationFilter::new(*relation).with_cvm_ids(ids.clone()))
                .collect(),
        };

        let mut edges = Vec::new();
        for filter in &filters {
            edges.extend(self.list(filter).await?);
        }
        Ok(edges)
    }
}

/// Delete edges by edge id in bounded chunks.
pub async fn delete_in_chunks(
    store: &dyn RelationStore,
    kind: RelationKind,
    ids: &[i64],
) -> Result<u64> {
    let mut deleted = 0;
    for chunk in ids.chunks(SQL_CHUNK) {
        deleted += store
            .delete(&RelationFilter::new(kind).with_ids(chunk.to_vec()))
            .await?;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{NewResource, ResourceFilter};
    use crate::repositories::{ResourceStore, SqliteResourceStore};
    use bridge_traits::extension::{Extension, TCloudCvmExtension, TCloudDiskExtension};
    use bridge_traits::resource::{CloudResource, Vendor, UNASSIGNED_BUSINESS};

    struct Fixture {
        resources: SqliteResourceStore,
        relations: SqliteRelationStore,
        cvm_id: String,
        disk_ids: Vec<String>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let resources = SqliteResourceStore::new(pool.clone());
        let relations = SqliteRelationStore::new(pool);

        let cvm = CloudResource::new(
            "ins-1",
            "RUNNING",
            "ap-guangzhou",
            Extension::TCloudCvm(TCloudCvmExtension::default()),
        );
        let cvm_id = resources
            .batch_create(
                ResourceKind::Cvm,
                vec![NewResource::from_cloud(Vendor::TCloud, "acct-1", UNASSIGNED_BUSINESS, &cvm)],
            )
            .await
            .unwrap()
            .remove(0);

        let disks = ["disk-1", "disk-2"]
            .iter()
            .map(|id| {
                let disk = CloudResource::new(
                    *id,
                    "ATTACHED",
                    "ap-guangzhou",
                    Extension::TCloudDisk(TCloudDiskExtension::default()),
                );
                NewResource::from_cloud(Vendor::TCloud, "acct-1", UNASSIGNED_BUSINESS, &disk)
            })
            .collect();
        let disk_ids = resources.batch_create(ResourceKind::Disk, disks).await.unwrap();

        Fixture {
            resources,
            relations,
            cvm_id,
            disk_ids,
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let f = setup().await;
        let edge = NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[0], &f.cvm_id, "sync");

        assert_eq!(f.relations.create(vec![edge.clone()]).await.unwrap(), 1);
        assert_eq!(f.relations.create(vec![edge]).await.unwrap(), 0);

        let edges = f
            .relations
            .list(&RelationFilter::new(RelationKind::DiskCvm))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].creator, "sync");
    }

    #[tokio::test]
    async fn test_missing_endpoint_writes_nothing() {
        let f = setup().await;
        let edges = vec![
            NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[0], &f.cvm_id, "sync"),
            NewRelation::new(RelationKind::DiskCvm, "ghost", &f.cvm_id, "sync"),
        ];

        let result = f.relations.create(edges).await;
        assert!(matches!(result, Err(InventoryError::EndpointMissing { .. })));

        let edges = f
            .relations
            .list(&RelationFilter::new(RelationKind::DiskCvm))
            .await
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_endpoint() {
        let f = setup().await;
        f.relations
            .create(vec![
                NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[0], &f.cvm_id, "sync"),
                NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[1], &f.cvm_id, "sync"),
            ])
            .await
            .unwrap();

        let by_cvm = f
            .relations
            .list_by_endpoint(ResourceKind::Cvm, &f.cvm_id)
            .await
            .unwrap();
        assert_eq!(by_cvm.len(), 2);

        let by_disk = f
            .relations
            .list_by_endpoint(ResourceKind::Disk, &f.disk_ids[1])
            .await
            .unwrap();
        assert_eq!(by_disk.len(), 1);
        assert_eq!(by_disk[0].cvm_id, f.cvm_id);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let f = setup().await;
        f.relations
            .create(vec![
                NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[0], &f.cvm_id, "sync"),
                NewRelation::new(RelationKind::DiskCvm, &f.disk_ids[1], &f.cvm_id, "sync"),
            ])
            .await
            .unwrap();
        let edges = f
            .relations
            .list(&RelationFilter::new(RelationKind::DiskCvm))
            .await
            .unwrap();

        let deleted = delete_in_chunks(&f.relations, RelationKind::DiskCvm, &[edges[0].id])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let unbounded = f.relations.delete(&RelationFilter::new(RelationKind::DiskCvm)).await;
        assert!(unbounded.is_err());
    }

    #[tokio::test]
    async fn test_deleting_cvm_removes_edges() {
        let f = setup().await;
        f.relations
            .create(vec![NewRelation::new(
                RelationKind::DiskCvm,
                &f.disk_ids[0],
                &f.cvm_id,
                "sync",
            )])
            .await
            .unwrap();

        f.resources
            .batch_delete_by_filter(ResourceKind::Cvm, &ResourceFilter::by_ids([f.cvm_id.clone()]))
            .await
            .unwrap();

        let edges = f
            .relations
            .list_by_endpoint(ResourceKind::Disk, &f.disk_ids[0])
            .await
            .unwrap();
        assert!(edges.is_empty());
    }
}
