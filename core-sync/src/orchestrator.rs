//! # Sync Orchestrator
//!
//! Runs one reconciliation pass of a resource kind over a scope.
//!
//! ## Workflow
//!
//! 1. **Fetching**: page through the vendor client, one call at a time,
//!    each bounded by `vendor_call_timeout` and the caller's cancellation
//!    token. Any failed page aborts the pass before the store is touched.
//! 2. **Diffing**: load the stored snapshot of the same scope and partition
//!    the union of ids into create / update / delete / unchanged.
//! 3. **Creating / Updating / Deleting**: one store batch per non-empty set,
//!    always in that order. Deletes are first re-checked against the vendor.
//! 4. **PropagatingRelationships**: re-derive edges from the resource side
//!    for EIP, disk and network-interface passes and from the instance side
//!    for CVM passes; mirror hosts to the CMDB for CVM passes. Failures here
//!    are logged and swallowed.
//!
//! Regional clients ignore `SyncScope::zone`, so their passes compare the
//! listing with the whole region on the store side as well.
//! 5. **Done**: the job is persisted and `SyncEvent::Completed` emitted.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(registry, resources, relations, bus, settings)
//!     .with_cmdb(bridge)
//!     .with_job_repository(jobs);
//!
//! let scope = SyncScope::new(Vendor::TCloud, "acct-1", "ap-guangzhou");
//! let report = orchestrator
//!     .sync(ResourceKind::Eip, &scope, &SyncOptions::default())
//!     .await?;
//! println!("created {}", report.stats.created);
//! ```

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::error::VendorError;
use bridge_traits::resource::{
    CloudResource, ResourceKind, SyncScope, Vendor, CLOUD_ID_FILTER_LIMIT, UNASSIGNED_BUSINESS,
};
use bridge_traits::vendor::{PageToken, VendorResourceClient};
use core_inventory::repositories::PageRequest;
use core_inventory::{
    NewResource, RelationStore, ResourceFilter, ResourceRecord, ResourceStore, ResourceUpdate,
};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, RelationEvent, SyncEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cmdb::CmdbBridge;
use crate::diff::{diff, CloudSnapshot, SyncPlan};
use crate::registry::VendorRegistry;
use crate::relation::{instance_reported_kinds, relation_kinds, RelationPropagator};
use crate::repository::SyncJobRepository;
use crate::{Result, SyncError, SyncJob, SyncJobId, SyncPhase, SyncStats};

/// Store page size used when collecting ids for a sweep.
const SWEEP_PAGE_SIZE: u32 = CLOUD_ID_FILTER_LIMIT as u32;

/// Ids reported in a `DeleteVerification` error.
const VERIFICATION_SAMPLE: usize = 10;

// ============================================================================
// Options & Report
// ============================================================================

/// Per-invocation options of a pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Business assigned to newly created records
    pub business_id: i64,
    pub cancel: CancellationToken,
    /// CVM passes leave instance-side edges to the caller.
    pub(crate) defer_instance_relations: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            business_id: UNASSIGNED_BUSINESS,
            cancel: CancellationToken::new(),
            defer_instance_relations: false,
        }
    }
}

impl SyncOptions {
    pub fn with_business_id(mut self, business_id: i64) -> Self {
        self.business_id = business_id;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn deferring_instance_relations(mut self) -> Self {
        self.defer_instance_relations = true;
        self
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub job_id: SyncJobId,
    pub vendor: Vendor,
    pub kind: ResourceKind,
    pub stats: SyncStats,
    pub duration: Duration,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct SyncOrchestrator {
    registry: Arc<VendorRegistry>,
    resources: Arc<dyn ResourceStore>,
    propagator: Arc<RelationPropagator>,
    cmdb: Option<Arc<CmdbBridge>>,
    jobs: Option<Arc<dyn SyncJobRepository>>,
    event_bus: EventBus,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<VendorRegistry>,
        resources: Arc<dyn ResourceStore>,
        relations: Arc<dyn RelationStore>,
        event_bus: EventBus,
        settings: SyncSettings,
    ) -> Self {
        let propagator = Arc::new(RelationPropagator::new(
            resources.clone(),
            relations,
            event_bus.clone(),
        ));
        Self {
            registry,
            resources,
            propagator,
            cmdb: None,
            jobs: None,
            event_bus,
            settings,
        }
    }

    /// Mirror CVM passes to the CMDB.
    pub fn with_cmdb(mut self, cmdb: Arc<CmdbBridge>) -> Self {
        self.cmdb = Some(cmdb);
        self
    }

    /// Persist a job row for every pass.
    pub fn with_job_repository(mut self, jobs: Arc<dyn SyncJobRepository>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn registry(&self) -> &Arc<VendorRegistry> {
        &self.registry
    }

    pub fn propagator(&self) -> &Arc<RelationPropagator> {
        &self.propagator
    }

    pub fn resources(&self) -> &Arc<dyn ResourceStore> {
        &self.resources
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Reconcile the stored records of `kind` inside `scope` with what the
    /// vendor currently reports.
    ///
    /// # Errors
    ///
    /// - `InvalidScope` / `UnsupportedResource` before any work starts
    /// - any vendor error of the fetch, unchanged; the store is not mutated
    /// - `DeleteVerification` if a record slated for deletion still exists
    /// - store errors of the mutation phases, which abort the remaining phases
    /// - `Cancelled` when `options.cancel` fires
    pub async fn sync(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        Ok(self.run(kind, scope, None, options).await?.0)
    }

    /// Run a pass over a snapshot already fetched with [`fetch_snapshot`]
    /// for the same scope, without listing the vendor again.
    ///
    /// Verification before delete still queries the vendor.
    ///
    /// [`fetch_snapshot`]: SyncOrchestrator::fetch_snapshot
    pub async fn sync_snapshot(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        cloud: CloudSnapshot,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        Ok(self.run(kind, scope, Some(cloud), options).await?.0)
    }

    /// A regular pass that also hands back the vendor snapshot it reconciled.
    pub(crate) async fn sync_keeping_snapshot(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<(SyncReport, CloudSnapshot)> {
        self.run(kind, scope, None, options).await
    }

    #[instrument(
        name = "sync",
        skip(self, scope, prefetched, options),
        fields(vendor = %scope.vendor, kind = %kind, account_id = %scope.account_id, region = %scope.region)
    )]
    async fn run(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        prefetched: Option<CloudSnapshot>,
        options: &SyncOptions,
    ) -> Result<(SyncReport, CloudSnapshot)> {
        scope
            .validate()
            .map_err(|e| SyncError::InvalidScope(e.to_string()))?;
        let client = self.registry.resolve(scope.vendor, kind)?;
        let scope = &listed_scope(client.as_ref(), scope);

        let mut job = SyncJob::new(kind, scope);
        self.persist(&job, true).await;
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                job_id: job.id.to_string(),
                vendor: scope.vendor.to_string(),
                kind: kind.to_string(),
                account_id: scope.account_id.clone(),
                region: scope.region.clone(),
            }))
            .ok();

        let started = Instant::now();
        match self
            .run_phases(&mut job, client.as_ref(), scope, prefetched, options)
            .await
        {
            Ok(cloud) => {
                job.complete()?;
                self.persist(&job, false).await;

                let duration = started.elapsed();
                info!(
                    account_id = %scope.account_id,
                    created = job.stats.created,
                    updated = job.stats.updated,
                    deleted = job.stats.deleted,
                    unchanged = job.stats.unchanged,
                    "[{}] sync {} success",
                    scope.vendor,
                    kind
                );
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Completed {
                        job_id: job.id.to_string(),
                        vendor: scope.vendor.to_string(),
                        kind: kind.to_string(),
                        created: job.stats.created,
                        updated: job.stats.updated,
                        deleted: job.stats.deleted,
                        unchanged: job.stats.unchanged,
                        duration_ms: duration.as_millis() as u64,
                    }))
                    .ok();

                let report = SyncReport {
                    job_id: job.id,
                    vendor: scope.vendor,
                    kind,
                    stats: job.stats,
                    duration,
                };
                Ok((report, cloud))
            }
            Err(e) => {
                self.abort(&mut job, &e).await;
                Err(e)
            }
        }
    }

    /// Fetch the complete vendor snapshot of `kind` inside `scope`.
    ///
    /// # Errors
    ///
    /// Fails on the first failed page; partial snapshots are never returned.
    pub async fn fetch_snapshot(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        cancel: &CancellationToken,
    ) -> Result<CloudSnapshot> {
        scope
            .validate()
            .map_err(|e| SyncError::InvalidScope(e.to_string()))?;
        let client = self.registry.resolve(scope.vendor, kind)?;
        let scope = listed_scope(client.as_ref(), scope);
        self.fetch(client.as_ref(), &scope, cancel).await
    }

    /// Delete stored records of `kind` in `scope` that the vendor no longer
    /// reports, checking the store side page by page.
    ///
    /// Returns the number of records deleted.
    #[instrument(
        skip(self, scope, options),
        fields(vendor = %scope.vendor, kind = %kind, account_id = %scope.account_id)
    )]
    pub async fn sweep_deleted(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<u64> {
        let scope = scope.unfiltered();
        scope
            .validate()
            .map_err(|e| SyncError::InvalidScope(e.to_string()))?;
        let client = self.registry.resolve(scope.vendor, kind)?;
        let scope = listed_scope(client.as_ref(), &scope);

        // Deleting while paging would shift offsets; collect first.
        let stored = self
            .load_stored(kind, &scope, SWEEP_PAGE_SIZE, &options.cancel)
            .await?;
        if stored.is_empty() {
            return Ok(0);
        }

        let mut vanished: Vec<ResourceRecord> = Vec::new();
        for chunk in stored.chunks(self.chunk_size()) {
            let recheck = scope.clone().with_cloud_ids(chunk.iter().map(|r| r.cloud_id.clone()));
            let found = self.fetch(client.as_ref(), &recheck, &options.cancel).await?;
            vanished.extend(
                chunk
                    .iter()
                    .filter(|r| !found.contains_key(&r.cloud_id))
                    .cloned(),
            );
        }
        if vanished.is_empty() {
            debug!("[{}] sweep {} found nothing to delete", scope.vendor, kind);
            return Ok(0);
        }

        let filter = ResourceFilter::from_scope(&scope)
            .with_cloud_ids(vanished.iter().map(|r| r.cloud_id.clone()));
        let deleted = guarded(
            &options.cancel,
            self.resources.batch_delete_by_filter(kind, &filter),
        )
        .await?;
        info!(
            account_id = %scope.account_id,
            count = deleted,
            "[{}] sweep {} to delete {} success",
            scope.vendor,
            kind,
            kind
        );

        if kind == ResourceKind::Cvm {
            self.forward_to_cmdb(&scope, &[], &vanished).await;
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    async fn run_phases(
        &self,
        job: &mut SyncJob,
        client: &dyn VendorResourceClient,
        scope: &SyncScope,
        prefetched: Option<CloudSnapshot>,
        options: &SyncOptions,
    ) -> Result<CloudSnapshot> {
        let (vendor, kind) = (scope.vendor, job.kind);
        let cancel = &options.cancel;

        self.enter(job, SyncPhase::Fetching)?;
        let cloud = match prefetched {
            Some(cloud) => cloud
                .into_iter()
                .filter(|(cloud_id, _)| scope.admits(cloud_id))
                .collect(),
            None => self.fetch(client, scope, cancel).await?,
        };
        job.stats.fetched = cloud.len() as u64;

        self.enter(job, SyncPhase::Diffing)?;
        let stored = self
            .load_stored(kind, scope, self.settings.store_page_size, cancel)
            .await?;
        let predicate = self.registry.predicate(vendor, kind);
        let plan = diff(&cloud, &stored, predicate.as_ref());
        job.stats.unchanged = plan.unchanged.len() as u64;
        debug!(
            create = plan.to_create.len(),
            update = plan.to_update.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            "[{}] diff {} done",
            vendor,
            kind
        );

        if !plan.to_create.is_empty() {
            self.enter(job, SyncPhase::Creating)?;
            let items: Vec<NewResource> = plan
                .to_create
                .values()
                .map(|r| NewResource::from_cloud(vendor, &scope.account_id, options.business_id, r))
                .collect();
            let ids = guarded(cancel, self.resources.batch_create(kind, items)).await?;
            job.stats.created = ids.len() as u64;
            info!(
                account_id = %scope.account_id,
                count = ids.len(),
                "[{}] sync {} to create {} success",
                vendor,
                kind,
                kind
            );
        }

        if !plan.to_update.is_empty() {
            self.enter(job, SyncPhase::Updating)?;
            let items: Vec<ResourceUpdate> = plan
                .to_update
                .values()
                .map(|u| ResourceUpdate::from_cloud(&u.id, &u.resource))
                .collect();
            let count = items.len();
            guarded(cancel, self.resources.batch_update_by_id(kind, items)).await?;
            job.stats.updated = count as u64;
            info!(
                account_id = %scope.account_id,
                count,
                "[{}] sync {} to update {} success",
                vendor,
                kind,
                kind
            );
        }

        let removed = removed_records(&plan, &stored);
        if !plan.to_delete.is_empty() {
            self.enter(job, SyncPhase::Deleting)?;
            let cloud_ids: Vec<String> = plan.to_delete.keys().cloned().collect();
            if self.settings.verify_before_delete {
                self.verify_absent(client, scope, &cloud_ids, cancel).await?;
            }
            let filter = ResourceFilter::from_scope(&scope.unfiltered()).with_cloud_ids(cloud_ids);
            let deleted = guarded(cancel, self.resources.batch_delete_by_filter(kind, &filter)).await?;
            job.stats.deleted = deleted;
            info!(
                account_id = %scope.account_id,
                count = deleted,
                "[{}] sync {} to delete {} success",
                vendor,
                kind,
                kind
            );
        }

        self.enter(job, SyncPhase::PropagatingRelationships)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.propagate(kind, scope, &cloud, &removed, options).await;

        Ok(cloud)
    }

    /// Page through the client until the last page.
    async fn fetch(
        &self,
        client: &dyn VendorResourceClient,
        scope: &SyncScope,
        cancel: &CancellationToken,
    ) -> Result<CloudSnapshot> {
        let vendor = scope.vendor;
        let mut snapshot = CloudSnapshot::new();
        let mut seen: HashSet<PageToken> = HashSet::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .call_vendor(cancel, client.list_page(scope, token.clone()))
                .await?;
            pages += 1;

            for item in page.items {
                if !scope.admits(&item.cloud_id) {
                    debug!(cloud_id = %item.cloud_id, "[{}] dropping item outside scope filter", vendor);
                    continue;
                }
                let cloud_id = item.cloud_id.clone();
                if snapshot.insert(cloud_id.clone(), item).is_some() {
                    warn!(cloud_id = %cloud_id, "[{}] duplicate {} in listing, keeping last", vendor, client.kind());
                }
            }

            match page.next_page {
                Some(next) => {
                    if !seen.insert(next.clone()) {
                        return Err(SyncError::PaginationLoop { token: next });
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        debug!(pages, items = snapshot.len(), "[{}] list {} done", vendor, client.kind());
        Ok(snapshot)
    }

    async fn load_stored(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceRecord>> {
        let filter = ResourceFilter::from_scope(scope);
        let mut request = PageRequest::first(page_size.max(1));
        let mut stored = Vec::new();
        loop {
            let page = guarded(cancel, self.resources.list(kind, &filter, request)).await?;
            let has_next = page.has_next();
            stored.extend(page.items);
            if !has_next {
                break;
            }
            request = request.next();
        }
        Ok(stored)
    }

    /// Re-query the vendor for ids about to be deleted.
    async fn verify_absent(
        &self,
        client: &dyn VendorResourceClient,
        scope: &SyncScope,
        cloud_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut still_present = Vec::new();
        for chunk in cloud_ids.chunks(self.chunk_size()) {
            let recheck = scope.unfiltered().with_cloud_ids(chunk.to_vec());
            let found = self.fetch(client, &recheck, cancel).await?;
            still_present.extend(found.into_keys());
        }

        if still_present.is_empty() {
            return Ok(());
        }
        warn!(
            count = still_present.len(),
            "[{}] {} slated for deletion still listed by vendor",
            scope.vendor,
            client.kind()
        );
        Err(SyncError::DeleteVerification {
            count: still_present.len(),
            sample: still_present.into_iter().take(VERIFICATION_SAMPLE).collect(),
        })
    }

    async fn propagate(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        cloud: &CloudSnapshot,
        removed: &[ResourceRecord],
        options: &SyncOptions,
    ) {
        let vendor = scope.vendor;
        let resources: Vec<CloudResource> = cloud.values().cloned().collect();

        if kind != ResourceKind::Cvm
            && self.settings.propagate_relations
            && relation_kinds(vendor).contains(&kind)
        {
            if let Err(e) = self
                .propagator
                .reconcile_from_resources(vendor, &scope.account_id, kind, &resources)
                .await
            {
                self.propagation_failed(vendor, kind, e);
            }
        }

        if kind == ResourceKind::Cvm
            && self.settings.propagate_relations
            && !options.defer_instance_relations
        {
            for &related in instance_reported_kinds(vendor) {
                if let Err(e) = self
                    .propagator
                    .reconcile_from_instances(vendor, &scope.account_id, related, &resources)
                    .await
                {
                    self.propagation_failed(vendor, related, e);
                }
            }
        }

        if kind == ResourceKind::Cvm && self.cmdb.is_some() && self.settings.forward_to_cmdb {
            let converged = match self
                .load_stored(kind, scope, self.settings.store_page_size, &options.cancel)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "[{}] reload cvm for cmdb failed", vendor);
                    return;
                }
            };
            self.forward_to_cmdb(scope, &converged, removed).await;
        }
    }

    fn propagation_failed(&self, vendor: Vendor, kind: ResourceKind, e: SyncError) {
        warn!(error = %e, "[{}] reconcile {} relations failed", vendor, kind);
        self.event_bus
            .emit(CoreEvent::Relation(RelationEvent::PropagationFailed {
                vendor: vendor.to_string(),
                relation: Some(kind.to_string()),
                message: e.to_string(),
            }))
            .ok();
    }

    async fn forward_to_cmdb(
        &self,
        scope: &SyncScope,
        converged: &[ResourceRecord],
        removed: &[ResourceRecord],
    ) {
        let Some(cmdb) = &self.cmdb else {
            return;
        };
        if !self.settings.forward_to_cmdb {
            return;
        }
        if let Err(e) = cmdb.forward_pass(scope.vendor, converged, removed).await {
            warn!(error = %e, "[{}] forward cvm to cmdb failed", scope.vendor);
        }
    }

    // ------------------------------------------------------------------------
    // Job bookkeeping
    // ------------------------------------------------------------------------

    fn enter(&self, job: &mut SyncJob, phase: SyncPhase) -> Result<()> {
        job.advance(phase)?;
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                job_id: job.id.to_string(),
                phase: phase.to_string(),
                items_fetched: job.stats.fetched,
            }))
            .ok();
        Ok(())
    }

    async fn abort(&self, job: &mut SyncJob, cause: &SyncError) {
        let phase = job.phase;

        if matches!(cause, SyncError::Cancelled) {
            info!("[{}] sync {} cancelled in {}", job.vendor, job.kind, phase);
            if let Err(e) = job.cancel() {
                warn!(error = %e, "Failed to mark job {} cancelled", job.id);
            }
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::Cancelled {
                    job_id: job.id.to_string(),
                    phase: phase.to_string(),
                }))
                .ok();
        } else {
            error!(
                account_id = %job.account_id,
                error = %cause,
                "[{}] sync {} failed in {}",
                job.vendor,
                job.kind,
                phase
            );
            if let Err(e) = job.fail(cause.to_string()) {
                warn!(error = %e, "Failed to mark job {} failed", job.id);
            }
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::Failed {
                    job_id: job.id.to_string(),
                    phase: phase.to_string(),
                    message: cause.to_string(),
                    recoverable: cause.is_recoverable(),
                }))
                .ok();
        }

        self.persist(job, false).await;
    }

    async fn persist(&self, job: &SyncJob, new: bool) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        let result = if new {
            jobs.insert(job).await
        } else {
            jobs.update(job).await
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist sync job {}", job.id);
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    /// One vendor call bounded by the per-call timeout and cancellation.
    pub(crate) async fn call_vendor<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, VendorError>>,
    {
        let limit = self.settings.vendor_call_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(result) => result.map_err(SyncError::from),
                Err(_) => Err(SyncError::Timeout(limit)),
            },
        }
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.settings
            .cloud_id_chunk_size
            .clamp(1, CLOUD_ID_FILTER_LIMIT)
    }
}

/// Await `work` unless `cancel` fires first. Store batches run in a single
/// transaction, so a dropped batch rolls back.
async fn guarded<T, E, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    SyncError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = work => result.map_err(SyncError::from),
    }
}

/// The scope a client actually lists.
fn listed_scope(client: &dyn VendorResourceClient, scope: &SyncScope) -> SyncScope {
    if client.zonal() {
        scope.clone()
    } else {
        scope.regional()
    }
}

fn removed_records(plan: &SyncPlan, stored: &[ResourceRecord]) -> Vec<ResourceRecord> {
    let ids: BTreeSet<&String> = plan.to_delete.values().collect();
    stored
        .iter()
        .filter(|r| ids.contains(&r.id))
        .cloned()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
