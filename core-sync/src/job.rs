//! # Sync Job State Machine
//!
//! Tracks one reconciliation pass through its phases.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Fetching → Diffing → Creating → Updating → Deleting
//!                                   → PropagatingRelationships → Done
//!
//! Any non-terminal phase → Failed | Cancelled
//! ```
//!
//! Phases only move forward. A pass with nothing to create may go straight
//! from `Diffing` to `Updating`, but never back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncJob, SyncPhase};
//!
//! let mut job = SyncJob::new(ResourceKind::Eip, &scope);
//! job.advance(SyncPhase::Fetching)?;
//! job.stats.fetched = 120;
//! job.advance(SyncPhase::Diffing)?;
//! job.complete()?;
//! ```

use crate::{Result, SyncError};
use bridge_traits::resource::{ResourceKind, SyncScope, Vendor};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::Database(format!("Invalid job id: {}", e)))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Pending,
    Fetching,
    Diffing,
    Creating,
    Updating,
    Deleting,
    PropagatingRelationships,
    Done,
    Failed,
    Cancelled,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed | SyncPhase::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Pending => "pending",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Creating => "creating",
            SyncPhase::Updating => "updating",
            SyncPhase::Deleting => "deleting",
            SyncPhase::PropagatingRelationships => "propagating_relationships",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
            SyncPhase::Cancelled => "cancelled",
        }
    }

    /// Position in the success path; `None` for `Failed` and `Cancelled`.
    fn ordinal(&self) -> Option<u8> {
        match self {
            SyncPhase::Pending => Some(0),
            SyncPhase::Fetching => Some(1),
            SyncPhase::Diffing => Some(2),
            SyncPhase::Creating => Some(3),
            SyncPhase::Updating => Some(4),
            SyncPhase::Deleting => Some(5),
            SyncPhase::PropagatingRelationships => Some(6),
            SyncPhase::Done => Some(7),
            SyncPhase::Failed | SyncPhase::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, to: SyncPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), to.ordinal()) {
            (Some(from), Some(to)) => to > from,
            (_, None) => true,
            _ => false,
        }
    }
}

impl FromStr for SyncPhase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncPhase::Pending),
            "fetching" => Ok(SyncPhase::Fetching),
            "diffing" => Ok(SyncPhase::Diffing),
            "creating" => Ok(SyncPhase::Creating),
            "updating" => Ok(SyncPhase::Updating),
            "deleting" => Ok(SyncPhase::Deleting),
            "propagating_relationships" => Ok(SyncPhase::PropagatingRelationships),
            "done" => Ok(SyncPhase::Done),
            "failed" => Ok(SyncPhase::Failed),
            "cancelled" => Ok(SyncPhase::Cancelled),
            _ => Err(SyncError::Database(format!("Invalid sync phase: {}", s))),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
}

impl SyncStats {
    pub fn mutations(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub vendor: Vendor,
    pub kind: ResourceKind,
    pub account_id: String,
    pub region: String,
    pub phase: SyncPhase,
    pub stats: SyncStats,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncJob {
    pub fn new(kind: ResourceKind, scope: &SyncScope) -> Self {
        Self {
            id: SyncJobId::new(),
            vendor: scope.vendor,
            kind,
            account_id: scope.account_id.clone(),
            region: scope.region.clone(),
            phase: SyncPhase::Pending,
            stats: SyncStats::default(),
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to a later phase of the success path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for backward moves or moves out of a terminal phase.
    pub fn advance(&mut self, to: SyncPhase) -> Result<()> {
        self.validate_transition(to)?;
        if self.phase == SyncPhase::Pending {
            self.started_at = Some(current_timestamp());
        }
        self.phase = to;
        if to.is_terminal() {
            self.completed_at = Some(current_timestamp());
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(SyncPhase::Done)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.advance(SyncPhase::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.advance(SyncPhase::Cancelled)
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: SyncPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(SyncError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Tests
// ============================================================================
