//! Count-based retention for managed copies in the destination region.
//!
//! Only snapshots tagged `managedby=rdsbackup` are ever considered. The
//! oldest ones beyond the keep count are deleted, oldest first.

use chrono::{DateTime, Utc};

use crate::context::RunContext;
use crate::error::Result;
use crate::rds::{SnapshotApi, SnapshotFilter, SnapshotStatus};
use crate::tags;

/// Retention policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    /// Managed snapshots to keep. 0 disables retention entirely.
    pub keep: usize,
}

impl RetentionPolicy {
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }

    pub fn is_enabled(&self) -> bool {
        self.keep > 0
    }
}

/// A managed snapshot considered for purging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

/// Result of retention analysis
#[derive(Debug, Clone, Default)]
pub struct PurgePlan {
    /// Snapshots to keep, oldest first
    pub keep: Vec<SnapshotEntry>,
    /// Snapshots to delete, oldest first
    pub delete: Vec<SnapshotEntry>,
}

impl PurgePlan {
    pub fn has_deletions(&self) -> bool {
        !self.delete.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Keep: {} snapshots, Delete: {} snapshots",
            self.keep.len(),
            self.delete.len()
        )
    }
}

/// Decide which managed snapshots to delete.
///
/// Entries are ordered by creation time, then identifier, so two copies made
/// in the same second are both accounted for.
pub fn analyze_retention(snapshots: &[SnapshotEntry], policy: &RetentionPolicy) -> PurgePlan {
    if !policy.is_enabled() || snapshots.len() <= policy.keep {
        let mut keep = snapshots.to_vec();
        sort_oldest_first(&mut keep);
        return PurgePlan {
            keep,
            delete: vec![],
        };
    }

    let mut sorted = snapshots.to_vec();
    sort_oldest_first(&mut sorted);

    let keep = sorted.split_off(sorted.len() - policy.keep);
    PurgePlan {
        keep,
        delete: sorted,
    }
}

fn sort_oldest_first(entries: &mut [SnapshotEntry]) {
    entries.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
}

/// Collect the managed snapshots of the instance in the destination region.
///
/// The provider's creation time is used when known, falling back to the
/// `timestamp` tag. Snapshots with neither, or whose tags cannot be read, are
/// left out.
pub async fn collect_managed(
    api: &dyn SnapshotApi,
    ctx: &RunContext,
) -> Result<Vec<SnapshotEntry>> {
    let snapshots = api
        .list_snapshots(&ctx.dest_region, SnapshotFilter::Instance(&ctx.instance_id))
        .await?;

    let mut managed = Vec::new();
    for snapshot in snapshots {
        let arn = ctx.dest_arn(&snapshot.identifier);
        let Some(found) = tags::read_tags(api, &ctx.dest_region, &arn).await else {
            continue;
        };
        if !tags::is_managed(&found) {
            continue;
        }
        match snapshot.created_at.or_else(|| tags::tagged_time(&found)) {
            Some(created_at) => managed.push(SnapshotEntry {
                identifier: snapshot.identifier,
                created_at,
            }),
            None => tracing::debug!(
                "Skipping {}: no creation time recorded",
                snapshot.identifier
            ),
        }
    }

    Ok(managed)
}

/// Purge the oldest managed snapshots beyond `ctx.keep`, returning the
/// identifiers deleted.
///
/// Stops at the first failed deletion.
pub async fn enforce(api: &dyn SnapshotApi, ctx: &RunContext) -> Result<Vec<String>> {
    let policy = RetentionPolicy::new(ctx.keep);
    if !policy.is_enabled() {
        return Ok(vec![]);
    }

    tracing::info!("Cleaning up old snapshots in dest region {}...", ctx.dest_region);

    let managed = collect_managed(api, ctx).await?;
    let plan = analyze_retention(&managed, &policy);

    if !plan.has_deletions() {
        tracing::info!(
            "Found {} snapshots. Purge flag is {}, so nothing will be purged.",
            managed.len(),
            policy.keep
        );
        return Ok(vec![]);
    }

    tracing::info!(
        "Found {} snapshots. Purge flag is {}, so the oldest {} snapshots will be purged.",
        managed.len(),
        policy.keep,
        plan.delete.len()
    );
    tracing::debug!("{}", plan.summary());

    let mut purged = Vec::with_capacity(plan.delete.len());
    for entry in &plan.delete {
        tracing::info!("Purging snapshot {}.", entry.identifier);
        let snapshot = api
            .delete_snapshot(&ctx.dest_region, &entry.identifier)
            .await?;
        if snapshot.status != SnapshotStatus::Deleted {
            tracing::warn!(
                "Snapshot was not deleted successfully: {} (status: {})",
                entry.identifier,
                snapshot.status
            );
        }
        purged.push(entry.identifier.clone());
    }

    tracing::info!("Done purging snapshots.");
    Ok(purged)
}
