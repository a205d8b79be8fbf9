//! Cross-region copy of the chosen source snapshot.
//!
//! A copy is only started if no managed snapshot in the destination already
//! carries the source ARN, so re-running after a crash or in quick succession
//! never produces a second copy of the same source snapshot.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::locator::SourceSnapshot;
use crate::rds::{CopyRequest, SnapshotApi, SnapshotFilter, SnapshotStatus};
use crate::tags::{self, Provenance};

/// Result of the replication stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    /// A managed copy of the source snapshot already exists
    AlreadyCopied { copy_id: String },
    /// A new copy was made and reached a terminal status
    Copied {
        copy_id: String,
        status: SnapshotStatus,
    },
}

/// Identifier for a new copy, e.g. `mydb-2024-01-15at10-30UTC`
pub fn copy_identifier(instance_id: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", instance_id, now.format("%Y-%m-%dat%H-%MUTC"))
}

/// Find a managed destination snapshot that was copied from `source_arn`.
pub async fn find_existing_copy(
    api: &dyn SnapshotApi,
    ctx: &RunContext,
    source_arn: &str,
) -> Result<Option<String>> {
    let snapshots = api
        .list_snapshots(&ctx.dest_region, SnapshotFilter::Instance(&ctx.instance_id))
        .await?;

    for snapshot in &snapshots {
        let arn = ctx.dest_arn(&snapshot.identifier);
        let Some(found) = tags::read_tags(api, &ctx.dest_region, &arn).await else {
            continue;
        };
        if tags::is_copy_of(&found, source_arn) {
            return Ok(Some(snapshot.identifier.clone()));
        }
    }

    Ok(None)
}

/// Request the copy and return the new snapshot's identifier.
pub async fn start_copy(
    api: &dyn SnapshotApi,
    ctx: &RunContext,
    source: &SourceSnapshot,
    now: DateTime<Utc>,
) -> Result<String> {
    let copy_id = copy_identifier(&ctx.instance_id, now);
    let provenance = Provenance {
        source_region: &ctx.source_region,
        instance_id: &ctx.instance_id,
        source_arn: &source.arn,
        created_at: now,
    };
    let request = CopyRequest {
        source_arn: source.arn.clone(),
        target_id: copy_id.clone(),
        tags: provenance.to_tags(),
    };

    tracing::info!(
        "Copying {} to {} as {}",
        source.identifier,
        ctx.dest_region,
        copy_id
    );

    let snapshot = api.copy_snapshot(&ctx.dest_region, &request).await?;
    if !snapshot.status.is_in_progress() {
        return Err(Error::CopyInitiation {
            snapshot_id: copy_id,
            status: snapshot.status.to_string(),
        });
    }

    Ok(copy_id)
}

/// Poll the copy until it leaves `creating`, returning the terminal status.
pub async fn wait_for_copy(
    api: &dyn SnapshotApi,
    ctx: &RunContext,
    copy_id: &str,
) -> Result<SnapshotStatus> {
    tracing::info!("Waiting for copy {}...", copy_id);
    let started = Instant::now();

    loop {
        let found = api
            .list_snapshots(&ctx.dest_region, SnapshotFilter::Identifier(copy_id))
            .await?;
        if found.len() != 1 {
            return Err(Error::SnapshotVanished {
                snapshot_id: copy_id.to_string(),
                count: found.len(),
            });
        }

        let snapshot = &found[0];
        if !snapshot.status.is_in_progress() {
            if snapshot.status != SnapshotStatus::Available {
                tracing::warn!(
                    "Copy {} finished with status {}",
                    copy_id,
                    snapshot.status
                );
            }
            return Ok(snapshot.status.clone());
        }

        if let Some(max_wait) = ctx.max_wait {
            let waited = started.elapsed();
            if waited >= max_wait {
                return Err(Error::CopyTimeout {
                    snapshot_id: copy_id.to_string(),
                    waited,
                });
            }
        }

        tracing::info!(
            "Waiting {} ({}% complete)",
            snapshot.status,
            snapshot.percent_progress
        );
        tokio::time::sleep(ctx.poll_interval).await;
    }
}

/// Make sure the destination holds a copy of `source`.
pub async fn replicate(
    api: &dyn SnapshotApi,
    ctx: &RunContext,
    source: &SourceSnapshot,
) -> Result<Replication> {
    if let Some(copy_id) = find_existing_copy(api, ctx, &source.arn).await? {
        tracing::info!(
            "Source snapshot has already been copied to destination region as {}.",
            copy_id
        );
        return Ok(Replication::AlreadyCopied { copy_id });
    }

    let copy_id = start_copy(api, ctx, source, Utc::now()).await?;
    let status = wait_for_copy(api, ctx, &copy_id).await?;
    Ok(Replication::Copied { copy_id, status })
}
