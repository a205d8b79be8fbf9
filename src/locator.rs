//! Finds the source snapshot to copy.

use chrono::{DateTime, Utc};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::rds::{Snapshot, SnapshotApi, SnapshotFilter};

/// The source snapshot chosen for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    /// Fully-qualified ARN, written into the copy's `sourcearn` tag
    pub arn: String,
}

/// Extract the account id (fifth field) from an identity ARN such as
/// `arn:aws:iam::123456789012:user/backup`.
pub fn parse_account_id(arn: &str) -> Result<String> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() != 6 {
        return Err(Error::AccountResolution(format!(
            "error parsing identity ARN {:?}: expected 6 fields, found {}",
            arn,
            parts.len()
        )));
    }
    if parts[4].is_empty() {
        return Err(Error::AccountResolution(format!(
            "identity ARN {:?} has no account id",
            arn
        )));
    }
    Ok(parts[4].to_string())
}

/// Look up the caller's account id.
pub async fn resolve_account_id(api: &dyn SnapshotApi) -> Result<String> {
    let arn = api.identity_arn().await?;
    let account_id = parse_account_id(&arn)?;
    tracing::debug!("Resolved AWS account {}", account_id);
    Ok(account_id)
}

/// Newest snapshot by creation time. Ties go to the greatest identifier.
/// Snapshots without a creation time are never selected.
pub fn select_latest(snapshots: &[Snapshot]) -> Option<(&Snapshot, DateTime<Utc>)> {
    snapshots
        .iter()
        .filter_map(|s| s.created_at.map(|t| (s, t)))
        .max_by(|(a, ta), (b, tb)| ta.cmp(tb).then_with(|| a.identifier.cmp(&b.identifier)))
}

/// Find the latest snapshot of the instance in the source region.
pub async fn find_latest(api: &dyn SnapshotApi, ctx: &RunContext) -> Result<SourceSnapshot> {
    tracing::info!("Searching for snapshots for: {}", ctx.instance_id);

    let snapshots = api
        .list_snapshots(&ctx.source_region, SnapshotFilter::Instance(&ctx.instance_id))
        .await?;

    if snapshots.is_empty() {
        return Err(Error::NotFound(format!(
            "no snapshots found for {} in {}",
            ctx.instance_id, ctx.source_region
        )));
    }

    tracing::info!(
        "Found {} snapshots for: {}",
        snapshots.len(),
        ctx.instance_id
    );

    let (latest, created_at) = select_latest(&snapshots).ok_or_else(|| {
        Error::NotFound(format!(
            "no usable snapshot found for {} in {}",
            ctx.instance_id, ctx.source_region
        ))
    })?;

    tracing::info!("Found latest snapshot: {}: {}", latest.identifier, created_at);

    Ok(SourceSnapshot {
        identifier: latest.identifier.clone(),
        created_at,
        arn: ctx.source_arn(&latest.identifier),
    })
}
