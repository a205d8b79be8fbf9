//! One backup run: locate, replicate, then purge.

use crate::context::RunContext;
use crate::error::Result;
use crate::locator;
use crate::rds::{SnapshotApi, SnapshotStatus};
use crate::replicate::{self, Replication};
use crate::retention;

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The latest source snapshot was already in the destination. Nothing was
    /// copied and retention was not applied.
    AlreadyCopied { copy_id: String },
    /// A new copy was made
    Completed {
        copy_id: String,
        status: SnapshotStatus,
        /// Identifiers removed by retention, oldest first
        purged: Vec<String>,
    },
}

/// Copy the latest snapshot of `ctx.instance_id` to the destination region and
/// apply retention.
pub async fn run(api: &dyn SnapshotApi, ctx: &RunContext) -> Result<RunOutcome> {
    let source = locator::find_latest(api, ctx).await?;

    let (copy_id, status) = match replicate::replicate(api, ctx, &source).await? {
        Replication::AlreadyCopied { copy_id } => {
            return Ok(RunOutcome::AlreadyCopied { copy_id });
        }
        Replication::Copied { copy_id, status } => (copy_id, status),
    };

    let purged = retention::enforce(api, ctx).await?;

    Ok(RunOutcome::Completed {
        copy_id,
        status,
        purged,
    })
}
