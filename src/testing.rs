//! In-memory `SnapshotApi` for unit tests.

use async_trait::async_trait;
use chrono::DateTime;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::rds::{snapshot_arn, CopyRequest, Snapshot, SnapshotApi, SnapshotFilter, SnapshotStatus, TagSet};
use crate::tags;

pub const ACCOUNT_ID: &str = "123456789012";
pub const SOURCE: &str = "us-east-1";
pub const DEST: &str = "us-west-1";
pub const INSTANCE: &str = "mydb";

#[derive(Default)]
pub struct FakeState {
    pub identity: String,
    pub snapshots: Vec<Snapshot>,
    /// Tags by resource ARN
    pub tags: HashMap<String, TagSet>,
    /// ARNs whose tag lookup fails
    pub broken_tags: HashSet<String>,
    /// Status reported right after a copy request (default: creating)
    pub copy_status: Option<SnapshotStatus>,
    /// Status and percent applied on each describe-by-identifier, in order.
    /// Once empty the copy becomes available.
    pub poll_script: VecDeque<(SnapshotStatus, i32)>,
    /// Snapshot ids whose deletion fails
    pub failing_deletes: HashSet<String>,
    /// Status reported by deletions (default: deleted)
    pub delete_status: Option<SnapshotStatus>,

    pub copies: Vec<CopyRequest>,
    pub deleted: Vec<String>,
    pub polls: usize,
}

pub struct FakeRds {
    state: Mutex<FakeState>,
}

impl FakeRds {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                identity: format!("arn:aws:iam::{}:user/backup", ACCOUNT_ID),
                ..Default::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Add a snapshot of `INSTANCE` created at `secs` with the given tags
    pub fn add_snapshot(&self, region: &str, id: &str, secs: i64, tags: &[(&str, &str)]) {
        let mut state = self.state();
        state.snapshots.push(Snapshot {
            identifier: id.to_string(),
            instance_id: INSTANCE.to_string(),
            created_at: DateTime::from_timestamp(secs, 0),
            status: SnapshotStatus::Available,
            percent_progress: 100,
            region: region.to_string(),
        });
        state.tags.insert(
            snapshot_arn(region, ACCOUNT_ID, id),
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    /// Add a snapshot carrying the ownership marker
    pub fn add_managed(&self, region: &str, id: &str, secs: i64) {
        self.add_snapshot(region, id, secs, &[(tags::MANAGED_BY, tags::MANAGED_BY_VALUE)]);
    }

    pub fn break_tags(&self, region: &str, id: &str) {
        self.state()
            .broken_tags
            .insert(snapshot_arn(region, ACCOUNT_ID, id));
    }

    pub fn snapshot_ids(&self, region: &str) -> Vec<String> {
        self.state()
            .snapshots
            .iter()
            .filter(|s| s.region == region)
            .map(|s| s.identifier.clone())
            .collect()
    }
}

/// Context for `INSTANCE` that polls without sleeping
pub fn ctx() -> RunContext {
    RunContext {
        poll_interval: Duration::ZERO,
        ..RunContext::for_instance(ACCOUNT_ID, INSTANCE)
    }
}

#[async_trait]
impl SnapshotApi for FakeRds {
    async fn identity_arn(&self) -> Result<String> {
        Ok(self.state().identity.clone())
    }

    async fn list_snapshots(
        &self,
        region: &str,
        filter: SnapshotFilter<'_>,
    ) -> Result<Vec<Snapshot>> {
        let mut state = self.state();
        match filter {
            SnapshotFilter::Instance(id) => Ok(state
                .snapshots
                .iter()
                .filter(|s| s.region == region && s.instance_id == id)
                .cloned()
                .collect()),
            SnapshotFilter::Identifier(id) => {
                state.polls += 1;
                let (status, percent) = state
                    .poll_script
                    .pop_front()
                    .unwrap_or((SnapshotStatus::Available, 100));
                let mut found = Vec::new();
                for snapshot in state.snapshots.iter_mut() {
                    if snapshot.region == region && snapshot.identifier == id {
                        snapshot.status = status.clone();
                        snapshot.percent_progress = percent;
                        found.push(snapshot.clone());
                    }
                }
                Ok(found)
            }
        }
    }

    async fn list_tags(&self, _region: &str, arn: &str) -> Result<TagSet> {
        let state = self.state();
        if state.broken_tags.contains(arn) {
            return Err(Error::provider("ListTagsForResource", "access denied"));
        }
        Ok(state.tags.get(arn).cloned().unwrap_or_default())
    }

    async fn copy_snapshot(&self, region: &str, request: &CopyRequest) -> Result<Snapshot> {
        let mut state = self.state();
        let snapshot = Snapshot {
            identifier: request.target_id.clone(),
            instance_id: request
                .tags
                .get(tags::SOURCE_ID)
                .cloned()
                .unwrap_or_default(),
            created_at: None,
            status: state.copy_status.clone().unwrap_or(SnapshotStatus::Creating),
            percent_progress: 0,
            region: region.to_string(),
        };
        state.copies.push(request.clone());
        state.snapshots.push(snapshot.clone());
        state.tags.insert(
            snapshot_arn(region, ACCOUNT_ID, &request.target_id),
            request.tags.clone(),
        );
        Ok(snapshot)
    }

    async fn delete_snapshot(&self, region: &str, snapshot_id: &str) -> Result<Snapshot> {
        let mut state = self.state();
        if state.failing_deletes.contains(snapshot_id) {
            return Err(Error::Deletion {
                snapshot_id: snapshot_id.to_string(),
                message: "InvalidDBSnapshotState".to_string(),
            });
        }
        let pos = state
            .snapshots
            .iter()
            .position(|s| s.region == region && s.identifier == snapshot_id)
            .ok_or_else(|| Error::Deletion {
                snapshot_id: snapshot_id.to_string(),
                message: "DBSnapshotNotFound".to_string(),
            })?;
        let mut snapshot = state.snapshots.remove(pos);
        snapshot.status = state.delete_status.clone().unwrap_or(SnapshotStatus::Deleted);
        state.deleted.push(snapshot_id.to_string());
        Ok(snapshot)
    }
}
