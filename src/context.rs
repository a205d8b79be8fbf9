use std::time::Duration;

use crate::config::{Settings, DEFAULT_DEST_REGION, DEFAULT_POLL_INTERVAL, DEFAULT_SOURCE_REGION};
use crate::rds::snapshot_arn;

/// Immutable inputs for one backup run, built once the account id is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub account_id: String,
    pub source_region: String,
    pub dest_region: String,
    pub instance_id: String,
    /// Managed snapshots to keep in the destination (0 = no purge)
    pub keep: usize,
    pub poll_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl RunContext {
    pub fn new(settings: &Settings, account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            source_region: settings.source_region.clone(),
            dest_region: settings.dest_region.clone(),
            instance_id: settings.instance_id.clone(),
            keep: settings.keep,
            poll_interval: settings.poll_interval,
            max_wait: settings.max_wait,
        }
    }

    /// Context with default regions and polling, for the given instance
    pub fn for_instance(account_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            source_region: DEFAULT_SOURCE_REGION.to_string(),
            dest_region: DEFAULT_DEST_REGION.to_string(),
            instance_id: instance_id.into(),
            keep: 0,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL),
            max_wait: None,
        }
    }

    /// ARN of a snapshot in the source region
    pub fn source_arn(&self, snapshot_id: &str) -> String {
        snapshot_arn(&self.source_region, &self.account_id, snapshot_id)
    }

    /// ARN of a snapshot in the destination region
    pub fn dest_arn(&self, snapshot_id: &str) -> String {
        snapshot_arn(&self.dest_region, &self.account_id, snapshot_id)
    }
}
