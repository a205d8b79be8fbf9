//! RDS snapshot model and the provider API the backup pipeline talks to.
//!
//! [`SnapshotApi`] is the narrow surface the pipeline depends on. [`AwsRds`]
//! implements it over the AWS SDK with one RDS client per region.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rds::config::Credentials;
use aws_sdk_rds::error::DisplayErrorContext;
use aws_sdk_rds::types::{DbSnapshot, Tag};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::AwsCredentials;
use crate::error::{Error, Result};

/// Tags on a single snapshot. At most one value per key.
pub type TagSet = BTreeMap<String, String>;

/// Lifecycle status of an RDS snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Creating,
    Available,
    Failed,
    Deleted,
    /// Any other provider status (e.g. "copying", "upgrading")
    Other(String),
}

impl SnapshotStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "failed" => Self::Failed,
            "deleted" => Self::Deleted,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
            Self::Other(s) => s,
        }
    }

    /// True while a copy is still being created
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Creating)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DB snapshot as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Snapshot identifier, unique within its region
    pub identifier: String,
    /// Identifier of the DB instance the snapshot was taken from
    pub instance_id: String,
    /// Creation time. Missing while a snapshot is still being created.
    pub created_at: Option<DateTime<Utc>>,
    pub status: SnapshotStatus,
    /// Percent complete (0-100), only meaningful while creating
    pub percent_progress: i32,
    pub region: String,
}

/// Which snapshots a describe call should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFilter<'a> {
    /// Every snapshot of a DB instance
    Instance(&'a str),
    /// A single snapshot by identifier
    Identifier(&'a str),
}

/// A cross-region copy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Fully-qualified ARN of the source snapshot
    pub source_arn: String,
    /// Identifier for the new snapshot in the destination region
    pub target_id: String,
    /// Tags attached to the copy when it is created
    pub tags: TagSet,
}

/// Build the fully-qualified ARN of a snapshot.
pub fn snapshot_arn(region: &str, account_id: &str, snapshot_id: &str) -> String {
    format!("arn:aws:rds:{}:{}:snapshot:{}", region, account_id, snapshot_id)
}

/// Remote operations the backup pipeline needs from the provider.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// ARN of the calling identity. The account id is its fifth field.
    async fn identity_arn(&self) -> Result<String>;

    /// Describe snapshots in `region`. An identifier that does not exist
    /// yields an empty list rather than an error.
    async fn list_snapshots(&self, region: &str, filter: SnapshotFilter<'_>)
        -> Result<Vec<Snapshot>>;

    /// Read the tags of the resource named by `arn`.
    async fn list_tags(&self, region: &str, arn: &str) -> Result<TagSet>;

    /// Start an asynchronous copy into `region`. Returns the new snapshot as
    /// the provider reports it right after accepting the request.
    async fn copy_snapshot(&self, region: &str, request: &CopyRequest) -> Result<Snapshot>;

    /// Delete a snapshot in `region`, returning its final reported state.
    async fn delete_snapshot(&self, region: &str, snapshot_id: &str) -> Result<Snapshot>;
}

/// [`SnapshotApi`] backed by the AWS SDK
pub struct AwsRds {
    sts: aws_sdk_sts::Client,
    clients: HashMap<String, aws_sdk_rds::Client>,
}

/// Load SDK config for one region using static credentials
async fn load_sdk_config(credentials: &Credentials, region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(credentials.clone())
        .load()
        .await
}

impl AwsRds {
    /// Create RDS clients for every region in `regions`. The identity lookup
    /// goes through the first region.
    pub async fn connect(credentials: &AwsCredentials, regions: &[&str]) -> Result<Self> {
        let first = regions
            .first()
            .ok_or_else(|| Error::config("at least one region is required"))?;

        let credentials = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "rdsbackup",
        );

        let mut clients = HashMap::new();
        let mut sts = None;
        for region in regions {
            let config = load_sdk_config(&credentials, region).await;
            if region == first {
                sts = Some(aws_sdk_sts::Client::new(&config));
            }
            clients.insert(region.to_string(), aws_sdk_rds::Client::new(&config));
            tracing::debug!("Created RDS client for {}", region);
        }

        let sts = sts.ok_or_else(|| Error::config("at least one region is required"))?;
        Ok(Self { sts, clients })
    }

    fn client(&self, region: &str) -> Result<&aws_sdk_rds::Client> {
        self.clients
            .get(region)
            .ok_or_else(|| Error::config(format!("no RDS client configured for region {}", region)))
    }
}

/// Convert an SDK snapshot into our model
fn from_sdk(snapshot: &DbSnapshot, region: &str) -> Snapshot {
    Snapshot {
        identifier: snapshot.db_snapshot_identifier().unwrap_or_default().to_string(),
        instance_id: snapshot.db_instance_identifier().unwrap_or_default().to_string(),
        created_at: snapshot
            .snapshot_create_time()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        status: SnapshotStatus::parse(snapshot.status().unwrap_or_default()),
        percent_progress: snapshot.percent_progress().unwrap_or(0),
        region: region.to_string(),
    }
}

#[async_trait]
impl SnapshotApi for AwsRds {
    async fn identity_arn(&self) -> Result<String> {
        let resp = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| Error::provider("GetCallerIdentity", DisplayErrorContext(&e).to_string()))?;

        resp.arn()
            .map(str::to_string)
            .ok_or_else(|| Error::AccountResolution("identity lookup returned no ARN".to_string()))
    }

    async fn list_snapshots(
        &self,
        region: &str,
        filter: SnapshotFilter<'_>,
    ) -> Result<Vec<Snapshot>> {
        let client = self.client(region)?;
        let mut snapshots = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = client.describe_db_snapshots();
            req = match filter {
                SnapshotFilter::Instance(id) => req.db_instance_identifier(id),
                SnapshotFilter::Identifier(id) => req.db_snapshot_identifier(id),
            };
            if let Some(token) = &marker {
                req = req.marker(token);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let not_found = err
                        .as_service_error()
                        .map(|e| e.is_db_snapshot_not_found_fault())
                        .unwrap_or(false);
                    if not_found {
                        break;
                    }
                    return Err(Error::provider(
                        "DescribeDBSnapshots",
                        DisplayErrorContext(&err).to_string(),
                    ));
                }
            };

            snapshots.extend(resp.db_snapshots().iter().map(|s| from_sdk(s, region)));

            match resp.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        tracing::debug!("Described {} snapshots in {}", snapshots.len(), region);
        Ok(snapshots)
    }

    async fn list_tags(&self, region: &str, arn: &str) -> Result<TagSet> {
        let resp = self
            .client(region)?
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await
            .map_err(|e| Error::provider("ListTagsForResource", DisplayErrorContext(&e).to_string()))?;

        Ok(resp
            .tag_list()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
            .collect())
    }

    async fn copy_snapshot(&self, region: &str, request: &CopyRequest) -> Result<Snapshot> {
        let tags: Vec<Tag> = request
            .tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect();

        let resp = self
            .client(region)?
            .copy_db_snapshot()
            .source_db_snapshot_identifier(&request.source_arn)
            .target_db_snapshot_identifier(&request.target_id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| Error::provider("CopyDBSnapshot", DisplayErrorContext(&e).to_string()))?;

        resp.db_snapshot()
            .map(|s| from_sdk(s, region))
            .ok_or_else(|| Error::CopyInitiation {
                snapshot_id: request.target_id.clone(),
                status: "no snapshot in response".to_string(),
            })
    }

    async fn delete_snapshot(&self, region: &str, snapshot_id: &str) -> Result<Snapshot> {
        let resp = self
            .client(region)?
            .delete_db_snapshot()
            .db_snapshot_identifier(snapshot_id)
            .send()
            .await
            .map_err(|e| Error::Deletion {
                snapshot_id: snapshot_id.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!("Deleted snapshot {} in {}", snapshot_id, region);
        Ok(resp
            .db_snapshot()
            .map(|s| from_sdk(s, region))
            .unwrap_or_else(|| Snapshot {
                identifier: snapshot_id.to_string(),
                instance_id: String::new(),
                created_at: None,
                status: SnapshotStatus::Other(String::new()),
                percent_progress: 0,
                region: region.to_string(),
            }))
    }
}
