//! Ownership and provenance tags written on every copy.
//!
//! `managedby=rdsbackup` is the only signal used to decide that a snapshot
//! belongs to this tool. `sourcearn` ties a copy to the exact source snapshot.

use chrono::{DateTime, Utc};

use crate::rds::{SnapshotApi, TagSet};

pub const MANAGED_BY: &str = "managedby";
pub const MANAGED_BY_VALUE: &str = "rdsbackup";
pub const SOURCE: &str = "source";
pub const SOURCE_ID: &str = "sourceid";
pub const SOURCE_ARN: &str = "sourcearn";
pub const TIME: &str = "time";
pub const TIMESTAMP: &str = "timestamp";

/// Where a copy came from and when it was made
#[derive(Debug, Clone)]
pub struct Provenance<'a> {
    pub source_region: &'a str,
    pub instance_id: &'a str,
    pub source_arn: &'a str,
    pub created_at: DateTime<Utc>,
}

impl Provenance<'_> {
    /// The full tag vocabulary for a new copy
    pub fn to_tags(&self) -> TagSet {
        TagSet::from([
            (
                TIME.to_string(),
                self.created_at.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            ),
            (TIMESTAMP.to_string(), self.created_at.timestamp().to_string()),
            (SOURCE.to_string(), self.source_region.to_string()),
            (SOURCE_ID.to_string(), self.instance_id.to_string()),
            (SOURCE_ARN.to_string(), self.source_arn.to_string()),
            (MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
        ])
    }
}

pub fn is_managed(tags: &TagSet) -> bool {
    tags.get(MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_VALUE)
}

/// True if `tags` mark a managed copy of exactly `source_arn`
pub fn is_copy_of(tags: &TagSet, source_arn: &str) -> bool {
    is_managed(tags) && tags.get(SOURCE_ARN).map(String::as_str) == Some(source_arn)
}

/// Creation time recorded in the `timestamp` tag
pub fn tagged_time(tags: &TagSet) -> Option<DateTime<Utc>> {
    let secs = tags.get(TIMESTAMP)?.parse::<i64>().ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Read a snapshot's tags, or `None` if the lookup failed.
///
/// Scans skip snapshots whose tags cannot be read instead of failing.
pub async fn read_tags(api: &dyn SnapshotApi, region: &str, arn: &str) -> Option<TagSet> {
    match api.list_tags(region, arn).await {
        Ok(tags) => Some(tags),
        Err(e) => {
            tracing::warn!("Skipping {}: could not read tags: {}", arn, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_provenance_tags() {
        let created_at = DateTime::parse_from_rfc3339("2024-01-15T10:30:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let provenance = Provenance {
            source_region: "us-east-1",
            instance_id: "mydb",
            source_arn: "arn:aws:rds:us-east-1:123456789012:snapshot:rds:mydb-1",
            created_at,
        };

        let tags = provenance.to_tags();
        assert_eq!(tags.len(), 6);
        assert_eq!(tags[MANAGED_BY], "rdsbackup");
        assert_eq!(tags[SOURCE], "us-east-1");
        assert_eq!(tags[SOURCE_ID], "mydb");
        assert_eq!(
            tags[SOURCE_ARN],
            "arn:aws:rds:us-east-1:123456789012:snapshot:rds:mydb-1"
        );
        assert_eq!(tags[TIME], "2024-01-15 10:30:05 +0000");
        assert_eq!(tags[TIMESTAMP], "1705314605");
        assert_eq!(tagged_time(&tags), Some(created_at));
    }

    #[test]
    fn test_is_managed() {
        assert!(is_managed(&tags(&[("managedby", "rdsbackup")])));
        assert!(!is_managed(&tags(&[("managedby", "someone-else")])));
        assert!(!is_managed(&tags(&[("owner", "rdsbackup")])));
        assert!(!is_managed(&TagSet::new()));
    }

    #[test]
    fn test_is_copy_of_requires_both_tags() {
        let arn = "arn:aws:rds:us-east-1:1:snapshot:a";

        assert!(is_copy_of(
            &tags(&[("managedby", "rdsbackup"), ("sourcearn", arn)]),
            arn
        ));
        assert!(!is_copy_of(
            &tags(&[("managedby", "rdsbackup"), ("sourcearn", "arn:aws:rds:us-east-1:1:snapshot:b")]),
            arn
        ));
        assert!(!is_copy_of(&tags(&[("sourcearn", arn)]), arn));
    }

    #[test]
    fn test_tagged_time_invalid() {
        assert_eq!(tagged_time(&tags(&[("timestamp", "yesterday")])), None);
        assert_eq!(tagged_time(&TagSet::new()), None);
    }
}
