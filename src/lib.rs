//! rdsbackup - easy cross-region AWS RDS snapshot backups
//!
//! Copies the latest snapshot of an RDS instance to another region, tags the
//! copy with where it came from, and optionally purges old copies.

pub mod backup;
pub mod config;
pub mod context;
pub mod error;
pub mod locator;
pub mod rds;
pub mod replicate;
pub mod retention;
pub mod tags;

#[cfg(test)]
mod testing;
