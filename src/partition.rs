//! Partition keys
//!
//! Usage records are grouped into one partition per UTC calendar date. The
//! key is independent of the storage backend; [`PartitionNaming`] maps it to
//! a file name for the JSONL store.

use crate::models::DATE_FORMAT;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

pub const DEFAULT_PARTITION_PREFIX: &str = "usage_log_";
pub const PARTITION_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn for_timestamp(timestamp: &DateTime<Utc>) -> Self {
        Self(timestamp.date_naive())
    }

    pub fn today() -> Self {
        Self::for_timestamp(&Utc::now())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl From<NaiveDate> for PartitionKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// File naming for date partitions: `<prefix>YYYY-MM-DD.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNaming {
    prefix: String,
}

impl Default for PartitionNaming {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_PREFIX)
    }
}

impl PartitionNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn file_name(&self, key: PartitionKey) -> String {
        format!("{}{}.{}", self.prefix, key, PARTITION_EXTENSION)
    }

    /// Glob matching every partition file of this naming.
    pub fn glob_pattern(&self) -> String {
        format!("{}*.{}", glob::Pattern::escape(&self.prefix), PARTITION_EXTENSION)
    }

    pub fn parse_file_name(&self, file_name: &str) -> Option<PartitionKey> {
        let date = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(PARTITION_EXTENSION)?
            .strip_suffix('.')?;
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .ok()
            .map(PartitionKey)
    }
}
