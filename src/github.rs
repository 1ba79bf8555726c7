use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::Result;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    /// Creation time, or publication time when GitHub left creation empty.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.published_at)
    }

    pub fn channel_label(&self) -> &'static str {
        if self.prerelease {
            "Alpha"
        } else {
            "Stable"
        }
    }
}

/// Read-only access to a repository's releases and their assets.
pub trait ReleaseProvider {
    /// The `count` most recent releases, in feed order.
    fn list_releases(&self, count: u8) -> Result<Vec<Release>>;

    /// A single release by tag, or `None` when the tag does not exist.
    fn release_by_tag(&self, tag: &str) -> Result<Option<Release>>;

    /// Streams an asset download into `sink` and returns the bytes written.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64>;
}
