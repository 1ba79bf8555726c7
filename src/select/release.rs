use std::fmt;

use crate::github::{Release, ReleaseProvider};
use crate::select::rank::{ranked, Ranked};
use crate::{Error, Result};

/// How many releases are pulled from the feed when no tag is given.
pub const RELEASE_FEED_SIZE: u8 = 100;

/// Release stream to pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stable,
    Alpha,
}

impl Channel {
    pub fn from_alpha_flag(alpha: bool) -> Self {
        if alpha {
            Channel::Alpha
        } else {
            Channel::Stable
        }
    }

    /// Drafts never belong to a channel.
    pub fn accepts(self, release: &Release) -> bool {
        !release.draft && release.prerelease == (self == Channel::Alpha)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => write!(f, "stable"),
            Channel::Alpha => write!(f, "alpha"),
        }
    }
}

/// Picks the newest (or second newest) release of `channel` out of a feed.
///
/// Releases are ordered by [`Release::timestamp`], newest first. Releases
/// with no timestamp at all sort last. Equal timestamps keep feed order.
pub fn select_release(
    releases: &[Release],
    channel: Channel,
    want_previous: bool,
) -> Result<&Release> {
    let index = usize::from(want_previous);

    match ranked(
        releases,
        |release| channel.accepts(release),
        |a, b| b.timestamp().cmp(&a.timestamp()),
        index,
    ) {
        Ranked::Picked(release) => Ok(release),
        Ranked::Empty => Err(Error::NoCandidates { channel }),
        Ranked::OutOfRange { available } => Err(Error::InsufficientHistory { channel, available }),
    }
}

/// Resolves the release to flash.
///
/// An explicit tag bypasses channel filtering entirely and is fetched as-is.
pub fn find_release<P: ReleaseProvider>(
    provider: &P,
    channel: Channel,
    want_previous: bool,
    explicit_tag: Option<&str>,
) -> Result<Release> {
    if let Some(tag) = explicit_tag {
        log::debug!("Fetching release by tag {tag}");
        return provider.release_by_tag(tag)?.ok_or_else(|| Error::NotFound {
            tag: tag.to_string(),
        });
    }

    let releases = provider.list_releases(RELEASE_FEED_SIZE)?;
    log::debug!("Release feed returned {} entries", releases.len());

    select_release(&releases, channel, want_previous).cloned()
}
