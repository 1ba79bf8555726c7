use std::fmt;

use regex::RegexBuilder;

use crate::github::{Asset, Release};
use crate::select::rank::{ranked, Ranked};
use crate::{Error, Result};

/// Hardware platforms that ship a firmware bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    #[value(name = "esp32")]
    Esp32,
    #[value(name = "esp32s3")]
    Esp32s3,
    #[value(name = "nrf52")]
    Nrf52,
    #[value(name = "rp2040")]
    Rp2040,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Esp32 => "esp32",
            Platform::Esp32s3 => "esp32s3",
            Platform::Nrf52 => "nrf52",
            Platform::Rp2040 => "rp2040",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the `firmware-<platform>-*.zip` bundle out of a release.
///
/// When several bundles match, the largest one wins. This is a size heuristic
/// only: the biggest bundle is assumed to be the most complete, and the
/// contents are never inspected. Equal sizes keep feed order.
pub fn pick_asset(release: &Release, platform: Platform) -> Result<&Asset> {
    let pattern = RegexBuilder::new(&format!(
        r"^firmware-{}-.*\.zip$",
        regex::escape(platform.as_str())
    ))
    .case_insensitive(true)
    .build()?;

    match ranked(
        &release.assets,
        |asset| pattern.is_match(&asset.name),
        |a, b| b.size.cmp(&a.size),
        0,
    ) {
        Ranked::Picked(asset) => Ok(asset),
        Ranked::Empty | Ranked::OutOfRange { .. } => Err(Error::NoAssetForPlatform {
            platform,
            tag: release.tag_name.clone(),
        }),
    }
}
