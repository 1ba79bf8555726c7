//! Release, bundle and image selection.
//!
//! Everything in here is a pure function of the data it is handed, apart
//! from [`find_release`] which asks a [`ReleaseProvider`](crate::github::ReleaseProvider)
//! for the feed first.

mod asset;
mod image;
mod rank;
mod release;

pub use asset::{pick_asset, Platform};
pub use image::{resolve_image, Image, Resolution};
pub use release::{find_release, Channel};
