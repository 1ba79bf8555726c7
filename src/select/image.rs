use std::path::{Path, PathBuf};

use regex::RegexBuilder;

use crate::error::AmbiguityError;
use crate::{Error, Result};

/// A flashable `*-update.bin` file inside an extracted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    path: PathBuf,
}

impl Image {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name only. All matching is done against this.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a Image),
    /// The operator (or the embedding caller) has to choose.
    Ambiguous(AmbiguityError),
}

/// Release tag with one leading `v` removed, e.g. `v2.7.11` -> `2.7.11`.
pub fn tag_version(release_tag: &str) -> &str {
    release_tag.strip_prefix('v').unwrap_or(release_tag)
}

/// Picks the image for `board` out of a bundle's images.
///
/// The strict name `firmware-<board>-<version>-update.bin` wins outright.
/// Failing that, a single `firmware-<board>-[*-]update.bin` candidate is
/// taken, or, among several, the first whose name contains the version. Anything
/// else is ambiguous and nothing is picked.
pub fn resolve_image<'a>(
    images: &'a [Image],
    board: Option<&str>,
    release_tag: &str,
) -> Result<Resolution<'a>> {
    if images.is_empty() {
        return Err(Error::NoImagesFound);
    }

    let Some(board) = board.map(str::trim).filter(|board| !board.is_empty()) else {
        return Ok(Resolution::Ambiguous(AmbiguityError::no_board()));
    };
    let version = tag_version(release_tag);

    if !version.is_empty() {
        let expected = format!("firmware-{board}-{version}-update.bin");
        if let Some(image) = images
            .iter()
            .find(|image| image.name().eq_ignore_ascii_case(&expected))
        {
            log::debug!("Strict match for board '{board}': {}", image.name());
            return Ok(Resolution::Resolved(image));
        }
    }

    let loose = RegexBuilder::new(&format!(
        r"^firmware-{}-(?:.*-)?update\.bin$",
        regex::escape(board)
    ))
    .case_insensitive(true)
    .build()?;
    let candidates: Vec<&Image> = images
        .iter()
        .filter(|image| loose.is_match(image.name()))
        .collect();

    match candidates.as_slice() {
        [only] => {
            log::debug!("Loose match for board '{board}': {}", only.name());
            return Ok(Resolution::Resolved(*only));
        }
        [_, _, ..] if !version.is_empty() => {
            if let Some(image) = candidates
                .iter()
                .copied()
                .find(|image| image.name().contains(version))
            {
                log::debug!("Version match for board '{board}': {}", image.name());
                return Ok(Resolution::Resolved(image));
            }
        }
        _ => {}
    }

    Ok(Resolution::Ambiguous(AmbiguityError {
        board: Some(board.to_string()),
        candidates: candidates.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(names: &[&str]) -> Vec<Image> {
        names
            .iter()
            .map(|name| Image::new(Path::new("/cache/firmware-esp32s3-2.7.11").join(name)))
            .collect()
    }

    fn resolved<'a>(resolution: &Resolution<'a>) -> &'a str {
        match resolution {
            Resolution::Resolved(image) => {
                let image: &'a Image = *image;
                image.name()
            }
            Resolution::Ambiguous(err) => panic!("expected an image, got: {err}"),
        }
    }

    #[test]
    fn test_strict_match() {
        let imgs = images(&["firmware-tlora-t3s3-v1-2.7.11-update.bin"]);
        let res = resolve_image(&imgs, Some("tlora-t3s3-v1"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "firmware-tlora-t3s3-v1-2.7.11-update.bin");
    }

    #[test]
    fn test_strict_match_beats_loose_candidates() {
        let imgs = images(&[
            "firmware-tlora-t3s3-v1-2.7.10-update.bin",
            "FIRMWARE-TLORA-T3S3-V1-2.7.11-UPDATE.BIN",
            "firmware-tlora-t3s3-v1-2.7.11-extra-update.bin",
        ]);
        let res = resolve_image(&imgs, Some("tlora-t3s3-v1"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "FIRMWARE-TLORA-T3S3-V1-2.7.11-UPDATE.BIN");
    }

    #[test]
    fn test_single_loose_candidate() {
        let imgs = images(&[
            "firmware-tlora-t3s3-v1-update.bin",
            "firmware-heltec-v3-2.7.11-update.bin",
        ]);
        let res = resolve_image(&imgs, Some("tlora-t3s3-v1"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "firmware-tlora-t3s3-v1-update.bin");
    }

    #[test]
    fn test_bare_board_image_is_a_loose_candidate() {
        let imgs = images(&["FIRMWARE-TLORA-T3S3-V1-UPDATE.BIN"]);
        let res = resolve_image(&imgs, Some("tlora-t3s3-v1"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "FIRMWARE-TLORA-T3S3-V1-UPDATE.BIN");

        let imgs = images(&[
            "firmware-heltec-v3-update.bin",
            "firmware-heltec-v3-2.7.11-update.bin.bak",
            "firmware-heltec-v3update.bin",
        ]);
        let res = resolve_image(&imgs, Some("heltec-v3"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "firmware-heltec-v3-update.bin");
    }

    #[test]
    fn test_loose_prefers_version_substring() {
        let imgs = images(&[
            "firmware-heltec-v3-2.7.10-update.bin",
            "firmware-heltec-v3-2.7.11-tft-update.bin",
            "firmware-heltec-v3-2.7.11-oled-update.bin",
        ]);
        let res = resolve_image(&imgs, Some("heltec-v3"), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "firmware-heltec-v3-2.7.11-tft-update.bin");
    }

    #[test]
    fn test_two_loose_matches_without_version_are_ambiguous() {
        let imgs = images(&[
            "firmware-heltec-v3-tft-update.bin",
            "firmware-heltec-v3-oled-update.bin",
        ]);
        let res = resolve_image(&imgs, Some("heltec-v3"), "v2.7.11").unwrap();
        assert_eq!(
            res,
            Resolution::Ambiguous(AmbiguityError {
                board: Some("heltec-v3".to_string()),
                candidates: 2,
            })
        );
    }

    #[test]
    fn test_empty_tag_skips_strict_and_version_phases() {
        let imgs = images(&[
            "firmware-heltec-v3-2.7.11-update.bin",
            "firmware-heltec-v3-2.7.10-update.bin",
        ]);
        let res = resolve_image(&imgs, Some("heltec-v3"), "").unwrap();
        assert!(matches!(res, Resolution::Ambiguous(_)));
    }

    #[test]
    fn test_unknown_board_is_ambiguous() {
        let imgs = images(&["firmware-heltec-v3-2.7.11-update.bin"]);
        let res = resolve_image(&imgs, Some("rak4631"), "v2.7.11").unwrap();
        assert_eq!(
            res,
            Resolution::Ambiguous(AmbiguityError {
                board: Some("rak4631".to_string()),
                candidates: 0,
            })
        );
    }

    #[test]
    fn test_no_board_is_always_ambiguous() {
        let imgs = images(&["firmware-heltec-v3-2.7.11-update.bin"]);
        let res = resolve_image(&imgs, None, "v2.7.11").unwrap();
        assert_eq!(res, Resolution::Ambiguous(AmbiguityError::no_board()));
    }

    #[test]
    fn test_empty_list_fails_before_board_matching() {
        let err = resolve_image(&[], Some("x"), "v1").unwrap_err();
        assert!(matches!(err, Error::NoImagesFound));
        let err = resolve_image(&[], None, "v1").unwrap_err();
        assert!(matches!(err, Error::NoImagesFound));
    }

    #[test]
    fn test_matches_file_name_not_path() {
        let imgs = vec![Image::new(
            "/cache/firmware-tbeam-2.7.11/firmware-tbeam-stuff/readme-update.bin",
        )];
        let res = resolve_image(&imgs, Some("tbeam"), "v2.7.11").unwrap();
        assert!(matches!(res, Resolution::Ambiguous(_)));
    }

    #[test]
    fn test_board_hint_is_trimmed_and_escaped() {
        let imgs = images(&["firmware-t.deck-2.7.11-update.bin", "firmware-tXdeck-update.bin"]);
        let res = resolve_image(&imgs, Some("  t.deck "), "v2.7.11").unwrap();
        assert_eq!(resolved(&res), "firmware-t.deck-2.7.11-update.bin");

        let res = resolve_image(&imgs[1..], Some("t.deck"), "v2.7.11").unwrap();
        assert!(matches!(res, Resolution::Ambiguous(_)));
    }

    #[test]
    fn test_tag_version() {
        assert_eq!(tag_version("v2.7.11.ee68575"), "2.7.11.ee68575");
        assert_eq!(tag_version("2.7.11"), "2.7.11");
        assert_eq!(tag_version(""), "");
    }
}
