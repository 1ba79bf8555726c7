//! On-disk cache of downloaded and extracted firmware bundles.
//!
//! Layout under the cache root, keyed by asset name:
//!
//! ```text
//! <root>/firmware-esp32s3-2.7.11.ee68575.zip
//! <root>/firmware-esp32s3-2.7.11.ee68575/device-update.sh
//! <root>/firmware-esp32s3-2.7.11.ee68575/firmware-<board>-2.7.11.ee68575-update.bin
//! ```
//!
//! An existing archive or directory is trusted as-is. There is no locking.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::github::{Asset, ReleaseProvider};
use crate::select::Image;
use crate::{Error, Result};

pub const FLASH_SCRIPT: &str = "device-update.sh";
const IMAGE_SUFFIX: &str = "-update.bin";

pub struct BundleCache {
    root: PathBuf,
}

impl BundleCache {
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: std::path::absolute(root)?,
        })
    }

    pub fn archive_path(&self, asset_name: &str) -> PathBuf {
        self.root.join(asset_name)
    }

    pub fn extract_dir(&self, asset_name: &str) -> PathBuf {
        self.root.join(bundle_stem(asset_name))
    }

    /// Downloads and extracts `asset` unless the cache already has it.
    pub fn fetch<P: ReleaseProvider>(&self, asset: &Asset, provider: &P) -> Result<ExtractedBundle> {
        let archive = self.ensure_archive(asset, provider)?;
        let dir = self.ensure_extracted(&asset.name, &archive)?;
        ExtractedBundle::open(dir)
    }

    fn ensure_archive<P: ReleaseProvider>(&self, asset: &Asset, provider: &P) -> Result<PathBuf> {
        let archive = self.archive_path(&asset.name);
        if archive.exists() {
            log::debug!("Using cached {}", archive.display());
            return Ok(archive);
        }

        log::info!("Downloading {} ...", asset.name);
        log::debug!("Source: {}", asset.browser_download_url);
        fs::create_dir_all(&self.root)?;

        // Written next to its final name so a failed download never occupies
        // the cache key.
        let mut partial = NamedTempFile::new_in(&self.root)?;
        let written = provider.download(&asset.browser_download_url, &mut partial)?;
        partial.flush()?;
        partial.persist(&archive)?;
        log::debug!("Saved {written} bytes to {}", archive.display());

        Ok(archive)
    }

    fn ensure_extracted(&self, asset_name: &str, archive: &Path) -> Result<PathBuf> {
        let dir = self.extract_dir(asset_name);
        if dir.exists() {
            log::debug!("Using existing extracted directory {}", dir.display());
            return Ok(dir);
        }

        log::info!("Extracting to {} ...", dir.display());
        let staging = tempfile::tempdir_in(&self.root)?;
        extract_zip(archive, staging.path())?;
        fs::rename(staging.keep(), &dir)?;

        Ok(dir)
    }
}

/// Asset name without a trailing `.zip`, in any case.
fn bundle_stem(asset_name: &str) -> &str {
    match asset_name.len().checked_sub(4) {
        Some(cut)
            if asset_name.is_char_boundary(cut)
                && asset_name[cut..].eq_ignore_ascii_case(".zip") =>
        {
            &asset_name[..cut]
        }
        _ => asset_name,
    }
}

fn extract_zip(archive_path: &Path, target_directory: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;

    for file_number in 0..archive.len() {
        let mut next = archive.by_index(file_number)?;

        // Entries that would climb out of the target are flattened by zip.
        let sanitized_name = next.mangled_name();
        let extracted_path = target_directory.join(sanitized_name);

        if next.is_dir() {
            fs::create_dir_all(&extracted_path)?;
        } else if next.is_file() {
            if let Some(parent) = extracted_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&extracted_path)?;
            io::copy(&mut next, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = next.unix_mode() {
                    fs::set_permissions(&extracted_path, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }

            log::trace!("Extracted file: {}", extracted_path.display());
        }
    }

    Ok(())
}

/// Adds execute bits when the owner cannot execute the file yet.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode();
    if mode & 0o100 == 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o111))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// A bundle unpacked on disk: its flashing script and update images.
#[derive(Debug)]
pub struct ExtractedBundle {
    pub dir: PathBuf,
    pub script: PathBuf,
    pub images: Vec<Image>,
}

impl ExtractedBundle {
    /// Locates the flashing script and lists every `*-update.bin` image.
    ///
    /// The image list may come back empty; deciding what that means is left
    /// to image resolution.
    pub fn open(dir: PathBuf) -> Result<Self> {
        let script = find_flash_script(&dir)?;
        make_executable(&script)?;

        let mut paths = Vec::new();
        collect_files(&dir, &mut paths)?;
        paths.sort();
        let images = paths
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(IMAGE_SUFFIX))
            })
            .map(Image::new)
            .collect();

        Ok(Self {
            dir,
            script,
            images,
        })
    }
}

/// `device-update.sh` at the bundle root, or the first one found below it.
fn find_flash_script(dir: &Path) -> Result<PathBuf> {
    let candidate = dir.join(FLASH_SCRIPT);
    if candidate.is_file() {
        return Ok(candidate);
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();
    files
        .into_iter()
        .find(|path| path.file_name().is_some_and(|name| name == FLASH_SCRIPT))
        .ok_or_else(|| Error::NoFlashScript {
            dir: dir.to_path_buf(),
        })
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::Release;
    use bytes::Bytes;
    use std::cell::Cell;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;

    fn bundle_zip(entries: &[(&str, &str)]) -> Bytes {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner().into()
    }

    struct ServesZip {
        body: Bytes,
        downloads: Cell<usize>,
    }

    impl ReleaseProvider for ServesZip {
        fn list_releases(&self, _count: u8) -> Result<Vec<Release>> {
            unreachable!()
        }

        fn release_by_tag(&self, _tag: &str) -> Result<Option<Release>> {
            unreachable!()
        }

        fn download(&self, _url: &str, sink: &mut dyn Write) -> Result<u64> {
            self.downloads.set(self.downloads.get() + 1);
            sink.write_all(&self.body)?;
            Ok(self.body.len() as u64)
        }
    }

    /// Sends a few bytes and then loses the connection.
    struct DropsConnection;

    impl ReleaseProvider for DropsConnection {
        fn list_releases(&self, _count: u8) -> Result<Vec<Release>> {
            unreachable!()
        }

        fn release_by_tag(&self, _tag: &str) -> Result<Option<Release>> {
            unreachable!()
        }

        fn download(&self, _url: &str, sink: &mut dyn Write) -> Result<u64> {
            sink.write_all(b"PK\x03\x04")?;
            Err(Error::Io(io::ErrorKind::ConnectionReset.into()))
        }
    }

    fn asset() -> Asset {
        Asset {
            name: "firmware-esp32s3-2.7.11.ee68575.zip".to_string(),
            size: 0,
            browser_download_url: "https://example.invalid/bundle.zip".to_string(),
        }
    }

    #[test]
    fn test_bundle_stem() {
        assert_eq!(bundle_stem("firmware-esp32-2.7.11.zip"), "firmware-esp32-2.7.11");
        assert_eq!(bundle_stem("firmware-esp32-2.7.11.ZIP"), "firmware-esp32-2.7.11");
        assert_eq!(bundle_stem("zip"), "zip");
    }

    #[test]
    fn test_fetch_downloads_extracts_and_lists() {
        let root = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(root.path()).unwrap();
        let provider = ServesZip {
            body: bundle_zip(&[
                ("device-update.sh", "#!/bin/sh\nexit 0\n"),
                ("firmware-heltec-v3-2.7.11-update.bin", "b"),
                ("firmware-heltec-v3-2.7.11.bin", "full image, not an update"),
                ("nested/firmware-tbeam-2.7.11-update.bin", "a"),
            ]),
            downloads: Cell::new(0),
        };

        let bundle = cache.fetch(&asset(), &provider).unwrap();

        assert_eq!(bundle.dir, cache.extract_dir(&asset().name));
        assert_eq!(bundle.script, bundle.dir.join(FLASH_SCRIPT));
        let names: Vec<&str> = bundle.images.iter().map(Image::name).collect();
        assert_eq!(
            names,
            [
                "firmware-heltec-v3-2.7.11-update.bin",
                "firmware-tbeam-2.7.11-update.bin"
            ]
        );
        assert!(cache.archive_path(&asset().name).is_file());
    }

    #[test]
    fn test_second_fetch_uses_cache() {
        let root = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(root.path()).unwrap();
        let provider = ServesZip {
            body: bundle_zip(&[("device-update.sh", "x"), ("firmware-a-1-update.bin", "a")]),
            downloads: Cell::new(0),
        };

        cache.fetch(&asset(), &provider).unwrap();
        cache.fetch(&asset(), &provider).unwrap();

        assert_eq!(provider.downloads.get(), 1);
    }

    #[test]
    fn test_existing_directory_is_trusted() {
        let root = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(root.path()).unwrap();
        fs::write(cache.archive_path(&asset().name), b"not a zip").unwrap();
        let dir = cache.extract_dir(&asset().name);
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub").join(FLASH_SCRIPT), "x").unwrap();

        let provider = ServesZip {
            body: Bytes::new(),
            downloads: Cell::new(0),
        };
        let bundle = cache.fetch(&asset(), &provider).unwrap();

        assert_eq!(provider.downloads.get(), 0);
        assert_eq!(bundle.script, dir.join("sub").join(FLASH_SCRIPT));
        assert!(bundle.images.is_empty());
    }

    #[test]
    fn test_interrupted_download_leaves_no_archive() {
        let root = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(root.path()).unwrap();
        let err = cache.fetch(&asset(), &DropsConnection).unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(!cache.archive_path(&asset().name).exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);

        // The next attempt starts from scratch.
        let provider = ServesZip {
            body: bundle_zip(&[("device-update.sh", "x")]),
            downloads: Cell::new(0),
        };
        cache.fetch(&asset(), &provider).unwrap();
        assert_eq!(provider.downloads.get(), 1);
    }

    #[test]
    fn test_missing_script() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("firmware-a-1-update.bin"), "a").unwrap();

        let err = ExtractedBundle::open(root.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::NoFlashScript { .. }));
    }

    #[test]
    fn test_broken_archive_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();
        let cache = BundleCache::new(root.path()).unwrap();
        let provider = ServesZip {
            body: Bytes::from_static(b"definitely not a zip"),
            downloads: Cell::new(0),
        };

        let err = cache.fetch(&asset(), &provider).unwrap_err();

        assert!(matches!(err, Error::Zip(_)));
        assert!(!cache.extract_dir(&asset().name).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_script_is_made_executable() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let script = root.path().join(FLASH_SCRIPT);
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        ExtractedBundle::open(root.path().to_path_buf()).unwrap();

        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
