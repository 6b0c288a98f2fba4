use std::{
    fs::{self, create_dir_all, File},
    io::Write,
    path::{Path, PathBuf},
};

use burn::data::network::downloader;
use sha2::{Digest, Sha256};

use crate::{encoder::densenet::PretrainedWeights, DenseNetError};

/// Cache directory name under `~/.cache`.
const CACHE_SUBDIR: &str = "densenet-burn";

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub(crate) fn cache_dir() -> Result<PathBuf, DenseNetError> {
    Ok(dirs::home_dir()
        .ok_or(DenseNetError::NoCacheDir)?
        .join(".cache")
        .join(CACHE_SUBDIR))
}

/// Check `bytes` against the pinned digest prefix of the file stored at `path`.
pub(crate) fn verify_digest(
    bytes: &[u8],
    expected: &'static str,
    path: &Path,
) -> Result<(), DenseNetError> {
    let actual = sha256_hex(bytes);
    if actual.starts_with(expected) {
        Ok(())
    } else {
        Err(DenseNetError::HashMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}

/// Returns the cached file when it exists and still matches the pinned prefix.
pub(crate) fn cached_if_valid(
    path: &Path,
    expected: &'static str,
) -> Result<Option<PathBuf>, DenseNetError> {
    if !path.exists() {
        return Ok(None);
    }

    match verify_digest(&fs::read(path)?, expected, path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(DenseNetError::HashMismatch { actual, .. }) => {
            log::warn!(
                "Cached weights {} fail the integrity check (sha256 {actual}), downloading again",
                path.display()
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Download the pre-trained weights to the local cache directory.
///
/// A cached file is reused only while its digest still matches the pinned prefix.
pub(crate) fn download(weights: &PretrainedWeights) -> Result<PathBuf, DenseNetError> {
    let model_dir = cache_dir()?;
    if !model_dir.exists() {
        create_dir_all(&model_dir)?;
    }

    let file_base_name = weights.file_name();
    let file_name = model_dir.join(file_base_name);
    if let Some(cached) = cached_if_valid(&file_name, weights.sha256_prefix)? {
        log::info!("Using cached weights {}", cached.display());
        return Ok(cached);
    }

    log::info!("Downloading {} from {}", file_base_name, weights.url);
    let bytes = downloader::download_file_as_bytes(weights.url, file_base_name);
    verify_digest(&bytes, weights.sha256_prefix, &file_name)?;

    let mut output_file = File::create(&file_name)?;
    output_file.write_all(&bytes)?;

    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_PREFIX: &str = "ba7816bf";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "densenet-burn-{name}-{}",
            std::process::id()
        ));
        create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn cache_lives_under_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                cache_dir().unwrap(),
                home.join(".cache").join("densenet-burn")
            );
        }
    }

    #[test]
    fn valid_cached_file_is_reused() {
        let dir = scratch_dir("valid");
        let path = dir.join("weights.pth");
        fs::write(&path, b"abc").unwrap();

        let cached = cached_if_valid(&path, ABC_PREFIX).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(cached, Some(path));
    }

    #[test]
    fn corrupted_cached_file_is_ignored() {
        let dir = scratch_dir("corrupted");
        let path = dir.join("weights.pth");
        fs::write(&path, b"abd").unwrap();

        let cached = cached_if_valid(&path, ABC_PREFIX).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(cached, None);
    }

    #[test]
    fn missing_cached_file_is_ignored() {
        let dir = scratch_dir("missing");

        let cached = cached_if_valid(&dir.join("weights.pth"), ABC_PREFIX).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(cached, None);
    }

    #[test]
    fn bad_download_reports_hash_mismatch() {
        let path = Path::new("densenet121-a639ec97.pth");

        assert!(verify_digest(b"abc", ABC_PREFIX, path).is_ok());
        match verify_digest(b"not the weights", "a639ec97", path) {
            Err(DenseNetError::HashMismatch {
                path: reported,
                expected,
                actual,
            }) => {
                assert_eq!(reported, path);
                assert_eq!(expected, "a639ec97");
                assert_eq!(actual, sha256_hex(b"not the weights"));
            }
            other => panic!("expected a hash mismatch, got {other:?}"),
        }
    }
}
