//! Unpacking of a bundled `espeak-ng-data.zip`.
//!
//! Mobile and sandboxed builds ship espeak-ng's data as a single archive in a
//! read-only resource directory. espeak-ng needs a real directory, so the
//! archive is extracted once into a writable location and reused afterwards.

use std::fs::File;
use std::path::{Path, PathBuf};

use super::error::InitError;

/// Name of the directory espeak-ng looks for under its data path.
pub const DATA_DIR_NAME: &str = "espeak-ng-data";

/// Staging directory an archive is unpacked into before it is moved in place.
const STAGING_DIR_NAME: &str = ".espeak-ng-data.partial";

/// Return `<dest_root>/espeak-ng-data`, extracting `archive` into `dest_root`
/// first if that directory does not exist yet.
///
/// The archive is expected to contain a top-level `espeak-ng-data/` folder.
/// It is unpacked into a staging directory and renamed into place only once
/// extraction succeeded, so an interrupted or failed extraction never leaves a
/// partial `espeak-ng-data/` behind.
pub fn ensure_data_dir(archive: &Path, dest_root: &Path) -> Result<PathBuf, InitError> {
    let data_dir = dest_root.join(DATA_DIR_NAME);
    if data_dir.is_dir() {
        log::info!("espeak-ng data already present at {}", data_dir.display());
        return Ok(data_dir);
    }

    log::info!(
        "Extracting {} into {}",
        archive.display(),
        dest_root.display()
    );
    std::fs::create_dir_all(dest_root)?;

    let staging = dest_root.join(STAGING_DIR_NAME);
    if staging.exists() {
        log::warn!("Removing leftover staging directory {}", staging.display());
        std::fs::remove_dir_all(&staging)?;
    }

    let result = extract_into(archive, &staging).and_then(|extracted| {
        std::fs::rename(&extracted, &data_dir)?;
        Ok(())
    });
    if let Err(e) = std::fs::remove_dir_all(&staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not remove {}: {e}", staging.display());
        }
    }
    result?;

    Ok(data_dir)
}

/// Unpack `archive` into `staging` and return the `espeak-ng-data` folder in it.
fn extract_into(archive: &Path, staging: &Path) -> Result<PathBuf, InitError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| InitError::DataArchive(format!("Failed to open zip archive: {e}")))?;
    zip.extract(staging)
        .map_err(|e| InitError::DataArchive(format!("Failed to extract archive: {e}")))?;

    let extracted = staging.join(DATA_DIR_NAME);
    if !extracted.is_dir() {
        return Err(InitError::DataArchive(format!(
            "{} has no top-level {DATA_DIR_NAME}/ directory",
            archive.display()
        )));
    }
    Ok(extracted)
}
