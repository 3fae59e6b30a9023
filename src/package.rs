//! Index package build, verification and staged install.
//!
//! A package is `index-v<semver>.zip` containing the application database
//! (`app.db`) and a `metadata.json` descriptor, with a sibling
//! `.sha256` checksum file (`<hex>  <filename>\n`). Installation stages
//! the archive contents under `pending_update/` before swapping the
//! database into place and recording the version in `index_version.txt`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use zip::write::SimpleFileOptions;

use crate::error::{PackageError, Result};
use crate::scanner::compute_sha256;

/// Database member name inside the archive.
pub const DB_MEMBER: &str = "app.db";

/// Metadata member name inside the archive.
pub const METADATA_MEMBER: &str = "metadata.json";

/// Package format identifier.
pub const PACKAGE_FORMAT: &str = "app-db";

/// Version marker filename under the index directory.
pub const VERSION_FILENAME: &str = "index_version.txt";

/// Staging directory name used during installs.
pub const PENDING_DIR: &str = "pending_update";

/// Package descriptor stored as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Semantic version of the package.
    pub version: String,
    /// Format identifier; always `app-db`.
    pub format: String,
    /// Schema version of the contained database.
    pub schema_version: u32,
}

/// Result of building a package.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    /// Path to the zip archive.
    pub zip_path: PathBuf,
    /// Path to the checksum sidecar.
    pub checksum_path: PathBuf,
    /// Hex SHA-256 of the archive.
    pub checksum: String,
}

/// Parses a version string into a comparable (major, minor, patch) tuple.
/// A leading `v` is tolerated; unparsable input yields (0, 0, 0).
#[must_use]
pub fn parse_version(version: &str) -> (u64, u64, u64) {
    let clean = version.trim().trim_start_matches('v');
    let mut parts = clean.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Whether the remote version is newer than the local one.
#[must_use]
pub fn is_newer_version(remote: &str, local: &str) -> bool {
    parse_version(remote) > parse_version(local)
}

/// Builds `index-v<version>.zip` plus its checksum sidecar in `out_dir`.
pub fn build_package(
    db_path: &Path,
    schema_version: u32,
    version: &str,
    out_dir: &Path,
) -> Result<BuiltPackage> {
    std::fs::create_dir_all(out_dir)?;

    let version = version.trim().trim_start_matches('v');
    let zip_name = format!("index-v{version}.zip");
    let zip_path = out_dir.join(&zip_name);

    let metadata = PackageMetadata {
        version: version.to_string(),
        format: PACKAGE_FORMAT.to_string(),
        schema_version,
    };

    let file = File::create(&zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    writer
        .start_file(DB_MEMBER, options)
        .map_err(PackageError::from)?;
    let mut db_file = File::open(db_path)?;
    std::io::copy(&mut db_file, &mut writer)?;

    writer
        .start_file(METADATA_MEMBER, options)
        .map_err(PackageError::from)?;
    let metadata_json = serde_json::to_string_pretty(&metadata)?;
    writer.write_all(metadata_json.as_bytes())?;

    writer.finish().map_err(PackageError::from)?;

    let checksum = compute_sha256(&zip_path)?;
    let checksum_path = out_dir.join(format!("{zip_name}.sha256"));
    std::fs::write(&checksum_path, format!("{checksum}  {zip_name}\n"))?;

    info!(path = %zip_path.display(), version, "index package built");
    Ok(BuiltPackage {
        zip_path,
        checksum_path,
        checksum,
    })
}

/// Verifies a package: the sidecar checksum must match the archive and the
/// metadata must parse with the expected format.
pub fn verify_package(zip_path: &Path) -> Result<PackageMetadata> {
    let checksum_path = zip_path.with_file_name(format!(
        "{}.sha256",
        zip_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    ));

    if checksum_path.exists() {
        let recorded = std::fs::read_to_string(&checksum_path)?;
        let expected = recorded.split_whitespace().next().unwrap_or("").to_string();
        let actual = compute_sha256(zip_path)?;
        if expected != actual {
            return Err(PackageError::ChecksumMismatch { expected, actual }.into());
        }
    }

    let metadata = read_metadata(zip_path)?;
    if metadata.format != PACKAGE_FORMAT {
        return Err(PackageError::InvalidMetadata(format!(
            "unexpected format {:?}",
            metadata.format
        ))
        .into());
    }
    Ok(metadata)
}

fn read_metadata(zip_path: &Path) -> Result<PackageMetadata> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(PackageError::from)?;

    let mut member = archive.by_name(METADATA_MEMBER).map_err(|_| {
        crate::error::Error::from(PackageError::MissingMember {
            name: METADATA_MEMBER.to_string(),
        })
    })?;
    let mut contents = String::new();
    member.read_to_string(&mut contents)?;

    serde_json::from_str(&contents)
        .map_err(|e| PackageError::InvalidMetadata(e.to_string()).into())
}

/// Installs a verified package: stages the database under
/// `pending_update/`, swaps it into place, and records the version.
pub fn install_package(zip_path: &Path, db_path: &Path, index_dir: &Path) -> Result<PackageMetadata> {
    let metadata = verify_package(zip_path)?;

    let staging = index_dir.join(PENDING_DIR);
    std::fs::create_dir_all(&staging)?;

    // Stage the database first so a failed extraction never clobbers the
    // live file
    let staged_db = staging.join(DB_MEMBER);
    {
        let file = File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(PackageError::from)?;
        let mut member = archive.by_name(DB_MEMBER).map_err(|_| {
            crate::error::Error::from(PackageError::MissingMember {
                name: DB_MEMBER.to_string(),
            })
        })?;
        let mut out = File::create(&staged_db)?;
        std::io::copy(&mut member, &mut out)?;
    }

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::rename(&staged_db, db_path).or_else(|_| {
        // Cross-device fallback
        std::fs::copy(&staged_db, db_path).map(|_| ())
    })?;
    let _ = std::fs::remove_dir_all(&staging);

    write_index_version(index_dir, &metadata.version)?;
    info!(version = %metadata.version, "index package installed");
    Ok(metadata)
}

/// Reads the installed index version, if recorded.
#[must_use]
pub fn read_index_version(index_dir: &Path) -> Option<String> {
    std::fs::read_to_string(index_dir.join(VERSION_FILENAME))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Records the installed index version.
pub fn write_index_version(index_dir: &Path, version: &str) -> Result<()> {
    std::fs::create_dir_all(index_dir)?;
    std::fs::write(index_dir.join(VERSION_FILENAME), format!("{version}\n"))?;
    Ok(())
}
