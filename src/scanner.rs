//! Directory scanning.
//!
//! Discovers agreement PDFs, tracks them by content hash, and reconciles
//! the database with the filesystem: new files are inserted as pending,
//! changed files are reset for reindexing, and rows for deleted files are
//! removed. Scanning never raises; per-file failures land in the report.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;
use crate::models::{ScanError, ScanReport};
use crate::storage::Store;

/// Computes the SHA-256 hex digest of a file.
pub fn compute_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Scans a directory for PDF files and reconciles the store.
///
/// Returns counters for new/changed/unchanged/missing files plus any
/// per-file errors.
pub fn scan_directory(store: &Store, dir: &Path) -> Result<ScanReport> {
    let mut report = ScanReport::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.errors.push(ScanError {
                path: dir.display().to_string(),
                error: e.to_string(),
            });
            return Ok(report);
        }
    };

    let mut seen_paths: HashSet<String> = HashSet::new();

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() || !is_pdf(&path) {
            continue;
        }

        let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
        let path_str = resolved.display().to_string();
        seen_paths.insert(path_str.clone());

        let outcome = (|| -> Result<()> {
            let metadata = std::fs::metadata(&resolved)?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0.0, |d| d.as_secs_f64());
            let sha256 = compute_sha256(&resolved)?;

            match store.get_file_by_path(&path_str)? {
                None => {
                    let filename = resolved
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    store.insert_file(&path_str, &filename, &sha256, mtime, metadata.len())?;
                    report.new += 1;
                }
                Some(existing) if existing.sha256 != sha256 => {
                    store.mark_file_changed(existing.id, &sha256, mtime, metadata.len())?;
                    report.changed += 1;
                }
                Some(_) => {
                    report.unchanged += 1;
                }
            }
            Ok(())
        })();

        if let Err(e) = outcome {
            report.errors.push(ScanError {
                path: path_str,
                error: e.to_string(),
            });
        }
    }

    // Rows for files no longer on disk are removed (cascades everywhere)
    for file in store.list_files()? {
        if !seen_paths.contains(&file.path) && !Path::new(&file.path).exists() {
            store.delete_file(file.id)?;
            report.missing += 1;
        }
    }

    info!(
        new = report.new,
        changed = report.changed,
        unchanged = report.unchanged,
        missing = report.missing,
        "scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileStatus;

    fn setup() -> (Store, tempfile::TempDir) {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        (store, tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_scan_new_files() {
        let (store, dir) = setup();
        std::fs::write(dir.path().join("a.pdf"), b"pdf-a").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"pdf-b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let report = scan_directory(&store, dir.path()).unwrap();
        assert_eq!(report.new, 2);
        assert_eq!(report.changed, 0);
        assert_eq!(store.list_files().unwrap().len(), 2);
        assert!(store
            .list_files()
            .unwrap()
            .iter()
            .all(|f| f.status == FileStatus::Pending));
    }

    #[test]
    fn test_scan_unchanged() {
        let (store, dir) = setup();
        std::fs::write(dir.path().join("a.pdf"), b"pdf-a").unwrap();

        scan_directory(&store, dir.path()).unwrap();
        let report = scan_directory(&store, dir.path()).unwrap();
        assert_eq!(report.new, 0);
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn test_scan_changed_resets_status() {
        let (store, dir) = setup();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"original").unwrap();
        scan_directory(&store, dir.path()).unwrap();

        let file = &store.list_files().unwrap()[0];
        store.set_file_indexed(file.id, 3).unwrap();

        std::fs::write(&path, b"modified content").unwrap();
        let report = scan_directory(&store, dir.path()).unwrap();
        assert_eq!(report.changed, 1);

        let file = store.get_file(file.id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Pending);
        assert!(file.pages.is_none());
    }

    #[test]
    fn test_scan_missing_removes_rows() {
        let (store, dir) = setup();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"pdf").unwrap();
        scan_directory(&store, dir.path()).unwrap();

        std::fs::remove_file(&path).unwrap();
        let report = scan_directory(&store, dir.path()).unwrap();
        assert_eq!(report.missing, 1);
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_directory_never_raises() {
        let (store, _) = setup();
        let report = scan_directory(&store, Path::new("/nonexistent/dir")).unwrap();
        assert_eq!(report.new, 0);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_sha256_stability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello").unwrap();
        let a = compute_sha256(&path).unwrap();
        let b = compute_sha256(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
