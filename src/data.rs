//! Source files and store locations.
//!
//! Opens wiktextract JSONL dumps (plain or gzip-compressed), fingerprints them so a store can be
//! matched to the dump it was built from, and resolves where cached stores live.

use crate::error::{Result, WikiliteError};
use directories_next::ProjectDirs;
use flate2::read::MultiGzDecoder;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Subdirectory name within the user's cache directory
pub const CACHE_SUBDIR: &str = "wikilite";
/// Hex characters kept from the source digest.
pub const FINGERPRINT_LEN: usize = 12;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER_SIZE: usize = 1 << 20;

/// Gets the directory cached stores are written to.
/// Creates the directory if it doesn't exist.
pub fn get_cache_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "Wikilite", CACHE_SUBDIR)
        .ok_or(WikiliteError::DataDirNotFound)?;
    let cache_dir = proj_dirs.cache_dir().to_path_buf();
    fs::create_dir_all(&cache_dir)?;
    Ok(cache_dir)
}

/// Identifies a source file by name, size and modification time.
///
/// Two dumps with the same fingerprint are treated as the same input, so an unchanged dump maps
/// to the store already built from it.
pub fn fingerprint(source: &Path) -> Result<String> {
    let meta = fs::metadata(source)?;
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(format!("{}_{}_{}", name, meta.len(), mtime).as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(hex[..FINGERPRINT_LEN].to_string())
}

/// Default store path for a source with the given fingerprint.
pub fn default_db_path(fingerprint: &str) -> Result<PathBuf> {
    Ok(get_cache_dir()?.join(format!("{}.db", fingerprint)))
}

/// Opens a source dump for line-by-line reading, decompressing gzip transparently.
pub fn open_source(source: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(source)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if compressed {
        info!("Reading gzip-compressed source {:?}", source);
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiGzDecoder::new(reader),
        )))
    } else {
        info!("Reading source {:?}", source);
        Ok(Box::new(reader))
    }
}

/// Removes a store file along with its SQLite `-wal` and `-shm` companions.
pub fn remove_store_files(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> Vec<String> {
        open_source(path)
            .unwrap()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_open_plain_and_gzip_sources() {
        let dir = tempdir().unwrap();
        let content = "{\"word\":\"cat\"}\n{\"word\":\"kitty\"}\n";

        let plain = dir.path().join("dump.jsonl");
        fs::write(&plain, content).unwrap();

        let gz = dir.path().join("dump.jsonl.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(read_lines(&plain), read_lines(&gz));
        assert_eq!(read_lines(&gz).len(), 2);
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");
        fs::write(&path, "abc").unwrap();

        let a = fingerprint(&path).unwrap();
        let b = fingerprint(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        fs::write(&path, "abcdef").unwrap();
        assert_ne!(fingerprint(&path).unwrap(), a);
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            fingerprint(&dir.path().join("absent.jsonl")),
            Err(WikiliteError::Io(_))
        ));
    }

    #[test]
    fn test_remove_store_files() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("store.db");
        for name in ["store.db", "store.db-wal", "store.db-shm"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        remove_store_files(&db).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        // Nothing left to remove is fine.
        remove_store_files(&db).unwrap();
    }
}
