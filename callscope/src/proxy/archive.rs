//! Snapshot archive sinks

use log::debug;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Receives every broadcast snapshot as serialized JSON
pub trait Archive: Send {
    fn archive(&mut self, json: &str) -> io::Result<()>;
}

/// Archiving disabled
pub struct NullArchive;

impl Archive for NullArchive {
    fn archive(&mut self, _json: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Writes `<dir>/<unix-seconds>.json` per snapshot
pub struct DirectoryArchive {
    dir: PathBuf,
}

impl DirectoryArchive {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, unix_secs: u64) -> PathBuf {
        self.dir.join(format!("{unix_secs}.json"))
    }
}

impl Archive for DirectoryArchive {
    fn archive(&mut self, json: &str) -> io::Result<()> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.path_for(secs);
        debug!("Archiving snapshot to {}", path.display());
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_archive_writes_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = DirectoryArchive::new(dir.path().join("nested")).unwrap();
        archive.archive(r#"{"nodes":[]}"#).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "json");
        assert!(files[0].file_stem().unwrap().to_str().unwrap().parse::<u64>().is_ok());
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), r#"{"nodes":[]}"#);
    }

    #[test]
    fn test_null_archive_accepts_everything() {
        assert!(NullArchive.archive("{}").is_ok());
    }
}
