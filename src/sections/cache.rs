use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::hash::{hash_hex, normalize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSection {
    pub file_path: PathBuf,
    pub header: String,
    pub content: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    mtime_millis: i64,
    section: CachedSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey<'a> {
    path: &'a Path,
    header: &'a str,
}

/// Two-tier cache: an in-memory map keyed by (path, header) holding the
/// file's mtime at read time, backed by a warm disk cache under
/// `<root>/cache/sections/`. Either tier is invalidated the moment the
/// file's mtime no longer matches.
pub struct SectionCache {
    disk_dir: PathBuf,
    memory: HashMap<(PathBuf, String), (SystemTime, CachedSection)>,
}

impl SectionCache {
    pub fn new(disk_dir: PathBuf) -> Self {
        Self {
            disk_dir,
            memory: HashMap::new(),
        }
    }

    fn key_hash(path: &Path, header: &str) -> String {
        hash_hex(&format!("{}\u{0}{}", path.display(), header))
    }

    fn disk_path(&self, path: &Path, header: &str) -> PathBuf {
        self.disk_dir
            .join(format!("{}.json", Self::key_hash(path, header)))
    }

    pub fn get(&mut self, path: &Path, header: &str, mtime: SystemTime) -> Option<CachedSection> {
        let key = (path.to_path_buf(), header.to_string());
        if let Some((cached_mtime, section)) = self.memory.get(&key)
            && *cached_mtime == mtime
        {
            return Some(section.clone());
        }

        // Memory miss or stale: fall through to disk.
        let disk_path = self.disk_path(path, header);
        let Ok(raw) = std::fs::read_to_string(&disk_path) else {
            return None;
        };
        let entry: DiskEntry = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(_) => {
                let _ = std::fs::remove_file(&disk_path);
                return None;
            }
        };
        let mtime_millis = mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        if entry.mtime_millis != mtime_millis {
            let _ = std::fs::remove_file(&disk_path);
            return None;
        }
        self.memory.insert(key, (mtime, entry.section.clone()));
        Some(entry.section)
    }

    pub fn put(&mut self, path: &Path, header: &str, mtime: SystemTime, content: &str) -> CachedSection {
        let normalized = normalize(content);
        let section = CachedSection {
            file_path: path.to_path_buf(),
            header: header.to_string(),
            content: content.to_string(),
            content_hash: hash_hex(&normalized),
        };

        let key = (path.to_path_buf(), header.to_string());
        self.memory.insert(key, (mtime, section.clone()));

        let mtime_millis = mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let entry = DiskEntry {
            mtime_millis,
            section: section.clone(),
        };
        if std::fs::create_dir_all(&self.disk_dir).is_ok()
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = std::fs::write(self.disk_path(path, header), json);
        }

        section
    }
}
