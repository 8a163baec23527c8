//! Parses a markdown spec into named sections, hashes each one, caches by
//! (path, header, mtime), and detects drift against a previously recorded
//! hash.

mod cache;
mod hash;
mod parser;

pub use cache::CachedSection;
pub use hash::{hash_hex, normalize};

use std::path::Path;

use cache::SectionCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    Unchanged,
    Drifted,
    Removed,
}

pub struct SectionStore {
    cache: SectionCache,
}

impl SectionStore {
    pub fn new(disk_cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache: SectionCache::new(disk_cache_dir.as_ref().to_path_buf()),
        }
    }

    pub fn extract(&mut self, path: &Path, header: &str) -> anyhow::Result<Option<CachedSection>> {
        let mtime = match std::fs::metadata(path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Some(cached) = self.cache.get(path, header, mtime) {
            return Ok(Some(cached));
        }

        let content = std::fs::read_to_string(path)?;
        let Some(section_text) = parser::extract_section(&content, header) else {
            return Ok(None);
        };

        Ok(Some(self.cache.put(path, header, mtime, section_text)))
    }

    pub fn drift(
        &mut self,
        path: &Path,
        header: &str,
        previous_hash: &str,
    ) -> anyhow::Result<Drift> {
        match self.extract(path, header)? {
            None => Ok(Drift::Removed),
            Some(section) => {
                let current = hash_hex(&normalize(&section.content));
                if current == previous_hash {
                    Ok(Drift::Unchanged)
                } else {
                    Ok(Drift::Drifted)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_spec(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("spec.md");
        fs::write(
            &path,
            "# Auth\n\n## Acceptance Criteria\n- must validate tokens\n\n## Dependencies\nnone\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn extract_returns_the_named_section() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let mut store = SectionStore::new(dir.path().join("cache"));
        let section = store.extract(&spec, "Acceptance Criteria").unwrap().unwrap();
        assert!(section.content.contains("must validate tokens"));
    }

    #[test]
    fn missing_section_is_none_not_error() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let mut store = SectionStore::new(dir.path().join("cache"));
        assert!(store.extract(&spec, "Nonexistent").unwrap().is_none());
    }

    #[test]
    fn drift_is_unchanged_right_after_extract() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let mut store = SectionStore::new(dir.path().join("cache"));
        let section = store.extract(&spec, "Dependencies").unwrap().unwrap();
        let drift = store.drift(&spec, "Dependencies", &section.content_hash).unwrap();
        assert_eq!(drift, Drift::Unchanged);
    }

    #[test]
    fn drift_detects_content_change() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let mut store = SectionStore::new(dir.path().join("cache"));
        let section = store.extract(&spec, "Dependencies").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(
            &spec,
            "# Auth\n\n## Acceptance Criteria\n- must validate tokens\n\n## Dependencies\nredis\n",
        )
        .unwrap();

        let drift = store.drift(&spec, "Dependencies", &section.content_hash).unwrap();
        assert_eq!(drift, Drift::Drifted);
    }

    #[test]
    fn drift_detects_section_removal() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let mut store = SectionStore::new(dir.path().join("cache"));
        let section = store.extract(&spec, "Dependencies").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(&spec, "# Auth\n\n## Acceptance Criteria\n- must validate tokens\n").unwrap();

        let drift = store.drift(&spec, "Dependencies", &section.content_hash).unwrap();
        assert_eq!(drift, Drift::Removed);
    }
}
