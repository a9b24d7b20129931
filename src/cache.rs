use crate::config::MatchPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Invoice numbers already seen in the archive, with the files each number
/// was extracted from. Persisted as a single JSON blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceCache {
    pub numbers: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<String>>,
}

impl InvoiceCache {
    /// Load the cache file. A missing file starts an empty cache; a corrupt
    /// one is logged and also starts empty, so a bad blob never blocks a run.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No cache file yet, starting empty");
            return Self::default();
        }
        match fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|s| {
            serde_json::from_str::<Self>(&s).map_err(anyhow::Error::from)
        }) {
            Ok(cache) => {
                info!(numbers = cache.numbers.len(), "Loaded invoice-number cache");
                cache
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache unreadable, starting empty");
                Self::default()
            }
        }
    }

    /// Write the cache atomically: serialize to a temp file in the same
    /// directory, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new_in("."),
        }
        .context("failed to create cache temp file")?;
        serde_json::to_writer_pretty(&mut tmp, self).context("failed to serialize cache")?;
        tmp.persist(path)
            .with_context(|| format!("failed to replace cache {}", path.display()))?;
        info!(path = %path.display(), numbers = self.numbers.len(), "Cache saved");
        Ok(())
    }

    /// Record a number as seen in `file`.
    pub fn insert(&mut self, number: &str, file: &Path) {
        self.numbers.insert(number.to_string());
        let files = self.files.entry(number.to_string()).or_default();
        let file = file.to_string_lossy().to_string();
        if !files.contains(&file) {
            files.push(file);
        }
    }

    pub fn contains(&self, number: &str) -> bool {
        self.numbers.contains(number)
    }

    /// Files known to carry `number`. When `include_pending` is false, paths
    /// under `pending_dir` are filtered out of the answer.
    pub fn files_for(&self, number: &str, pending_dir: &Path, include_pending: bool) -> Vec<String> {
        let pending = pending_dir.to_string_lossy();
        self.files
            .get(number)
            .map(|files| {
                files
                    .iter()
                    .filter(|f| include_pending || !f.starts_with(pending.as_ref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Decide whether a document with these extracted numbers is already in
    /// the archive.
    pub fn is_duplicate(&self, numbers: &[String], policy: MatchPolicy) -> bool {
        if numbers.is_empty() {
            return false;
        }
        match policy {
            MatchPolicy::Any => numbers.iter().any(|n| self.contains(n)),
            MatchPolicy::All => numbers.iter().all(|n| self.contains(n)),
        }
    }

    /// Merge numbers extracted from the archive into the cache and persist
    /// the result. Load-then-merge keeps numbers from files that have since
    /// been moved or deleted; `rebuild` drops them instead.
    pub fn refresh<F>(
        path: &Path,
        pdfs: &[PathBuf],
        rebuild: bool,
        mut extract: F,
    ) -> Result<Self>
    where
        F: FnMut(&Path) -> Vec<String>,
    {
        let mut cache = if rebuild {
            info!("Rebuilding cache from scratch");
            Self::default()
        } else {
            Self::load(path)
        };

        for pdf in pdfs {
            for number in extract(pdf) {
                cache.insert(&number, pdf);
            }
        }
        cache.save(path)?;
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = InvoiceCache::default();
        cache.insert("12345678", Path::new("/archive/a.pdf"));
        cache.insert("12345678", Path::new("/archive/b.pdf"));
        cache.insert("87654321", Path::new("/archive/b.pdf"));
        cache.save(&path).unwrap();

        let loaded = InvoiceCache::load(&path);
        assert!(loaded.contains("12345678"));
        assert_eq!(loaded.files["12345678"].len(), 2);
        assert_eq!(loaded.numbers.len(), 2);
    }

    #[test]
    fn missing_and_corrupt_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(InvoiceCache::load(&missing).numbers.is_empty());

        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(InvoiceCache::load(&corrupt).numbers.is_empty());
    }

    #[test]
    fn refresh_merges_into_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = InvoiceCache::default();
        cache.insert("11111111", Path::new("/archive/old.pdf"));
        cache.save(&path).unwrap();

        let pdfs = vec![PathBuf::from("/archive/new.pdf")];
        let merged = InvoiceCache::refresh(&path, &pdfs, false, |_| {
            vec!["22222222".to_string()]
        })
        .unwrap();
        assert!(merged.contains("11111111"));
        assert!(merged.contains("22222222"));

        let rebuilt = InvoiceCache::refresh(&path, &pdfs, true, |_| {
            vec!["22222222".to_string()]
        })
        .unwrap();
        assert!(!rebuilt.contains("11111111"));
        assert!(rebuilt.contains("22222222"));
    }

    #[test]
    fn duplicate_decision_follows_match_policy() {
        let mut cache = InvoiceCache::default();
        cache.insert("11111111", Path::new("a.pdf"));

        let mixed = vec!["11111111".to_string(), "99999999".to_string()];
        assert!(cache.is_duplicate(&mixed, MatchPolicy::Any));
        assert!(!cache.is_duplicate(&mixed, MatchPolicy::All));
        assert!(!cache.is_duplicate(&[], MatchPolicy::Any));
    }

    #[test]
    fn files_for_can_hide_pending_entries() {
        let mut cache = InvoiceCache::default();
        cache.insert("11111111", Path::new("/archive/2025/a.pdf"));
        cache.insert("11111111", Path::new("/archive/tbd/b.pdf"));

        let pending = Path::new("/archive/tbd");
        assert_eq!(cache.files_for("11111111", pending, false).len(), 1);
        assert_eq!(cache.files_for("11111111", pending, true).len(), 2);
    }
}
