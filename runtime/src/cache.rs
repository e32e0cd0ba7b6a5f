//! Document cache for change detection.
//!
//! Each key (a source tag) owns two files in the cache directory: the raw
//! document `{key}.pdf` and its SHA-256 hex digest `{key}.sha256`. The hash
//! file is written after the document so a crash between the two writes only
//! costs one redundant re-parse.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Filesystem-backed document cache.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    cache_dir: PathBuf,
}

impl DocumentCache {
    /// Open (and create if needed) a cache in the given directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;
        tracing::debug!("DocumentCache at {}", cache_dir.display());
        Ok(Self { cache_dir })
    }

    pub fn document_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.pdf", file_key(key)))
    }

    pub fn hash_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.sha256", file_key(key)))
    }

    /// Hash recorded by the last successful [`store`](Self::store), if any.
    pub fn stored_hash(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.hash_path(key))
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }

    /// Last successfully downloaded document, if any.
    pub fn load_document(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.document_path(key)).ok()
    }

    /// Store a document and its hash.
    pub fn store(&self, key: &str, document: &[u8], hash: &str) -> Result<()> {
        let doc_path = self.document_path(key);
        fs::write(&doc_path, document)
            .with_context(|| format!("failed to write cache file: {}", doc_path.display()))?;
        let hash_path = self.hash_path(key);
        fs::write(&hash_path, hash)
            .with_context(|| format!("failed to write cache file: {}", hash_path.display()))?;
        Ok(())
    }

    /// Remove both files for a key.
    pub fn remove(&self, key: &str) -> Result<()> {
        for path in [self.document_path(key), self.hash_path(key)] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// SHA-256 of a document, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn file_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::new(dir.path().join("docs")).unwrap();

        assert!(cache.stored_hash("BSI").is_none());
        assert!(cache.load_document("BSI").is_none());

        let hash = content_hash(b"catalog v1");
        cache.store("BSI", b"catalog v1", &hash).unwrap();
        assert_eq!(cache.stored_hash("BSI"), Some(hash));
        assert_eq!(cache.load_document("BSI").unwrap(), b"catalog v1");
        assert!(dir.path().join("docs/bsi.pdf").exists());
        assert!(dir.path().join("docs/bsi.sha256").exists());

        cache.remove("BSI").unwrap();
        assert!(cache.stored_hash("BSI").is_none());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn test_file_key_sanitizes() {
        assert_eq!(file_key("Common Criteria"), "common_criteria");
        assert_eq!(file_key("../x"), "___x");
    }
}
