//! Filesystem-backed layered store
//!
//! Layout under the root directory:
//!
//! ```text
//! raw/<key>.page.v1.html
//! processed/<key>.document.v1.json
//! processed/<key>.classification.v1.json
//! processed/<key>.analysis.v1.json
//! report/run-7.summary.v1.json
//! ```
//!
//! Each write lands in a temp file first and is then hard-linked to its
//! versioned name. Linking fails if the name exists, so two writers racing for
//! the same version cannot clobber each other; the loser takes the next one.

use crate::storage::traits::{Layer, LayeredStore, StorageError, StorageResult, StoredArtifact};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Attempts at claiming a version before giving up
const MAX_VERSION_CLAIMS: u32 = 16;

pub struct FsLayeredStore {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl FsLayeredStore {
    /// Opens the store, creating one directory per layer
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        for layer in Layer::ALL {
            std::fs::create_dir_all(root.join(layer.as_str()))?;
        }
        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layer_dir(&self, layer: Layer) -> PathBuf {
        self.root.join(layer.as_str())
    }

    fn write_temp(&self, dir: &Path, payload: &[u8]) -> StorageResult<PathBuf> {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(".tmp-{}-{}", std::process::id(), seq));
        let mut file = std::fs::File::create(&path)?;
        file.write_all(payload)?;
        file.sync_all()?;
        Ok(path)
    }
}

/// Keys and artifact names become file name parts, so keep them plain
fn check_name(name: &str) -> StorageResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(name.to_string()))
    }
}

/// Parses the version out of `<key>.<artifact>.v<N>.<ext>`
fn parse_version(file_name: &str, prefix: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(prefix)?;
    let (version, _ext) = rest.split_once('.')?;
    version.parse().ok()
}

impl LayeredStore for FsLayeredStore {
    fn put(
        &self,
        layer: Layer,
        key: &str,
        artifact: &str,
        extension: &str,
        payload: &[u8],
    ) -> StorageResult<StoredArtifact> {
        check_name(key)?;
        check_name(artifact)?;
        check_name(extension)?;

        let dir = self.layer_dir(layer);
        let temp = self.write_temp(&dir, payload)?;
        let mut version = self.versions(layer, key, artifact)?.last().copied().unwrap_or(0) + 1;

        let result = (|| {
            for _ in 0..MAX_VERSION_CLAIMS {
                let path = dir.join(format!("{}.{}.v{}.{}", key, artifact, version, extension));
                match std::fs::hard_link(&temp, &path) {
                    Ok(()) => {
                        return Ok(StoredArtifact {
                            layer,
                            key: key.to_string(),
                            artifact: artifact.to_string(),
                            version,
                            path,
                        })
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => version += 1,
                    Err(e) => return Err(StorageError::Io(e)),
                }
            }
            Err(StorageError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("could not claim a version for {}.{}", key, artifact),
            )))
        })();

        if let Err(e) = std::fs::remove_file(&temp) {
            tracing::warn!(path = %temp.display(), "failed to remove temp file: {}", e);
        }
        if let Ok(stored) = &result {
            tracing::debug!(layer = %layer, key, artifact, version = stored.version, "stored artifact");
        }
        result
    }

    fn get(&self, layer: Layer, key: &str, artifact: &str) -> StorageResult<Vec<u8>> {
        let version = self
            .versions(layer, key, artifact)?
            .last()
            .copied()
            .ok_or_else(|| StorageError::NotFound {
                layer,
                key: key.to_string(),
                artifact: artifact.to_string(),
            })?;

        let prefix = format!("{}.{}.v{}.", key, artifact, version);
        for entry in std::fs::read_dir(self.layer_dir(layer))? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(std::fs::read(entry.path())?);
            }
        }
        Err(StorageError::NotFound {
            layer,
            key: key.to_string(),
            artifact: artifact.to_string(),
        })
    }

    fn versions(&self, layer: Layer, key: &str, artifact: &str) -> StorageResult<Vec<u32>> {
        check_name(key)?;
        check_name(artifact)?;

        let prefix = format!("{}.{}.v", key, artifact);
        let mut versions: Vec<u32> = std::fs::read_dir(self.layer_dir(layer))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_version(&entry.file_name().to_string_lossy(), &prefix))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsLayeredStore) {
        let dir = TempDir::new().unwrap();
        let store = FsLayeredStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, store) = store();
        let stored = store.put(Layer::Raw, "abc123", "page", "html", b"<html></html>").unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.path.ends_with("raw/abc123.page.v1.html"));
        assert_eq!(store.get(Layer::Raw, "abc123", "page").unwrap(), b"<html></html>");
    }

    #[test]
    fn test_second_put_adds_version() {
        let (_dir, store) = store();
        store.put(Layer::Raw, "k", "page", "html", b"first").unwrap();
        let second = store.put(Layer::Raw, "k", "page", "html", b"second").unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(store.versions(Layer::Raw, "k", "page").unwrap(), vec![1, 2]);
        assert_eq!(store.get(Layer::Raw, "k", "page").unwrap(), b"second");
        let first = std::fs::read(store.root().join("raw/k.page.v1.html")).unwrap();
        assert_eq!(first, b"first");
    }

    #[test]
    fn test_artifacts_and_layers_are_separate() {
        let (_dir, store) = store();
        store.put(Layer::Processed, "k", "document", "json", b"{}").unwrap();
        assert!(matches!(
            store.get(Layer::Processed, "k", "analysis"),
            Err(StorageError::NotFound { .. })
        ));
        assert!(store.get(Layer::Raw, "k", "document").is_err());
        assert!(store.versions(Layer::Processed, "k", "doc").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let (_dir, store) = store();
        assert!(matches!(
            store.put(Layer::Raw, "../escape", "page", "html", b""),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.put(Layer::Raw, "k", "page.v1", "html", b"").is_err());
    }

    #[test]
    fn test_json_helpers() {
        let (_dir, store) = store();
        let store: Arc<dyn LayeredStore> = Arc::new(store);
        store
            .put_json(Layer::Report, "run-1", "summary", &json!({"total_pages": 3}))
            .unwrap();
        let value: serde_json::Value = store.get_json(Layer::Report, "run-1", "summary").unwrap();
        assert_eq!(value["total_pages"], 3);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_dir, store) = store();
        store.put(Layer::Raw, "k", "page", "html", b"x").unwrap();
        let names: Vec<String> = std::fs::read_dir(store.root().join("raw"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.page.v1.html"]);
    }
}
