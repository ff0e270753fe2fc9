//! Filesystem-backed document store for the knowledge base.
//!
//! Keys are `/`-separated relative paths under the store root. Content
//! types given at upload are kept in a JSON index next to the root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use berrybot_core::error::{BerrybotError, Result};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata of one stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

pub struct DocumentStore {
    root: PathBuf,
    index_path: PathBuf,
    content_types: Mutex<HashMap<String, String>>,
}

impl DocumentStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let index_path = root.with_extension("index.json");
        let content_types = match std::fs::read_to_string(&index_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %index_path.display(), error = %e, "Ignoring corrupt content-type index");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(root = %root.display(), "Document store opened");
        Ok(Self {
            root,
            index_path,
            content_types: Mutex::new(content_types),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All documents, sorted by key.
    pub fn list(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        self.walk(&self.root, &mut documents)?;
        documents.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(documents)
    }

    pub fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        self.update_index(|types| {
            match content_type {
                Some(ct) => types.insert(key.to_string(), ct.to_string()),
                None => types.remove(key),
            };
        })?;
        tracing::info!(key = %key, size = bytes.len(), "Document stored");
        Ok(())
    }

    /// Bytes and content type of `key`, or `None` if it does not exist.
    pub fn get(&self, key: &str) -> Result<Option<(Vec<u8>, String)>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some((bytes, self.content_type(key)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `key`. Returns `false` if it did not exist.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.update_index(|types| {
                    types.remove(key);
                })?;
                tracing::info!(key = %key, "Document deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn content_type(&self, key: &str) -> String {
        self.content_types
            .lock()
            .ok()
            .and_then(|types| types.get(key).cloned())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    fn update_index(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let mut types = self
            .content_types
            .lock()
            .map_err(|e| BerrybotError::Storage(format!("content-type index poisoned: {}", e)))?;
        f(&mut types);
        std::fs::write(&self.index_path, serde_json::to_string_pretty(&*types)?)?;
        Ok(())
    }

    fn walk(&self, dir: &Path, out: &mut Vec<StoredDocument>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let path = entry.path();
            if meta.is_dir() {
                self.walk(&path, out)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let last_modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(StoredDocument {
                key,
                size: meta.len(),
                last_modified,
            });
        }
        Ok(())
    }
}

/// Reject keys that would escape the store root.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.contains('\\')
        || key.contains('\0')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(BerrybotError::Storage(format!("invalid document key '{}'", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("documents")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_list_delete() {
        let (_dir, store) = store();
        store.put("guide.pdf", b"%PDF", Some("application/pdf")).unwrap();
        store.put("email-replies/a.txt", b"hello", None).unwrap();

        let docs = store.list().unwrap();
        let keys: Vec<_> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["email-replies/a.txt", "guide.pdf"]);
        assert_eq!(docs[1].size, 4);

        let (bytes, content_type) = store.get("guide.pdf").unwrap().unwrap();
        assert_eq!(bytes, b"%PDF");
        assert_eq!(content_type, "application/pdf");
        assert_eq!(store.content_type("email-replies/a.txt"), DEFAULT_CONTENT_TYPE);

        assert!(store.delete("guide.pdf").unwrap());
        assert!(!store.delete("guide.pdf").unwrap());
        assert!(store.get("guide.pdf").unwrap().is_none());
    }

    #[test]
    fn test_content_types_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("documents");
        DocumentStore::open(&root)
            .unwrap()
            .put("notes.txt", b"x", Some("text/plain"))
            .unwrap();
        let reopened = DocumentStore::open(&root).unwrap();
        assert_eq!(reopened.content_type("notes.txt"), "text/plain");
    }

    #[test]
    fn test_rejects_escaping_keys() {
        for key in ["", "../x", "a/../../x", "/abs", "a//b", "a\\b", "."] {
            assert!(validate_key(key).is_err(), "accepted {:?}", key);
        }
        assert!(validate_key("folder/file name.txt").is_ok());
    }

    #[test]
    fn test_index_lives_outside_root() {
        let (_dir, store) = store();
        store.put("a.txt", b"x", Some("text/plain")).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
