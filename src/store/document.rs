// Backing documents: a whole JSON array read and rewritten in one piece.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StoreError;

/// What to do when a backing document exists but cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Treat the document as empty and keep going. Unreadable history is lost
    /// on the next write.
    #[default]
    Lenient,
    /// Refuse to read or write until the document is repaired.
    Strict,
}

impl FromStr for CorruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(CorruptPolicy::Lenient),
            "strict" => Ok(CorruptPolicy::Strict),
            other => Err(format!("unknown corrupt policy: {other}")),
        }
    }
}

/// Raw byte storage behind a [`JsonDocument`].
pub trait DocumentBackend: Send + Sync {
    /// Returns `None` if nothing has been written yet.
    fn read(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replaces the stored bytes. Either the whole write lands or the previous
    /// contents stay in place.
    fn write(&self, contents: &[u8]) -> io::Result<()>;

    /// Human-readable location used in errors and logs.
    fn location(&self) -> String;
}

/// A document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the new contents are staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "document.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DocumentBackend for FileBackend {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        let staged = fs::File::create(&staging).and_then(|mut file| {
            io::Write::write_all(&mut file, contents)?;
            file.sync_all()
        });
        if let Err(e) = staged.and_then(|_| fs::rename(&staging, &self.path)) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process document, used by tests and throwaway servers.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, simulating a full or read-only disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DocumentBackend for MemoryBackend {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    fn write(&self, contents: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("memory backend is refusing writes"));
        }
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

impl<B: DocumentBackend + ?Sized> DocumentBackend for std::sync::Arc<B> {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        (**self).read()
    }

    fn write(&self, contents: &[u8]) -> io::Result<()> {
        (**self).write(contents)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// A pretty-printed JSON array of `T`, always loaded and saved whole.
pub struct JsonDocument<T> {
    backend: Box<dyn DocumentBackend>,
    policy: CorruptPolicy,
    _items: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(backend: impl DocumentBackend + 'static, policy: CorruptPolicy) -> Self {
        Self {
            backend: Box::new(backend),
            policy,
            _items: PhantomData,
        }
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    pub fn load(&self) -> Result<Vec<T>, StoreError> {
        let bytes = match self.backend.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    location: self.location(),
                    source,
                })
            }
        };

        // A freshly created, still empty file is not corruption.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<T>>(&bytes) {
            Ok(items) => Ok(items),
            Err(source) => match self.policy {
                CorruptPolicy::Lenient => {
                    tracing::warn!(
                        location = %self.location(),
                        error = %source,
                        "backing document is malformed, treating it as empty"
                    );
                    Ok(Vec::new())
                }
                CorruptPolicy::Strict => Err(StoreError::Corrupt {
                    location: self.location(),
                    source,
                }),
            },
        }
    }

    pub fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_vec_pretty(items)?;
        encoded.push(b'\n');
        self.backend
            .write(&encoded)
            .map_err(|source| StoreError::Write {
                location: self.location(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn numbers(
        backend: impl DocumentBackend + 'static,
        policy: CorruptPolicy,
    ) -> JsonDocument<u32> {
        JsonDocument::new(backend, policy)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let doc = numbers(FileBackend::new(dir.path().join("nope.json")), CorruptPolicy::Strict);
        assert!(doc.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_save_is_pretty_and_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("scores.json");
        let doc = numbers(FileBackend::new(&path), CorruptPolicy::Lenient);

        doc.save(&[1, 2, 3]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        assert_eq!(doc.load().unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("nested").join("scores.json.tmp").exists());
    }

    #[test]
    fn test_lenient_policy_treats_garbage_as_empty() {
        let backend = MemoryBackend::with_contents("{not json");
        let doc = numbers(backend, CorruptPolicy::Lenient);
        assert!(doc.load().unwrap().is_empty());
    }

    #[test]
    fn test_strict_policy_reports_garbage() {
        let backend = MemoryBackend::with_contents("[1, 2,");
        let doc = numbers(backend, CorruptPolicy::Strict);
        let err = doc.load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_malformed_not_io() {
        let backend = MemoryBackend::with_contents(vec![0xff, 0xfe, 0x5b]);
        let doc = numbers(backend, CorruptPolicy::Lenient);
        assert!(doc.load().unwrap().is_empty());
    }

    #[test]
    fn test_blank_document_is_empty_even_when_strict() {
        let backend = MemoryBackend::with_contents("  \n");
        let doc = numbers(backend, CorruptPolicy::Strict);
        assert!(doc.load().unwrap().is_empty());
    }

    #[test]
    fn test_failed_write_keeps_previous_contents() {
        let backend = Arc::new(MemoryBackend::new());
        let doc = numbers(backend.clone(), CorruptPolicy::Strict);
        doc.save(&[7]).unwrap();

        backend.set_fail_writes(true);
        let err = doc.save(&[7, 8]).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(doc.load().unwrap(), vec![7]);
    }

    #[test]
    fn test_read_error_is_surfaced() {
        let dir = TempDir::new().unwrap();
        // Reading a directory as a file fails with something other than NotFound.
        let doc = numbers(FileBackend::new(dir.path()), CorruptPolicy::Lenient);
        assert!(matches!(doc.load().unwrap_err(), StoreError::Read { .. }));
    }

    #[test]
    fn test_corrupt_policy_parse() {
        assert_eq!("lenient".parse::<CorruptPolicy>(), Ok(CorruptPolicy::Lenient));
        assert_eq!(" STRICT ".parse::<CorruptPolicy>(), Ok(CorruptPolicy::Strict));
        assert!("sometimes".parse::<CorruptPolicy>().is_err());
    }
}
