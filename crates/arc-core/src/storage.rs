//! Flat key/value stores and the .arcs file format that persists them.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::types::{ArcError, ArcResult};

/// Magic bytes: "ARCS"
const ARCS_MAGIC: u32 = 0x41524353;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 32;

/// A flat, process-wide string store (the persistence behind the cache).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String) -> ArcResult<()>;

    fn remove(&mut self, key: &str) -> ArcResult<()>;

    fn keys(&self) -> Vec<String>;

    /// Drop every entry.
    fn clear(&mut self) -> ArcResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: String) -> ArcResult<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> ArcResult<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }

    fn clear(&mut self) -> ArcResult<()> {
        (**self).clear()
    }
}

/// Store that lives as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> ArcResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> ArcResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn clear(&mut self) -> ArcResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Store persisted to a .arcs file, written through on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> ArcResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            tracing::debug!("Opening store: {}", path.display());
            ArcsReader::read_from_file(&path)?
        } else {
            tracing::debug!("Creating store: {}", path.display());
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn flush(&self) -> ArcResult<()> {
        ArcsWriter::write_to_file(&self.entries, &self.path)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> ArcResult<()> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> ArcResult<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn clear(&mut self) -> ArcResult<()> {
        self.entries.clear();
        self.flush()
    }
}

/// Writer for .arcs files.
pub struct ArcsWriter;

/// Reader for .arcs files.
pub struct ArcsReader;

impl ArcsWriter {
    /// Write store entries to a file.
    pub fn write_to_file(entries: &BTreeMap<String, String>, path: &Path) -> ArcResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::File::create(path)?;
        Self::write_to(entries, &mut file)
    }

    /// Write store entries to any writer.
    pub fn write_to<W: Write>(entries: &BTreeMap<String, String>, writer: &mut W) -> ArcResult<()> {
        let payload = serde_json::to_vec(entries)
            .map_err(|e| ArcError::Storage(format!("Serialization failed: {e}")))?;

        let now = chrono::Utc::now().timestamp().max(0) as u64;

        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], ARCS_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], 0); // flags
        write_u64(&mut header[8..16], entries.len() as u64);
        write_u64(&mut header[16..24], now);
        write_u64(&mut header[24..32], payload.len() as u64);

        writer.write_all(&header)?;
        writer.write_all(&payload)?;

        Ok(())
    }
}

impl ArcsReader {
    /// Read store entries from a file.
    pub fn read_from_file(path: &Path) -> ArcResult<BTreeMap<String, String>> {
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Read store entries from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> ArcResult<BTreeMap<String, String>> {
        let mut header = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header)
            .map_err(|e| ArcError::Storage(format!("Failed to read header: {e}")))?;

        let magic = read_u32(&header[0..4]);
        if magic != ARCS_MAGIC {
            return Err(ArcError::Storage(format!(
                "Invalid magic: expected 0x{ARCS_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }

        let version = read_u16(&header[4..6]);
        if version != FORMAT_VERSION {
            return Err(ArcError::Storage(format!(
                "Unsupported version: {version}"
            )));
        }

        let entry_count = read_u64(&header[8..16]) as usize;
        let payload_len = read_u64(&header[24..32]);

        // The header length is untrusted; read at most that much and compare.
        let mut payload = Vec::new();
        reader
            .by_ref()
            .take(payload_len)
            .read_to_end(&mut payload)
            .map_err(|e| ArcError::Storage(format!("Failed to read payload: {e}")))?;
        if payload.len() as u64 != payload_len {
            return Err(ArcError::Storage(format!(
                "Truncated payload: header says {payload_len} bytes, found {}",
                payload.len()
            )));
        }

        let entries: BTreeMap<String, String> = serde_json::from_slice(&payload)
            .map_err(|e| ArcError::Storage(format!("Deserialization failed: {e}")))?;

        if entries.len() != entry_count {
            return Err(ArcError::Storage(format!(
                "Entry count mismatch: header says {entry_count}, payload has {}",
                entries.len()
            )));
        }

        Ok(entries)
    }
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        entries.insert("file_version".to_string(), "3".to_string());
        entries.insert("file_app_js".to_string(), "console.log(1);".to_string());
        entries
    }

    #[test]
    fn test_roundtrip_in_memory() {
        let mut buf = Vec::new();
        ArcsWriter::write_to(&sample(), &mut buf).unwrap();
        assert_eq!(&buf[0..4], &ARCS_MAGIC.to_le_bytes());

        let loaded = ArcsReader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_invalid_magic() {
        let buf = [0u8; HEADER_SIZE + 4];
        let err = ArcsReader::read_from(&mut &buf[..]).unwrap_err();
        assert!(err.to_string().contains("Invalid magic"));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let buf: [u8; 0] = [];
        let err = ArcsReader::read_from(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, ArcError::Storage(_)));
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = Vec::new();
        ArcsWriter::write_to(&sample(), &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(ArcsReader::read_from(&mut &buf[..]).is_err());
    }

    #[test]
    fn test_oversized_length_field_is_a_storage_error() {
        let mut buf = Vec::new();
        ArcsWriter::write_to(&sample(), &mut buf).unwrap();
        write_u64(&mut buf[24..32], u64::MAX);
        let err = ArcsReader::read_from(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, ArcError::Storage(ref m) if m.contains("Truncated payload")));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.arcs");

        {
            let mut store = FileStore::open(&path).unwrap();
            assert!(store.is_empty());
            store.set("file_version", "9".to_string()).unwrap();
            store.set("file_site_css", "body{}".to_string()).unwrap();
        }

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("file_version").as_deref(), Some("9"));
        assert_eq!(store.len(), 2);

        store.remove("file_site_css").unwrap();
        store.clear().unwrap();
        let store = FileStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_through_box() {
        let mut store: Box<dyn KeyValueStore + Send> = Box::new(MemoryStore::new());
        store.set("a", "1".to_string()).unwrap();
        assert_eq!(store.keys(), vec!["a".to_string()]);
        store.remove("a").unwrap();
        assert_eq!(store.get("a"), None);
    }
}
