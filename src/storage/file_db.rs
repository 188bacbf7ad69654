/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A durable [`KVStore`] that keeps every key in its own file under a storage root directory.
//!
//! ## File layout
//!
//! The file of a key is named `kv-` followed by the URL-safe, unpadded Base64 encoding of the SHA-256
//! digest of the key, so file names have the same length whatever the length of the key. The file
//! holds a single framed record:
//!
//! |Bytes|Contents|
//! |---|---|
//! |4|Magic number `FLS2`|
//! |4|Length `k` of the key, little-endian `u32`|
//! |`k`|The key|
//! |4|Length `n` of the payload, little-endian `u32`|
//! |`n`|Payload (the value)|
//! |32|SHA-256 digest of everything before it|
//!
//! A record whose key differs from the key it was read for (two keys with the same file name) is
//! reported as corrupted rather than returned.
//!
//! ## Crash consistency
//!
//! A value is never overwritten in place. Writing a key first writes the new record to a uniquely
//! named temporary file in the same directory and fsyncs it, then renames it over the key's file and
//! fsyncs the directory. A crash at any point therefore leaves either the previous record or the new
//! one, never a mix. Temporary files left behind by a crash are removed the next time the directory is
//! opened. A record that fails its length or digest check is reported as [`KVStoreError::Corrupted`].
//!
//! Each key is committed atomically on its own. Every write batch produced by this crate touches a
//! single key.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use super::pluggables::{KVGet, KVStore, KVStoreError, WriteBatch};

const RECORD_MAGIC: [u8; 4] = *b"FLS2";
const DIGEST_LEN: usize = 32;
const LEN_LEN: usize = 4;
const FILE_PREFIX: &str = "kv-";
const TMP_SUFFIX: &str = ".tmp";

#[derive(Clone)]
pub struct FileDB {
    inner: Arc<FileDBInner>,
}

struct FileDBInner {
    root: PathBuf,
    // Serializes writers so that two clones never race on the same key's rename.
    write_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl FileDB {
    /// Open (creating if necessary) the store rooted at `root`, removing temporary files left behind by
    /// interrupted writes.
    pub fn open(root: impl AsRef<Path>) -> Result<FileDB, KVStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(TMP_SUFFIX) {
                log::debug!("Removing stale temporary file {:?}", entry.path());
                fs::remove_file(entry.path())?;
            }
        }

        Ok(FileDB {
            inner: Arc::new(FileDBInner {
                root,
                write_lock: Mutex::new(()),
                tmp_counter: AtomicU64::new(0),
            }),
        })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn path_of(&self, key: &[u8]) -> PathBuf {
        self.inner
            .root
            .join(format!("{}{}", FILE_PREFIX, file_stem(key)))
    }

    fn tmp_path_of(&self, key: &[u8]) -> PathBuf {
        let n = self.inner.tmp_counter.fetch_add(1, Ordering::SeqCst);
        self.inner.root.join(format!(
            "{}{}.{}.{}{}",
            FILE_PREFIX,
            file_stem(key),
            process::id(),
            n,
            TMP_SUFFIX
        ))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let tmp_path = self.tmp_path_of(key);
        let result = write_record(&tmp_path, key, value)
            .and_then(|()| fs::rename(&tmp_path, self.path_of(key)));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        Ok(result?)
    }

    fn remove(&self, key: &[u8]) -> Result<(), KVStoreError> {
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl KVStore for FileDB {
    type WriteBatch = FileWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), KVStoreError> {
        let _guard = self.inner.write_lock.lock().unwrap();
        for (key, value) in &wb.operations {
            match value {
                Some(value) => self.put(key, value)?,
                None => self.remove(key)?,
            }
        }
        sync_dir(&self.inner.root)?;
        Ok(())
    }
}

impl KVGet for FileDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let path = self.path_of(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        decode_record(key, &bytes)
            .map(Some)
            .map_err(|reason| KVStoreError::Corrupted { path, reason })
    }
}

/// Write batch of [`FileDB`]. Operations on the same key collapse into the last one.
pub struct FileWriteBatch {
    operations: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl FileWriteBatch {
    fn upsert(&mut self, key: &[u8], value: Option<Vec<u8>>) {
        self.operations.retain(|(k, _)| k.as_slice() != key);
        self.operations.push((key.to_vec(), value));
    }
}

impl WriteBatch for FileWriteBatch {
    fn new() -> Self {
        FileWriteBatch {
            operations: Vec::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.upsert(key, Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.upsert(key, None);
    }
}

fn file_stem(key: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key))
}

fn encode_record(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, io::Error> {
    let too_long = |_| io::Error::new(io::ErrorKind::InvalidInput, "key or value longer than 4 GiB");
    let key_len = u32::try_from(key.len()).map_err(too_long)?;
    let payload_len = u32::try_from(payload.len()).map_err(too_long)?;

    let mut record =
        Vec::with_capacity(RECORD_MAGIC.len() + 2 * LEN_LEN + key.len() + payload.len() + DIGEST_LEN);
    record.extend_from_slice(&RECORD_MAGIC);
    record.extend_from_slice(&key_len.to_le_bytes());
    record.extend_from_slice(key);
    record.extend_from_slice(&payload_len.to_le_bytes());
    record.extend_from_slice(payload);
    let digest = Sha256::digest(&record);
    record.extend_from_slice(&digest);
    Ok(record)
}

/// Check the framing, digest and key of `record`, and return its payload.
fn decode_record(expected_key: &[u8], record: &[u8]) -> Result<Vec<u8>, &'static str> {
    if record.len() < RECORD_MAGIC.len() + 2 * LEN_LEN + DIGEST_LEN {
        return Err("record shorter than its header");
    }
    let (framed, digest) = record.split_at(record.len() - DIGEST_LEN);
    if framed[0..4] != RECORD_MAGIC {
        return Err("bad magic number");
    }
    if Sha256::digest(framed).as_slice() != digest {
        return Err("digest mismatch");
    }

    let rest = &framed[RECORD_MAGIC.len()..];
    let (key, rest) = split_length_prefixed(rest).ok_or("key length does not match the record")?;
    let (payload, rest) =
        split_length_prefixed(rest).ok_or("value length does not match the record")?;
    if !rest.is_empty() {
        return Err("trailing bytes after the value");
    }
    if key != expected_key {
        return Err("record belongs to a different key");
    }
    Ok(payload.to_vec())
}

fn split_length_prefixed(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    if bytes.len() < LEN_LEN {
        return None;
    }
    let mut len_bytes = [0u8; LEN_LEN];
    len_bytes.copy_from_slice(&bytes[..LEN_LEN]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let rest = &bytes[LEN_LEN..];
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

fn write_record(path: &Path, key: &[u8], payload: &[u8]) -> io::Result<()> {
    let record = encode_record(key, payload)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(&record)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_one(db: &mut FileDB, key: &[u8], value: &[u8]) {
        let mut wb = FileWriteBatch::new();
        wb.set(key, value);
        db.write(wb).unwrap();
    }

    #[test]
    fn values_survive_reopening() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        assert_eq!(db.root(), root.path());
        write_one(&mut db, b"\x00cell", b"first");
        write_one(&mut db, b"\x00cell", b"second");
        drop(db);

        let db = FileDB::open(root.path()).unwrap();
        assert_eq!(db.get(b"\x00cell").unwrap(), Some(b"second".to_vec()));
        assert_eq!(db.get(b"\x00other").unwrap(), None);
    }

    #[test]
    fn long_keys_get_short_file_names() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        let key = vec![b'x'; 4096];
        write_one(&mut db, &key, b"value");

        assert_eq!(db.get(&key).unwrap(), Some(b"value".to_vec()));
        let name_len = db.path_of(&key).file_name().unwrap().len();
        assert!(name_len < 64);
        assert!(db.tmp_path_of(&key).file_name().unwrap().len() < 128);
    }

    #[test]
    fn record_of_another_key_is_reported_as_corrupted() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        write_one(&mut db, b"a", b"value of a");

        // Make the file of `b` hold the record of `a`, as a file name collision would.
        fs::copy(db.path_of(b"a"), db.path_of(b"b")).unwrap();
        assert!(matches!(db.get(b"b"), Err(KVStoreError::Corrupted { .. })));
        assert_eq!(db.get(b"a").unwrap(), Some(b"value of a".to_vec()));
    }

    #[test]
    fn delete_removes_the_value() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        write_one(&mut db, b"k", b"v");

        let mut wb = FileWriteBatch::new();
        wb.delete(b"k");
        wb.delete(b"never-written");
        db.write(wb).unwrap();

        assert_eq!(db.get(b"k").unwrap(), None);
    }

    #[test]
    fn torn_record_is_reported_as_corrupted() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        write_one(&mut db, b"k", b"some value");

        let path = db.path_of(b"k");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(db.get(b"k"), Err(KVStoreError::Corrupted { .. })));

        let mut flipped = bytes.clone();
        flipped[RECORD_MAGIC.len() + LEN_LEN] ^= 0xff;
        fs::write(&path, &flipped).unwrap();
        assert!(matches!(db.get(b"k"), Err(KVStoreError::Corrupted { .. })));
    }

    #[test]
    fn stale_temporary_files_are_removed_on_open() {
        let root = TempDir::new().unwrap();
        let mut db = FileDB::open(root.path()).unwrap();
        write_one(&mut db, b"k", b"committed");

        // A crash between writing the temporary file and renaming it leaves the old value in place.
        let stale = db.tmp_path_of(b"k");
        fs::write(&stale, b"half-written").unwrap();
        drop(db);

        let db = FileDB::open(root.path()).unwrap();
        assert!(!stale.exists());
        assert_eq!(db.get(b"k").unwrap(), Some(b"committed".to_vec()));
    }

    #[test]
    fn empty_values_are_stored() {
        let record = encode_record(b"k", &[]).unwrap();
        assert_eq!(decode_record(b"k", &record).unwrap(), Vec::<u8>::new());
    }
}
