//! Integration tests for the filesystem adapter against in-memory
//! collaborators.
//!
//! The mock registry and content store record call counts and upload
//! concurrency so the tests can observe caching behavior and commit
//! serialization from the outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hex_literal::hex;
use parking_lot::Mutex;
use tempfile::TempDir;

use moonfs_core::crypto::{CipherEnvelope, ObjectKey, SeekableCipher, IV_LEN};
use moonfs_core::fs::{ContentId, FilesystemAdapter, Stat};
use moonfs_core::remote::{
    ContentStore, MetadataRegistry, RemoteAttr, RemoteError, TransportError,
};
use moonfs_core::{FsError, MountConfig};

#[derive(Default)]
struct MockState {
    files: Mutex<HashMap<String, (Stat, Option<ContentId>)>>,
    dirs: Mutex<HashMap<String, Vec<String>>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,

    lookup_calls: AtomicUsize,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    store_calls: AtomicUsize,

    next_cid: AtomicUsize,
    store_delay: Mutex<Duration>,
    fail_store: AtomicBool,
    stores_active: AtomicUsize,
    stores_max_active: AtomicUsize,
}

#[derive(Clone)]
struct MockRegistry(Arc<MockState>);

#[derive(Clone)]
struct MockStore(Arc<MockState>);

impl MetadataRegistry for MockRegistry {
    fn lookup_attributes(&self, path: &str) -> Result<RemoteAttr, RemoteError> {
        self.0.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .files
            .lock()
            .get(path)
            .map(|(stat, cid)| RemoteAttr {
                stat: stat.clone(),
                content_id: cid.clone(),
            })
            .ok_or(RemoteError::NotFound)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        self.0.list_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .dirs
            .lock()
            .get(path)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        Ok(self.0.files.lock().contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.0
            .files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or(RemoteError::NotFound)
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), RemoteError> {
        let mut files = self.0.files.lock();
        let entry = files.remove(old).ok_or(RemoteError::NotFound)?;
        files.insert(new.to_string(), entry);
        Ok(())
    }
}

impl ContentStore for MockStore {
    fn fetch_range(
        &self,
        content_id: &ContentId,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, RemoteError> {
        self.0.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.0.objects.lock();
        let object = objects
            .get(content_id.as_str())
            .ok_or(RemoteError::NotFound)?;
        let start = usize::try_from(offset).unwrap();
        let end = start + len;
        if end > object.len() {
            return Err(RemoteError::Transport(TransportError::Malformed {
                endpoint: "download".into(),
                reason: format!("range {start}..{end} beyond object of {}", object.len()),
            }));
        }
        Ok(object[start..end].to_vec())
    }

    fn store(&self, path: &str, payload: &[u8]) -> Result<ContentId, RemoteError> {
        if self.0.fail_store.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport(TransportError::Timeout));
        }

        let active = self.0.stores_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.stores_max_active.fetch_max(active, Ordering::SeqCst);
        thread::sleep(*self.0.store_delay.lock());

        self.0.store_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.0.next_cid.fetch_add(1, Ordering::SeqCst);
        let cid = format!("QmUpload{n}");
        self.0.objects.lock().insert(cid.clone(), payload.to_vec());
        self.0.uploads.lock().push(path.to_string());
        // The real upload route also binds the new cid to the path in the
        // registry; the payload here is the envelope, so strip the IV when
        // recording the plaintext size.
        let size = payload.len().saturating_sub(IV_LEN) as u64;
        self.0.files.lock().insert(
            path.to_string(),
            (Stat::file(size), Some(ContentId::from_raw(cid.clone()))),
        );

        self.0.stores_active.fetch_sub(1, Ordering::SeqCst);
        Ok(ContentId::from_raw(cid))
    }
}

fn test_cipher() -> SeekableCipher {
    let key = ObjectKey::from_bytes(&hex!(
        "202122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f"
    ))
    .unwrap();
    SeekableCipher::new(key)
}

struct Harness {
    _cache_dir: TempDir,
    state: Arc<MockState>,
    adapter: FilesystemAdapter<MockRegistry, MockStore>,
    cipher: SeekableCipher,
}

fn harness_with_ttl(ttl: Duration) -> Harness {
    let cache_dir = TempDir::new().unwrap();
    let state = Arc::new(MockState::default());
    let config = MountConfig::default()
        .attr_ttl(ttl)
        .dir_ttl(ttl)
        .chunk_cache_dir(cache_dir.path().join("chunks"));
    let cipher = test_cipher();
    let adapter = FilesystemAdapter::new(
        MockRegistry(state.clone()),
        MockStore(state.clone()),
        cipher.clone(),
        &config,
    )
    .unwrap();
    Harness {
        _cache_dir: cache_dir,
        state,
        adapter,
        cipher,
    }
}

fn harness() -> Harness {
    harness_with_ttl(Duration::from_secs(60))
}

impl Harness {
    /// Install a file on the mock remote, encrypted under the adapter's key.
    fn seed_file(&self, path: &str, plaintext: &[u8]) -> ContentId {
        let envelope = self.cipher.encrypt_stream(plaintext);
        let n = self.state.next_cid.fetch_add(1, Ordering::SeqCst);
        let cid = format!("QmSeed{n}");
        self.state
            .objects
            .lock()
            .insert(cid.clone(), envelope.into_bytes());
        self.state.files.lock().insert(
            path.to_string(),
            (
                Stat::file(plaintext.len() as u64),
                Some(ContentId::from_raw(cid.clone())),
            ),
        );
        ContentId::from_raw(cid)
    }

    /// Decrypt a stored object back to plaintext for verification.
    fn decrypt_object(&self, cid: &ContentId) -> Vec<u8> {
        let bytes = self.state.objects.lock()[cid.as_str()].clone();
        let envelope = CipherEnvelope::from_bytes(&bytes).unwrap();
        if envelope.ciphertext.is_empty() {
            return Vec::new();
        }
        self.cipher
            .decrypt_range(&envelope.iv, 0, &envelope.ciphertext)
            .unwrap()
    }

    fn last_upload_cid(&self) -> ContentId {
        let n = self.state.next_cid.load(Ordering::SeqCst) - 1;
        ContentId::from_raw(format!("QmUpload{n}"))
    }
}

#[test]
fn getattr_root_is_a_synthetic_directory() {
    let h = harness();
    let stat = h.adapter.getattr("/").unwrap();
    assert!(stat.is_dir());
    assert_eq!(h.state.lookup_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn getattr_caches_within_ttl() {
    let h = harness();
    h.seed_file("/docs/a.txt", b"abc");
    h.adapter.getattr("/docs/a.txt").unwrap();
    h.adapter.getattr("/docs/a.txt").unwrap();
    assert_eq!(h.state.lookup_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn getattr_refetches_after_ttl_elapses() {
    let h = harness_with_ttl(Duration::from_millis(15));
    h.seed_file("/docs/a.txt", b"abc");
    h.adapter.getattr("/docs/a.txt").unwrap();
    thread::sleep(Duration::from_millis(30));
    h.adapter.getattr("/docs/a.txt").unwrap();
    assert_eq!(h.state.lookup_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn getattr_missing_maps_to_not_found_and_caches_nothing() {
    let h = harness();
    assert!(matches!(
        h.adapter.getattr("/docs/ghost.txt"),
        Err(FsError::NotFound { .. })
    ));
    assert!(h.adapter.cached_record("/docs/ghost.txt").is_none());
    // A second call consults the registry again.
    let _ = h.adapter.getattr("/docs/ghost.txt");
    assert_eq!(h.state.lookup_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn readdir_is_prefixed_and_cached() {
    let h = harness();
    h.state
        .dirs
        .lock()
        .insert("/docs".into(), vec!["a.txt".into(), "b.txt".into()]);

    let listing = h.adapter.readdir("/docs").unwrap();
    assert_eq!(listing.entries(), [".", "..", "a.txt", "b.txt"]);

    h.adapter.readdir("/docs").unwrap();
    assert_eq!(h.state.list_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn opendir_on_a_file_is_not_a_directory() {
    let h = harness();
    h.seed_file("/docs/a.txt", b"abc");
    assert!(matches!(
        h.adapter.opendir("/docs/a.txt"),
        Err(FsError::NotADirectory { .. })
    ));
}

#[test]
fn open_missing_file_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.adapter.open("/docs/ghost.txt"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn read_without_open_is_invalid_state() {
    let h = harness();
    h.seed_file("/docs/a.txt", b"abc");
    assert!(matches!(
        h.adapter.read("/docs/a.txt", 0, 3),
        Err(FsError::InvalidState { .. })
    ));
}

#[test]
fn read_round_trips_through_fetch_and_decrypt() {
    let h = harness();
    let plaintext: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    h.seed_file("/docs/big.bin", &plaintext);

    h.adapter.open("/docs/big.bin").unwrap();

    // Aligned and unaligned ranges.
    for (offset, len) in [(0u64, 16usize), (16, 64), (5, 7), (1023, 100), (1999, 1)] {
        let bytes = h.adapter.read("/docs/big.bin", offset, len).unwrap();
        let offset = offset as usize;
        assert_eq!(bytes, &plaintext[offset..offset + len], "offset {offset}");
    }
}

#[test]
fn read_clamps_to_file_size() {
    let h = harness();
    h.seed_file("/docs/a.txt", b"hello");
    h.adapter.open("/docs/a.txt").unwrap();

    assert_eq!(h.adapter.read("/docs/a.txt", 3, 100).unwrap(), b"lo");
    assert_eq!(h.adapter.read("/docs/a.txt", 5, 10).unwrap(), b"");
    assert_eq!(h.adapter.read("/docs/a.txt", 99, 10).unwrap(), b"");
}

#[test]
fn repeated_reads_hit_the_chunk_cache() {
    let h = harness();
    h.seed_file("/docs/a.txt", b"some cached content here");
    h.adapter.open("/docs/a.txt").unwrap();

    let first = h.adapter.read("/docs/a.txt", 5, 10).unwrap();
    let after_first = h.state.fetch_calls.load(Ordering::SeqCst);
    let second = h.adapter.read("/docs/a.txt", 5, 10).unwrap();

    assert_eq!(first, second);
    // IV fetch + range fetch for the first read, nothing for the second.
    assert_eq!(after_first, 2);
    assert_eq!(h.state.fetch_calls.load(Ordering::SeqCst), after_first);
}

#[test]
fn create_write_gap_release_scenario() {
    let h = harness();
    h.adapter.create("/docs/doc.txt").unwrap();
    h.adapter.write("/docs/doc.txt", 0, b"hello").unwrap();
    h.adapter.write("/docs/doc.txt", 10, b"world").unwrap();

    // Size visible before commit.
    assert_eq!(h.adapter.getattr("/docs/doc.txt").unwrap().size, 15);

    h.adapter.release("/docs/doc.txt").unwrap();

    let cid = h.adapter.cached_record("/docs/doc.txt").unwrap().content_id;
    assert!(cid.is_some(), "record carries committed content id");
    assert_eq!(
        h.decrypt_object(&cid.unwrap()),
        b"hello\x00\x00\x00\x00\x00world"
    );

    // Session is back to absent: another release uploads nothing.
    h.adapter.release("/docs/doc.txt").unwrap();
    assert_eq!(h.state.store_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn commit_matches_replayed_writes() {
    let h = harness();
    let writes: &[(u64, &[u8])] = &[
        (0, b"aaaaaaaaaa"),
        (25, b"gap"),
        (4, b"overlap"),
        (15, b"x"),
        (2, b"yy"),
    ];

    h.adapter.create("/docs/r.bin").unwrap();
    let mut reference: Vec<u8> = Vec::new();
    for &(offset, data) in writes {
        h.adapter.write("/docs/r.bin", offset, data).unwrap();
        let end = offset as usize + data.len();
        if end > reference.len() {
            reference.resize(end, 0);
        }
        reference[offset as usize..end].copy_from_slice(data);
    }
    h.adapter.release("/docs/r.bin").unwrap();

    assert_eq!(h.decrypt_object(&h.last_upload_cid()), reference);
}

#[test]
fn buffered_bytes_are_readable_before_commit() {
    let h = harness();
    h.adapter.create("/docs/w.txt").unwrap();
    h.adapter.write("/docs/w.txt", 0, b"uncommitted").unwrap();
    assert_eq!(h.adapter.read("/docs/w.txt", 2, 4).unwrap(), b"comm");
    assert_eq!(h.state.fetch_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn truncate_resizes_pending_buffer() {
    let h = harness();
    h.adapter.create("/docs/t.txt").unwrap();
    h.adapter.write("/docs/t.txt", 0, b"hello").unwrap();
    h.adapter.truncate("/docs/t.txt", 8).unwrap();
    assert_eq!(h.adapter.getattr("/docs/t.txt").unwrap().size, 8);

    h.adapter.release("/docs/t.txt").unwrap();
    assert_eq!(h.decrypt_object(&h.last_upload_cid()), b"hello\x00\x00\x00");
}

#[test]
fn failed_commit_preserves_buffer_for_retry() {
    let h = harness();
    h.adapter.create("/docs/f.txt").unwrap();
    h.adapter.write("/docs/f.txt", 0, b"precious").unwrap();

    h.state.fail_store.store(true, Ordering::SeqCst);
    assert!(matches!(
        h.adapter.release("/docs/f.txt"),
        Err(FsError::UploadFailure { .. })
    ));

    // Retry succeeds with the same bytes.
    h.state.fail_store.store(false, Ordering::SeqCst);
    h.adapter.release("/docs/f.txt").unwrap();
    assert_eq!(h.decrypt_object(&h.last_upload_cid()), b"precious");
}

#[test]
fn concurrent_releases_never_overlap_uploads() {
    let h = harness();
    *h.state.store_delay.lock() = Duration::from_millis(40);

    h.adapter.create("/docs/c.txt").unwrap();
    let adapter = Arc::new(h.adapter);
    let mut handles = Vec::new();
    for i in 0..2u8 {
        let adapter = Arc::clone(&adapter);
        handles.push(thread::spawn(move || {
            adapter.write("/docs/c.txt", 0, &[i; 32]).unwrap();
            adapter.release("/docs/c.txt").unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(h.state.store_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(h.state.stores_max_active.load(Ordering::SeqCst), 1);
}

#[test]
fn unlink_removes_remote_and_local_state() {
    let h = harness();
    h.seed_file("/docs/gone.txt", b"bye");
    h.adapter.getattr("/docs/gone.txt").unwrap();

    h.adapter.unlink("/docs/gone.txt").unwrap();

    assert!(!h.state.files.lock().contains_key("/docs/gone.txt"));
    assert!(h.adapter.cached_record("/docs/gone.txt").is_none());
    assert!(matches!(
        h.adapter.getattr("/docs/gone.txt"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn unlink_missing_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.adapter.unlink("/docs/ghost.txt"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn rename_commits_pending_write_under_old_name() {
    let h = harness();
    h.adapter.create("/docs/a.txt").unwrap();
    h.adapter.write("/docs/a.txt", 0, b"draft").unwrap();

    h.adapter.rename("/docs/a.txt", "/docs/b.txt").unwrap();

    // The upload went out under the old name, before the rename.
    assert_eq!(h.state.uploads.lock().as_slice(), ["/docs/a.txt"]);
    assert_eq!(h.decrypt_object(&h.last_upload_cid()), b"draft");

    // The committed binding then moved to the new name on the remote.
    assert!(!h.state.files.lock().contains_key("/docs/a.txt"));
    assert!(h.state.files.lock().contains_key("/docs/b.txt"));

    // Both names drop out of the file table.
    assert!(h.adapter.cached_record("/docs/a.txt").is_none());
    assert!(h.adapter.cached_record("/docs/b.txt").is_none());
}

#[test]
fn rename_missing_source_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.adapter.rename("/docs/ghost.txt", "/docs/new.txt"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn rename_moves_the_remote_entry() {
    let h = harness();
    let plaintext = b"movable".to_vec();
    h.seed_file("/docs/old.txt", &plaintext);

    h.adapter.rename("/docs/old.txt", "/docs/new.txt").unwrap();

    assert!(!h.state.files.lock().contains_key("/docs/old.txt"));
    assert!(h.state.files.lock().contains_key("/docs/new.txt"));

    h.adapter.open("/docs/new.txt").unwrap();
    assert_eq!(
        h.adapter.read("/docs/new.txt", 0, plaintext.len()).unwrap(),
        plaintext
    );
}
