/// Handle lifetimes seen from a recording backend
///
/// The backend logs every open and close so the tests can check which
/// handles the cache keeps, which it releases, and in what order.

use casedb_core::model::{FsType, LayoutRange, NewFile, VsPartFlags, VsType};
use casedb_core::native::{RawHandle, VsInfo};
use casedb_core::{CaseDatabase, CaseDbConfig, HandleCache, NativeBackend, NewFileSystem, NewImage, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingBackend {
    next_handle: AtomicU64,
    log: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }

    fn open(&self, kind: &str) -> RawHandle {
        self.record(&format!("open {}", kind));
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

fn fill(buf: &mut [u8], value: u8) -> Result<usize> {
    buf.iter_mut().for_each(|b| *b = value);
    Ok(buf.len())
}

impl NativeBackend for RecordingBackend {
    fn open_image(&self, _paths: &[PathBuf], _sector_size: u32) -> Result<RawHandle> {
        Ok(self.open("image"))
    }
    fn read_image(&self, _image: RawHandle, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        fill(buf, 0x11)
    }
    fn image_size(&self, _image: RawHandle) -> Result<u64> {
        Ok(1 << 20)
    }
    fn close_image(&self, _image: RawHandle) {
        self.record("close image");
    }

    fn open_vs(&self, _image: RawHandle, _offset: u64) -> Result<RawHandle> {
        Ok(self.open("vs"))
    }
    fn vs_info(&self, _vs: RawHandle) -> Result<VsInfo> {
        Ok(VsInfo {
            vs_type: VsType::Dos,
            offset: 0,
            block_size: 512,
            partitions: Vec::new(),
        })
    }
    fn read_vs(&self, _vs: RawHandle, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        fill(buf, 0x22)
    }
    fn close_vs(&self, _vs: RawHandle) {
        self.record("close vs");
    }

    fn open_volume(&self, _vs: RawHandle, _addr: i64) -> Result<RawHandle> {
        Ok(self.open("volume"))
    }
    fn read_volume(&self, _volume: RawHandle, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        fill(buf, 0x33)
    }
    fn close_volume(&self, _volume: RawHandle) {
        self.record("close volume");
    }

    fn open_fs(&self, _image: RawHandle, _offset: u64) -> Result<RawHandle> {
        Ok(self.open("fs"))
    }
    fn read_fs(&self, _fs: RawHandle, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        fill(buf, 0x44)
    }
    fn close_fs(&self, _fs: RawHandle) {
        self.record("close fs");
    }

    fn open_file(&self, _fs: RawHandle, _meta_addr: i64, _layout: &[LayoutRange], _size: u64) -> Result<RawHandle> {
        Ok(self.open("file"))
    }
    fn read_file(&self, _file: RawHandle, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        fill(buf, 0x55)
    }
    fn close_file(&self, _file: RawHandle) {
        self.record("close file");
    }

    fn version(&self) -> String {
        "recording 1.0".to_string()
    }
}

struct RecordedCase {
    _temp_dir: TempDir,
    backend: Arc<RecordingBackend>,
    case: CaseDatabase,
    image_id: i64,
}

fn create_recorded_case() -> RecordedCase {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(RecordingBackend::default());
    let case = CaseDatabase::new_case_with_backend(
        temp_dir.path().join("case.db"),
        CaseDbConfig::default(),
        backend.clone(),
    )
    .unwrap();
    let image_id = case
        .add_image(NewImage::new(vec![PathBuf::from("/evidence/disk.dd")]))
        .unwrap()
        .id;
    RecordedCase {
        _temp_dir: temp_dir,
        backend,
        case,
        image_id,
    }
}

fn add_fs_file(rc: &RecordedCase) -> i64 {
    let fs = rc
        .case
        .add_file_system(
            rc.image_id,
            NewFileSystem {
                img_offset: 32256,
                fs_type: FsType::Ext4,
                block_size: 4096,
                block_count: 100,
                root_inum: 2,
                first_inum: 1,
                last_inum: 1000,
                display_name: None,
            },
        )
        .unwrap();
    let mut file = NewFile::regular("notes.txt", 16);
    file.meta_addr = 12;
    rc.case.add_file(fs.id, file).unwrap().id
}

#[test]
fn test_file_reads_share_image_and_fs_handles() {
    let rc = create_recorded_case();
    let file_id = add_fs_file(&rc);

    let mut buf = [0u8; 4];
    assert_eq!(rc.case.read_file(file_id, 0, &mut buf).unwrap(), 4);
    assert_eq!(buf, [0x55; 4]);
    assert_eq!(rc.case.read_file(file_id, 4, &mut buf).unwrap(), 4);

    assert_eq!(rc.backend.count("open image"), 1);
    assert_eq!(rc.backend.count("open fs"), 1);
    // File handles are not cached
    assert_eq!(rc.backend.count("open file"), 2);
    assert_eq!(rc.backend.count("close file"), 2);
    assert_eq!(rc.backend.count("close fs"), 0);
    assert_eq!(rc.backend.count("close image"), 0);

    // Past the end reads nothing and opens nothing
    assert_eq!(rc.case.read_file(file_id, 16, &mut buf).unwrap(), 0);
    assert_eq!(rc.backend.count("open file"), 2);
}

#[test]
fn test_close_releases_fs_before_image() {
    let rc = create_recorded_case();
    let file_id = add_fs_file(&rc);
    let mut buf = [0u8; 4];
    rc.case.read_file(file_id, 0, &mut buf).unwrap();
    rc.backend.clear();

    rc.case.close().unwrap();
    assert_eq!(rc.backend.entries(), vec!["close fs", "close image"]);
    assert_eq!(rc.case.handle_cache().cached_image_count(), 0);

    // The case still works and reopens what it needs
    rc.case.read_file(file_id, 0, &mut buf).unwrap();
    assert_eq!(rc.backend.count("open image"), 1);
}

#[test]
fn test_dropping_case_closes_handles() {
    let rc = create_recorded_case();
    let mut buf = [0u8; 8];
    rc.case.read_image(rc.image_id, 0, &mut buf).unwrap();
    assert_eq!(buf, [0x11; 8]);

    let backend = Arc::clone(&rc.backend);
    backend.clear();
    drop(rc);
    assert_eq!(backend.entries(), vec!["close image"]);
}

#[test]
fn test_volume_closes_before_volume_system() {
    let rc = create_recorded_case();
    let vs = rc.case.add_volume_system(rc.image_id, VsType::Dos, 0, 512).unwrap();
    let volume = rc
        .case
        .add_volume(vs.id, 0, 63, 1000, "Linux (0x83)", VsPartFlags::ALLOC)
        .unwrap();

    let mut buf = [0u8; 2];
    assert_eq!(rc.case.read_volume(volume.id, 0, &mut buf).unwrap(), 2);
    assert_eq!(buf, [0x33; 2]);

    let entries = rc.backend.entries();
    let tail: Vec<&str> = entries.iter().rev().take(2).rev().map(|e| e.as_str()).collect();
    assert_eq!(tail, vec!["close volume", "close vs"]);
    assert_eq!(rc.backend.count("close image"), 0);
}

#[test]
fn test_cache_capacity_and_held_handles() {
    let backend = Arc::new(RecordingBackend::default());
    let cache = HandleCache::new(backend.clone(), 1);
    let a = vec![PathBuf::from("/evidence/a.dd")];
    let b = vec![PathBuf::from("/evidence/b.dd")];

    let held_a = cache.open_image(&a, 512).unwrap();
    cache.open_image(&b, 512).unwrap();
    assert_eq!(cache.cached_image_count(), 1);
    // The evicted image stays open while it is held
    assert_eq!(backend.count("close image"), 0);

    drop(held_a);
    assert_eq!(backend.count("close image"), 1);

    // Reopening an evicted image opens a new handle
    cache.open_image(&a, 512).unwrap();
    assert_eq!(backend.count("open image"), 3);
    assert_eq!(backend.count("close image"), 2);

    assert!(cache.evict_image(&a).unwrap());
    assert!(!cache.evict_image(&a).unwrap());
    assert_eq!(backend.count("close image"), 3);
}
