//! Reference-counted native handles and the per-case handle cache
//!
//! Image handles are cached by the concatenation of their segment paths.
//! File system handles are cached by (image key, byte offset). Volume system,
//! volume and file handles are not cached and belong to whoever opened them.
//!
//! Every handle closes its native resource in `Drop`. Child handles hold an
//! `Arc` to their parent, so a parent outlives every child opened from it.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{NativeBackend, RawHandle, VsInfo};
use crate::error::{CaseDbError, Result};
use crate::model::LayoutRange;

/// An open image
pub struct ImageHandle {
    raw: RawHandle,
    key: String,
    sector_size: u32,
    backend: Arc<dyn NativeBackend>,
}

impl ImageHandle {
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Cache key: the concatenated segment paths
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.backend.read_image(self.raw, offset, buf)
    }

    pub fn size(&self) -> Result<u64> {
        self.backend.image_size(self.raw)
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        tracing::debug!("Closing image handle {} ({})", self.raw, self.key);
        self.backend.close_image(self.raw);
    }
}

/// An open volume system
pub struct VsHandle {
    raw: RawHandle,
    image: Arc<ImageHandle>,
}

impl VsHandle {
    pub fn image(&self) -> &Arc<ImageHandle> {
        &self.image
    }

    pub fn info(&self) -> Result<VsInfo> {
        self.image.backend.vs_info(self.raw)
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.image.backend.read_vs(self.raw, offset, buf)
    }
}

impl Drop for VsHandle {
    fn drop(&mut self) {
        self.image.backend.close_vs(self.raw);
    }
}

/// An open volume
pub struct VolumeHandle {
    raw: RawHandle,
    vs: Arc<VsHandle>,
}

impl VolumeHandle {
    pub fn volume_system(&self) -> &Arc<VsHandle> {
        &self.vs
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.vs.image.backend.read_volume(self.raw, offset, buf)
    }
}

impl Drop for VolumeHandle {
    fn drop(&mut self) {
        self.vs.image.backend.close_volume(self.raw);
    }
}

/// An open file system
pub struct FsHandle {
    raw: RawHandle,
    offset: u64,
    image: Arc<ImageHandle>,
}

impl FsHandle {
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn image(&self) -> &Arc<ImageHandle> {
        &self.image
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.image.backend.read_fs(self.raw, offset, buf)
    }
}

impl Drop for FsHandle {
    fn drop(&mut self) {
        tracing::debug!("Closing file system handle {} at offset {}", self.raw, self.offset);
        self.image.backend.close_fs(self.raw);
    }
}

/// An open file
pub struct FileHandle {
    raw: RawHandle,
    fs: Arc<FsHandle>,
}

impl FileHandle {
    pub fn file_system(&self) -> &Arc<FsHandle> {
        &self.fs
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.fs.image.backend.read_file(self.raw, offset, buf)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.fs.image.backend.close_file(self.raw);
    }
}

#[derive(Default)]
struct CacheState {
    images: HashMap<String, Arc<ImageHandle>>,
    /// Image keys, least recently opened first
    order: VecDeque<String>,
    file_systems: HashMap<(String, u64), Arc<FsHandle>>,
}

/// Cache of image and file system handles for one case
pub struct HandleCache {
    backend: Arc<dyn NativeBackend>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl HandleCache {
    pub fn new(backend: Arc<dyn NativeBackend>, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.backend
    }

    fn state(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| CaseDbError::core("handle cache lock poisoned"))
    }

    /// Key used for an image made of `paths`
    pub fn image_key(paths: &[PathBuf]) -> String {
        paths.iter().map(|p| p.display().to_string()).collect()
    }

    pub fn is_image_cached(&self, paths: &[PathBuf]) -> bool {
        let key = Self::image_key(paths);
        self.state().map(|s| s.images.contains_key(&key)).unwrap_or(false)
    }

    /// Get the cached handle for `paths` or open it
    pub fn open_image(&self, paths: &[PathBuf], sector_size: u32) -> Result<Arc<ImageHandle>> {
        let key = Self::image_key(paths);
        let mut state = self.state()?;

        if let Some(handle) = state.images.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let raw = self.backend.open_image(paths, sector_size)?;
        let handle = Arc::new(ImageHandle {
            raw,
            key: key.clone(),
            sector_size,
            backend: Arc::clone(&self.backend),
        });
        tracing::debug!("Opened image handle {} for {}", raw, key);

        state.images.insert(key.clone(), Arc::clone(&handle));
        state.order.push_back(key);

        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                tracing::debug!("Evicting cached image handle for {}", oldest);
                Self::drop_image_entries(&mut state, &oldest);
            }
        }

        Ok(handle)
    }

    /// Get the cached file system handle at `offset` in `image` or open it
    pub fn open_fs(&self, image: &Arc<ImageHandle>, offset: u64) -> Result<Arc<FsHandle>> {
        let key = (image.key.clone(), offset);
        let mut state = self.state()?;

        if let Some(handle) = state.file_systems.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let raw = self.backend.open_fs(image.raw, offset)?;
        let handle = Arc::new(FsHandle {
            raw,
            offset,
            image: Arc::clone(image),
        });
        state.file_systems.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn open_vs(&self, image: &Arc<ImageHandle>, offset: u64) -> Result<Arc<VsHandle>> {
        let raw = self.backend.open_vs(image.raw, offset)?;
        Ok(Arc::new(VsHandle {
            raw,
            image: Arc::clone(image),
        }))
    }

    pub fn open_volume(&self, vs: &Arc<VsHandle>, addr: i64) -> Result<Arc<VolumeHandle>> {
        let raw = self.backend.open_volume(vs.raw, addr)?;
        Ok(Arc::new(VolumeHandle {
            raw,
            vs: Arc::clone(vs),
        }))
    }

    pub fn open_file(
        &self,
        fs: &Arc<FsHandle>,
        meta_addr: i64,
        layout: &[LayoutRange],
        size: u64,
    ) -> Result<FileHandle> {
        let raw = self.backend.open_file(fs.raw, meta_addr, layout, size)?;
        Ok(FileHandle {
            raw,
            fs: Arc::clone(fs),
        })
    }

    /// Drop the cache's references to an image and its file systems.
    ///
    /// Handles still held elsewhere stay open until their owners drop them.
    pub fn evict_image(&self, paths: &[PathBuf]) -> Result<bool> {
        let key = Self::image_key(paths);
        let mut state = self.state()?;
        state.order.retain(|k| k != &key);
        Ok(Self::drop_image_entries(&mut state, &key))
    }

    fn drop_image_entries(state: &mut CacheState, key: &str) -> bool {
        state.file_systems.retain(|(image_key, _), _| image_key != key);
        state.images.remove(key).is_some()
    }

    /// Drop every cached reference
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state()?;
        let count = state.images.len();
        state.file_systems.clear();
        state.images.clear();
        state.order.clear();
        tracing::debug!("Cleared {} cached image handle(s)", count);
        Ok(())
    }

    pub fn cached_image_count(&self) -> usize {
        self.state().map(|s| s.images.len()).unwrap_or(0)
    }

    pub fn cached_fs_count(&self) -> usize {
        self.state().map(|s| s.file_systems.len()).unwrap_or(0)
    }
}

impl Drop for HandleCache {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            // File systems before images
            state.file_systems.clear();
            state.images.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::RawImageBackend;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_image(dir: &TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![0x41u8; len]).unwrap();
        path
    }

    fn create_test_cache(capacity: usize) -> HandleCache {
        HandleCache::new(Arc::new(RawImageBackend::new()), capacity)
    }

    #[test]
    fn test_image_handle_reused() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_image(&temp_dir, "a.dd", 1024);
        let cache = create_test_cache(4);

        let first = cache.open_image(&[path.clone()], 512).unwrap();
        let second = cache.open_image(&[path], 512).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_image_count(), 1);
    }

    #[test]
    fn test_fs_handle_keyed_by_offset() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_image(&temp_dir, "a.dd", 4096);
        let cache = create_test_cache(4);

        let image = cache.open_image(&[path], 512).unwrap();
        let fs0 = cache.open_fs(&image, 0).unwrap();
        let fs0_again = cache.open_fs(&image, 0).unwrap();
        let fs1 = cache.open_fs(&image, 2048).unwrap();

        assert!(Arc::ptr_eq(&fs0, &fs0_again));
        assert!(!Arc::ptr_eq(&fs0, &fs1));
        assert_eq!(cache.cached_fs_count(), 2);
        assert!(Arc::ptr_eq(fs1.image(), &image));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let temp_dir = TempDir::new().unwrap();
        let a = create_test_image(&temp_dir, "a.dd", 512);
        let b = create_test_image(&temp_dir, "b.dd", 512);
        let c = create_test_image(&temp_dir, "c.dd", 512);
        let cache = create_test_cache(2);

        let held_a = cache.open_image(&[a.clone()], 512).unwrap();
        cache.open_image(&[b], 512).unwrap();
        cache.open_image(&[c], 512).unwrap();
        assert_eq!(cache.cached_image_count(), 2);

        // The evicted handle is still usable by its holder
        let mut buf = [0u8; 2];
        assert_eq!(held_a.read(0, &mut buf).unwrap(), 2);

        let reopened = cache.open_image(&[a], 512).unwrap();
        assert!(!Arc::ptr_eq(&held_a, &reopened));
    }

    #[test]
    fn test_image_key_concatenates_paths() {
        let key = HandleCache::image_key(&[PathBuf::from("/x/img.001"), PathBuf::from("/x/img.002")]);
        assert_eq!(key, "/x/img.001/x/img.002");
    }
}
