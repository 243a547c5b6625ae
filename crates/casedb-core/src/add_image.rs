//! Transactional add-image process
//!
//! `run` opens the image and inserts its rows inside one transaction that
//! stays open until the caller decides to `commit` or `revert`. The case lock
//! is held for that whole time. A run can be cancelled from another thread
//! through a [`StopHandle`].

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::case::content::{insert_image, insert_volume, insert_volume_system, update_image_info};
use crate::case::{CaseDatabase, CaseDbTransaction, NewImage};
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts;
use crate::native::ImageHandle;

const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Steps reported while an image is added
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddImageProgress {
    Opening { path: PathBuf },
    Volume { addr: i64, description: String },
    Hashing { bytes_done: u64, total: u64 },
    Done { image_id: i64 },
}

/// Cancels a running add-image process from any thread
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask the current run to stop. Errors when nothing is running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CaseDbError::data("no add image process is running"));
        }
        self.stop.store(true, Ordering::SeqCst);
        tracing::info!("Stop requested for add image process");
        Ok(())
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct PendingImage<'a> {
    trans: CaseDbTransaction<'a>,
    image_id: i64,
    paths: Vec<PathBuf>,
    /// The image handle was opened by this run rather than found in the cache
    opened_handle: bool,
}

type ProgressCallback<'a> = Box<dyn Fn(&AddImageProgress) + 'a>;

/// Adds one image to a case in a single transaction
pub struct AddImageProcess<'a> {
    case: &'a CaseDatabase,
    time_zone: String,
    no_fat_fs_orphans: bool,
    device_id: String,
    progress: Option<ProgressCallback<'a>>,
    stop: StopHandle,
    pending: Option<PendingImage<'a>>,
}

impl<'a> AddImageProcess<'a> {
    pub fn new(case: &'a CaseDatabase, time_zone: &str, no_fat_fs_orphans: bool, device_id: &str) -> Self {
        Self {
            case,
            time_zone: time_zone.to_string(),
            no_fat_fs_orphans,
            device_id: device_id.to_string(),
            progress: None,
            stop: StopHandle::default(),
            pending: None,
        }
    }

    /// Report progress to `callback`. The callback runs while the case lock
    /// is held and must not call back into the case.
    pub fn with_progress(mut self, callback: impl Fn(&AddImageProgress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn no_fat_fs_orphans(&self) -> bool {
        self.no_fat_fs_orphans
    }

    pub fn is_running(&self) -> bool {
        self.stop.running.load(Ordering::SeqCst)
    }

    /// Open the image at `paths` and insert its rows. On success the rows
    /// stay uncommitted until `commit` or `revert`.
    pub fn run(&mut self, paths: &[PathBuf]) -> Result<()> {
        if self.stop.running.swap(true, Ordering::SeqCst) {
            return Err(CaseDbError::data("add image process is already running"));
        }
        self.stop.stop.store(false, Ordering::SeqCst);
        let opened_handle = !self.case.handle_cache().is_image_cached(paths);

        match self.add(paths, opened_handle) {
            Ok(pending) => {
                self.pending = Some(pending);
                Ok(())
            }
            Err(e) => {
                self.stop.running.store(false, Ordering::SeqCst);
                if opened_handle {
                    if let Err(evict_err) = self.case.handle_cache().evict_image(paths) {
                        tracing::warn!("Failed to release image handle: {}", evict_err);
                    }
                }
                tracing::warn!("Add image failed: {}", e);
                Err(e)
            }
        }
    }

    /// Same as [`StopHandle::stop`]
    pub fn stop(&self) -> Result<()> {
        self.stop.stop()
    }

    /// Commit the rows of the last run and return the new image id
    pub fn commit(&mut self) -> Result<i64> {
        let pending = self.take_pending()?;
        pending.trans.commit()?;
        tracing::info!("Committed image {}", pending.image_id);
        Ok(pending.image_id)
    }

    /// Discard the rows of the last run
    pub fn revert(&mut self) -> Result<()> {
        let pending = self.take_pending()?;
        pending.trans.rollback()?;
        if pending.opened_handle {
            self.case.handle_cache().evict_image(&pending.paths)?;
        }
        tracing::info!("Reverted image {}", pending.image_id);
        Ok(())
    }

    fn take_pending(&mut self) -> Result<PendingImage<'a>> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| CaseDbError::data("no add image process is running"))?;
        self.stop.running.store(false, Ordering::SeqCst);
        Ok(pending)
    }

    fn report(&self, progress: AddImageProgress) {
        if let Some(callback) = &self.progress {
            callback(&progress);
        }
    }

    fn check_stop(&self) -> Result<()> {
        if self.stop.is_stop_requested() {
            return Err(CaseDbError::data("add image process was stopped"));
        }
        Ok(())
    }

    fn add(&self, paths: &[PathBuf], opened_handle: bool) -> Result<PendingImage<'a>> {
        let first = paths
            .first()
            .ok_or_else(|| CaseDbError::invalid("an image needs at least one path"))?;
        for path in paths {
            if !path.exists() {
                return Err(CaseDbError::not_found(format!("image file {}", path.display())));
            }
        }

        self.report(AddImageProgress::Opening { path: first.clone() });
        let config = self.case.config();
        let image = self.case.handle_cache().open_image(paths, config.sector_size)?;
        let size = image.size()?;
        self.check_stop()?;

        let mut trans = self.case.begin_transaction()?;
        let mut new_image = NewImage::new(paths.to_vec());
        new_image.sector_size = config.sector_size;
        new_image.time_zone = self.time_zone.clone();
        new_image.device_id = self.device_id.clone();
        new_image.size = size;

        let (host, created) = hosts::get_or_create_host(&trans, &format!("{} Host", new_image.name()))?;
        if created {
            trans.queue_event(CaseEvent::HostsAdded(vec![host.clone()]));
        }
        let added = insert_image(&trans, &new_image, host.id, chrono::Utc::now().timestamp())?;
        tracing::debug!(
            "Inserted image {} ({} bytes, FAT orphan search {})",
            added.id,
            size,
            if self.no_fat_fs_orphans { "off" } else { "on" }
        );
        self.check_stop()?;

        self.add_volume_system(&trans, &image, added.id)?;

        if config.compute_image_hashes {
            let (md5, sha1, sha256) = self.hash_image(&image, size)?;
            update_image_info(&trans, added.id, size, Some(&md5), Some(&sha1), Some(&sha256))?;
        }

        trans.queue_event(CaseEvent::DataSourceAdded(added.id));
        self.report(AddImageProgress::Done { image_id: added.id });
        Ok(PendingImage {
            trans,
            image_id: added.id,
            paths: paths.to_vec(),
            opened_handle,
        })
    }

    /// Insert the partition table at the start of the image, if it has one
    fn add_volume_system(&self, trans: &CaseDbTransaction<'_>, image: &Arc<ImageHandle>, image_id: i64) -> Result<()> {
        let vs = match self.case.handle_cache().open_vs(image, 0) {
            Ok(vs) => vs,
            Err(CaseDbError::Native(reason)) => {
                tracing::debug!("Image {} has no volume system: {}", image_id, reason);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let info = vs.info()?;
        let vs_row = insert_volume_system(trans, image_id, info.vs_type, info.offset, info.block_size)?;
        for part in &info.partitions {
            self.check_stop()?;
            insert_volume(trans, vs_row.id, part.addr, part.start, part.length, &part.description, part.flags)?;
            self.report(AddImageProgress::Volume {
                addr: part.addr,
                description: part.description.clone(),
            });
        }
        tracing::debug!("Added {} volumes for image {}", info.partitions.len(), image_id);
        Ok(())
    }

    fn hash_image(&self, image: &ImageHandle, size: u64) -> Result<(String, String, String)> {
        let mut md5 = md5::Context::new();
        let mut sha1 = sha1::Sha1::new();
        let mut sha256 = Sha256::new();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
        let mut offset = 0u64;

        while offset < size {
            self.check_stop()?;
            let n = image.read(offset, &mut buffer)?;
            if n == 0 {
                break;
            }
            md5.consume(&buffer[..n]);
            sha1.update(&buffer[..n]);
            sha256.update(&buffer[..n]);
            offset += n as u64;
            self.report(AddImageProgress::Hashing {
                bytes_done: offset,
                total: size,
            });
        }

        Ok((
            format!("{:x}", md5.compute()),
            format!("{:x}", sha1.finalize()),
            format!("{:x}", sha256.finalize()),
        ))
    }
}

impl CaseDatabase {
    pub fn make_add_image_process(&self, time_zone: &str, no_fat_fs_orphans: bool, device_id: &str) -> AddImageProcess<'_> {
        AddImageProcess::new(self, time_zone, no_fat_fs_orphans, device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseDbConfig;
    use byteorder::{ByteOrder, LittleEndian};
    use std::cell::RefCell;
    use tempfile::TempDir;

    const IMAGE_SECTORS: usize = 2048;

    fn hashing_case(temp_dir: &TempDir) -> CaseDatabase {
        let mut config = CaseDbConfig::default();
        config.compute_image_hashes = true;
        CaseDatabase::new_case(temp_dir.path().join("case.db"), config).unwrap()
    }

    /// 1 MiB image with one Linux partition at sector 63
    fn write_partitioned_image(temp_dir: &TempDir) -> PathBuf {
        let mut data = vec![0u8; IMAGE_SECTORS * 512];
        let entry = &mut data[446..462];
        entry[4] = 0x83;
        LittleEndian::write_u32(&mut entry[8..12], 63);
        LittleEndian::write_u32(&mut entry[12..16], 1000);
        data[510] = 0x55;
        data[511] = 0xAA;
        let path = temp_dir.path().join("disk.dd");
        std::fs::write(&path, &data).unwrap();
        path
    }

    #[test]
    fn test_run_and_commit() {
        let temp_dir = TempDir::new().unwrap();
        let case = hashing_case(&temp_dir);
        let path = write_partitioned_image(&temp_dir);

        let seen = RefCell::new(Vec::new());
        let image_id = {
            let mut process = case
                .make_add_image_process("America/New_York", false, "device-1")
                .with_progress(|p| seen.borrow_mut().push(p.clone()));
            process.run(&[path.clone()]).unwrap();
            assert!(process.is_running());
            process.commit().unwrap()
        };

        let image = case.get_image(image_id).unwrap();
        assert_eq!(image.size, (IMAGE_SECTORS * 512) as u64);
        assert_eq!(image.device_id, "device-1");
        assert_eq!(image.time_zone, "America/New_York");
        let data = std::fs::read(&path).unwrap();
        assert_eq!(image.md5, Some(format!("{:x}", md5::compute(&data))));
        assert!(image.sha256.is_some());

        let systems = case.get_volume_systems(image_id).unwrap();
        assert_eq!(systems.len(), 1);
        let volumes = case.get_volumes(systems[0].id).unwrap();
        assert_eq!(volumes.len(), 4);
        assert_eq!(volumes[2].start, 63);

        let seen = seen.into_inner();
        assert!(matches!(seen.first(), Some(AddImageProgress::Opening { .. })));
        assert_eq!(seen.last(), Some(&AddImageProgress::Done { image_id }));
    }

    #[test]
    fn test_revert_leaves_no_rows() {
        let temp_dir = TempDir::new().unwrap();
        let case = hashing_case(&temp_dir);
        let path = temp_dir.path().join("blank.dd");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let mut process = case.make_add_image_process("UTC", true, "device-2");
        process.run(&[path.clone()]).unwrap();
        assert!(process.run(&[path]).unwrap_err().is_data_error());
        process.revert().unwrap();
        assert!(!process.is_running());

        assert!(case.get_images().unwrap().is_empty());
        assert_eq!(case.handle_cache().cached_image_count(), 0);
    }

    #[test]
    fn test_calls_out_of_order() {
        let temp_dir = TempDir::new().unwrap();
        let case = hashing_case(&temp_dir);
        let mut process = case.make_add_image_process("UTC", false, "device-3");

        assert!(process.stop().is_err());
        assert!(process.commit().is_err());
        assert!(process.revert().is_err());

        let missing = process.run(&[temp_dir.path().join("missing.dd")]);
        assert!(missing.unwrap_err().is_data_error());
        assert!(!process.is_running());
    }

    #[test]
    fn test_stop_during_run() {
        let temp_dir = TempDir::new().unwrap();
        let case = hashing_case(&temp_dir);
        let path = write_partitioned_image(&temp_dir);

        let process = case.make_add_image_process("UTC", false, "device-4");
        let stopper = process.stop_handle();
        let mut process = process.with_progress(move |p| {
            if matches!(p, AddImageProgress::Volume { .. }) {
                stopper.stop().unwrap();
            }
        });

        let err = process.run(&[path]).unwrap_err();
        assert!(err.to_string().contains("stopped"));
        assert!(!process.is_running());
        assert!(process.commit().is_err());
        assert!(case.get_images().unwrap().is_empty());
        assert_eq!(case.handle_cache().cached_image_count(), 0);
    }

    #[test]
    fn test_failed_run_keeps_handles_opened_elsewhere() {
        let temp_dir = TempDir::new().unwrap();
        let case = hashing_case(&temp_dir);
        let path = write_partitioned_image(&temp_dir);
        let held = case
            .handle_cache()
            .open_image(&[path.clone()], case.config().sector_size)
            .unwrap();

        let process = case.make_add_image_process("UTC", false, "device-5");
        let stopper = process.stop_handle();
        let mut process = process.with_progress(move |p| {
            if matches!(p, AddImageProgress::Volume { .. }) {
                stopper.stop().unwrap();
            }
        });
        assert!(process.run(&[path.clone()]).is_err());
        assert!(case.handle_cache().is_image_cached(&[path.clone()]));

        let mut process = case.make_add_image_process("UTC", false, "device-5");
        process.run(&[path.clone()]).unwrap();
        process.revert().unwrap();
        assert!(case.handle_cache().is_image_cached(&[path]));
        drop(held);
    }
}
