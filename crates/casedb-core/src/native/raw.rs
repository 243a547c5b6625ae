//! Raw (dd) image backend over memory-mapped segments

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{NativeBackend, PartitionInfo, RawHandle, VsInfo};
use crate::error::{CaseDbError, Result};
use crate::model::{LayoutRange, VsPartFlags, VsType};

const DOS_SIGNATURE_OFFSET: usize = 510;
const DOS_TABLE_OFFSET: usize = 446;
const DOS_ENTRY_SIZE: usize = 16;

struct Segment {
    mmap: Option<Mmap>,
    start: u64,
    len: u64,
}

/// A raw image made of one or more consecutive segment files
struct SegmentedImage {
    segments: Vec<Segment>,
    size: u64,
    sector_size: u32,
}

impl SegmentedImage {
    fn open(paths: &[PathBuf], sector_size: u32) -> Result<Self> {
        if paths.is_empty() {
            return Err(CaseDbError::invalid("no image paths given"));
        }
        if sector_size == 0 {
            return Err(CaseDbError::invalid("sector size must be positive"));
        }

        let mut segments = Vec::with_capacity(paths.len());
        let mut start = 0u64;
        for path in paths {
            let file = File::open(path).map_err(|e| {
                CaseDbError::Native(format!("cannot open image segment {}: {}", path.display(), e))
            })?;
            let len = file.metadata()?.len();

            // Empty segments cannot be mapped
            let mmap = if len == 0 {
                None
            } else {
                Some(unsafe { MmapOptions::new().map(&file)? })
            };

            segments.push(Segment { mmap, start, len });
            start += len;
        }

        Ok(Self {
            segments,
            size: start,
            sector_size,
        })
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset > self.size {
            return Err(CaseDbError::Native(format!(
                "read offset {} beyond image size {}",
                offset, self.size
            )));
        }

        let mut copied = 0usize;
        let mut pos = offset;
        while copied < buf.len() && pos < self.size {
            let segment = match self
                .segments
                .iter()
                .find(|s| pos >= s.start && pos < s.start + s.len)
            {
                Some(s) => s,
                None => break,
            };
            let mmap = match &segment.mmap {
                Some(m) => m,
                None => break,
            };

            let seg_offset = (pos - segment.start) as usize;
            let available = segment.len as usize - seg_offset;
            let n = available.min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&mmap[seg_offset..seg_offset + n]);
            copied += n;
            pos += n as u64;
        }

        Ok(copied)
    }
}

/// Read from a window `[start, start + len)` of an image
fn read_window(image: &SegmentedImage, start: u64, len: u64, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if offset > len {
        return Err(CaseDbError::Native(format!(
            "read offset {} beyond object size {}",
            offset, len
        )));
    }
    let n = ((len - offset) as usize).min(buf.len());
    image.read(start + offset, &mut buf[..n])
}

enum RawObject {
    Image(Arc<SegmentedImage>),
    Vs {
        image: Arc<SegmentedImage>,
        info: VsInfo,
    },
    Volume {
        image: Arc<SegmentedImage>,
        start: u64,
        len: u64,
    },
    Fs {
        image: Arc<SegmentedImage>,
        offset: u64,
    },
    File {
        image: Arc<SegmentedImage>,
        layout: Vec<LayoutRange>,
        size: u64,
    },
}

/// Backend that reads raw and split-raw images.
///
/// Volume systems are limited to DOS partition tables and file systems are
/// exposed as byte windows. File content is read through layout ranges.
pub struct RawImageBackend {
    objects: Mutex<HashMap<RawHandle, RawObject>>,
    next_handle: AtomicU64,
}

impl Default for RawImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RawImageBackend {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn objects(&self) -> Result<MutexGuard<'_, HashMap<RawHandle, RawObject>>> {
        self.objects
            .lock()
            .map_err(|_| CaseDbError::core("raw backend lock poisoned"))
    }

    fn insert(&self, object: RawObject) -> Result<RawHandle> {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.objects()?.insert(handle, object);
        Ok(handle)
    }

    fn image(&self, handle: RawHandle) -> Result<Arc<SegmentedImage>> {
        match self.objects()?.get(&handle) {
            Some(RawObject::Image(image)) => Ok(Arc::clone(image)),
            _ => Err(CaseDbError::Native(format!("invalid image handle {}", handle))),
        }
    }

    fn remove(&self, handle: RawHandle, kind: &str) {
        match self.objects() {
            Ok(mut objects) => {
                if objects.remove(&handle).is_none() {
                    tracing::warn!("Close of unknown {} handle {}", kind, handle);
                }
            }
            Err(e) => tracing::warn!("Failed to close {} handle {}: {}", kind, handle, e),
        }
    }

    fn with_object<T>(
        &self,
        handle: RawHandle,
        f: impl FnOnce(&RawObject) -> Result<T>,
    ) -> Result<T> {
        let objects = self.objects()?;
        let object = objects
            .get(&handle)
            .ok_or_else(|| CaseDbError::Native(format!("invalid handle {}", handle)))?;
        f(object)
    }
}

/// Parse a DOS partition table from the first sector of a volume system
pub(crate) fn parse_dos_table(sector: &[u8], offset: u64, sector_size: u64, image_sectors: u64) -> Result<VsInfo> {
    if sector.len() < 512
        || sector[DOS_SIGNATURE_OFFSET] != 0x55
        || sector[DOS_SIGNATURE_OFFSET + 1] != 0xAA
    {
        return Err(CaseDbError::Native(
            "Cannot determine partition type (no DOS signature)".to_string(),
        ));
    }

    let mut allocated = Vec::new();
    for i in 0..4 {
        let entry = &sector[DOS_TABLE_OFFSET + i * DOS_ENTRY_SIZE..][..DOS_ENTRY_SIZE];
        let part_type = entry[4];
        let start = LittleEndian::read_u32(&entry[8..12]) as u64;
        let length = LittleEndian::read_u32(&entry[12..16]) as u64;
        if part_type == 0 || length == 0 {
            continue;
        }
        allocated.push((start, length, format!("{} (0x{:02x})", dos_type_name(part_type), part_type)));
    }
    allocated.sort_by_key(|(start, ..)| *start);

    let mut partitions = vec![PartitionInfo {
        addr: 0,
        start: 0,
        length: 1,
        description: "Primary Table (#0)".to_string(),
        flags: VsPartFlags::META,
    }];

    let mut next_free = 1u64;
    for (start, length, description) in allocated {
        if start > next_free {
            partitions.push(PartitionInfo {
                addr: partitions.len() as i64,
                start: next_free,
                length: start - next_free,
                description: "Unallocated".to_string(),
                flags: VsPartFlags::UNALLOC,
            });
        }
        partitions.push(PartitionInfo {
            addr: partitions.len() as i64,
            start,
            length,
            description,
            flags: VsPartFlags::ALLOC,
        });
        next_free = next_free.max(start + length);
    }
    if image_sectors > next_free {
        partitions.push(PartitionInfo {
            addr: partitions.len() as i64,
            start: next_free,
            length: image_sectors - next_free,
            description: "Unallocated".to_string(),
            flags: VsPartFlags::UNALLOC,
        });
    }

    Ok(VsInfo {
        vs_type: VsType::Dos,
        offset,
        block_size: sector_size,
        partitions,
    })
}

fn dos_type_name(code: u8) -> &'static str {
    match code {
        0x01 => "DOS FAT12",
        0x04 | 0x06 | 0x0e => "DOS FAT16",
        0x05 | 0x0f => "DOS Extended",
        0x07 => "NTFS / exFAT",
        0x0b | 0x0c => "Win95 FAT32",
        0x82 => "Linux Swap",
        0x83 => "Linux",
        0x8e => "Linux Logical Volume Manager",
        0xee => "GPT Safety Partition",
        0xef => "EFI System Partition",
        _ => "Unknown Type",
    }
}

impl NativeBackend for RawImageBackend {
    fn open_image(&self, paths: &[PathBuf], sector_size: u32) -> Result<RawHandle> {
        let image = SegmentedImage::open(paths, sector_size)?;
        tracing::debug!("Opened raw image with {} segment(s), {} bytes", paths.len(), image.size);
        self.insert(RawObject::Image(Arc::new(image)))
    }

    fn read_image(&self, image: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.image(image)?.read(offset, buf)
    }

    fn image_size(&self, image: RawHandle) -> Result<u64> {
        Ok(self.image(image)?.size)
    }

    fn close_image(&self, image: RawHandle) {
        self.remove(image, "image");
    }

    fn open_vs(&self, image: RawHandle, offset: u64) -> Result<RawHandle> {
        let img = self.image(image)?;
        let sector_size = img.sector_size as u64;
        if sector_size == 0 {
            return Err(CaseDbError::Native(format!("image handle {} has no sector size", image)));
        }
        let mut sector = vec![0u8; img.sector_size.max(512) as usize];
        let n = img.read(offset, &mut sector)?;
        let image_sectors = img.size.saturating_sub(offset) / sector_size;
        let info = parse_dos_table(&sector[..n], offset, sector_size, image_sectors)?;
        self.insert(RawObject::Vs { image: img, info })
    }

    fn vs_info(&self, vs: RawHandle) -> Result<VsInfo> {
        self.with_object(vs, |object| match object {
            RawObject::Vs { info, .. } => Ok(info.clone()),
            _ => Err(CaseDbError::Native(format!("invalid volume system handle {}", vs))),
        })
    }

    fn read_vs(&self, vs: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (image, start) = self.with_object(vs, |object| match object {
            RawObject::Vs { image, info } => Ok((Arc::clone(image), info.offset)),
            _ => Err(CaseDbError::Native(format!("invalid volume system handle {}", vs))),
        })?;
        let len = image.size.saturating_sub(start);
        read_window(&image, start, len, offset, buf)
    }

    fn close_vs(&self, vs: RawHandle) {
        self.remove(vs, "volume system");
    }

    fn open_volume(&self, vs: RawHandle, addr: i64) -> Result<RawHandle> {
        let (image, start, len) = self.with_object(vs, |object| match object {
            RawObject::Vs { image, info } => {
                let part = info
                    .partitions
                    .iter()
                    .find(|p| p.addr == addr)
                    .ok_or_else(|| CaseDbError::Native(format!("no partition at address {}", addr)))?;
                Ok((
                    Arc::clone(image),
                    info.offset + part.start * info.block_size,
                    part.length * info.block_size,
                ))
            }
            _ => Err(CaseDbError::Native(format!("invalid volume system handle {}", vs))),
        })?;
        self.insert(RawObject::Volume { image, start, len })
    }

    fn read_volume(&self, volume: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (image, start, len) = self.with_object(volume, |object| match object {
            RawObject::Volume { image, start, len } => Ok((Arc::clone(image), *start, *len)),
            _ => Err(CaseDbError::Native(format!("invalid volume handle {}", volume))),
        })?;
        read_window(&image, start, len, offset, buf)
    }

    fn close_volume(&self, volume: RawHandle) {
        self.remove(volume, "volume");
    }

    fn open_fs(&self, image: RawHandle, offset: u64) -> Result<RawHandle> {
        let img = self.image(image)?;
        if offset >= img.size {
            return Err(CaseDbError::Native(format!(
                "file system offset {} beyond image size {}",
                offset, img.size
            )));
        }
        self.insert(RawObject::Fs { image: img, offset })
    }

    fn read_fs(&self, fs: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (image, start) = self.with_object(fs, |object| match object {
            RawObject::Fs { image, offset } => Ok((Arc::clone(image), *offset)),
            _ => Err(CaseDbError::Native(format!("invalid file system handle {}", fs))),
        })?;
        let len = image.size - start;
        read_window(&image, start, len, offset, buf)
    }

    fn close_fs(&self, fs: RawHandle) {
        self.remove(fs, "file system");
    }

    fn open_file(
        &self,
        fs: RawHandle,
        meta_addr: i64,
        layout: &[LayoutRange],
        size: u64,
    ) -> Result<RawHandle> {
        let image = self.with_object(fs, |object| match object {
            RawObject::Fs { image, .. } => Ok(Arc::clone(image)),
            _ => Err(CaseDbError::Native(format!("invalid file system handle {}", fs))),
        })?;
        if layout.is_empty() && size > 0 {
            return Err(CaseDbError::Native(format!(
                "file at metadata address {} has no layout",
                meta_addr
            )));
        }

        let mut layout = layout.to_vec();
        layout.sort_by_key(|r| r.sequence);
        self.insert(RawObject::File { image, layout, size })
    }

    fn read_file(&self, file: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.with_object(file, |object| match object {
            RawObject::File { image, layout, size } => {
                if offset >= *size {
                    return Ok(0);
                }
                let wanted = ((*size - offset) as usize).min(buf.len());
                let mut copied = 0usize;
                let mut file_pos = 0u64;
                for range in layout {
                    if copied == wanted {
                        break;
                    }
                    let range_end = file_pos + range.byte_len;
                    let read_pos = offset + copied as u64;
                    if read_pos < range_end {
                        let within = read_pos - file_pos;
                        let n = ((range.byte_len - within) as usize).min(wanted - copied);
                        let got = image.read(range.byte_start + within, &mut buf[copied..copied + n])?;
                        copied += got;
                        if got < n {
                            break;
                        }
                    }
                    file_pos = range_end;
                }
                Ok(copied)
            }
            _ => Err(CaseDbError::Native(format!("invalid file handle {}", file))),
        })
    }

    fn close_file(&self, file: RawHandle) {
        self.remove(file, "file");
    }

    fn version(&self) -> String {
        format!("casedb-raw {}", env!("CARGO_PKG_VERSION"))
    }
}
