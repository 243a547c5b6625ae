//! Content reads by object id through the handle cache
//!
//! Rows are loaded under the case lock, which is released before any native
//! read so long reads never block other case operations.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use super::content::{load_file, load_file_system, load_image, load_volume, load_volume_system};
use super::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::model::{AbstractFile, LayoutRange};
use crate::native::ImageHandle;

/// Largest file `read_all` buffers in memory
pub const MAX_READ_ALL_SIZE: u64 = 256 * 1024 * 1024;

impl CaseDatabase {
    /// Cached native handle for an image data source
    pub fn image_handle(&self, image_id: i64) -> Result<Arc<ImageHandle>> {
        let image = load_image(&*self.connection()?, image_id)?;
        if image.paths.is_empty() {
            return Err(CaseDbError::data(format!("image {} has no paths", image_id)));
        }
        self.handles.open_image(&image.paths, image.sector_size)
    }

    pub fn read_image(&self, image_id: i64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.image_handle(image_id)?.read(offset, buf)
    }

    /// Read from a volume, relative to its first sector
    pub fn read_volume(&self, volume_id: i64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (volume, vs) = {
            let conn = self.connection()?;
            let volume = load_volume(&conn, volume_id)?;
            let vs = load_volume_system(&conn, volume.vs_id)?;
            (volume, vs)
        };
        let image = self.image_handle(vs.image_id)?;
        let vs_handle = self.handles.open_vs(&image, vs.img_offset)?;
        let handle = self.handles.open_volume(&vs_handle, volume.addr)?;
        handle.read(offset, buf)
    }

    /// Read from a file system, relative to its start
    pub fn read_fs(&self, fs_id: i64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let fs = load_file_system(&*self.connection()?, fs_id)?;
        let image = self.image_handle(fs.data_source_id)?;
        self.handles.open_fs(&image, fs.img_offset)?.read(offset, buf)
    }

    /// Read file content. Local files come from the examiner's disk, file
    /// system files from the native backend, and other files from their
    /// layout ranges in the image.
    pub fn read_file(&self, file_id: i64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = load_file(&*self.connection()?, file_id)?;
        if offset >= file.size || buf.is_empty() {
            return Ok(0);
        }

        if let Some(local_path) = &file.local_path {
            return read_local(local_path, &file, offset, buf);
        }

        if file.fs_id.is_none() && file.layout.is_empty() {
            return Err(CaseDbError::data(format!(
                "file {} has no readable content",
                file.id
            )));
        }

        let image = self.image_handle(file.data_source_id)?;
        match file.fs_id {
            Some(fs_id) => {
                let fs = load_file_system(&*self.connection()?, fs_id)?;
                let fs_handle = self.handles.open_fs(&image, fs.img_offset)?;
                let handle =
                    self.handles
                        .open_file(&fs_handle, file.meta_addr, &file.layout, file.size)?;
                handle.read(offset, buf)
            }
            None => read_layout(&image, &file.layout, file.size, offset, buf),
        }
    }

    /// Whole content of a file, refused above [`MAX_READ_ALL_SIZE`]
    pub fn read_all(&self, file_id: i64) -> Result<Vec<u8>> {
        let size = self.get_file(file_id)?.size;
        if size > MAX_READ_ALL_SIZE {
            return Err(CaseDbError::invalid(format!(
                "file {} is {} bytes, read it in chunks with read_file",
                file_id, size
            )));
        }
        let size = size as usize;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = self.read_file(file_id, filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

fn read_local(path: &str, file: &AbstractFile, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut local = File::open(path)?;
    local.seek(SeekFrom::Start(offset))?;
    let wanted = ((file.size - offset) as usize).min(buf.len());
    let mut copied = 0;
    while copied < wanted {
        let n = local.read(&mut buf[copied..wanted])?;
        if n == 0 {
            break;
        }
        copied += n;
    }
    Ok(copied)
}

/// Read `[offset, offset + buf.len())` of a file made of image ranges
fn read_layout(
    image: &ImageHandle,
    layout: &[LayoutRange],
    size: u64,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    let mut ranges = layout.to_vec();
    ranges.sort_by_key(|r| r.sequence);

    let wanted = ((size - offset) as usize).min(buf.len());
    let mut copied = 0usize;
    let mut file_pos = 0u64;
    for range in &ranges {
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
