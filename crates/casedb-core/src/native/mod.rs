//! Native image access surface and the handle cache built on it
//!
//! A `NativeBackend` exposes open/read/close for images, volume systems,
//! volumes, file systems and files, using opaque integer handles. The
//! `HandleCache` wraps those handles in reference-counted owners that close
//! them when the last owner drops.

pub mod cache;
pub mod raw;

pub use cache::{FileHandle, FsHandle, HandleCache, ImageHandle, VolumeHandle, VsHandle};
pub use raw::RawImageBackend;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::model::{LayoutRange, VsPartFlags, VsType};

/// Opaque handle returned by a backend
pub type RawHandle = u64;

/// One entry of a volume system's partition list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub addr: i64,
    /// First sector
    pub start: u64,
    /// Length in sectors
    pub length: u64,
    pub description: String,
    pub flags: VsPartFlags,
}

/// Summary of an opened volume system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VsInfo {
    pub vs_type: VsType,
    pub offset: u64,
    pub block_size: u64,
    pub partitions: Vec<PartitionInfo>,
}

/// The native call surface.
///
/// Reads fill as much of `buf` as is available and return the byte count.
/// Close calls never fail; a backend logs and drops bad handles.
pub trait NativeBackend: Send + Sync {
    fn open_image(&self, paths: &[PathBuf], sector_size: u32) -> Result<RawHandle>;
    fn read_image(&self, image: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn image_size(&self, image: RawHandle) -> Result<u64>;
    fn close_image(&self, image: RawHandle);

    fn open_vs(&self, image: RawHandle, offset: u64) -> Result<RawHandle>;
    fn vs_info(&self, vs: RawHandle) -> Result<VsInfo>;
    fn read_vs(&self, vs: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn close_vs(&self, vs: RawHandle);

    fn open_volume(&self, vs: RawHandle, addr: i64) -> Result<RawHandle>;
    fn read_volume(&self, volume: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn close_volume(&self, volume: RawHandle);

    fn open_fs(&self, image: RawHandle, offset: u64) -> Result<RawHandle>;
    fn read_fs(&self, fs: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn close_fs(&self, fs: RawHandle);

    /// Open a file by metadata address. `layout` holds its runs in image offsets.
    fn open_file(
        &self,
        fs: RawHandle,
        meta_addr: i64,
        layout: &[LayoutRange],
        size: u64,
    ) -> Result<RawHandle>;
    fn read_file(&self, file: RawHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn close_file(&self, file: RawHandle);

    /// Backend name and version for `tsk_db_info_extended`
    fn version(&self) -> String;
}
