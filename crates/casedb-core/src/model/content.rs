//! Content rows: images, volume systems, volumes, file systems and files

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{
    BlackboardArtifact, FileKnown, FileType, FsType, ImageType, MetaFlags, MetaType, Mode,
    NameFlags, NameType, ObjectType, VsPartFlags, VsType,
};

/// A disk image data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub image_type: ImageType,
    pub sector_size: u32,
    pub time_zone: String,
    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub device_id: String,
    pub paths: Vec<PathBuf>,
    pub host_id: Option<i64>,
    pub added_date_time: i64,
}

impl Image {
    pub fn unique_path(&self) -> String {
        format!("/img_{}", self.name)
    }

    /// True when the first segment is still present on disk
    pub fn image_file_exists(&self) -> bool {
        self.paths.first().map(|p| p.exists()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSystem {
    pub id: i64,
    pub image_id: i64,
    pub vs_type: VsType,
    pub img_offset: u64,
    pub block_size: u64,
}

/// A partition inside a volume system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: i64,
    pub vs_id: i64,
    pub addr: i64,
    /// First sector
    pub start: u64,
    /// Length in sectors
    pub length: u64,
    pub description: String,
    pub flags: VsPartFlags,
}

impl Volume {
    pub fn is_allocated(&self) -> bool {
        self.flags.contains(VsPartFlags::ALLOC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSystem {
    pub id: i64,
    pub parent_id: i64,
    pub data_source_id: i64,
    /// Byte offset of the file system inside its image
    pub img_offset: u64,
    pub fs_type: FsType,
    pub block_size: u64,
    pub block_count: u64,
    pub root_inum: u64,
    pub first_inum: u64,
    pub last_inum: u64,
    pub display_name: Option<String>,
}

impl FileSystem {
    pub fn size(&self) -> u64 {
        self.block_size * self.block_count
    }
}

/// One contiguous run of a file's content, in image byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRange {
    pub byte_start: u64,
    pub byte_len: u64,
    pub sequence: i32,
}

impl LayoutRange {
    pub fn new(byte_start: u64, byte_len: u64, sequence: i32) -> Self {
        Self {
            byte_start,
            byte_len,
            sequence,
        }
    }
}

/// A row of `tsk_files`
///
/// Setters mark the row dirty. Changes are written back with
/// `CaseDatabase::update_file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractFile {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub fs_id: Option<i64>,
    pub data_source_id: i64,
    pub file_type: FileType,
    pub name: String,
    pub meta_addr: i64,
    pub meta_seq: i64,
    pub dir_type: NameType,
    pub meta_type: MetaType,
    pub dir_flags: NameFlags,
    pub meta_flags: MetaFlags,
    pub size: u64,
    pub ctime: i64,
    pub crtime: i64,
    pub atime: i64,
    pub mtime: i64,
    pub mode: Mode,
    pub uid: i32,
    pub gid: i32,
    pub md5: Option<String>,
    pub sha256: Option<String>,
    pub known: FileKnown,
    pub parent_path: String,
    pub mime_type: Option<String>,
    pub extension: String,
    pub local_path: Option<String>,
    pub layout: Vec<LayoutRange>,
    #[serde(skip)]
    dirty: bool,
}

impl AbstractFile {
    pub(crate) fn from_parts(id: i64, parent_id: Option<i64>, data_source_id: i64, new: NewFile) -> Self {
        let extension = extract_extension(&new.name);
        Self {
            id,
            parent_id,
            fs_id: new.fs_id,
            data_source_id,
            file_type: new.file_type,
            name: new.name,
            meta_addr: new.meta_addr,
            meta_seq: new.meta_seq,
            dir_type: new.dir_type,
            meta_type: new.meta_type,
            dir_flags: new.dir_flags,
            meta_flags: new.meta_flags,
            size: new.size,
            ctime: new.ctime,
            crtime: new.crtime,
            atime: new.atime,
            mtime: new.mtime,
            mode: new.mode,
            uid: new.uid,
            gid: new.gid,
            md5: new.md5,
            sha256: None,
            known: FileKnown::Unknown,
            parent_path: new.parent_path,
            mime_type: new.mime_type,
            extension,
            local_path: new.local_path,
            layout: new.layout,
            dirty: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.meta_type == MetaType::Dir || self.dir_type == NameType::Dir
    }

    pub fn is_file(&self) -> bool {
        self.meta_type == MetaType::Reg
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.file_type, FileType::VirtualDir | FileType::LocalDir)
            || self.meta_type == MetaType::Virt
    }

    pub fn is_allocated(&self) -> bool {
        self.dir_flags.contains(NameFlags::ALLOC)
    }

    /// Parent path plus name
    pub fn unique_path(&self) -> String {
        format!("{}{}", self.parent_path, self.name)
    }

    /// MAC times that are set, labelled the way timeline events are
    pub fn mac_times(&self) -> Vec<(&'static str, i64)> {
        [
            ("Modified", self.mtime),
            ("Accessed", self.atime),
            ("Created", self.crtime),
            ("Changed", self.ctime),
        ]
        .into_iter()
        .filter(|(_, t)| *t > 0)
        .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn set_md5(&mut self, md5: impl Into<String>) {
        self.md5 = Some(md5.into().to_lowercase());
        self.dirty = true;
    }

    pub fn set_sha256(&mut self, sha256: impl Into<String>) {
        self.sha256 = Some(sha256.into().to_lowercase());
        self.dirty = true;
    }

    pub fn set_known(&mut self, known: FileKnown) {
        self.known = known;
        self.dirty = true;
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = Some(mime_type.into());
        self.dirty = true;
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let file_type: i32 = row.get("type")?;
        let dir_type: i32 = row.get("dir_type")?;
        let meta_type: i32 = row.get("meta_type")?;
        let known: i32 = row.get("known")?;
        let size: i64 = row.get("size")?;
        let name: String = row.get("name")?;

        Ok(Self {
            id: row.get("obj_id")?,
            parent_id: row.get("par_obj_id")?,
            fs_id: row.get("fs_obj_id")?,
            data_source_id: row.get("data_source_obj_id")?,
            file_type: to_sql_err(FileType::from_code(file_type))?,
            extension: row
                .get::<_, Option<String>>("extension")?
                .unwrap_or_else(|| extract_extension(&name)),
            name,
            meta_addr: row.get("meta_addr")?,
            meta_seq: row.get("meta_seq")?,
            dir_type: to_sql_err(NameType::from_code(dir_type))?,
            meta_type: to_sql_err(MetaType::from_code(meta_type))?,
            dir_flags: NameFlags(row.get("dir_flags")?),
            meta_flags: MetaFlags(row.get("meta_flags")?),
            size: size.max(0) as u64,
            ctime: row.get("ctime")?,
            crtime: row.get("crtime")?,
            atime: row.get("atime")?,
            mtime: row.get("mtime")?,
            mode: Mode(row.get("mode")?),
            uid: row.get("uid")?,
            gid: row.get("gid")?,
            md5: row.get("md5")?,
            sha256: row.get("sha256")?,
            known: to_sql_err(FileKnown::from_code(known))?,
            parent_path: row.get::<_, Option<String>>("parent_path")?.unwrap_or_default(),
            mime_type: row.get("mime_type")?,
            local_path: row.get("path")?,
            layout: Vec::new(),
            dirty: false,
        })
    }
}

/// Values for a new `tsk_files` row
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub name: String,
    pub file_type: FileType,
    pub fs_id: Option<i64>,
    pub meta_addr: i64,
    pub meta_seq: i64,
    pub dir_type: NameType,
    pub meta_type: MetaType,
    pub dir_flags: NameFlags,
    pub meta_flags: MetaFlags,
    pub size: u64,
    pub ctime: i64,
    pub crtime: i64,
    pub atime: i64,
    pub mtime: i64,
    pub mode: Mode,
    pub uid: i32,
    pub gid: i32,
    pub md5: Option<String>,
    pub parent_path: String,
    pub mime_type: Option<String>,
    pub local_path: Option<String>,
    pub layout: Vec<LayoutRange>,
}

impl Default for NewFile {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_type: FileType::Fs,
            fs_id: None,
            meta_addr: 0,
            meta_seq: 0,
            dir_type: NameType::Reg,
            meta_type: MetaType::Reg,
            dir_flags: NameFlags::ALLOC,
            meta_flags: MetaFlags::ALLOC.union(MetaFlags::USED),
            size: 0,
            ctime: 0,
            crtime: 0,
            atime: 0,
            mtime: 0,
            mode: Mode(0o644),
            uid: 0,
            gid: 0,
            md5: None,
            parent_path: "/".to_string(),
            mime_type: None,
            local_path: None,
            layout: Vec::new(),
        }
    }
}

impl NewFile {
    /// A regular allocated file
    pub fn regular(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    /// A directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir_type: NameType::Dir,
            meta_type: MetaType::Dir,
            mode: Mode(0o755),
            ..Self::default()
        }
    }

    pub fn with_times(mut self, crtime: i64, mtime: i64, atime: i64, ctime: i64) -> Self {
        self.crtime = crtime;
        self.mtime = mtime;
        self.atime = atime;
        self.ctime = ctime;
        self
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn with_layout(mut self, layout: Vec<LayoutRange>) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn unallocated(mut self) -> Self {
        self.dir_flags = NameFlags::UNALLOC;
        self.meta_flags = MetaFlags::UNALLOC;
        self
    }
}

/// Any object addressable by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Image(Image),
    VolumeSystem(VolumeSystem),
    Volume(Volume),
    FileSystem(FileSystem),
    File(AbstractFile),
    Artifact(BlackboardArtifact),
}

impl Content {
    pub fn id(&self) -> i64 {
        match self {
            Content::Image(i) => i.id,
            Content::VolumeSystem(vs) => vs.id,
            Content::Volume(v) => v.id,
            Content::FileSystem(fs) => fs.id,
            Content::File(f) => f.id,
            Content::Artifact(a) => a.obj_id,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Content::Image(_) => ObjectType::Image,
            Content::VolumeSystem(_) => ObjectType::VolumeSystem,
            Content::Volume(_) => ObjectType::Volume,
            Content::FileSystem(_) => ObjectType::FileSystem,
            Content::File(_) => ObjectType::AbstractFile,
            Content::Artifact(_) => ObjectType::Artifact,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Content::Image(i) => i.name.clone(),
            Content::VolumeSystem(vs) => format!("{} Volume System", vs.vs_type),
            Content::Volume(v) => format!("vol{}", v.addr),
            Content::FileSystem(fs) => fs
                .display_name
                .clone()
                .unwrap_or_else(|| format!("{} ({})", fs.fs_type, fs.img_offset)),
            Content::File(f) => f.name.clone(),
            Content::Artifact(a) => a.type_name.clone(),
        }
    }
}

/// Lowercase text after the last dot, or empty when there is none
pub(crate) fn extract_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => {
            let ext = &name[pos + 1..];
            if ext.contains(' ') {
                String::new()
            } else {
                ext.to_lowercase()
            }
        }
        _ => String::new(),
    }
}

pub(crate) fn to_sql_err<T>(result: crate::error::Result<T>) -> rusqlite::Result<T> {
    result.map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_extension() {
        assert_eq!(extract_extension("report.PDF"), "pdf");
        assert_eq!(extract_extension("archive.tar.gz"), "gz");
        assert_eq!(extract_extension("README"), "");
        assert_eq!(extract_extension("trailing."), "");
        assert_eq!(extract_extension("odd.file name"), "");
    }

    #[test]
    fn test_setters_mark_dirty() {
        let mut file = AbstractFile::from_parts(10, Some(2), 1, NewFile::regular("a.txt", 5));
        assert!(!file.is_dirty());
        assert_eq!(file.extension, "txt");

        file.set_md5("ABCDEF");
        assert!(file.is_dirty());
        assert_eq!(file.md5.as_deref(), Some("abcdef"));

        file.clear_dirty();
        file.set_known(FileKnown::Bad);
        assert!(file.is_dirty());
    }

    #[test]
    fn test_mac_times_skip_unset() {
        let file = AbstractFile::from_parts(
            10,
            None,
            1,
            NewFile::regular("a.txt", 5).with_times(100, 200, 0, 0),
        );
        let times = file.mac_times();
        assert_eq!(times, vec![("Modified", 200), ("Created", 100)]);
    }

    #[test]
    fn test_directory_defaults() {
        let dir = AbstractFile::from_parts(3, None, 1, NewFile::directory("Windows"));
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert!(dir.is_allocated());
        assert_eq!(dir.unique_path(), "/Windows");
    }
}
