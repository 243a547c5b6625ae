//! Content rows: insertion and lookup of images, volumes, file systems and files

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

use super::{id_list, CaseDatabase};
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts;
use crate::model::content::to_sql_err;
use crate::model::{
    AbstractFile, Content, FileKnown, FileSystem, FileType, FsType, Image, ImageType, LayoutRange,
    MetaType, NameType, NewFile, ObjectType, Volume, VolumeSystem, VsPartFlags, VsType,
};

const FILE_SELECT: &str = "SELECT tsk_files.*, tsk_objects.par_obj_id, tsk_files_path.path
     FROM tsk_files
     JOIN tsk_objects ON tsk_objects.obj_id = tsk_files.obj_id
     LEFT JOIN tsk_files_path ON tsk_files_path.obj_id = tsk_files.obj_id";

/// Values for a new image data source
#[derive(Debug, Clone)]
pub struct NewImage {
    pub paths: Vec<PathBuf>,
    pub image_type: ImageType,
    pub sector_size: u32,
    pub time_zone: String,
    pub size: u64,
    pub device_id: String,
    pub display_name: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub host_id: Option<i64>,
    pub acquisition_details: Option<String>,
}

impl NewImage {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        let image_type = if paths.len() > 1 {
            ImageType::RawSplit
        } else {
            ImageType::RawSingle
        };
        Self {
            paths,
            image_type,
            sector_size: 512,
            time_zone: "UTC".to_string(),
            size: 0,
            device_id: uuid::Uuid::new_v4().to_string(),
            display_name: None,
            md5: None,
            sha1: None,
            sha256: None,
            host_id: None,
            acquisition_details: None,
        }
    }

    /// Display name, or the first segment's file name
    pub fn name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        self.paths
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Values for a new file system row
#[derive(Debug, Clone)]
pub struct NewFileSystem {
    pub img_offset: u64,
    pub fs_type: FsType,
    pub block_size: u64,
    pub block_count: u64,
    pub root_inum: u64,
    pub first_inum: u64,
    pub last_inum: u64,
    pub display_name: Option<String>,
}

pub(crate) fn insert_object(conn: &Connection, parent_id: Option<i64>, object_type: ObjectType) -> Result<i64> {
    conn.execute(
        "INSERT INTO tsk_objects (par_obj_id, type) VALUES (?1, ?2)",
        params![parent_id, object_type.code()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn object_type_of(conn: &Connection, obj_id: i64) -> Result<ObjectType> {
    let code: i32 = conn
        .query_row(
            "SELECT type FROM tsk_objects WHERE obj_id = ?1",
            params![obj_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("object {}", obj_id)))?;
    ObjectType::from_code(code)
}

pub(crate) fn parent_of(conn: &Connection, obj_id: i64) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT par_obj_id FROM tsk_objects WHERE obj_id = ?1",
        params![obj_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("object {}", obj_id)))
}

/// Walk up `tsk_objects` to the root object, which is the data source
pub(crate) fn data_source_of(conn: &Connection, obj_id: i64) -> Result<i64> {
    let mut current = obj_id;
    // Object trees are shallow; the bound only guards against cycles
    for _ in 0..4096 {
        match parent_of(conn, current)? {
            Some(parent) => current = parent,
            None => return Ok(current),
        }
    }
    Err(CaseDbError::core(format!("object {} has a cyclic parent chain", obj_id)))
}

pub(crate) fn insert_image(conn: &Connection, image: &NewImage, host_id: i64, added: i64) -> Result<Image> {
    let obj_id = insert_object(conn, None, ObjectType::Image)?;
    let name = image.name();

    conn.execute(
        "INSERT INTO tsk_image_info
            (obj_id, type, ssize, tzone, size, md5, sha1, sha256, display_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            obj_id,
            image.image_type.code(),
            image.sector_size,
            image.time_zone,
            image.size as i64,
            image.md5,
            image.sha1,
            image.sha256,
            name,
        ],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO tsk_image_names (obj_id, name, sequence) VALUES (?1, ?2, ?3)",
    )?;
    for (seq, path) in image.paths.iter().enumerate() {
        stmt.execute(params![obj_id, path.display().to_string(), seq as i64])?;
    }

    conn.execute(
        "INSERT INTO data_source_info
            (obj_id, device_id, time_zone, acquisition_details, added_date_time, host_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            obj_id,
            image.device_id,
            image.time_zone,
            image.acquisition_details,
            added,
            host_id,
        ],
    )?;

    Ok(Image {
        id: obj_id,
        name,
        image_type: image.image_type,
        sector_size: image.sector_size,
        time_zone: image.time_zone.clone(),
        size: image.size,
        md5: image.md5.clone(),
        sha1: image.sha1.clone(),
        sha256: image.sha256.clone(),
        device_id: image.device_id.clone(),
        paths: image.paths.clone(),
        host_id: Some(host_id),
        added_date_time: added,
    })
}

pub(crate) fn update_image_info(
    conn: &Connection,
    image_id: i64,
    size: u64,
    md5: Option<&str>,
    sha1: Option<&str>,
    sha256: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE tsk_image_info
         SET size = ?1, md5 = COALESCE(?2, md5), sha1 = COALESCE(?3, sha1), sha256 = COALESCE(?4, sha256)
         WHERE obj_id = ?5",
        params![size as i64, md5, sha1, sha256, image_id],
    )?;
    Ok(())
}

pub(crate) fn insert_volume_system(
    conn: &Connection,
    image_id: i64,
    vs_type: VsType,
    img_offset: u64,
    block_size: u64,
) -> Result<VolumeSystem> {
    let obj_id = insert_object(conn, Some(image_id), ObjectType::VolumeSystem)?;
    conn.execute(
        "INSERT INTO tsk_vs_info (obj_id, vs_type, img_offset, block_size) VALUES (?1, ?2, ?3, ?4)",
        params![obj_id, vs_type.code(), img_offset as i64, block_size as i64],
    )?;
    Ok(VolumeSystem {
        id: obj_id,
        image_id,
        vs_type,
        img_offset,
        block_size,
    })
}

pub(crate) fn insert_volume(
    conn: &Connection,
    vs_id: i64,
    addr: i64,
    start: u64,
    length: u64,
    description: &str,
    flags: VsPartFlags,
) -> Result<Volume> {
    let obj_id = insert_object(conn, Some(vs_id), ObjectType::Volume)?;
    conn.execute(
        "INSERT INTO tsk_vs_parts (obj_id, addr, start, length, descr, flags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![obj_id, addr, start as i64, length as i64, description, flags.0],
    )?;
    Ok(Volume {
        id: obj_id,
        vs_id,
        addr,
        start,
        length,
        description: description.to_string(),
        flags,
    })
}

pub(crate) fn insert_file_system(conn: &Connection, parent_id: i64, fs: &NewFileSystem) -> Result<FileSystem> {
    let data_source_id = data_source_of(conn, parent_id)?;
    let obj_id = insert_object(conn, Some(parent_id), ObjectType::FileSystem)?;
    conn.execute(
        "INSERT INTO tsk_fs_info
            (obj_id, data_source_obj_id, img_offset, fs_type, block_size, block_count,
             root_inum, first_inum, last_inum, display_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            obj_id,
            data_source_id,
            fs.img_offset as i64,
            fs.fs_type.code(),
            fs.block_size as i64,
            fs.block_count as i64,
            fs.root_inum as i64,
            fs.first_inum as i64,
            fs.last_inum as i64,
            fs.display_name,
        ],
    )?;
    Ok(FileSystem {
        id: obj_id,
        parent_id,
        data_source_id,
        img_offset: fs.img_offset,
        fs_type: fs.fs_type,
        block_size: fs.block_size,
        block_count: fs.block_count,
        root_inum: fs.root_inum,
        first_inum: fs.first_inum,
        last_inum: fs.last_inum,
        display_name: fs.display_name.clone(),
    })
}

pub(crate) fn insert_file(conn: &Connection, parent_id: i64, mut new: NewFile) -> Result<AbstractFile> {
    let data_source_id = data_source_of(conn, parent_id)?;

    match object_type_of(conn, parent_id)? {
        ObjectType::FileSystem => {
            new.fs_id = Some(parent_id);
        }
        ObjectType::AbstractFile => {
            let parent = load_file(conn, parent_id)?;
            new.fs_id = parent.fs_id;
            new.parent_path = if parent.name.is_empty() {
                parent.parent_path.clone()
            } else {
                format!("{}{}/", parent.parent_path, parent.name)
            };
        }
        _ => {}
    }

    let obj_id = insert_object(conn, Some(parent_id), ObjectType::AbstractFile)?;
    let file = AbstractFile::from_parts(obj_id, Some(parent_id), data_source_id, new);

    conn.execute(
        "INSERT INTO tsk_files
            (obj_id, fs_obj_id, data_source_obj_id, name, meta_addr, meta_seq, type,
             has_layout, has_path, dir_type, meta_type, dir_flags, meta_flags, size,
             ctime, crtime, atime, mtime, mode, uid, gid, md5, sha256, known,
             parent_path, mime_type, extension)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        params![
            file.id,
            file.fs_id,
            file.data_source_id,
            file.name,
            file.meta_addr,
            file.meta_seq,
            file.file_type.code(),
            !file.layout.is_empty(),
            file.local_path.is_some(),
            file.dir_type.code(),
            file.meta_type.code(),
            file.dir_flags.0,
            file.meta_flags.0,
            file.size as i64,
            file.ctime,
            file.crtime,
            file.atime,
            file.mtime,
            file.mode.0,
            file.uid,
            file.gid,
            file.md5,
            file.sha256,
            file.known.code(),
            file.parent_path,
            file.mime_type,
            file.extension,
        ],
    )?;

    if let Some(local_path) = &file.local_path {
        conn.execute(
            "INSERT INTO tsk_files_path (obj_id, path, encoding_type) VALUES (?1, ?2, 0)",
            params![file.id, local_path],
        )?;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO tsk_file_layout (obj_id, byte_start, byte_len, sequence) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for range in &file.layout {
        stmt.execute(params![
            file.id,
            range.byte_start as i64,
            range.byte_len as i64,
            range.sequence
        ])?;
    }

    Ok(file)
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    let image_type: i32 = row.get("type")?;
    let size: Option<i64> = row.get("size")?;
    Ok(Image {
        id: row.get("obj_id")?,
        name: row.get::<_, Option<String>>("display_name")?.unwrap_or_default(),
        image_type: to_sql_err(ImageType::from_code(image_type))?,
        sector_size: row.get("ssize")?,
        time_zone: row.get::<_, Option<String>>("tzone")?.unwrap_or_default(),
        size: size.unwrap_or(0).max(0) as u64,
        md5: row.get("md5")?,
        sha1: row.get("sha1")?,
        sha256: row.get("sha256")?,
        device_id: row.get("device_id")?,
        paths: Vec::new(),
        host_id: row.get("host_id")?,
        added_date_time: row.get::<_, Option<i64>>("added_date_time")?.unwrap_or(0),
    })
}

const IMAGE_SELECT: &str = "SELECT tsk_image_info.*, data_source_info.device_id,
        data_source_info.host_id, data_source_info.added_date_time
     FROM tsk_image_info
     JOIN data_source_info ON data_source_info.obj_id = tsk_image_info.obj_id";

fn load_image_paths(conn: &Connection, image_id: i64) -> Result<Vec<PathBuf>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM tsk_image_names WHERE obj_id = ?1 ORDER BY sequence",
    )?;
    let paths = stmt
        .query_map(params![image_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(paths.into_iter().map(PathBuf::from).collect())
}

pub(crate) fn load_image(conn: &Connection, image_id: i64) -> Result<Image> {
    let mut image = conn
        .query_row(
            &format!("{} WHERE tsk_image_info.obj_id = ?1", IMAGE_SELECT),
            params![image_id],
            image_from_row,
        )
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("image {}", image_id)))?;
    image.paths = load_image_paths(conn, image_id)?;
    Ok(image)
}

pub(crate) fn load_images(conn: &Connection) -> Result<Vec<Image>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY tsk_image_info.obj_id", IMAGE_SELECT))?;
    let mut images = stmt
        .query_map([], image_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for image in &mut images {
        image.paths = load_image_paths(conn, image.id)?;
    }
    Ok(images)
}

fn vs_from_row(row: &Row<'_>) -> rusqlite::Result<VolumeSystem> {
    let vs_type: i32 = row.get("vs_type")?;
    Ok(VolumeSystem {
        id: row.get("obj_id")?,
        image_id: row.get("par_obj_id")?,
        vs_type: to_sql_err(VsType::from_code(vs_type))?,
        img_offset: row.get::<_, i64>("img_offset")? as u64,
        block_size: row.get::<_, i64>("block_size")? as u64,
    })
}

fn volume_from_row(row: &Row<'_>) -> rusqlite::Result<Volume> {
    Ok(Volume {
        id: row.get("obj_id")?,
        vs_id: row.get("par_obj_id")?,
        addr: row.get("addr")?,
        start: row.get::<_, i64>("start")? as u64,
        length: row.get::<_, i64>("length")? as u64,
        description: row.get::<_, Option<String>>("descr")?.unwrap_or_default(),
        flags: VsPartFlags(row.get("flags")?),
    })
}

fn fs_from_row(row: &Row<'_>) -> rusqlite::Result<FileSystem> {
    let fs_type: i64 = row.get("fs_type")?;
    Ok(FileSystem {
        id: row.get("obj_id")?,
        parent_id: row.get("par_obj_id")?,
        data_source_id: row.get("data_source_obj_id")?,
        img_offset: row.get::<_, i64>("img_offset")? as u64,
        fs_type: to_sql_err(FsType::from_code(fs_type))?,
        block_size: row.get::<_, i64>("block_size")? as u64,
        block_count: row.get::<_, i64>("block_count")? as u64,
        root_inum: row.get::<_, i64>("root_inum")? as u64,
        first_inum: row.get::<_, i64>("first_inum")? as u64,
        last_inum: row.get::<_, i64>("last_inum")? as u64,
        display_name: row.get("display_name")?,
    })
}

pub(crate) fn load_volume_system(conn: &Connection, id: i64) -> Result<VolumeSystem> {
    conn.query_row(
        "SELECT tsk_vs_info.*, tsk_objects.par_obj_id FROM tsk_vs_info
         JOIN tsk_objects ON tsk_objects.obj_id = tsk_vs_info.obj_id
         WHERE tsk_vs_info.obj_id = ?1",
        params![id],
        vs_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("volume system {}", id)))
}

pub(crate) fn load_volume(conn: &Connection, id: i64) -> Result<Volume> {
    conn.query_row(
        "SELECT tsk_vs_parts.*, tsk_objects.par_obj_id FROM tsk_vs_parts
         JOIN tsk_objects ON tsk_objects.obj_id = tsk_vs_parts.obj_id
         WHERE tsk_vs_parts.obj_id = ?1",
        params![id],
        volume_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("volume {}", id)))
}

pub(crate) fn load_file_system(conn: &Connection, id: i64) -> Result<FileSystem> {
    conn.query_row(
        "SELECT tsk_fs_info.*, tsk_objects.par_obj_id FROM tsk_fs_info
         JOIN tsk_objects ON tsk_objects.obj_id = tsk_fs_info.obj_id
         WHERE tsk_fs_info.obj_id = ?1",
        params![id],
        fs_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("file system {}", id)))
}

pub(crate) fn load_layout(conn: &Connection, file_id: i64) -> Result<Vec<LayoutRange>> {
    let mut stmt = conn.prepare(
        "SELECT byte_start, byte_len, sequence FROM tsk_file_layout
         WHERE obj_id = ?1 ORDER BY sequence",
    )?;
    let ranges = stmt
        .query_map(params![file_id], |row| {
            Ok(LayoutRange::new(
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
                row.get(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ranges)
}

pub(crate) fn load_file(conn: &Connection, file_id: i64) -> Result<AbstractFile> {
    let mut file = conn
        .query_row(
            &format!("{} WHERE tsk_files.obj_id = ?1", FILE_SELECT),
            params![file_id],
            AbstractFile::from_row,
        )
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("file {}", file_id)))?;
    file.layout = load_layout(conn, file_id)?;
    Ok(file)
}

pub(crate) fn query_files(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<AbstractFile>> {
    let sql = format!("{} WHERE {} ORDER BY tsk_files.obj_id", FILE_SELECT, where_clause);
    let mut stmt = conn.prepare(&sql)?;
    let mut files = stmt
        .query_map(args, AbstractFile::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for file in &mut files {
        file.layout = load_layout(conn, file.id)?;
    }
    Ok(files)
}

pub(crate) fn load_content(conn: &Connection, obj_id: i64) -> Result<Content> {
    Ok(match object_type_of(conn, obj_id)? {
        ObjectType::Image => Content::Image(load_image(conn, obj_id)?),
        ObjectType::VolumeSystem => Content::VolumeSystem(load_volume_system(conn, obj_id)?),
        ObjectType::Volume => Content::Volume(load_volume(conn, obj_id)?),
        ObjectType::FileSystem => Content::FileSystem(load_file_system(conn, obj_id)?),
        ObjectType::AbstractFile => Content::File(load_file(conn, obj_id)?),
        ObjectType::Artifact => {
            Content::Artifact(crate::blackboard::load_artifact_by_obj_id(conn, obj_id)?)
        }
        other => {
            return Err(CaseDbError::data(format!(
                "object {} of type {} is not content",
                obj_id, other
            )))
        }
    })
}

pub(crate) fn children_ids(conn: &Connection, obj_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT obj_id FROM tsk_objects WHERE par_obj_id = ?1 AND type != ?2 ORDER BY obj_id",
    )?;
    let ids = stmt
        .query_map(params![obj_id, ObjectType::Artifact.code()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CaseDatabase {
    /// Add an image data source. A host named after the image is created
    /// when none is given.
    pub fn add_image(&self, image: NewImage) -> Result<Image> {
        self.with_transaction(|trans| {
            let host_id = match image.host_id {
                Some(id) => id,
                None => {
                    let (host, created) =
                        hosts::get_or_create_host(trans, &format!("{} Host", image.name()))?;
                    if created {
                        trans.queue_event(CaseEvent::HostsAdded(vec![host.clone()]));
                    }
                    host.id
                }
            };
            let added = insert_image(trans, &image, host_id, unix_now())?;
            trans.queue_event(CaseEvent::DataSourceAdded(added.id));
            tracing::info!("Added image {} ({}) to case", added.id, added.name);
            Ok(added)
        })
    }

    pub fn add_volume_system(&self, image_id: i64, vs_type: VsType, img_offset: u64, block_size: u64) -> Result<VolumeSystem> {
        self.with_transaction(|trans| insert_volume_system(trans, image_id, vs_type, img_offset, block_size))
    }

    pub fn add_volume(
        &self,
        vs_id: i64,
        addr: i64,
        start: u64,
        length: u64,
        description: &str,
        flags: VsPartFlags,
    ) -> Result<Volume> {
        self.with_transaction(|trans| insert_volume(trans, vs_id, addr, start, length, description, flags))
    }

    /// Add a file system under an image or volume
    pub fn add_file_system(&self, parent_id: i64, fs: NewFileSystem) -> Result<FileSystem> {
        self.with_transaction(|trans| {
            match object_type_of(trans, parent_id)? {
                ObjectType::Image | ObjectType::Volume => {}
                other => {
                    return Err(CaseDbError::invalid(format!(
                        "a file system cannot be a child of a {}",
                        other
                    )))
                }
            }
            insert_file_system(trans, parent_id, &fs)
        })
    }

    /// Add a file under any content object
    pub fn add_file(&self, parent_id: i64, file: NewFile) -> Result<AbstractFile> {
        if file.name.is_empty() && file.file_type != FileType::Fs {
            return Err(CaseDbError::invalid("file name must not be empty"));
        }
        self.with_transaction(|trans| insert_file(trans, parent_id, file))
    }

    /// Add a file whose content is the given image ranges
    pub fn add_layout_file(&self, parent_id: i64, name: &str, layout: Vec<LayoutRange>) -> Result<AbstractFile> {
        if layout.is_empty() {
            return Err(CaseDbError::invalid("layout file needs at least one range"));
        }
        let size = layout.iter().map(|r| r.byte_len).sum();
        let new = NewFile {
            file_type: FileType::LayoutFile,
            meta_type: MetaType::Reg,
            dir_type: NameType::Reg,
            ..NewFile::regular(name, size)
        }
        .with_layout(layout);
        self.add_file(parent_id, new)
    }

    /// Add a file whose content lives on the examiner's disk
    pub fn add_local_file(&self, parent_id: i64, name: &str, local_path: impl Into<PathBuf>) -> Result<AbstractFile> {
        let local_path = local_path.into();
        let size = std::fs::metadata(&local_path)?.len();
        let new = NewFile {
            file_type: FileType::Local,
            local_path: Some(local_path.display().to_string()),
            ..NewFile::regular(name, size)
        };
        self.add_file(parent_id, new)
    }

    pub fn add_virtual_directory(&self, parent_id: i64, name: &str) -> Result<AbstractFile> {
        let new = NewFile {
            file_type: FileType::VirtualDir,
            meta_type: MetaType::Dir,
            dir_type: NameType::Dir,
            ..NewFile::directory(name)
        };
        self.add_file(parent_id, new)
    }

    pub fn get_content(&self, obj_id: i64) -> Result<Content> {
        load_content(&*self.connection()?, obj_id)
    }

    pub fn get_image(&self, image_id: i64) -> Result<Image> {
        load_image(&*self.connection()?, image_id)
    }

    pub fn get_images(&self) -> Result<Vec<Image>> {
        load_images(&*self.connection()?)
    }

    /// All data sources; every data source in this layer is an image
    pub fn get_data_sources(&self) -> Result<Vec<Image>> {
        self.get_images()
    }

    /// The data source that contains `obj_id`
    pub fn get_data_source(&self, obj_id: i64) -> Result<Image> {
        let conn = self.connection()?;
        let id = data_source_of(&conn, obj_id)?;
        load_image(&conn, id)
    }

    /// Object id of the data source that contains `obj_id`
    pub fn get_data_source_id(&self, obj_id: i64) -> Result<i64> {
        data_source_of(&*self.connection()?, obj_id)
    }

    pub fn get_volume_systems(&self, image_id: i64) -> Result<Vec<VolumeSystem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT tsk_vs_info.*, tsk_objects.par_obj_id FROM tsk_vs_info
             JOIN tsk_objects ON tsk_objects.obj_id = tsk_vs_info.obj_id
             WHERE tsk_objects.par_obj_id = ?1 ORDER BY tsk_vs_info.obj_id",
        )?;
        let systems = stmt
            .query_map(params![image_id], vs_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(systems)
    }

    pub fn get_volumes(&self, vs_id: i64) -> Result<Vec<Volume>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT tsk_vs_parts.*, tsk_objects.par_obj_id FROM tsk_vs_parts
             JOIN tsk_objects ON tsk_objects.obj_id = tsk_vs_parts.obj_id
             WHERE tsk_objects.par_obj_id = ?1 ORDER BY tsk_vs_parts.addr",
        )?;
        let volumes = stmt
            .query_map(params![vs_id], volume_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(volumes)
    }

    pub fn get_file_system(&self, fs_id: i64) -> Result<FileSystem> {
        load_file_system(&*self.connection()?, fs_id)
    }

    /// File systems anywhere under a data source
    pub fn get_file_systems(&self, data_source_id: i64) -> Result<Vec<FileSystem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT tsk_fs_info.*, tsk_objects.par_obj_id FROM tsk_fs_info
             JOIN tsk_objects ON tsk_objects.obj_id = tsk_fs_info.obj_id
             WHERE tsk_fs_info.data_source_obj_id = ?1 ORDER BY tsk_fs_info.obj_id",
        )?;
        let systems = stmt
            .query_map(params![data_source_id], fs_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(systems)
    }

    pub fn get_file(&self, file_id: i64) -> Result<AbstractFile> {
        load_file(&*self.connection()?, file_id)
    }

    /// Ids of non-artifact children
    pub fn get_children_ids(&self, obj_id: i64) -> Result<Vec<i64>> {
        children_ids(&*self.connection()?, obj_id)
    }

    pub fn get_children(&self, obj_id: i64) -> Result<Vec<Content>> {
        let conn = self.connection()?;
        children_ids(&conn, obj_id)?
            .into_iter()
            .map(|id| load_content(&conn, id))
            .collect()
    }

    pub fn get_parent(&self, obj_id: i64) -> Result<Option<Content>> {
        let conn = self.connection()?;
        match parent_of(&conn, obj_id)? {
            Some(parent) => Ok(Some(load_content(&conn, parent)?)),
            None => Ok(None),
        }
    }

    /// The directory directly under the file system
    pub fn get_root_directory(&self, fs_id: i64) -> Result<AbstractFile> {
        let conn = self.connection()?;
        query_files(
            &conn,
            "tsk_objects.par_obj_id = ?1 AND tsk_files.type = ?2 AND tsk_files.dir_type = ?3",
            &[&fs_id, &FileType::Fs.code(), &NameType::Dir.code()],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| CaseDbError::not_found(format!("root directory of file system {}", fs_id)))
    }

    /// Files in a data source whose name matches a SQL LIKE pattern
    pub fn find_files(&self, data_source_id: i64, name_pattern: &str) -> Result<Vec<AbstractFile>> {
        let conn = self.connection()?;
        query_files(
            &conn,
            "tsk_files.data_source_obj_id = ?1 AND LOWER(tsk_files.name) LIKE LOWER(?2)",
            &[&data_source_id, &name_pattern],
        )
    }

    pub fn find_files_by_md5(&self, md5: &str) -> Result<Vec<AbstractFile>> {
        let conn = self.connection()?;
        let md5 = md5.to_lowercase();
        query_files(&conn, "tsk_files.md5 = ?1", &[&md5])
    }

    pub fn get_files_by_ids(&self, ids: &[i64]) -> Result<Vec<AbstractFile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        query_files(&conn, &format!("tsk_files.obj_id IN ({})", id_list(ids)), &[])
    }

    pub fn count_files(&self, data_source_id: i64) -> Result<i64> {
        let conn = self.connection()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM tsk_files WHERE data_source_obj_id = ?1",
            params![data_source_id],
            |row| row.get(0),
        )?)
    }

    /// Write back the mutable fields of a dirty file
    pub fn update_file(&self, file: &mut AbstractFile) -> Result<()> {
        if !file.is_dirty() {
            return Ok(());
        }
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE tsk_files SET md5 = ?1, sha256 = ?2, known = ?3, mime_type = ?4 WHERE obj_id = ?5",
            params![file.md5, file.sha256, file.known.code(), file.mime_type, file.id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!("file {}", file.id)));
        }
        file.clear_dirty();
        Ok(())
    }

    pub fn set_known(&self, file_id: i64, known: FileKnown) -> Result<()> {
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE tsk_files SET known = ?1 WHERE obj_id = ?2",
            params![known.code(), file_id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!("file {}", file_id)));
        }
        Ok(())
    }

    /// Store a file's md5, lowercased
    pub fn set_md5(&self, file_id: i64, md5: &str) -> Result<()> {
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE tsk_files SET md5 = ?1 WHERE obj_id = ?2",
            params![md5.to_lowercase(), file_id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!("file {}", file_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;

    fn create_test_tree(case: &CaseDatabase) -> (i64, FileSystem, AbstractFile) {
        let image_id = add_test_image(case, "disk.dd");
        let vs = case.add_volume_system(image_id, VsType::Dos, 0, 512).unwrap();
        let vol = case
            .add_volume(vs.id, 2, 2048, 4096, "Linux (0x83)", VsPartFlags::ALLOC)
            .unwrap();
        let fs = case
            .add_file_system(
                vol.id,
                NewFileSystem {
                    img_offset: 2048 * 512,
                    fs_type: FsType::Ext4,
                    block_size: 4096,
                    block_count: 512,
                    root_inum: 2,
                    first_inum: 1,
                    last_inum: 1024,
                    display_name: None,
                },
            )
            .unwrap();
        let root = case.add_file(fs.id, NewFile::directory("")).unwrap();
        (image_id, fs, root)
    }

    #[test]
    fn test_content_tree() {
        let (_temp_dir, case) = create_test_case();
        let (image_id, fs, root) = create_test_tree(&case);

        assert_eq!(fs.data_source_id, image_id);
        assert_eq!(root.fs_id, Some(fs.id));
        assert_eq!(root.data_source_id, image_id);

        let home = case.add_file(root.id, NewFile::directory("home")).unwrap();
        let notes = case.add_file(home.id, NewFile::regular("notes.txt", 12)).unwrap();
        assert_eq!(notes.parent_path, "/home/");
        assert_eq!(notes.unique_path(), "/home/notes.txt");
        assert_eq!(notes.extension, "txt");
        assert_eq!(case.get_data_source_id(notes.id).unwrap(), image_id);

        let loaded = case.get_file(notes.id).unwrap();
        assert_eq!(loaded, notes);

        assert_eq!(case.get_root_directory(fs.id).unwrap().id, root.id);
        match case.get_parent(notes.id).unwrap() {
            Some(Content::File(parent)) => assert_eq!(parent.id, home.id),
            other => panic!("unexpected parent {:?}", other),
        }
    }

    #[test]
    fn test_image_round_trip() {
        let (_temp_dir, case) = create_test_case();
        let mut new = NewImage::new(vec![PathBuf::from("/e/img.001"), PathBuf::from("/e/img.002")]);
        new.time_zone = "Europe/Berlin".to_string();
        new.size = 4096;
        let image = case.add_image(new).unwrap();

        let loaded = case.get_image(image.id).unwrap();
        assert_eq!(loaded, image);
        assert_eq!(loaded.image_type, ImageType::RawSplit);
        assert_eq!(loaded.name, "img.001");
        assert_eq!(loaded.unique_path(), "/img_img.001");

        let host = case.hosts().get_host_by_name("img.001 Host").unwrap();
        assert_eq!(host.map(|h| h.id), loaded.host_id);
    }

    #[test]
    fn test_children_and_content_dispatch() {
        let (_temp_dir, case) = create_test_case();
        let (image_id, fs, _root) = create_test_tree(&case);

        let children = case.get_children(image_id).unwrap();
        assert_eq!(children.len(), 1);
        assert!(matches!(children[0], Content::VolumeSystem(_)));

        assert!(matches!(case.get_content(fs.id).unwrap(), Content::FileSystem(_)));
        assert_eq!(case.get_file_systems(image_id).unwrap().len(), 1);
        assert!(case.get_content(9999).unwrap_err().is_data_error());
    }

    #[test]
    fn test_file_system_parent_checked() {
        let (_temp_dir, case) = create_test_case();
        let (_image_id, fs, _root) = create_test_tree(&case);
        let err = case
            .add_file_system(
                fs.id,
                NewFileSystem {
                    img_offset: 0,
                    fs_type: FsType::Raw,
                    block_size: 512,
                    block_count: 1,
                    root_inum: 0,
                    first_inum: 0,
                    last_inum: 0,
                    display_name: None,
                },
            )
            .unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_update_dirty_file() {
        let (_temp_dir, case) = create_test_case();
        let (_image_id, _fs, root) = create_test_tree(&case);
        let mut file = case.add_file(root.id, NewFile::regular("a.exe", 10)).unwrap();

        file.set_md5("D41D8CD98F00B204E9800998ECF8427E");
        file.set_known(FileKnown::Bad);
        case.update_file(&mut file).unwrap();
        assert!(!file.is_dirty());

        let loaded = case.get_file(file.id).unwrap();
        assert_eq!(loaded.known, FileKnown::Bad);
        assert_eq!(case.find_files_by_md5("d41d8cd98f00b204e9800998ecf8427e").unwrap().len(), 1);

        case.set_known(file.id, FileKnown::Known).unwrap();
        case.set_md5(file.id, "ABC").unwrap();
        let loaded = case.get_file(file.id).unwrap();
        assert_eq!(loaded.known, FileKnown::Known);
        assert_eq!(loaded.md5.as_deref(), Some("abc"));
        assert!(case.set_known(9999, FileKnown::Bad).unwrap_err().is_data_error());
    }

    #[test]
    fn test_find_files_and_layout() {
        let (_temp_dir, case) = create_test_case();
        let (image_id, fs, root) = create_test_tree(&case);
        case.add_file(root.id, NewFile::regular("Report.DOCX", 10)).unwrap();
        let carved = case
            .add_layout_file(
                fs.id,
                "carved.jpg",
                vec![LayoutRange::new(4096, 100, 0), LayoutRange::new(9000, 50, 1)],
            )
            .unwrap();

        assert_eq!(carved.size, 150);
        assert_eq!(case.get_file(carved.id).unwrap().layout.len(), 2);

        let found = case.find_files(image_id, "report%").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extension, "docx");
        assert_eq!(case.count_files(image_id).unwrap(), 3);
    }
}
