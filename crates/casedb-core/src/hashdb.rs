//! MD5 hash set lookups against NSRL and known-bad lists
//!
//! A hash set is a text file with one MD5 per line, optionally followed by a
//! separator (space, tab, comma or `|`) and a name. Blank lines and `#`
//! comments are skipped, as are lines that do not start with an MD5. A sorted
//! `.idx` copy of a hash set is preferred when present.

use nom::bytes::complete::take_while_m_n;
use nom::character::complete::one_of;
use nom::combinator::{all_consuming, opt, rest};
use nom::sequence::{pair, preceded};
use nom::IResult;
use rayon::prelude::*;
use rusqlite::params;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::blackboard::{load_attributes, post_analysis_result};
use crate::case::CaseDatabase;
use crate::config::CaseDbConfig;
use crate::error::{CaseDbError, Result};
use crate::model::artifact::{artifact_ids, attribute_ids};
use crate::model::{Attribute, AttributeValue, FileKnown, MetaType};
use crate::scoring::{Priority, Score, Significance};

/// Module name recorded on hash hit results
const HASH_LOOKUP_SOURCE: &str = "Hash Lookup";

fn md5_hex(input: &str) -> IResult<&str, &str> {
    take_while_m_n(32, 32, |c: char| c.is_ascii_hexdigit())(input)
}

fn hash_line(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming(pair(md5_hex, opt(preceded(one_of(" \t,|"), rest))))(input)
}

/// MD5 and optional name of one hash set line
fn parse_hash_line(line: &str) -> Option<(String, Option<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (_, (md5, name)) = hash_line(line).ok()?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Some((md5.to_ascii_lowercase(), name))
}

fn validate_md5(md5: &str) -> Result<String> {
    match all_consuming(md5_hex)(md5) {
        Ok(_) => Ok(md5.to_ascii_lowercase()),
        Err(_) => Err(CaseDbError::invalid(format!("{} is not an MD5 hash", md5))),
    }
}

fn index_path(path: &Path) -> PathBuf {
    let mut index: OsString = path.as_os_str().to_owned();
    index.push(".idx");
    PathBuf::from(index)
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, Option<String>>> {
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<(String, Option<String>)> = content.par_lines().filter_map(parse_hash_line).collect();

    let mut hashes = BTreeMap::new();
    for (md5, name) in entries {
        // First name wins for repeated hashes
        hashes.entry(md5).or_insert(name);
    }
    Ok(hashes)
}

/// One loaded hash set
#[derive(Debug, Clone)]
pub struct HashSetFile {
    path: PathBuf,
    hashes: BTreeMap<String, Option<String>>,
}

impl HashSetFile {
    /// Load a hash set, reading its `.idx` copy when one exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index = index_path(&path);
        let source = if index.exists() { &index } else { &path };
        if !source.exists() {
            return Err(CaseDbError::not_found(format!("hash set {}", path.display())));
        }

        let hashes = read_entries(source)?;
        tracing::info!("Loaded {} hashes from {}", hashes.len(), source.display());
        Ok(Self { path, hashes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn contains(&self, md5: &str) -> bool {
        self.hashes.contains_key(md5)
    }

    /// Name recorded next to the hash, if any
    pub fn name_of(&self, md5: &str) -> Option<&str> {
        self.hashes.get(md5).and_then(|n| n.as_deref())
    }
}

/// The NSRL and known-bad hash sets of a case
#[derive(Debug, Clone, Default)]
pub struct HashDatabase {
    nsrl: Option<HashSetFile>,
    known_bad: Option<HashSetFile>,
}

impl HashDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the hash sets named in the config
    pub fn from_config(config: &CaseDbConfig) -> Result<Self> {
        let mut db = Self::new();
        if let Some(path) = &config.nsrl_db_path {
            db.set_nsrl_database(path)?;
        }
        if let Some(path) = &config.known_bad_db_path {
            db.set_known_bad_database(path)?;
        }
        Ok(db)
    }

    /// Use `path` as the NSRL set; returns the number of hashes loaded
    pub fn set_nsrl_database(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let set = HashSetFile::open(path)?;
        let count = set.len();
        self.nsrl = Some(set);
        Ok(count)
    }

    /// Use `path` as the known-bad set; returns the number of hashes loaded
    pub fn set_known_bad_database(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let set = HashSetFile::open(path)?;
        let count = set.len();
        self.known_bad = Some(set);
        Ok(count)
    }

    pub fn has_nsrl(&self) -> bool {
        self.nsrl.is_some()
    }

    pub fn has_known_bad(&self) -> bool {
        self.known_bad.is_some()
    }

    pub fn nsrl_lookup_md5(&self, md5: &str) -> Result<bool> {
        let md5 = validate_md5(md5)?;
        match &self.nsrl {
            Some(set) => Ok(set.contains(&md5)),
            None => Err(CaseDbError::data("no NSRL database is set")),
        }
    }

    pub fn known_bad_lookup_md5(&self, md5: &str) -> Result<bool> {
        let md5 = validate_md5(md5)?;
        match &self.known_bad {
            Some(set) => Ok(set.contains(&md5)),
            None => Err(CaseDbError::data("no known-bad database is set")),
        }
    }

    /// Known state of a hash across the loaded sets. Known-bad wins over NSRL.
    pub fn lookup_md5(&self, md5: &str) -> Result<FileKnown> {
        let md5 = validate_md5(md5)?;
        if self.known_bad.as_ref().is_some_and(|set| set.contains(&md5)) {
            return Ok(FileKnown::Bad);
        }
        if self.nsrl.as_ref().is_some_and(|set| set.contains(&md5)) {
            return Ok(FileKnown::Known);
        }
        Ok(FileKnown::Unknown)
    }

    /// Write a sorted, de-duplicated `<path>.idx` copy of a hash set
    pub fn create_lookup_index(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let entries = read_entries(path)?;
        let index = index_path(path);

        let mut out = BufWriter::new(File::create(&index)?);
        for (md5, name) in &entries {
            match name {
                Some(name) => writeln!(out, "{}|{}", md5, name)?,
                None => writeln!(out, "{}", md5)?,
            }
        }
        out.flush()?;

        tracing::info!("Wrote lookup index {} ({} hashes)", index.display(), entries.len());
        Ok(index)
    }

    pub fn lookup_index_exists(path: impl AsRef<Path>) -> bool {
        index_path(path.as_ref()).exists()
    }

    /// MD5 of a file's content, read through the case
    pub fn compute_md5(case: &CaseDatabase, file_id: i64) -> Result<String> {
        let content = case.read_all(file_id)?;
        Ok(format!("{:x}", md5::compute(&content)))
    }

    /// Name of the known-bad set, taken from its file name
    fn known_bad_set_name(&self) -> String {
        self.known_bad
            .as_ref()
            .and_then(|set| set.path().file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Known Bad".to_string())
    }

    /// Post a notable TSK_HASHSET_HIT result on the file unless the set
    /// already has one there. Returns true when a result was posted.
    fn post_hash_hit(&self, case: &CaseDatabase, file_id: i64, md5: &str) -> Result<bool> {
        let set_name = self.known_bad_set_name();
        let conclusion = self
            .known_bad
            .as_ref()
            .and_then(|set| set.name_of(md5))
            .unwrap_or_default()
            .to_string();
        let attributes = [
            Attribute::standard(
                attribute_ids::TSK_SET_NAME,
                AttributeValue::String(set_name.clone()),
                HASH_LOOKUP_SOURCE,
            )?,
            Attribute::standard(
                attribute_ids::TSK_HASH_MD5,
                AttributeValue::String(md5.to_string()),
                HASH_LOOKUP_SOURCE,
            )?,
        ];

        case.with_transaction(|trans| {
            let mut stmt = trans.prepare(
                "SELECT artifact_id FROM blackboard_artifacts
                 WHERE obj_id = ?1 AND artifact_type_id = ?2",
            )?;
            let existing = stmt
                .query_map(params![file_id, artifact_ids::TSK_HASHSET_HIT], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            drop(stmt);
            for artifact_id in existing {
                let same_set = load_attributes(trans, artifact_id)?.iter().any(|attr| {
                    attr.attribute_type.type_id == attribute_ids::TSK_SET_NAME
                        && attr.value.as_str() == Some(set_name.as_str())
                });
                if same_set {
                    return Ok(false);
                }
            }

            post_analysis_result(
                trans,
                artifact_ids::TSK_HASHSET_HIT,
                file_id,
                Score::new(Significance::Notable, Priority::Normal),
                &conclusion,
                &set_name,
                "",
                &attributes,
            )?;
            Ok(true)
        })
    }

    /// Hash the regular files of a data source that have no MD5 yet and set
    /// the known state of every file whose MD5 is in a loaded set. Files with
    /// a known-bad hash get a notable TSK_HASHSET_HIT result, which raises
    /// their aggregate score, and are flagged as hash hits on the timeline.
    /// Returns the number of files marked known or bad.
    pub fn apply_known_status(&self, case: &CaseDatabase, data_source_id: i64) -> Result<usize> {
        let files: Vec<(i64, Option<String>)> = {
            let conn = case.connection()?;
            let mut stmt = conn.prepare(
                "SELECT obj_id, md5 FROM tsk_files
                 WHERE data_source_obj_id = ?1 AND meta_type = ?2 ORDER BY obj_id",
            )?;
            let files = stmt
                .query_map(params![data_source_id, MetaType::Reg.code()], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            files
        };

        let hashed: Vec<(i64, Option<String>)> = files
            .into_par_iter()
            .map(|(file_id, md5)| match md5 {
                Some(md5) => (file_id, Some(md5)),
                None => match Self::compute_md5(case, file_id) {
                    Ok(md5) => (file_id, Some(md5)),
                    Err(e) => {
                        tracing::warn!("Could not hash file {}: {}", file_id, e);
                        (file_id, None)
                    }
                },
            })
            .collect();

        let mut flagged = 0;
        for (file_id, md5) in hashed {
            let Some(md5) = md5 else { continue };
            case.set_md5(file_id, &md5)?;
            let known = self.lookup_md5(&md5)?;
            if known == FileKnown::Unknown {
                continue;
            }
            case.set_known(file_id, known)?;
            if known == FileKnown::Bad {
                if self.post_hash_hit(case, file_id, &md5)? {
                    tracing::debug!("Hash set hit on file {}", file_id);
                }
                case.timeline().set_events_hash_hit(file_id, true)?;
            }
            flagged += 1;
        }

        tracing::info!("Applied hash sets to data source {}: {} files flagged", data_source_id, flagged);
        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const WORLD_MD5: &str = "7d793037a0760186574b0282f2f435e7";

    fn write_set(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_lines() {
        assert_eq!(parse_hash_line(HELLO_MD5), Some((HELLO_MD5.to_string(), None)));
        assert_eq!(
            parse_hash_line("5D41402ABC4B2A76B9719D911017C592|hello.txt"),
            Some((HELLO_MD5.to_string(), Some("hello.txt".to_string())))
        );
        assert_eq!(
            parse_hash_line("5d41402abc4b2a76b9719d911017c592  spaced name "),
            Some((HELLO_MD5.to_string(), Some("spaced name".to_string())))
        );
        assert_eq!(parse_hash_line("# comment"), None);
        assert_eq!(parse_hash_line(""), None);
        assert_eq!(parse_hash_line("\"SHA-1\",\"MD5\""), None);
        // A SHA-1 is not an MD5 followed by junk
        assert_eq!(parse_hash_line("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"), None);
    }

    #[test]
    fn test_lookups() {
        let dir = TempDir::new().unwrap();
        let nsrl = write_set(&dir, "nsrl.txt", &format!("{}\n{}\n", HELLO_MD5, WORLD_MD5));
        let bad = write_set(&dir, "bad.txt", &format!("# bad things\n{},world.exe\n", WORLD_MD5));

        let mut db = HashDatabase::new();
        assert!(db.nsrl_lookup_md5(HELLO_MD5).unwrap_err().is_data_error());
        assert_eq!(db.lookup_md5(HELLO_MD5).unwrap(), FileKnown::Unknown);

        assert_eq!(db.set_nsrl_database(&nsrl).unwrap(), 2);
        assert_eq!(db.set_known_bad_database(&bad).unwrap(), 1);

        assert!(db.nsrl_lookup_md5(&HELLO_MD5.to_uppercase()).unwrap());
        assert!(!db.known_bad_lookup_md5(HELLO_MD5).unwrap());
        assert_eq!(db.lookup_md5(HELLO_MD5).unwrap(), FileKnown::Known);
        assert_eq!(db.lookup_md5(WORLD_MD5).unwrap(), FileKnown::Bad);
        assert_eq!(db.lookup_md5("00000000000000000000000000000000").unwrap(), FileKnown::Unknown);
        assert!(db.lookup_md5("xyz").is_err());
    }

    #[test]
    fn test_lookup_index() {
        let dir = TempDir::new().unwrap();
        let set = write_set(&dir, "set.txt", &format!("{}\n{}|first\n{}|second\n", WORLD_MD5, HELLO_MD5, HELLO_MD5));
        assert!(!HashDatabase::lookup_index_exists(&set));

        let index = HashDatabase::create_lookup_index(&set).unwrap();
        assert!(HashDatabase::lookup_index_exists(&set));
        assert_eq!(
            std::fs::read_to_string(&index).unwrap(),
            format!("{}|first\n{}\n", HELLO_MD5, WORLD_MD5)
        );

        let loaded = HashSetFile::open(&set).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.name_of(HELLO_MD5), Some("first"));
    }

    #[test]
    fn test_apply_known_status() {
        let dir = TempDir::new().unwrap();
        let (_case_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "usb.img");

        let hello_path = write_set(&dir, "hello.txt", "hello");
        let world_path = write_set(&dir, "world.txt", "world");
        let other_path = write_set(&dir, "other.txt", "other");
        let hello = case.add_local_file(image_id, "hello.txt", &hello_path).unwrap();
        let world = case.add_local_file(image_id, "world.txt", &world_path).unwrap();
        let other = case.add_local_file(image_id, "other.txt", &other_path).unwrap();

        assert_eq!(HashDatabase::compute_md5(&case, hello.id).unwrap(), HELLO_MD5);

        let mut db = HashDatabase::new();
        db.set_nsrl_database(write_set(&dir, "nsrl.txt", HELLO_MD5)).unwrap();
        db.set_known_bad_database(write_set(&dir, "bad.txt", WORLD_MD5)).unwrap();

        assert_eq!(db.apply_known_status(&case, image_id).unwrap(), 2);
        assert_eq!(case.get_file(hello.id).unwrap().known, FileKnown::Known);
        assert_eq!(case.get_file(world.id).unwrap().known, FileKnown::Bad);
        let other = case.get_file(other.id).unwrap();
        assert_eq!(other.known, FileKnown::Unknown);
        assert!(other.md5.is_some());
    }

    #[test]
    fn test_known_bad_hit_raises_score() {
        let dir = TempDir::new().unwrap();
        let (_case_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "usb.img");
        let world_path = write_set(&dir, "world.txt", "world");
        let world = case.add_local_file(image_id, "world.txt", &world_path).unwrap();

        let mut db = HashDatabase::new();
        db.set_known_bad_database(write_set(&dir, "malware.txt", &format!("{}|dropper", WORLD_MD5)))
            .unwrap();

        assert_eq!(case.scoring().get_aggregate_score(world.id).unwrap(), Score::UNKNOWN);
        db.apply_known_status(&case, image_id).unwrap();
        assert_eq!(
            case.scoring().get_aggregate_score(world.id).unwrap(),
            Score::new(Significance::Notable, Priority::Normal)
        );

        let results = case.blackboard().get_analysis_results(world.id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].artifact.type_id, artifact_ids::TSK_HASHSET_HIT);
        assert_eq!(results[0].conclusion, "dropper");
        let attributes = case.blackboard().get_attributes(results[0].artifact.artifact_id).unwrap();
        assert_eq!(attributes[0].value.as_str(), Some("malware"));

        // A second pass does not post the same hit again
        db.apply_known_status(&case, image_id).unwrap();
        assert_eq!(case.blackboard().get_analysis_results(world.id).unwrap().len(), 1);
    }
}
