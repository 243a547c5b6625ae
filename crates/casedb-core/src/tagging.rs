//! Tags on content and artifacts, tag names and mutually exclusive tag sets

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::blackboard::load_artifact;
use crate::case::content::data_source_of;
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::model::content::to_sql_err;
use crate::model::FileKnown;
use crate::scoring::{self, BAD_TAG_SCORE};
use crate::timeline;

/// A row of `tag_names`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagName {
    pub id: i64,
    pub display_name: String,
    pub description: String,
    pub color: String,
    pub known_status: FileKnown,
    pub tag_set_id: Option<i64>,
    pub rank: i32,
}

/// Named group of tag names; an object carries at most one tag of a set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub id: i64,
    pub name: String,
    pub tag_names: Vec<TagName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTag {
    pub tag_id: i64,
    pub obj_id: i64,
    pub tag_name: TagName,
    pub comment: String,
    pub begin_byte_offset: i64,
    pub end_byte_offset: i64,
    pub examiner_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTag {
    pub tag_id: i64,
    pub artifact_id: i64,
    /// Content the artifact was derived from
    pub source_obj_id: i64,
    pub tag_name: TagName,
    pub comment: String,
    pub examiner_login: Option<String>,
}

/// Result of adding a tag: the new tag and the tags of the same set it replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagChange<T> {
    pub added: T,
    pub removed: Vec<T>,
}

const TAG_NAME_COLUMNS: &str = "tag_names.tag_name_id, tag_names.display_name, tag_names.description,
        tag_names.color, tag_names.knownStatus, tag_names.tag_set_id, tag_names.rank";

fn tag_name_from_row(row: &Row<'_>) -> rusqlite::Result<TagName> {
    let known: i32 = row.get(4)?;
    Ok(TagName {
        id: row.get(0)?,
        display_name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        known_status: to_sql_err(FileKnown::from_code(known))?,
        tag_set_id: row.get(5)?,
        rank: row.get::<_, Option<i32>>(6)?.unwrap_or(0),
    })
}

fn content_tag_from_row(row: &Row<'_>) -> rusqlite::Result<ContentTag> {
    Ok(ContentTag {
        tag_name: tag_name_from_row(row)?,
        tag_id: row.get(7)?,
        obj_id: row.get(8)?,
        comment: row.get(9)?,
        begin_byte_offset: row.get(10)?,
        end_byte_offset: row.get(11)?,
        examiner_login: row.get(12)?,
    })
}

fn artifact_tag_from_row(row: &Row<'_>) -> rusqlite::Result<ArtifactTag> {
    Ok(ArtifactTag {
        tag_name: tag_name_from_row(row)?,
        tag_id: row.get(7)?,
        artifact_id: row.get(8)?,
        comment: row.get(9)?,
        source_obj_id: row.get(10)?,
        examiner_login: row.get(11)?,
    })
}

fn query_tag_names(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<TagName>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tag_names WHERE {} ORDER BY tag_names.rank, tag_names.tag_name_id",
        TAG_NAME_COLUMNS, where_clause
    ))?;
    let names = stmt
        .query_map(args, tag_name_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn load_tag_name(conn: &Connection, tag_name_id: i64) -> Result<TagName> {
    query_tag_names(conn, "tag_name_id = ?1", &[&tag_name_id])?
        .pop()
        .ok_or_else(|| CaseDbError::not_found(format!("tag name {}", tag_name_id)))
}

fn query_content_tags(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ContentTag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, content_tags.tag_id, content_tags.obj_id, content_tags.comment,
                content_tags.begin_byte_offset, content_tags.end_byte_offset,
                tsk_examiners.login_name
         FROM content_tags
         JOIN tag_names ON tag_names.tag_name_id = content_tags.tag_name_id
         LEFT JOIN tsk_examiners ON tsk_examiners.examiner_id = content_tags.examiner_id
         WHERE {} ORDER BY content_tags.tag_id",
        TAG_NAME_COLUMNS, where_clause
    ))?;
    let tags = stmt
        .query_map(args, content_tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn query_artifact_tags(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ArtifactTag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, blackboard_artifact_tags.tag_id, blackboard_artifact_tags.artifact_id,
                blackboard_artifact_tags.comment, blackboard_artifacts.obj_id,
                tsk_examiners.login_name
         FROM blackboard_artifact_tags
         JOIN tag_names ON tag_names.tag_name_id = blackboard_artifact_tags.tag_name_id
         JOIN blackboard_artifacts
            ON blackboard_artifacts.artifact_id = blackboard_artifact_tags.artifact_id
         LEFT JOIN tsk_examiners ON tsk_examiners.examiner_id = blackboard_artifact_tags.examiner_id
         WHERE {} ORDER BY blackboard_artifact_tags.tag_id",
        TAG_NAME_COLUMNS, where_clause
    ))?;
    let tags = stmt
        .query_map(args, artifact_tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Id of the examiner with this login, created on first use
pub(crate) fn get_or_create_examiner(conn: &Connection, login: &str) -> Result<i64> {
    if let Some(id) = conn
        .query_row(
            "SELECT examiner_id FROM tsk_examiners WHERE login_name = ?1",
            params![login],
            |row| row.get(0),
        )
        .optional()?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO tsk_examiners (login_name) VALUES (?1)",
        params![login],
    )?;
    Ok(conn.last_insert_rowid())
}

fn load_tag_set(conn: &Connection, tag_set_id: i64) -> Result<TagSet> {
    let name: String = conn
        .query_row(
            "SELECT name FROM tsk_tag_sets WHERE tag_set_id = ?1",
            params![tag_set_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("tag set {}", tag_set_id)))?;
    Ok(TagSet {
        id: tag_set_id,
        name,
        tag_names: query_tag_names(conn, "tag_set_id = ?1", &[&tag_set_id])?,
    })
}

/// Recompute the score of an object that lost a tag and report the change
fn rescore(conn: &Connection, obj_id: i64, data_source_id: i64) -> Result<Option<CaseEvent>> {
    Ok(
        scoring::update_after_deletion(conn, obj_id, Some(data_source_id))?.map(|score| {
            CaseEvent::AggregateScoreChanged {
                obj_id,
                data_source_id: Some(data_source_id),
                score,
            }
        }),
    )
}

/// Tag operations on a case
pub struct TaggingManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> TaggingManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Create a tag set from existing tag names, ranked in the given order
    pub fn add_tag_set(&self, name: &str, tag_names: &[TagName]) -> Result<TagSet> {
        if name.is_empty() {
            return Err(CaseDbError::invalid("tag set name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            let exists: bool = trans.query_row(
                "SELECT EXISTS (SELECT 1 FROM tsk_tag_sets WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )?;
            if exists {
                return Err(CaseDbError::data(format!("tag set {} already exists", name)));
            }
            trans.execute("INSERT INTO tsk_tag_sets (name) VALUES (?1)", params![name])?;
            let tag_set_id = trans.last_insert_rowid();

            for (rank, tag_name) in tag_names.iter().enumerate() {
                let updated = trans.execute(
                    "UPDATE tag_names SET tag_set_id = ?1, rank = ?2 WHERE tag_name_id = ?3",
                    params![tag_set_id, rank as i32, tag_name.id],
                )?;
                if updated == 0 {
                    return Err(CaseDbError::not_found(format!("tag name {}", tag_name.id)));
                }
            }

            let tag_set = load_tag_set(trans, tag_set_id)?;
            trans.queue_event(CaseEvent::TagSetsAdded(vec![tag_set.clone()]));
            Ok(tag_set)
        })
    }

    /// Append a tag name to an existing set, ranked after its current members
    pub fn add_tag_name_to_tag_set(&self, tag_set: &TagSet, tag_name: &TagName) -> Result<TagSet> {
        self.case.with_transaction(|trans| {
            let next_rank: i32 = trans
                .query_row(
                    "SELECT (SELECT COALESCE(MAX(rank) + 1, 0) FROM tag_names WHERE tag_set_id = ?1)
                     FROM tsk_tag_sets WHERE tag_set_id = ?1",
                    params![tag_set.id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| CaseDbError::not_found(format!("tag set {}", tag_set.id)))?;

            let current = load_tag_name(trans, tag_name.id)?;
            if current.tag_set_id == Some(tag_set.id) {
                return load_tag_set(trans, tag_set.id);
            }
            if let Some(other) = current.tag_set_id {
                return Err(CaseDbError::data(format!(
                    "tag name {} already belongs to tag set {}",
                    current.display_name, other
                )));
            }
            trans.execute(
                "UPDATE tag_names SET tag_set_id = ?1, rank = ?2 WHERE tag_name_id = ?3",
                params![tag_set.id, next_rank, tag_name.id],
            )?;

            let updated = load_tag_set(trans, tag_set.id)?;
            trans.queue_event(CaseEvent::TagSetsUpdated(vec![updated.clone()]));
            Ok(updated)
        })
    }

    /// Delete a tag set and its tag names. Fails while any of them is in use.
    pub fn delete_tag_set(&self, tag_set: &TagSet) -> Result<()> {
        self.case.with_transaction(|trans| {
            let in_use: i64 = trans.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM content_tags
                     JOIN tag_names ON tag_names.tag_name_id = content_tags.tag_name_id
                     WHERE tag_names.tag_set_id = ?1)
                  + (SELECT COUNT(*) FROM blackboard_artifact_tags
                     JOIN tag_names ON tag_names.tag_name_id = blackboard_artifact_tags.tag_name_id
                     WHERE tag_names.tag_set_id = ?1)",
                params![tag_set.id],
                |row| row.get(0),
            )?;
            if in_use > 0 {
                return Err(CaseDbError::data(format!(
                    "tag set {} is used by {} tag(s)",
                    tag_set.name, in_use
                )));
            }
            trans.execute("DELETE FROM tag_names WHERE tag_set_id = ?1", params![tag_set.id])?;
            let deleted = trans.execute(
                "DELETE FROM tsk_tag_sets WHERE tag_set_id = ?1",
                params![tag_set.id],
            )?;
            if deleted == 0 {
                return Err(CaseDbError::not_found(format!("tag set {}", tag_set.id)));
            }
            trans.queue_event(CaseEvent::TagSetsDeleted(vec![tag_set.id]));
            Ok(())
        })
    }

    pub fn get_tag_sets(&self) -> Result<Vec<TagSet>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare("SELECT tag_set_id FROM tsk_tag_sets ORDER BY tag_set_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids.into_iter().map(|id| load_tag_set(&conn, id)).collect()
    }

    /// The set a tag name belongs to, if any
    pub fn get_tag_set(&self, tag_name: &TagName) -> Result<Option<TagSet>> {
        let conn = self.case.connection()?;
        match load_tag_name(&conn, tag_name.id)?.tag_set_id {
            Some(tag_set_id) => Ok(Some(load_tag_set(&conn, tag_set_id)?)),
            None => Ok(None),
        }
    }

    /// Create a tag name, or update the description, color and known status
    /// of the one with this display name
    pub fn add_or_update_tag_name(
        &self,
        display_name: &str,
        description: &str,
        color: &str,
        known_status: FileKnown,
    ) -> Result<TagName> {
        if display_name.is_empty() {
            return Err(CaseDbError::invalid("tag name must not be empty"));
        }
        let conn = self.case.connection()?;
        conn.execute(
            "INSERT INTO tag_names (display_name, description, color, knownStatus)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(display_name) DO UPDATE SET description = excluded.description,
                                                      color = excluded.color,
                                                      knownStatus = excluded.knownStatus",
            params![display_name, description, color, known_status.code()],
        )?;
        query_tag_names(&conn, "display_name = ?1", &[&display_name])?
            .pop()
            .ok_or_else(|| CaseDbError::core(format!("tag name {} was not stored", display_name)))
    }

    pub fn get_tag_names(&self) -> Result<Vec<TagName>> {
        query_tag_names(&*self.case.connection()?, "1", &[])
    }

    pub fn get_tag_name(&self, tag_name_id: i64) -> Result<TagName> {
        load_tag_name(&*self.case.connection()?, tag_name_id)
    }

    /// Tag content. Tags of the same set already on the content are removed.
    pub fn add_content_tag(
        &self,
        obj_id: i64,
        tag_name: &TagName,
        comment: &str,
        begin_byte_offset: i64,
        end_byte_offset: i64,
    ) -> Result<TagChange<ContentTag>> {
        let examiner = self.case.config().examiner_login.clone();
        self.case.with_transaction(|trans| {
            let tag_name = load_tag_name(trans, tag_name.id)?;
            let data_source_id = data_source_of(trans, obj_id)?;

            let removed = match tag_name.tag_set_id {
                Some(tag_set_id) => {
                    let removed = query_content_tags(
                        trans,
                        "content_tags.obj_id = ?1 AND tag_names.tag_set_id = ?2",
                        &[&obj_id, &tag_set_id],
                    )?;
                    for tag in &removed {
                        trans.execute("DELETE FROM content_tags WHERE tag_id = ?1", params![tag.tag_id])?;
                    }
                    removed
                }
                None => Vec::new(),
            };

            let examiner_id = get_or_create_examiner(trans, &examiner)?;
            trans.execute(
                "INSERT INTO content_tags
                    (obj_id, tag_name_id, comment, begin_byte_offset, end_byte_offset, examiner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![obj_id, tag_name.id, comment, begin_byte_offset, end_byte_offset, examiner_id],
            )?;
            let added = ContentTag {
                tag_id: trans.last_insert_rowid(),
                obj_id,
                tag_name: tag_name.clone(),
                comment: comment.to_string(),
                begin_byte_offset,
                end_byte_offset,
                examiner_login: Some(examiner.clone()),
            };

            let score_event = if !removed.is_empty() {
                rescore(trans, obj_id, data_source_id)?
            } else if tag_name.known_status == FileKnown::Bad {
                scoring::update_after_addition(trans, obj_id, Some(data_source_id), BAD_TAG_SCORE)?
                    .map(|score| CaseEvent::AggregateScoreChanged {
                        obj_id,
                        data_source_id: Some(data_source_id),
                        score,
                    })
            } else {
                None
            };
            timeline::update_tagged(trans, obj_id, None, true)?;

            if !removed.is_empty() {
                trans.queue_event(CaseEvent::TagsDeleted { obj_ids: vec![obj_id] });
            }
            trans.queue_event(CaseEvent::TagsAdded { obj_ids: vec![obj_id] });
            if let Some(event) = score_event {
                trans.queue_event(event);
            }
            Ok(TagChange { added, removed })
        })
    }

    /// Tag an artifact. Tags of the same set already on it are removed.
    pub fn add_artifact_tag(&self, artifact_id: i64, tag_name: &TagName, comment: &str) -> Result<TagChange<ArtifactTag>> {
        let examiner = self.case.config().examiner_login.clone();
        self.case.with_transaction(|trans| {
            let tag_name = load_tag_name(trans, tag_name.id)?;
            let artifact = load_artifact(trans, artifact_id)?;

            let removed = match tag_name.tag_set_id {
                Some(tag_set_id) => {
                    let removed = query_artifact_tags(
                        trans,
                        "blackboard_artifact_tags.artifact_id = ?1 AND tag_names.tag_set_id = ?2",
                        &[&artifact_id, &tag_set_id],
                    )?;
                    for tag in &removed {
                        trans.execute(
                            "DELETE FROM blackboard_artifact_tags WHERE tag_id = ?1",
                            params![tag.tag_id],
                        )?;
                    }
                    removed
                }
                None => Vec::new(),
            };

            let examiner_id = get_or_create_examiner(trans, &examiner)?;
            trans.execute(
                "INSERT INTO blackboard_artifact_tags (artifact_id, tag_name_id, comment, examiner_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![artifact_id, tag_name.id, comment, examiner_id],
            )?;
            let added = ArtifactTag {
                tag_id: trans.last_insert_rowid(),
                artifact_id,
                source_obj_id: artifact.source_obj_id,
                tag_name: tag_name.clone(),
                comment: comment.to_string(),
                examiner_login: Some(examiner.clone()),
            };

            let data_source_id = artifact.data_source_obj_id;
            let score_event = if !removed.is_empty() {
                rescore(trans, artifact.obj_id, data_source_id)?
            } else if tag_name.known_status == FileKnown::Bad {
                scoring::update_after_addition(trans, artifact.obj_id, Some(data_source_id), BAD_TAG_SCORE)?
                    .map(|score| CaseEvent::AggregateScoreChanged {
                        obj_id: artifact.obj_id,
                        data_source_id: Some(data_source_id),
                        score,
                    })
            } else {
                None
            };
            timeline::update_tagged(trans, artifact.source_obj_id, Some(artifact_id), true)?;

            if !removed.is_empty() {
                trans.queue_event(CaseEvent::TagsDeleted { obj_ids: vec![artifact.obj_id] });
            }
            trans.queue_event(CaseEvent::TagsAdded { obj_ids: vec![artifact.obj_id] });
            if let Some(event) = score_event {
                trans.queue_event(event);
            }
            Ok(TagChange { added, removed })
        })
    }

    pub fn delete_content_tag(&self, tag_id: i64) -> Result<()> {
        self.case.with_transaction(|trans| {
            let tag = query_content_tags(trans, "content_tags.tag_id = ?1", &[&tag_id])?
                .pop()
                .ok_or_else(|| CaseDbError::not_found(format!("content tag {}", tag_id)))?;
            trans.execute("DELETE FROM content_tags WHERE tag_id = ?1", params![tag_id])?;

            let data_source_id = data_source_of(trans, tag.obj_id)?;
            let score_event = rescore(trans, tag.obj_id, data_source_id)?;
            let still_tagged: bool = trans.query_row(
                "SELECT EXISTS (SELECT 1 FROM content_tags WHERE obj_id = ?1)",
                params![tag.obj_id],
                |row| row.get(0),
            )?;
            if !still_tagged {
                timeline::update_tagged(trans, tag.obj_id, None, false)?;
            }

            trans.queue_event(CaseEvent::TagsDeleted { obj_ids: vec![tag.obj_id] });
            if let Some(event) = score_event {
                trans.queue_event(event);
            }
            Ok(())
        })
    }

    pub fn delete_artifact_tag(&self, tag_id: i64) -> Result<()> {
        self.case.with_transaction(|trans| {
            let tag = query_artifact_tags(trans, "blackboard_artifact_tags.tag_id = ?1", &[&tag_id])?
                .pop()
                .ok_or_else(|| CaseDbError::not_found(format!("artifact tag {}", tag_id)))?;
            let artifact = load_artifact(trans, tag.artifact_id)?;
            trans.execute("DELETE FROM blackboard_artifact_tags WHERE tag_id = ?1", params![tag_id])?;

            let score_event = rescore(trans, artifact.obj_id, artifact.data_source_obj_id)?;
            let still_tagged: bool = trans.query_row(
                "SELECT EXISTS (SELECT 1 FROM blackboard_artifact_tags WHERE artifact_id = ?1)",
                params![artifact.artifact_id],
                |row| row.get(0),
            )?;
            if !still_tagged {
                timeline::update_tagged(trans, artifact.source_obj_id, Some(artifact.artifact_id), false)?;
            }

            trans.queue_event(CaseEvent::TagsDeleted { obj_ids: vec![artifact.obj_id] });
            if let Some(event) = score_event {
                trans.queue_event(event);
            }
            Ok(())
        })
    }

    pub fn get_content_tags(&self, obj_id: i64) -> Result<Vec<ContentTag>> {
        query_content_tags(&*self.case.connection()?, "content_tags.obj_id = ?1", &[&obj_id])
    }

    pub fn get_artifact_tags(&self, artifact_id: i64) -> Result<Vec<ArtifactTag>> {
        query_artifact_tags(
            &*self.case.connection()?,
            "blackboard_artifact_tags.artifact_id = ?1",
            &[&artifact_id],
        )
    }

    /// Content tags using a tag name, across the case
    pub fn get_content_tags_by_tag_name(&self, tag_name: &TagName) -> Result<Vec<ContentTag>> {
        query_content_tags(
            &*self.case.connection()?,
            "content_tags.tag_name_id = ?1",
            &[&tag_name.id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::model::artifact::artifact_ids;
    use crate::model::NewFile;
    use crate::scoring::{Score, Significance};
    use crate::timeline::Interval;

    fn create_test_file(case: &CaseDatabase) -> i64 {
        let image_id = add_test_image(case, "disk.dd");
        case.add_file(image_id, NewFile::regular("photo.jpg", 10).with_times(0, 50, 0, 0))
            .unwrap()
            .id
    }

    #[test]
    fn test_tag_names_upsert() {
        let (_temp_dir, case) = create_test_case();
        let tagging = case.tagging();

        let name = tagging.add_or_update_tag_name("Follow Up", "", "Yellow", FileKnown::Unknown).unwrap();
        let updated = tagging
            .add_or_update_tag_name("Follow Up", "check later", "Orange", FileKnown::Unknown)
            .unwrap();
        assert_eq!(updated.id, name.id);
        assert_eq!(updated.color, "Orange");
        assert_eq!(tagging.get_tag_names().unwrap().len(), 1);
        assert_eq!(tagging.get_tag_name(name.id).unwrap().description, "check later");
    }

    #[test]
    fn test_tag_set_is_exclusive() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let tagging = case.tagging();

        let cat1 = tagging.add_or_update_tag_name("CAT-1", "", "Red", FileKnown::Bad).unwrap();
        let cat2 = tagging.add_or_update_tag_name("CAT-2", "", "Orange", FileKnown::Bad).unwrap();
        let set = tagging.add_tag_set("Project VIC", &[cat1.clone(), cat2.clone()]).unwrap();
        assert_eq!(set.tag_names.len(), 2);
        assert_eq!(set.tag_names[1].rank, 1);
        assert_eq!(tagging.get_tag_set(&cat2).unwrap().unwrap().id, set.id);
        assert!(tagging.add_tag_set("Project VIC", &[]).unwrap_err().is_data_error());

        let first = tagging.add_content_tag(file_id, &cat1, "", 0, 0).unwrap();
        assert!(first.removed.is_empty());
        assert_eq!(first.added.examiner_login.as_deref(), Some("tester"));

        let second = tagging.add_content_tag(file_id, &cat2, "", 0, 0).unwrap();
        assert_eq!(second.removed, vec![first.added]);
        let remaining = tagging.get_content_tags(file_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tag_name.display_name, "CAT-2");

        assert!(tagging.delete_tag_set(&set).unwrap_err().is_data_error());
    }

    #[test]
    fn test_bad_tag_scores_and_flags_events() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        case.timeline().add_file_system_events(file_id).unwrap();
        let tagging = case.tagging();
        let bad = tagging.add_or_update_tag_name("Evidence", "", "Red", FileKnown::Bad).unwrap();

        let change = tagging.add_content_tag(file_id, &bad, "contraband", 0, 10).unwrap();
        let score = case.scoring().get_aggregate_score(file_id).unwrap();
        assert_eq!(score.significance, Significance::Notable);
        let ids = case.timeline().get_event_ids(Interval::all(), None).unwrap();
        assert!(case.timeline().get_event(ids[0]).unwrap().tagged);

        tagging.delete_content_tag(change.added.tag_id).unwrap();
        assert_eq!(case.scoring().get_aggregate_score(file_id).unwrap(), Score::UNKNOWN);
        assert!(!case.timeline().get_event(ids[0]).unwrap().tagged);
        assert!(tagging.delete_content_tag(change.added.tag_id).is_err());
    }

    #[test]
    fn test_artifact_tags() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let artifact = case.blackboard().new_artifact(artifact_ids::TSK_GEN_INFO, file_id).unwrap();
        let tagging = case.tagging();
        let bad = tagging.add_or_update_tag_name("Suspicious", "", "Red", FileKnown::Bad).unwrap();

        let change = tagging.add_artifact_tag(artifact.artifact_id, &bad, "").unwrap();
        assert_eq!(change.added.source_obj_id, file_id);
        assert_eq!(tagging.get_artifact_tags(artifact.artifact_id).unwrap().len(), 1);
        assert_eq!(
            case.scoring().get_aggregate_score(artifact.obj_id).unwrap().significance,
            Significance::Notable
        );

        tagging.delete_artifact_tag(change.added.tag_id).unwrap();
        assert!(tagging.get_artifact_tags(artifact.artifact_id).unwrap().is_empty());
        assert_eq!(case.scoring().get_aggregate_score(artifact.obj_id).unwrap(), Score::UNKNOWN);
    }

    #[test]
    fn test_delete_unused_tag_set() {
        let (_temp_dir, case) = create_test_case();
        let tagging = case.tagging();
        let name = tagging.add_or_update_tag_name("Low", "", "Green", FileKnown::Unknown).unwrap();
        let set = tagging.add_tag_set("Priority", &[name]).unwrap();

        tagging.delete_tag_set(&set).unwrap();
        assert!(tagging.get_tag_sets().unwrap().is_empty());
        assert!(tagging.get_tag_names().unwrap().is_empty());
    }

    #[test]
    fn test_add_tag_name_to_tag_set() {
        let (_temp_dir, case) = create_test_case();
        let tagging = case.tagging();
        let high = tagging.add_or_update_tag_name("High", "", "Red", FileKnown::Unknown).unwrap();
        let low = tagging.add_or_update_tag_name("Low", "", "Green", FileKnown::Unknown).unwrap();
        let set = tagging.add_tag_set("Priority", &[high]).unwrap();

        let updated = tagging.add_tag_name_to_tag_set(&set, &low).unwrap();
        assert_eq!(updated.tag_names.len(), 2);
        let added = updated.tag_names.iter().find(|t| t.id == low.id).unwrap();
        assert_eq!(added.rank, 1);
        assert_eq!(added.tag_set_id, Some(set.id));
        assert_eq!(tagging.get_tag_set(&low).unwrap().unwrap().id, set.id);

        let again = tagging.add_tag_name_to_tag_set(&set, &low).unwrap();
        assert_eq!(again.tag_names.len(), 2);

        let other = tagging.add_tag_set("Other", &[]).unwrap();
        assert!(tagging.add_tag_name_to_tag_set(&other, &low).unwrap_err().is_data_error());
    }
}
