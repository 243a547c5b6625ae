//! Aggregate scores: the most significant verdict reached about each object

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::case::content::load_content;
use crate::case::{id_list, CaseDatabase};
use crate::error::Result;
use crate::model::{code_enum, Content, FileKnown};

code_enum! {
    /// How significant a verdict is
    Significance: i32 {
        Unknown = 0 => "Unknown",
        LikelyNone = 8 => "Likely Not Notable",
        None = 10 => "Not Notable",
        LikelyNotable = 18 => "Likely Notable",
        Notable = 20 => "Notable",
    }
}

code_enum! {
    /// Override scores win over any normal score
    Priority: i32 {
        Normal = 0 => "Normal",
        Override = 10 => "Override",
    }
}

/// A significance with a priority, ordered by priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub significance: Significance,
    pub priority: Priority,
}

impl Score {
    pub const UNKNOWN: Score = Score {
        significance: Significance::Unknown,
        priority: Priority::Normal,
    };

    pub fn new(significance: Significance, priority: Priority) -> Self {
        Self { significance, priority }
    }

    pub fn from_codes(significance: i32, priority: i32) -> Result<Self> {
        Ok(Self {
            significance: Significance::from_code(significance)?,
            priority: Priority::from_code(priority)?,
        })
    }

    pub fn is_unknown(&self) -> bool {
        self.significance == Significance::Unknown
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority.code(), self.significance.code())
            .cmp(&(other.priority.code(), other.significance.code()))
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.significance, self.priority)
    }
}

/// Score contributed by a tag whose name is known bad
pub(crate) const BAD_TAG_SCORE: Score = Score {
    significance: Significance::Notable,
    priority: Priority::Normal,
};

pub(crate) fn get_aggregate_score(conn: &Connection, obj_id: i64) -> Result<Score> {
    let codes: Option<(i32, i32)> = conn
        .query_row(
            "SELECT significance, priority FROM tsk_aggregate_score WHERE obj_id = ?1",
            params![obj_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match codes {
        Some((significance, priority)) => Score::from_codes(significance, priority),
        None => Ok(Score::UNKNOWN),
    }
}

fn store_score(conn: &Connection, obj_id: i64, data_source_id: Option<i64>, score: Score) -> Result<()> {
    conn.execute(
        "INSERT INTO tsk_aggregate_score (obj_id, data_source_obj_id, significance, priority)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(obj_id) DO UPDATE SET significance = excluded.significance,
                                           priority = excluded.priority",
        params![obj_id, data_source_id, score.significance.code(), score.priority.code()],
    )?;
    Ok(())
}

/// Raise the aggregate score of `obj_id` to `new_score` if it is higher or
/// the current score is unknown. Returns the stored score when it changed.
pub(crate) fn update_after_addition(
    conn: &Connection,
    obj_id: i64,
    data_source_id: Option<i64>,
    new_score: Score,
) -> Result<Option<Score>> {
    let current = get_aggregate_score(conn, obj_id)?;
    if new_score.is_unknown() || (!current.is_unknown() && new_score <= current) {
        return Ok(None);
    }
    store_score(conn, obj_id, data_source_id, new_score)?;
    Ok(Some(new_score))
}

/// Recompute the aggregate score of `obj_id` from its remaining analysis
/// results and known-bad tags. Returns the new score when it changed.
pub(crate) fn update_after_deletion(
    conn: &Connection,
    obj_id: i64,
    data_source_id: Option<i64>,
) -> Result<Option<Score>> {
    let current = get_aggregate_score(conn, obj_id)?;

    let mut stmt = conn.prepare(
        "SELECT r.significance, r.priority
         FROM tsk_analysis_results r
         JOIN blackboard_artifacts a ON a.artifact_obj_id = r.obj_id
         WHERE a.obj_id = ?1 AND r.ignore_score = 0",
    )?;
    let mut recomputed = Score::UNKNOWN;
    let rows = stmt.query_map(params![obj_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    for row in rows {
        let (significance, priority) = row?;
        recomputed = recomputed.max(Score::from_codes(significance, priority)?);
    }

    let bad_tags: i64 = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM content_tags t
             JOIN tag_names n ON n.tag_name_id = t.tag_name_id
             WHERE t.obj_id = ?1 AND n.knownStatus = ?2)
          + (SELECT COUNT(*) FROM blackboard_artifact_tags t
             JOIN tag_names n ON n.tag_name_id = t.tag_name_id
             JOIN blackboard_artifacts a ON a.artifact_id = t.artifact_id
             WHERE a.artifact_obj_id = ?1 AND n.knownStatus = ?2)",
        params![obj_id, FileKnown::Bad.code()],
        |row| row.get(0),
    )?;
    if bad_tags > 0 {
        recomputed = recomputed.max(BAD_TAG_SCORE);
    }

    if recomputed == current {
        return Ok(None);
    }
    if recomputed.is_unknown() {
        conn.execute("DELETE FROM tsk_aggregate_score WHERE obj_id = ?1", params![obj_id])?;
    } else {
        store_score(conn, obj_id, data_source_id, recomputed)?;
    }
    Ok(Some(recomputed))
}

/// Aggregate score queries
pub struct ScoringManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> ScoringManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Score of an object; objects never scored are unknown
    pub fn get_aggregate_score(&self, obj_id: i64) -> Result<Score> {
        get_aggregate_score(&*self.case.connection()?, obj_id)
    }

    /// Scores of several objects. Objects without a stored score map to unknown.
    pub fn get_aggregate_scores(&self, obj_ids: &[i64]) -> Result<HashMap<i64, Score>> {
        let mut scores: HashMap<i64, Score> = obj_ids.iter().map(|id| (*id, Score::UNKNOWN)).collect();
        if obj_ids.is_empty() {
            return Ok(scores);
        }

        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT obj_id, significance, priority FROM tsk_aggregate_score WHERE obj_id IN ({})",
            id_list(obj_ids)
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        for row in rows {
            let (obj_id, significance, priority): (i64, i32, i32) = row?;
            scores.insert(obj_id, Score::from_codes(significance, priority)?);
        }
        Ok(scores)
    }

    /// Number of scored objects in a data source with the given significance
    pub fn get_content_count(&self, data_source_id: i64, significance: Significance) -> Result<i64> {
        let conn = self.case.connection()?;
        Ok(conn.query_row(
            "SELECT COUNT(obj_id) FROM tsk_aggregate_score
             WHERE data_source_obj_id = ?1 AND significance = ?2",
            params![data_source_id, significance.code()],
            |row| row.get(0),
        )?)
    }

    /// Scored objects in a data source with the given significance
    pub fn get_content(&self, data_source_id: i64, significance: Significance) -> Result<Vec<Content>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT obj_id FROM tsk_aggregate_score
             WHERE data_source_obj_id = ?1 AND significance = ?2 ORDER BY obj_id",
        )?;
        let ids = stmt
            .query_map(params![data_source_id, significance.code()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids.into_iter().map(|id| load_content(&conn, id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::model::NewFile;

    #[test]
    fn test_score_ordering() {
        let notable = Score::new(Significance::Notable, Priority::Normal);
        let likely_none_override = Score::new(Significance::LikelyNone, Priority::Override);
        let likely_notable = Score::new(Significance::LikelyNotable, Priority::Normal);

        assert!(likely_none_override > notable);
        assert!(notable > likely_notable);
        assert!(likely_notable > Score::UNKNOWN);
        assert_eq!(notable.to_string(), "Notable (Normal)");
    }

    #[test]
    fn test_addition_only_raises() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "disk.dd");
        let file_id = case.add_file(image_id, NewFile::regular("a.txt", 1)).unwrap().id;
        let conn = case.connection().unwrap();

        let likely = Score::new(Significance::LikelyNotable, Priority::Normal);
        let none = Score::new(Significance::None, Priority::Normal);

        assert_eq!(update_after_addition(&conn, file_id, Some(image_id), likely).unwrap(), Some(likely));
        assert_eq!(update_after_addition(&conn, file_id, Some(image_id), none).unwrap(), None);
        assert_eq!(update_after_addition(&conn, file_id, Some(image_id), Score::UNKNOWN).unwrap(), None);
        assert_eq!(get_aggregate_score(&conn, file_id).unwrap(), likely);
    }

    #[test]
    fn test_content_by_significance() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "disk.dd");
        let a = case.add_file(image_id, NewFile::regular("a.txt", 1)).unwrap().id;
        let b = case.add_file(image_id, NewFile::regular("b.txt", 1)).unwrap().id;
        {
            let conn = case.connection().unwrap();
            let notable = Score::new(Significance::Notable, Priority::Normal);
            update_after_addition(&conn, a, Some(image_id), notable).unwrap();
        }

        let scoring = case.scoring();
        assert_eq!(scoring.get_content_count(image_id, Significance::Notable).unwrap(), 1);
        let content = scoring.get_content(image_id, Significance::Notable).unwrap();
        assert_eq!(content[0].id(), a);

        let scores = scoring.get_aggregate_scores(&[a, b]).unwrap();
        assert_eq!(scores[&a].significance, Significance::Notable);
        assert_eq!(scores[&b], Score::UNKNOWN);
    }
}
