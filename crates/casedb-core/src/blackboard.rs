//! Blackboard: artifacts, attributes and analysis results posted against content

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::case::content::{data_source_of, insert_object};
use crate::case::{CaseDatabase, CaseDbTransaction};
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::model::content::to_sql_err;
use crate::model::{
    ArtifactCategory, ArtifactType, Attribute, AttributeType, AttributeValue, AttributeValueType,
    BlackboardArtifact, ObjectType, ReviewStatus,
};
use crate::scoring::{self, Score};

/// First id handed out to types added at run time
const CUSTOM_TYPE_ID_BASE: i32 = 10000;

const ARTIFACT_SELECT: &str = "SELECT blackboard_artifacts.artifact_id,
        blackboard_artifacts.artifact_obj_id, blackboard_artifacts.obj_id,
        blackboard_artifacts.data_source_obj_id, blackboard_artifacts.artifact_type_id,
        blackboard_artifact_types.type_name, blackboard_artifact_types.display_name,
        blackboard_artifacts.review_status_id
     FROM blackboard_artifacts
     JOIN blackboard_artifact_types
        ON blackboard_artifact_types.artifact_type_id = blackboard_artifacts.artifact_type_id";

/// An analysis result and the verdict it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub artifact: BlackboardArtifact,
    pub score: Score,
    pub conclusion: String,
    pub configuration: String,
    pub justification: String,
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<BlackboardArtifact> {
    let status: i32 = row.get(7)?;
    Ok(BlackboardArtifact {
        artifact_id: row.get(0)?,
        obj_id: row.get(1)?,
        source_obj_id: row.get(2)?,
        data_source_obj_id: row.get(3)?,
        type_id: row.get(4)?,
        type_name: row.get(5)?,
        display_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        review_status: to_sql_err(ReviewStatus::from_code(status))?,
    })
}

fn artifact_type_from_row(row: &Row<'_>) -> rusqlite::Result<ArtifactType> {
    let category: i32 = row.get(3)?;
    Ok(ArtifactType {
        type_id: row.get(0)?,
        type_name: row.get(1)?,
        display_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        category: to_sql_err(ArtifactCategory::from_code(category))?,
    })
}

pub(crate) fn attribute_type_from_row(row: &Row<'_>) -> rusqlite::Result<AttributeType> {
    let value_type: i32 = row.get(3)?;
    Ok(AttributeType {
        type_id: row.get(0)?,
        type_name: row.get(1)?,
        display_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        value_type: to_sql_err(AttributeValueType::from_code(value_type))?,
    })
}

pub(crate) fn load_artifact_type(conn: &Connection, type_id: i32) -> Result<ArtifactType> {
    conn.query_row(
        "SELECT artifact_type_id, type_name, display_name, category_type
         FROM blackboard_artifact_types WHERE artifact_type_id = ?1",
        params![type_id],
        artifact_type_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("artifact type {}", type_id)))
}

pub(crate) fn load_attribute_type(conn: &Connection, type_id: i32) -> Result<AttributeType> {
    conn.prepare_cached(
        "SELECT attribute_type_id, type_name, display_name, value_type
         FROM blackboard_attribute_types WHERE attribute_type_id = ?1",
    )?
    .query_row(params![type_id], attribute_type_from_row)
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("attribute type {}", type_id)))
}

fn find_artifact_type(conn: &Connection, type_name: &str) -> Result<Option<ArtifactType>> {
    Ok(conn
        .query_row(
            "SELECT artifact_type_id, type_name, display_name, category_type
             FROM blackboard_artifact_types WHERE type_name = ?1",
            params![type_name],
            artifact_type_from_row,
        )
        .optional()?)
}

fn find_attribute_type(conn: &Connection, type_name: &str) -> Result<Option<AttributeType>> {
    Ok(conn
        .query_row(
            "SELECT attribute_type_id, type_name, display_name, value_type
             FROM blackboard_attribute_types WHERE type_name = ?1",
            params![type_name],
            attribute_type_from_row,
        )
        .optional()?)
}

pub(crate) fn load_artifact(conn: &Connection, artifact_id: i64) -> Result<BlackboardArtifact> {
    conn.query_row(
        &format!("{} WHERE blackboard_artifacts.artifact_id = ?1", ARTIFACT_SELECT),
        params![artifact_id],
        artifact_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("artifact {}", artifact_id)))
}

pub(crate) fn load_artifact_by_obj_id(conn: &Connection, obj_id: i64) -> Result<BlackboardArtifact> {
    conn.query_row(
        &format!("{} WHERE blackboard_artifacts.artifact_obj_id = ?1", ARTIFACT_SELECT),
        params![obj_id],
        artifact_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("artifact object {}", obj_id)))
}

fn query_artifacts(conn: &Connection, where_clause: &str, arg: i64) -> Result<Vec<BlackboardArtifact>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {} ORDER BY blackboard_artifacts.artifact_id",
        ARTIFACT_SELECT, where_clause
    ))?;
    let artifacts = stmt
        .query_map(params![arg], artifact_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(artifacts)
}

/// Insert the object and artifact rows for a new artifact on `source_obj_id`
pub(crate) fn insert_artifact(conn: &Connection, type_id: i32, source_obj_id: i64) -> Result<BlackboardArtifact> {
    let artifact_type = load_artifact_type(conn, type_id)?;
    let data_source_obj_id = data_source_of(conn, source_obj_id)?;
    let obj_id = insert_object(conn, Some(source_obj_id), ObjectType::Artifact)?;

    conn.execute(
        "INSERT INTO blackboard_artifacts
            (obj_id, artifact_obj_id, data_source_obj_id, artifact_type_id, review_status_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            source_obj_id,
            obj_id,
            data_source_obj_id,
            type_id,
            ReviewStatus::Undecided.code()
        ],
    )?;

    Ok(BlackboardArtifact {
        artifact_id: conn.last_insert_rowid(),
        obj_id,
        source_obj_id,
        data_source_obj_id,
        type_id,
        type_name: artifact_type.type_name,
        display_name: artifact_type.display_name,
        review_status: ReviewStatus::Undecided,
    })
}

/// Value split over the `value_byte`, `value_text`, `value_int32`,
/// `value_int64` and `value_double` columns
pub(crate) type ValueColumns<'v> = (Option<&'v [u8]>, Option<&'v str>, Option<i32>, Option<i64>, Option<f64>);

pub(crate) fn value_columns(value: &AttributeValue) -> ValueColumns<'_> {
    match value {
        AttributeValue::Byte(b) => (Some(b.as_slice()), None, None, None, None),
        AttributeValue::String(s) => (None, Some(s.as_str()), None, None, None),
        AttributeValue::Integer(v) => (None, None, Some(*v), None, None),
        AttributeValue::Long(v) | AttributeValue::DateTime(v) => (None, None, None, Some(*v), None),
        AttributeValue::Double(v) => (None, None, None, None, Some(*v)),
    }
}

/// Read a value of `value_type` from the five value columns starting at `first`
pub(crate) fn value_from_columns(
    row: &Row<'_>,
    value_type: AttributeValueType,
    first: usize,
) -> rusqlite::Result<AttributeValue> {
    Ok(match value_type {
        AttributeValueType::Byte => {
            AttributeValue::Byte(row.get::<_, Option<Vec<u8>>>(first)?.unwrap_or_default())
        }
        AttributeValueType::String => {
            AttributeValue::String(row.get::<_, Option<String>>(first + 1)?.unwrap_or_default())
        }
        AttributeValueType::Integer => AttributeValue::Integer(row.get(first + 2)?),
        AttributeValueType::Long => AttributeValue::Long(row.get(first + 3)?),
        AttributeValueType::DateTime => AttributeValue::DateTime(row.get(first + 3)?),
        AttributeValueType::Double => AttributeValue::Double(row.get(first + 4)?),
    })
}

/// Refuse a value whose type differs from the stored attribute type
pub(crate) fn check_value_type(conn: &Connection, attribute_type: &AttributeType, value: &AttributeValue) -> Result<()> {
    let stored_type = load_attribute_type(conn, attribute_type.type_id)?;
    if stored_type.value_type != value.value_type() {
        return Err(CaseDbError::invalid(format!(
            "attribute {} holds {} values, got {}",
            stored_type.type_name,
            stored_type.value_type,
            value.value_type()
        )));
    }
    Ok(())
}

/// Store each value in the column that matches its value type
pub(crate) fn insert_attributes(conn: &Connection, artifact: &BlackboardArtifact, attributes: &[Attribute]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO blackboard_attributes
            (artifact_id, artifact_type_id, source, context, attribute_type_id, value_type,
             value_byte, value_text, value_int32, value_int64, value_double)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    for attr in attributes {
        check_value_type(conn, &attr.attribute_type, &attr.value)?;
        let (byte, text, int32, int64, double) = value_columns(&attr.value);
        stmt.execute(params![
            artifact.artifact_id,
            artifact.type_id,
            attr.source,
            attr.context,
            attr.attribute_type.type_id,
            attr.value.value_type().code(),
            byte,
            text,
            int32,
            int64,
            double,
        ])?;
    }
    Ok(())
}

pub(crate) fn load_attributes(conn: &Connection, artifact_id: i64) -> Result<Vec<Attribute>> {
    let mut stmt = conn.prepare(
        "SELECT t.attribute_type_id, t.type_name, t.display_name, t.value_type,
                a.source, a.context, a.value_byte, a.value_text, a.value_int32,
                a.value_int64, a.value_double
         FROM blackboard_attributes a
         JOIN blackboard_attribute_types t ON t.attribute_type_id = a.attribute_type_id
         WHERE a.artifact_id = ?1
         ORDER BY a.rowid",
    )?;
    let attributes = stmt
        .query_map(params![artifact_id], |row| {
            let attribute_type = attribute_type_from_row(row)?;
            let value = value_from_columns(row, attribute_type.value_type, 6)?;
            Ok(Attribute {
                attribute_type,
                value,
                source: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                context: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(attributes)
}

/// Insert an analysis result inside an open transaction and queue its events
#[allow(clippy::too_many_arguments)]
pub(crate) fn post_analysis_result(
    trans: &mut CaseDbTransaction<'_>,
    type_id: i32,
    source_obj_id: i64,
    score: Score,
    conclusion: &str,
    configuration: &str,
    justification: &str,
    attributes: &[Attribute],
) -> Result<AnalysisResult> {
    let artifact_type = load_artifact_type(trans, type_id)?;
    if artifact_type.category != ArtifactCategory::AnalysisResult {
        return Err(CaseDbError::invalid(format!(
            "{} is not an analysis result type",
            artifact_type.type_name
        )));
    }

    let artifact = insert_artifact(trans, type_id, source_obj_id)?;
    trans.execute(
        "INSERT INTO tsk_analysis_results
            (obj_id, conclusion, significance, priority, configuration, justification)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            artifact.obj_id,
            conclusion,
            score.significance.code(),
            score.priority.code(),
            configuration,
            justification
        ],
    )?;
    insert_attributes(trans, &artifact, attributes)?;

    let data_source_id = Some(artifact.data_source_obj_id);
    if let Some(new_score) =
        scoring::update_after_addition(trans, source_obj_id, data_source_id, score)?
    {
        trans.queue_event(CaseEvent::AggregateScoreChanged {
            obj_id: source_obj_id,
            data_source_id,
            score: new_score,
        });
    }
    trans.queue_event(CaseEvent::ArtifactsPosted {
        artifact_ids: vec![artifact.artifact_id],
        type_id,
    });

    Ok(AnalysisResult {
        artifact,
        score,
        conclusion: conclusion.to_string(),
        configuration: configuration.to_string(),
        justification: justification.to_string(),
    })
}

/// Blackboard operations on a case
pub struct Blackboard<'a> {
    case: &'a CaseDatabase,
}

impl<'a> Blackboard<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    pub fn get_artifact_type(&self, type_id: i32) -> Result<ArtifactType> {
        load_artifact_type(&*self.case.connection()?, type_id)
    }

    pub fn get_artifact_type_by_name(&self, type_name: &str) -> Result<Option<ArtifactType>> {
        find_artifact_type(&*self.case.connection()?, type_name)
    }

    pub fn get_artifact_types(&self) -> Result<Vec<ArtifactType>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT artifact_type_id, type_name, display_name, category_type
             FROM blackboard_artifact_types ORDER BY artifact_type_id",
        )?;
        let types = stmt
            .query_map([], artifact_type_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(types)
    }

    /// Get or create an artifact type. An existing type with the same name
    /// but a different category is an error.
    pub fn add_artifact_type(
        &self,
        type_name: &str,
        display_name: &str,
        category: ArtifactCategory,
    ) -> Result<ArtifactType> {
        if type_name.is_empty() {
            return Err(CaseDbError::invalid("artifact type name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if let Some(existing) = find_artifact_type(trans, type_name)? {
                if existing.category != category {
                    return Err(CaseDbError::data(format!(
                        "artifact type {} already exists as a {}",
                        type_name, existing.category
                    )));
                }
                return Ok(existing);
            }

            let max_id: i32 = trans.query_row(
                "SELECT COALESCE(MAX(artifact_type_id), 0) FROM blackboard_artifact_types",
                [],
                |row| row.get(0),
            )?;
            let type_id = (max_id + 1).max(CUSTOM_TYPE_ID_BASE);
            trans.execute(
                "INSERT INTO blackboard_artifact_types
                    (artifact_type_id, type_name, display_name, category_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![type_id, type_name, display_name, category.code()],
            )?;
            tracing::info!("Added artifact type {} ({})", type_name, type_id);

            Ok(ArtifactType {
                type_id,
                type_name: type_name.to_string(),
                display_name: display_name.to_string(),
                category,
            })
        })
    }

    pub fn get_attribute_type_by_name(&self, type_name: &str) -> Result<Option<AttributeType>> {
        find_attribute_type(&*self.case.connection()?, type_name)
    }

    pub fn get_attribute_type(&self, type_id: i32) -> Result<AttributeType> {
        load_attribute_type(&*self.case.connection()?, type_id)
    }

    /// Get or create an attribute type
    pub fn add_attribute_type(
        &self,
        type_name: &str,
        display_name: &str,
        value_type: AttributeValueType,
    ) -> Result<AttributeType> {
        if type_name.is_empty() {
            return Err(CaseDbError::invalid("attribute type name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if let Some(existing) = find_attribute_type(trans, type_name)? {
                if existing.value_type != value_type {
                    return Err(CaseDbError::data(format!(
                        "attribute type {} already exists with value type {}",
                        type_name, existing.value_type
                    )));
                }
                return Ok(existing);
            }

            let max_id: i32 = trans.query_row(
                "SELECT COALESCE(MAX(attribute_type_id), 0) FROM blackboard_attribute_types",
                [],
                |row| row.get(0),
            )?;
            let type_id = (max_id + 1).max(CUSTOM_TYPE_ID_BASE);
            trans.execute(
                "INSERT INTO blackboard_attribute_types
                    (attribute_type_id, type_name, display_name, value_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![type_id, type_name, display_name, value_type.code()],
            )?;

            Ok(AttributeType {
                type_id,
                type_name: type_name.to_string(),
                display_name: display_name.to_string(),
                value_type,
            })
        })
    }

    /// Create a data artifact on `source_obj_id` with review status undecided
    pub fn new_artifact(&self, type_id: i32, source_obj_id: i64) -> Result<BlackboardArtifact> {
        self.new_data_artifact(type_id, source_obj_id, &[])
    }

    /// Create a data artifact and its attributes in one transaction
    pub fn new_data_artifact(
        &self,
        type_id: i32,
        source_obj_id: i64,
        attributes: &[Attribute],
    ) -> Result<BlackboardArtifact> {
        self.case.with_transaction(|trans| {
            let artifact_type = load_artifact_type(trans, type_id)?;
            if artifact_type.category != ArtifactCategory::DataArtifact {
                return Err(CaseDbError::invalid(format!(
                    "{} is not a data artifact type",
                    artifact_type.type_name
                )));
            }
            let artifact = insert_artifact(trans, type_id, source_obj_id)?;
            insert_attributes(trans, &artifact, attributes)?;
            trans.queue_event(CaseEvent::ArtifactsPosted {
                artifact_ids: vec![artifact.artifact_id],
                type_id,
            });
            Ok(artifact)
        })
    }

    pub fn add_attributes(&self, artifact_id: i64, attributes: &[Attribute]) -> Result<()> {
        self.case.with_transaction(|trans| {
            let artifact = load_artifact(trans, artifact_id)?;
            insert_attributes(trans, &artifact, attributes)
        })
    }

    pub fn get_attributes(&self, artifact_id: i64) -> Result<Vec<Attribute>> {
        load_attributes(&*self.case.connection()?, artifact_id)
    }

    pub fn get_artifact(&self, artifact_id: i64) -> Result<BlackboardArtifact> {
        load_artifact(&*self.case.connection()?, artifact_id)
    }

    /// All artifacts of a type
    pub fn get_artifacts(&self, type_id: i32) -> Result<Vec<BlackboardArtifact>> {
        query_artifacts(
            &*self.case.connection()?,
            "blackboard_artifacts.artifact_type_id = ?1",
            type_id as i64,
        )
    }

    pub fn get_artifacts_by_source(&self, source_obj_id: i64) -> Result<Vec<BlackboardArtifact>> {
        query_artifacts(
            &*self.case.connection()?,
            "blackboard_artifacts.obj_id = ?1",
            source_obj_id,
        )
    }

    pub fn get_artifacts_by_data_source(&self, data_source_obj_id: i64) -> Result<Vec<BlackboardArtifact>> {
        query_artifacts(
            &*self.case.connection()?,
            "blackboard_artifacts.data_source_obj_id = ?1",
            data_source_obj_id,
        )
    }

    pub fn get_artifacts_count(&self, type_id: i32) -> Result<i64> {
        let conn = self.case.connection()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM blackboard_artifacts WHERE artifact_type_id = ?1",
            params![type_id],
            |row| row.get(0),
        )?)
    }

    pub fn set_review_status(&self, artifact_id: i64, status: ReviewStatus) -> Result<()> {
        let conn = self.case.connection()?;
        let updated = conn.execute(
            "UPDATE blackboard_artifacts SET review_status_id = ?1 WHERE artifact_id = ?2",
            params![status.code(), artifact_id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!("artifact {}", artifact_id)));
        }
        Ok(())
    }

    /// Post an analysis result on `source_obj_id` and fold its score into
    /// the source's aggregate score
    #[allow(clippy::too_many_arguments)]
    pub fn new_analysis_result(
        &self,
        type_id: i32,
        source_obj_id: i64,
        score: Score,
        conclusion: &str,
        configuration: &str,
        justification: &str,
        attributes: &[Attribute],
    ) -> Result<AnalysisResult> {
        self.case.with_transaction(|trans| {
            post_analysis_result(
                trans,
                type_id,
                source_obj_id,
                score,
                conclusion,
                configuration,
                justification,
                attributes,
            )
        })
    }

    pub fn get_analysis_results(&self, source_obj_id: i64) -> Result<Vec<AnalysisResult>> {
        let conn = self.case.connection()?;
        let artifacts = query_artifacts(&conn, "blackboard_artifacts.obj_id = ?1", source_obj_id)?;
        let mut results = Vec::new();
        for artifact in artifacts {
            let row = conn
                .query_row(
                    "SELECT significance, priority, conclusion, configuration, justification
                     FROM tsk_analysis_results WHERE obj_id = ?1",
                    params![artifact.obj_id],
                    |row| {
                        Ok((
                            row.get::<_, i32>(0)?,
                            row.get::<_, i32>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;
            if let Some((significance, priority, conclusion, configuration, justification)) = row {
                results.push(AnalysisResult {
                    artifact,
                    score: Score::from_codes(significance, priority)?,
                    conclusion: conclusion.unwrap_or_default(),
                    configuration: configuration.unwrap_or_default(),
                    justification: justification.unwrap_or_default(),
                });
            }
        }
        Ok(results)
    }

    /// Delete an analysis result and recompute its source's aggregate score
    pub fn delete_analysis_result(&self, artifact_id: i64) -> Result<()> {
        self.case.with_transaction(|trans| {
            let artifact = load_artifact(trans, artifact_id)?;
            let category = load_artifact_type(trans, artifact.type_id)?.category;
            if category != ArtifactCategory::AnalysisResult {
                return Err(CaseDbError::invalid(format!(
                    "artifact {} is not an analysis result",
                    artifact_id
                )));
            }

            // Cascades to the artifact, its attributes and its analysis row
            trans.execute(
                "DELETE FROM tsk_objects WHERE obj_id = ?1",
                params![artifact.obj_id],
            )?;

            let data_source_id = Some(artifact.data_source_obj_id);
            if let Some(new_score) =
                scoring::update_after_deletion(trans, artifact.source_obj_id, data_source_id)?
            {
                trans.queue_event(CaseEvent::AggregateScoreChanged {
                    obj_id: artifact.source_obj_id,
                    data_source_id,
                    score: new_score,
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::model::artifact::{artifact_ids, attribute_ids};
    use crate::model::NewFile;
    use crate::scoring::{Priority, Significance};

    fn create_test_file(case: &CaseDatabase) -> i64 {
        let image_id = add_test_image(case, "disk.dd");
        case.add_file(image_id, NewFile::regular("evil.exe", 100)).unwrap().id
    }

    #[test]
    fn test_new_artifact_with_attributes() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let blackboard = case.blackboard();

        let attrs = vec![
            Attribute::standard(attribute_ids::TSK_URL, AttributeValue::String("http://x.test".into()), "web").unwrap(),
            Attribute::standard(attribute_ids::TSK_DATETIME, AttributeValue::DateTime(1483272732), "web").unwrap(),
            Attribute::standard(attribute_ids::TSK_ENTROPY, AttributeValue::Double(7.5), "web").unwrap(),
        ];
        let artifact = blackboard
            .new_data_artifact(artifact_ids::TSK_WEB_HISTORY, file_id, &attrs)
            .unwrap();

        assert_eq!(artifact.source_obj_id, file_id);
        assert_eq!(artifact.review_status, ReviewStatus::Undecided);
        assert_eq!(artifact.type_name, "TSK_WEB_HISTORY");

        let loaded = blackboard.get_attributes(artifact.artifact_id).unwrap();
        assert_eq!(loaded, attrs);
        assert_eq!(blackboard.get_artifacts(artifact_ids::TSK_WEB_HISTORY).unwrap().len(), 1);
        assert_eq!(blackboard.get_artifacts_by_source(file_id).unwrap()[0], artifact);

        // Artifacts are content too, but not listed as children
        assert!(case.get_children_ids(file_id).unwrap().is_empty());
        assert!(matches!(
            case.get_content(artifact.obj_id).unwrap(),
            crate::model::Content::Artifact(_)
        ));
    }

    #[test]
    fn test_wrong_value_type_rejected_on_insert() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let blackboard = case.blackboard();
        let artifact = blackboard.new_artifact(artifact_ids::TSK_WEB_HISTORY, file_id).unwrap();

        let mut url = Attribute::standard(attribute_ids::TSK_URL, AttributeValue::String("x".into()), "web").unwrap();
        url.value = AttributeValue::Long(5);
        let err = blackboard.add_attributes(artifact.artifact_id, &[url.clone()]).unwrap_err();
        assert!(matches!(err, CaseDbError::InvalidArgument(_)));
        assert!(blackboard.get_attributes(artifact.artifact_id).unwrap().is_empty());

        // The stored type wins over a relabelled one
        url.attribute_type.value_type = AttributeValueType::Long;
        assert!(blackboard.add_attributes(artifact.artifact_id, &[url]).is_err());

        // Nothing is created when an attribute of a new artifact is bad
        let mut bad = Attribute::standard(attribute_ids::TSK_ENTROPY, AttributeValue::Double(1.0), "x").unwrap();
        bad.value = AttributeValue::String("high".into());
        assert!(blackboard.new_data_artifact(artifact_ids::TSK_WEB_HISTORY, file_id, &[bad]).is_err());
        assert_eq!(blackboard.get_artifacts_count(artifact_ids::TSK_WEB_HISTORY).unwrap(), 1);
    }

    #[test]
    fn test_review_status() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let blackboard = case.blackboard();
        let artifact = blackboard.new_artifact(artifact_ids::TSK_GEN_INFO, file_id).unwrap();

        blackboard.set_review_status(artifact.artifact_id, ReviewStatus::Approved).unwrap();
        assert_eq!(
            blackboard.get_artifact(artifact.artifact_id).unwrap().review_status,
            ReviewStatus::Approved
        );
        assert!(blackboard.set_review_status(9999, ReviewStatus::Rejected).is_err());
    }

    #[test]
    fn test_custom_types() {
        let (_temp_dir, case) = create_test_case();
        let blackboard = case.blackboard();

        let custom = blackboard
            .add_artifact_type("CUSTOM_THING", "Custom Thing", ArtifactCategory::DataArtifact)
            .unwrap();
        assert!(custom.type_id >= CUSTOM_TYPE_ID_BASE);

        let again = blackboard
            .add_artifact_type("CUSTOM_THING", "Custom Thing", ArtifactCategory::DataArtifact)
            .unwrap();
        assert_eq!(again, custom);

        let err = blackboard
            .add_artifact_type("CUSTOM_THING", "Custom Thing", ArtifactCategory::AnalysisResult)
            .unwrap_err();
        assert!(err.is_data_error());

        let attr_type = blackboard
            .add_attribute_type("CUSTOM_COUNT", "Count", AttributeValueType::Integer)
            .unwrap();
        assert_eq!(attr_type.type_id, CUSTOM_TYPE_ID_BASE);
        assert_eq!(blackboard.get_attribute_type(attr_type.type_id).unwrap(), attr_type);
        assert!(blackboard
            .add_attribute_type("CUSTOM_COUNT", "Count", AttributeValueType::String)
            .unwrap_err()
            .is_data_error());
    }

    #[test]
    fn test_concurrent_type_registration_yields_one_type() {
        let (_temp_dir, case) = create_test_case();
        let ids: Vec<i32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        case.blackboard()
                            .add_artifact_type("RACED_TYPE", "Raced", ArtifactCategory::DataArtifact)
                            .unwrap()
                            .type_id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(ids.iter().all(|id| *id == ids[0]));
        let count = case
            .blackboard()
            .get_artifact_types()
            .unwrap()
            .into_iter()
            .filter(|t| t.type_name == "RACED_TYPE")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_analysis_result_updates_score() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let blackboard = case.blackboard();

        let notable = Score::new(Significance::Notable, Priority::Normal);
        let result = blackboard
            .new_analysis_result(
                artifact_ids::TSK_HASHSET_HIT,
                file_id,
                notable,
                "known malware",
                "",
                "md5 match",
                &[],
            )
            .unwrap();
        assert_eq!(case.scoring().get_aggregate_score(file_id).unwrap(), notable);
        assert_eq!(blackboard.get_analysis_results(file_id).unwrap().len(), 1);

        blackboard.delete_analysis_result(result.artifact.artifact_id).unwrap();
        assert_eq!(case.scoring().get_aggregate_score(file_id).unwrap(), Score::UNKNOWN);
    }

    #[test]
    fn test_category_checked() {
        let (_temp_dir, case) = create_test_case();
        let file_id = create_test_file(&case);
        let blackboard = case.blackboard();

        assert!(blackboard.new_artifact(artifact_ids::TSK_KEYWORD_HIT, file_id).is_err());
        assert!(blackboard
            .new_analysis_result(
                artifact_ids::TSK_WEB_HISTORY,
                file_id,
                Score::UNKNOWN,
                "",
                "",
                "",
                &[]
            )
            .is_err());
    }
}
