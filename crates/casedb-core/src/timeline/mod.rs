//! Timeline: typed, timestamped events derived from files and artifacts
//!
//! Each event points at a description row shared by every event with the
//! same text about the same content, so flags such as `tagged` and
//! `hash_hit` are kept once per description.

mod filter;

pub use filter::{RootFilter, TimelineFilter, TRUE_LITERAL};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::case::content::{data_source_of, load_file};
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::model::artifact::artifact_ids;

/// Built-in event types as (id, display name, super type)
pub(crate) const ROOT_EVENT_TYPES: &[(i64, &str, Option<i64>)] = &[
    (EventType::ROOT, "Event Types", None),
    (EventType::FILE_SYSTEM, "File System", Some(EventType::ROOT)),
    (EventType::WEB_ACTIVITY, "Web Activity", Some(EventType::ROOT)),
    (EventType::MISC_TYPES, "Misc Types", Some(EventType::ROOT)),
    (EventType::FILE_MODIFIED, "Modified", Some(EventType::FILE_SYSTEM)),
    (EventType::FILE_ACCESSED, "Accessed", Some(EventType::FILE_SYSTEM)),
    (EventType::FILE_CREATED, "Created", Some(EventType::FILE_SYSTEM)),
    (EventType::FILE_CHANGED, "Changed", Some(EventType::FILE_SYSTEM)),
];

/// A row of `tsk_event_types`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType {
    pub type_id: i64,
    pub display_name: String,
    pub super_type_id: Option<i64>,
}

impl EventType {
    pub const ROOT: i64 = 0;
    pub const FILE_SYSTEM: i64 = 1;
    pub const WEB_ACTIVITY: i64 = 2;
    pub const MISC_TYPES: i64 = 3;
    pub const FILE_MODIFIED: i64 = 4;
    pub const FILE_ACCESSED: i64 = 5;
    pub const FILE_CREATED: i64 = 6;
    pub const FILE_CHANGED: i64 = 7;
}

/// Half-open time range `[start, end)` in seconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if end < start {
            return Err(CaseDbError::invalid(format!(
                "interval end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Everything representable
    pub fn all() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Description text at three levels of detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescription {
    pub full: String,
    pub medium: String,
    pub short: String,
}

impl EventDescription {
    pub fn new(full: impl Into<String>, medium: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            medium: medium.into(),
            short: short.into(),
        }
    }
}

/// An event joined with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: i64,
    pub event_type_id: i64,
    pub time: i64,
    pub description: EventDescription,
    pub data_source_obj_id: i64,
    pub content_obj_id: i64,
    pub artifact_id: Option<i64>,
    pub hash_hit: bool,
    pub tagged: bool,
}

/// Event tables joined the way every filter expects
pub(crate) const EVENTS_FROM: &str = "FROM tsk_events
     JOIN tsk_event_descriptions
        ON tsk_event_descriptions.event_description_id = tsk_events.event_description_id
     LEFT JOIN tsk_files ON tsk_files.obj_id = tsk_event_descriptions.content_obj_id";

const EVENT_SELECT: &str = "SELECT tsk_events.event_id, tsk_events.event_type_id, tsk_events.time,
        tsk_event_descriptions.full_description, tsk_event_descriptions.med_description,
        tsk_event_descriptions.short_description, tsk_event_descriptions.data_source_obj_id,
        tsk_event_descriptions.content_obj_id, tsk_event_descriptions.artifact_id,
        tsk_event_descriptions.hash_hit, tsk_event_descriptions.tagged";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<TimelineEvent> {
    Ok(TimelineEvent {
        event_id: row.get(0)?,
        event_type_id: row.get(1)?,
        time: row.get(2)?,
        description: EventDescription {
            full: row.get(3)?,
            medium: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            short: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        },
        data_source_obj_id: row.get(6)?,
        content_obj_id: row.get(7)?,
        artifact_id: row.get(8)?,
        hash_hit: row.get::<_, i64>(9)? != 0,
        tagged: row.get::<_, i64>(10)? != 0,
    })
}

fn event_type_from_row(row: &Row<'_>) -> rusqlite::Result<EventType> {
    Ok(EventType {
        type_id: row.get(0)?,
        display_name: row.get(1)?,
        super_type_id: row.get(2)?,
    })
}

pub(crate) fn load_event_types(conn: &Connection) -> Result<Vec<EventType>> {
    let mut stmt = conn.prepare(
        "SELECT event_type_id, display_name, super_type_id FROM tsk_event_types ORDER BY event_type_id",
    )?;
    let types = stmt
        .query_map([], event_type_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(types)
}

/// `type_id` and every type below it
pub(crate) fn type_and_descendants(conn: &Connection, type_id: i64) -> Result<Vec<i64>> {
    let all = load_event_types(conn)?;
    let mut ids = vec![type_id];
    let mut next = 0;
    while next < ids.len() {
        let parent = ids[next];
        ids.extend(all.iter().filter(|t| t.super_type_id == Some(parent)).map(|t| t.type_id));
        next += 1;
    }
    Ok(ids)
}

fn load_event(conn: &Connection, event_id: i64) -> Result<TimelineEvent> {
    conn.query_row(
        &format!("{} {} WHERE tsk_events.event_id = ?1", EVENT_SELECT, EVENTS_FROM),
        params![event_id],
        event_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("timeline event {}", event_id)))
}

fn render_filter(conn: &Connection, filter: Option<&TimelineFilter>) -> Result<String> {
    match filter {
        Some(filter) => filter.to_sql(conn),
        None => Ok(TRUE_LITERAL.to_string()),
    }
}

/// Whether the content already carries a tag or a hash set hit, so new
/// descriptions start with the right flags
fn content_flags(conn: &Connection, content_obj_id: i64, artifact_id: Option<i64>) -> Result<(bool, bool)> {
    let hash_hit: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM blackboard_artifacts
                        WHERE obj_id = ?1 AND artifact_type_id = ?2)",
        params![content_obj_id, artifact_ids::TSK_HASHSET_HIT],
        |row| row.get(0),
    )?;
    let tagged: bool = match artifact_id {
        Some(artifact_id) => conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM blackboard_artifact_tags WHERE artifact_id = ?1)",
            params![artifact_id],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM content_tags WHERE obj_id = ?1)",
            params![content_obj_id],
            |row| row.get(0),
        )?,
    };
    Ok((hash_hit, tagged))
}

fn get_or_insert_description(
    conn: &Connection,
    description: &EventDescription,
    content_obj_id: i64,
    artifact_id: Option<i64>,
) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT event_description_id FROM tsk_event_descriptions
             WHERE full_description = ?1 AND content_obj_id = ?2 AND artifact_id IS ?3",
            params![description.full, content_obj_id, artifact_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let data_source_obj_id = data_source_of(conn, content_obj_id)?;
    let (hash_hit, tagged) = content_flags(conn, content_obj_id, artifact_id)?;
    conn.execute(
        "INSERT INTO tsk_event_descriptions
            (full_description, med_description, short_description, data_source_obj_id,
             content_obj_id, artifact_id, hash_hit, tagged)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            description.full,
            description.medium,
            description.short,
            data_source_obj_id,
            content_obj_id,
            artifact_id,
            hash_hit,
            tagged
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert one event; returns `None` when the same event already exists
pub(crate) fn insert_event(
    conn: &Connection,
    event_type_id: i64,
    time: i64,
    description: &EventDescription,
    content_obj_id: i64,
    artifact_id: Option<i64>,
) -> Result<Option<i64>> {
    let description_id = get_or_insert_description(conn, description, content_obj_id, artifact_id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tsk_events (event_type_id, event_description_id, time)
         VALUES (?1, ?2, ?3)",
        params![event_type_id, description_id, time],
    )?;
    Ok(if inserted == 0 {
        None
    } else {
        Some(conn.last_insert_rowid())
    })
}

fn event_ids_for_descriptions(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT tsk_events.event_id FROM tsk_events
         JOIN tsk_event_descriptions
            ON tsk_event_descriptions.event_description_id = tsk_events.event_description_id
         WHERE {} ORDER BY tsk_events.event_id",
        where_clause
    ))?;
    let ids = stmt
        .query_map(args, |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Set the tagged flag on descriptions of a content object or of one of its
/// artifacts. Returns the ids of events whose flag changed.
pub(crate) fn update_tagged(
    conn: &Connection,
    content_obj_id: i64,
    artifact_id: Option<i64>,
    tagged: bool,
) -> Result<Vec<i64>> {
    let target = "content_obj_id = ?1 AND artifact_id IS ?2 AND tagged != ?3";
    let changed = event_ids_for_descriptions(
        conn,
        &format!("tsk_event_descriptions.{}", target),
        &[&content_obj_id, &artifact_id, &tagged],
    )?;
    conn.execute(
        &format!("UPDATE tsk_event_descriptions SET tagged = ?3 WHERE {}", target),
        params![content_obj_id, artifact_id, tagged],
    )?;
    Ok(changed)
}

/// Set the hash hit flag on every description of a content object
pub(crate) fn update_hash_hit(conn: &Connection, content_obj_id: i64, hash_hit: bool) -> Result<Vec<i64>> {
    let changed = event_ids_for_descriptions(
        conn,
        "tsk_event_descriptions.content_obj_id = ?1 AND tsk_event_descriptions.hash_hit != ?2",
        &[&content_obj_id, &hash_hit],
    )?;
    conn.execute(
        "UPDATE tsk_event_descriptions SET hash_hit = ?2 WHERE content_obj_id = ?1 AND hash_hit != ?2",
        params![content_obj_id, hash_hit],
    )?;
    Ok(changed)
}

/// Timeline operations on a case
pub struct TimelineManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> TimelineManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    pub fn get_event_types(&self) -> Result<Vec<EventType>> {
        load_event_types(&*self.case.connection()?)
    }

    pub fn get_event_type(&self, type_id: i64) -> Result<EventType> {
        self.get_event_types()?
            .into_iter()
            .find(|t| t.type_id == type_id)
            .ok_or_else(|| CaseDbError::not_found(format!("event type {}", type_id)))
    }

    /// Direct children of an event type
    pub fn get_sub_types(&self, type_id: i64) -> Result<Vec<EventType>> {
        Ok(self
            .get_event_types()?
            .into_iter()
            .filter(|t| t.super_type_id == Some(type_id))
            .collect())
    }

    /// Get or create an event type under `super_type_id`
    pub fn add_event_type(&self, display_name: &str, super_type_id: i64) -> Result<EventType> {
        if display_name.is_empty() {
            return Err(CaseDbError::invalid("event type name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            let types = load_event_types(trans)?;
            if let Some(existing) = types.iter().find(|t| t.display_name == display_name) {
                if existing.super_type_id != Some(super_type_id) {
                    return Err(CaseDbError::data(format!(
                        "event type {} already exists under another parent",
                        display_name
                    )));
                }
                return Ok(existing.clone());
            }
            if !types.iter().any(|t| t.type_id == super_type_id) {
                return Err(CaseDbError::not_found(format!("event type {}", super_type_id)));
            }
            trans.execute(
                "INSERT INTO tsk_event_types (display_name, super_type_id) VALUES (?1, ?2)",
                params![display_name, super_type_id],
            )?;
            Ok(EventType {
                type_id: trans.last_insert_rowid(),
                display_name: display_name.to_string(),
                super_type_id: Some(super_type_id),
            })
        })
    }

    /// Add an event. Descriptions are shared with earlier events about the
    /// same content; an identical event is not added twice.
    pub fn add_event(
        &self,
        event_type_id: i64,
        time: i64,
        description: &EventDescription,
        content_obj_id: i64,
        artifact_id: Option<i64>,
    ) -> Result<Option<TimelineEvent>> {
        self.case.with_transaction(|trans| {
            match insert_event(trans, event_type_id, time, description, content_obj_id, artifact_id)? {
                Some(event_id) => {
                    trans.queue_event(CaseEvent::TimelineEventsAdded(vec![event_id]));
                    Ok(Some(load_event(trans, event_id)?))
                }
                None => Ok(None),
            }
        })
    }

    /// One event per MAC time the file has set
    pub fn add_file_system_events(&self, file_id: i64) -> Result<Vec<TimelineEvent>> {
        self.case.with_transaction(|trans| {
            let file = load_file(trans, file_id)?;
            let description = EventDescription::new(
                file.unique_path(),
                file.parent_path.clone(),
                file.parent_path
                    .split('/')
                    .find(|part| !part.is_empty())
                    .map(|root| format!("/{}", root))
                    .unwrap_or_else(|| "/".to_string()),
            );

            let mut added = Vec::new();
            for (label, time) in file.mac_times() {
                let event_type_id = match label {
                    "Modified" => EventType::FILE_MODIFIED,
                    "Accessed" => EventType::FILE_ACCESSED,
                    "Created" => EventType::FILE_CREATED,
                    _ => EventType::FILE_CHANGED,
                };
                if let Some(event_id) = insert_event(trans, event_type_id, time, &description, file.id, None)? {
                    added.push(load_event(trans, event_id)?);
                }
            }

            if !added.is_empty() {
                trans.queue_event(CaseEvent::TimelineEventsAdded(
                    added.iter().map(|e| e.event_id).collect(),
                ));
            }
            tracing::debug!("Added {} timeline events for file {}", added.len(), file.id);
            Ok(added)
        })
    }

    pub fn get_event(&self, event_id: i64) -> Result<TimelineEvent> {
        load_event(&*self.case.connection()?, event_id)
    }

    /// Ids of events in the interval that pass the filter, oldest first
    pub fn get_event_ids(&self, interval: Interval, filter: Option<&TimelineFilter>) -> Result<Vec<i64>> {
        let conn = self.case.connection()?;
        let sql = format!(
            "SELECT tsk_events.event_id {} WHERE tsk_events.time >= ?1 AND tsk_events.time < ?2 AND {}
             ORDER BY tsk_events.time, tsk_events.event_id",
            EVENTS_FROM,
            render_filter(&conn, filter)?
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![interval.start, interval.end], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Number of events that pass the filter, at any time
    pub fn count_events(&self, filter: Option<&TimelineFilter>) -> Result<i64> {
        let conn = self.case.connection()?;
        let sql = format!("SELECT COUNT(*) {} WHERE {}", EVENTS_FROM, render_filter(&conn, filter)?);
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Event counts in the interval keyed by event type id
    pub fn count_events_by_type(
        &self,
        interval: Interval,
        filter: Option<&TimelineFilter>,
    ) -> Result<BTreeMap<i64, i64>> {
        let conn = self.case.connection()?;
        let sql = format!(
            "SELECT tsk_events.event_type_id, COUNT(*) {}
             WHERE tsk_events.time >= ?1 AND tsk_events.time < ?2 AND {}
             GROUP BY tsk_events.event_type_id",
            EVENTS_FROM,
            render_filter(&conn, filter)?
        );
        let mut stmt = conn.prepare(&sql)?;
        let counts = stmt
            .query_map(params![interval.start, interval.end], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<BTreeMap<i64, i64>, _>>()?;
        Ok(counts)
    }

    pub fn get_min_time(&self) -> Result<Option<i64>> {
        let conn = self.case.connection()?;
        Ok(conn.query_row("SELECT MIN(time) FROM tsk_events", [], |row| row.get(0))?)
    }

    pub fn get_max_time(&self) -> Result<Option<i64>> {
        let conn = self.case.connection()?;
        Ok(conn.query_row("SELECT MAX(time) FROM tsk_events", [], |row| row.get(0))?)
    }

    /// Widen `interval` to the nearest matching events outside it: the last
    /// one at or before the start and the first one at or after the end
    pub fn get_spanning_interval(&self, interval: Interval, filter: Option<&TimelineFilter>) -> Result<Interval> {
        let conn = self.case.connection()?;
        let where_sql = render_filter(&conn, filter)?;
        let (start, end): (Option<i64>, Option<i64>) = conn.query_row(
            &format!(
                "SELECT (SELECT MAX(tsk_events.time) {0} WHERE tsk_events.time <= ?1 AND {1}),
                        (SELECT MIN(tsk_events.time) {0} WHERE tsk_events.time >= ?2 AND {1})",
                EVENTS_FROM, where_sql
            ),
            params![interval.start, interval.end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        // The end is exclusive, so step past the last matching event
        Ok(Interval {
            start: start.unwrap_or(interval.start),
            end: end.map(|t| t.saturating_add(1)).unwrap_or(interval.end),
        })
    }

    /// Set the tagged flag on events of a content object, or of one of its
    /// artifacts when `artifact_id` is given
    pub fn set_events_tagged(&self, content_obj_id: i64, artifact_id: Option<i64>, tagged: bool) -> Result<Vec<i64>> {
        update_tagged(&*self.case.connection()?, content_obj_id, artifact_id, tagged)
    }

    pub fn set_events_hash_hit(&self, content_obj_id: i64, hash_hit: bool) -> Result<Vec<i64>> {
        update_hash_hit(&*self.case.connection()?, content_obj_id, hash_hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::model::NewFile;

    fn create_file_with_times(case: &CaseDatabase) -> (i64, i64) {
        let image_id = add_test_image(case, "disk.dd");
        let docs = case.add_file(image_id, NewFile::directory("Documents")).unwrap().id;
        let file = case
            .add_file(docs, NewFile::regular("report.docx", 10).with_times(100, 200, 300, 0))
            .unwrap();
        (image_id, file.id)
    }

    #[test]
    fn test_root_event_types() {
        let (_temp_dir, case) = create_test_case();
        let timeline = case.timeline();

        let fs_types = timeline.get_sub_types(EventType::FILE_SYSTEM).unwrap();
        assert_eq!(fs_types.len(), 4);
        assert_eq!(timeline.get_event_type(EventType::FILE_ACCESSED).unwrap().display_name, "Accessed");

        let conn = case.connection().unwrap();
        let mut below_root = type_and_descendants(&conn, EventType::ROOT).unwrap();
        below_root.sort();
        assert_eq!(below_root, (0..8).collect::<Vec<i64>>());
    }

    #[test]
    fn test_add_event_type() {
        let (_temp_dir, case) = create_test_case();
        let timeline = case.timeline();

        let visit = timeline.add_event_type("Page Visit", EventType::WEB_ACTIVITY).unwrap();
        assert!(visit.type_id > EventType::FILE_CHANGED);
        assert_eq!(timeline.add_event_type("Page Visit", EventType::WEB_ACTIVITY).unwrap(), visit);
        assert!(timeline.add_event_type("Page Visit", EventType::MISC_TYPES).is_err());
        assert!(timeline.add_event_type("Orphan", 999).unwrap_err().is_data_error());
    }

    #[test]
    fn test_file_system_events() {
        let (_temp_dir, case) = create_test_case();
        let (image_id, file_id) = create_file_with_times(&case);
        let timeline = case.timeline();

        let events = timeline.add_file_system_events(file_id).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.data_source_obj_id == image_id));
        assert_eq!(events[0].event_type_id, EventType::FILE_MODIFIED);
        assert_eq!(events[0].description.full, "/Documents/report.docx");
        assert_eq!(events[0].description.short, "/Documents");

        // All three share one description
        let descriptions: i64 = case
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM tsk_event_descriptions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(descriptions, 1);

        assert!(timeline.add_file_system_events(file_id).unwrap().is_empty());
        assert_eq!(timeline.count_events(None).unwrap(), 3);
        assert_eq!(timeline.get_min_time().unwrap(), Some(100));
        assert_eq!(timeline.get_max_time().unwrap(), Some(300));
    }

    #[test]
    fn test_interval_queries() {
        let (_temp_dir, case) = create_test_case();
        let (_, file_id) = create_file_with_times(&case);
        let timeline = case.timeline();
        timeline.add_file_system_events(file_id).unwrap();

        let ids = timeline.get_event_ids(Interval::new(150, 300).unwrap(), None).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(timeline.get_event(ids[0]).unwrap().time, 200);

        let by_type = timeline.count_events_by_type(Interval::all(), None).unwrap();
        assert_eq!(by_type[&EventType::FILE_CREATED], 1);
        assert_eq!(by_type.len(), 3);

        let span = timeline.get_spanning_interval(Interval::new(150, 250).unwrap(), None).unwrap();
        assert_eq!(span, Interval { start: 100, end: 301 });
        assert!(Interval::new(5, 1).is_err());
    }

    #[test]
    fn test_spanning_interval_at_max_time() {
        let (_temp_dir, case) = create_test_case();
        let (_, file_id) = create_file_with_times(&case);
        let timeline = case.timeline();
        let description = EventDescription::new("end of time", "end", "end");
        timeline
            .add_event(EventType::FILE_MODIFIED, i64::MAX, &description, file_id, None)
            .unwrap();

        let span = timeline.get_spanning_interval(Interval::new(0, 10).unwrap(), None).unwrap();
        assert_eq!(span, Interval { start: 0, end: i64::MAX });
    }

    #[test]
    fn test_flags() {
        let (_temp_dir, case) = create_test_case();
        let (_, file_id) = create_file_with_times(&case);
        let timeline = case.timeline();
        timeline.add_file_system_events(file_id).unwrap();

        assert_eq!(timeline.set_events_tagged(file_id, None, true).unwrap().len(), 3);
        assert!(timeline.set_events_tagged(file_id, None, true).unwrap().is_empty());
        assert_eq!(timeline.set_events_hash_hit(file_id, true).unwrap().len(), 3);

        let ids = timeline.get_event_ids(Interval::all(), None).unwrap();
        let event = timeline.get_event(ids[0]).unwrap();
        assert!(event.tagged && event.hash_hit);
    }
}
