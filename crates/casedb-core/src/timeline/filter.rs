//! Timeline filters rendered to SQL conditions over the event tables

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::type_and_descendants;
use crate::case::id_list;
use crate::error::Result;
use crate::model::FileKnown;

/// Condition that every row satisfies
pub const TRUE_LITERAL: &str = "1";

/// A condition on timeline events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineFilter {
    /// All sub-filters must pass
    Intersection(Vec<TimelineFilter>),
    /// Any sub-filter may pass
    Union(Vec<TimelineFilter>),
    /// Events of this type or any type below it
    EventType(i64),
    /// Events whose content or artifact is tagged (or not)
    Tagged(bool),
    /// Events whose content has a hash set hit (or not)
    HashHit(bool),
    /// Text contained in any description level
    Text(String),
    /// Drop events about files known to a hash database
    HideKnown,
    DataSource(i64),
    DataSources(Vec<i64>),
    /// Events about files of these mime types; `image/*` matches a whole family
    FileType(Vec<String>),
    /// Events about anything but these mime types
    NotFileType(Vec<String>),
    Root(Box<RootFilter>),
}

/// The filter behind a timeline view: each part is optional and the parts
/// are intersected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFilter {
    pub hide_known: bool,
    pub tagged: Option<bool>,
    pub hash_hit: Option<bool>,
    pub text: Option<String>,
    pub event_type: Option<i64>,
    pub data_sources: Vec<i64>,
    pub file_types: Vec<String>,
}

impl RootFilter {
    fn parts(&self) -> Vec<TimelineFilter> {
        let mut parts = Vec::new();
        if let Some(text) = &self.text {
            parts.push(TimelineFilter::Text(text.clone()));
        }
        if self.hide_known {
            parts.push(TimelineFilter::HideKnown);
        }
        if let Some(tagged) = self.tagged {
            parts.push(TimelineFilter::Tagged(tagged));
        }
        if !self.data_sources.is_empty() {
            parts.push(TimelineFilter::DataSources(self.data_sources.clone()));
        }
        if let Some(hash_hit) = self.hash_hit {
            parts.push(TimelineFilter::HashHit(hash_hit));
        }
        if !self.file_types.is_empty() {
            parts.push(TimelineFilter::FileType(self.file_types.clone()));
        }
        if let Some(event_type) = self.event_type {
            parts.push(TimelineFilter::EventType(event_type));
        }
        parts
    }
}

fn escape_quotes(text: &str) -> String {
    text.replace('\'', "''")
}

fn mime_condition(mime_type: &str) -> String {
    match mime_type.strip_suffix("/*") {
        Some(family) => format!("(tsk_files.mime_type LIKE '{}/_%')", escape_quotes(family)),
        None => format!("(tsk_files.mime_type = '{}')", escape_quotes(mime_type)),
    }
}

fn join_without_true(conn: &Connection, filters: &[TimelineFilter], separator: &str) -> Result<String> {
    let mut rendered = Vec::new();
    for filter in filters {
        let sql = filter.to_sql(conn)?;
        if sql != TRUE_LITERAL {
            rendered.push(sql);
        }
    }
    Ok(if rendered.is_empty() {
        TRUE_LITERAL.to_string()
    } else {
        format!("({})", rendered.join(separator))
    })
}

impl TimelineFilter {
    /// Render as a condition over `tsk_events`, `tsk_event_descriptions`
    /// and `tsk_files`. Filters that exclude nothing render as `1`.
    pub fn to_sql(&self, conn: &Connection) -> Result<String> {
        let sql = match self {
            TimelineFilter::Intersection(filters) => join_without_true(conn, filters, " AND ")?,
            TimelineFilter::Union(filters) => {
                // One unrestricted branch makes the whole union unrestricted
                let mut rendered = Vec::new();
                for filter in filters {
                    let sql = filter.to_sql(conn)?;
                    if sql == TRUE_LITERAL {
                        return Ok(sql);
                    }
                    rendered.push(sql);
                }
                if rendered.is_empty() {
                    TRUE_LITERAL.to_string()
                } else {
                    format!("({})", rendered.join(" OR "))
                }
            }
            TimelineFilter::EventType(type_id) => format!(
                "(tsk_events.event_type_id IN ({}))",
                id_list(&type_and_descendants(conn, *type_id)?)
            ),
            TimelineFilter::Tagged(tagged) => {
                format!("(tsk_event_descriptions.tagged = {})", i32::from(*tagged))
            }
            TimelineFilter::HashHit(hash_hit) => {
                format!("(tsk_event_descriptions.hash_hit = {})", i32::from(*hash_hit))
            }
            TimelineFilter::Text(text) if text.trim().is_empty() => TRUE_LITERAL.to_string(),
            TimelineFilter::Text(text) => {
                let text = escape_quotes(text);
                format!(
                    "((tsk_event_descriptions.med_description LIKE '%{0}%')
                      OR (tsk_event_descriptions.full_description LIKE '%{0}%')
                      OR (tsk_event_descriptions.short_description LIKE '%{0}%'))",
                    text
                )
            }
            TimelineFilter::HideKnown => format!(
                "(tsk_files.known IS NULL OR tsk_files.known != {})",
                FileKnown::Known.code()
            ),
            TimelineFilter::DataSource(id) => {
                format!("(tsk_event_descriptions.data_source_obj_id = {})", id)
            }
            TimelineFilter::DataSources(ids) if ids.is_empty() => TRUE_LITERAL.to_string(),
            TimelineFilter::DataSources(ids) => {
                format!("(tsk_event_descriptions.data_source_obj_id IN ({}))", id_list(ids))
            }
            TimelineFilter::FileType(mime_types) if mime_types.is_empty() => TRUE_LITERAL.to_string(),
            TimelineFilter::FileType(mime_types) => format!(
                "({})",
                mime_types.iter().map(|m| mime_condition(m)).collect::<Vec<_>>().join(" OR ")
            ),
            TimelineFilter::NotFileType(mime_types) if mime_types.is_empty() => {
                TRUE_LITERAL.to_string()
            }
            TimelineFilter::NotFileType(mime_types) => format!(
                "(tsk_files.mime_type IS NULL OR NOT {})",
                TimelineFilter::FileType(mime_types.clone()).to_sql(conn)?
            ),
            TimelineFilter::Root(root) => join_without_true(conn, &root.parts(), " AND ")?,
        };
        Ok(sql)
    }
}
