//! Filters over account relationships

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_sources_for_device, RelationshipType};
use crate::case::id_list;
use crate::error::Result;

const SECONDS_PER_DAY: i64 = 86_400;

/// One condition of a [`CommunicationsFilter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubFilter {
    /// Relationships of any of these types
    RelationshipType(Vec<RelationshipType>),
    /// Relationships dated from `start` up to the end of the day starting at
    /// `end`. Zero leaves that side open.
    DateRange { start: i64, end: i64 },
    /// Accounts of any of these type names
    AccountType(Vec<String>),
    /// Relationships found on any of these devices
    Device(Vec<String>),
}

impl SubFilter {
    /// SQL condition over the `relationships`, `account_types` and
    /// `artifacts` aliases, or an empty string when nothing is filtered
    pub fn to_sql(&self, conn: &Connection) -> Result<String> {
        let sql = match self {
            SubFilter::RelationshipType(types) if types.is_empty() => String::new(),
            SubFilter::RelationshipType(types) => {
                let codes: Vec<i64> = types.iter().map(|t| t.code() as i64).collect();
                format!("relationships.relationship_type IN ({})", id_list(&codes))
            }
            SubFilter::DateRange { start, end } => {
                let mut bounds = Vec::new();
                if *start > 0 {
                    bounds.push(format!("relationships.date_time >= {}", start));
                }
                if *end > 0 {
                    bounds.push(format!("relationships.date_time < {}", end + SECONDS_PER_DAY));
                }
                bounds.join(" AND ")
            }
            SubFilter::AccountType(names) if names.is_empty() => String::new(),
            SubFilter::AccountType(names) => {
                let mut type_ids = Vec::new();
                for name in names {
                    let type_id: Option<i64> = conn
                        .query_row(
                            "SELECT account_type_id FROM account_types WHERE type_name = ?1",
                            params![name],
                            |row| row.get(0),
                        )
                        .optional()?;
                    type_ids.extend(type_id);
                }
                in_list_or_nothing("account_types.account_type_id", &type_ids)
            }
            SubFilter::Device(devices) if devices.is_empty() => String::new(),
            SubFilter::Device(devices) => {
                let mut data_sources = Vec::new();
                for device_id in devices {
                    data_sources.extend(data_sources_for_device(conn, device_id)?);
                }
                in_list_or_nothing("artifacts.data_source_obj_id", &data_sources)
            }
        };
        Ok(sql)
    }
}

/// `column IN (...)`; names that resolved to no rows match nothing
fn in_list_or_nothing(column: &str, ids: &[i64]) -> String {
    if ids.is_empty() {
        "0".to_string()
    } else {
        format!("{} IN ({})", column, id_list(ids))
    }
}

/// Conjunction of sub-filters. A filter with no conditions matches every
/// relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationsFilter {
    pub sub_filters: Vec<SubFilter>,
}

impl CommunicationsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sub_filter: SubFilter) -> Self {
        self.sub_filters.push(sub_filter);
        self
    }

    pub fn add(&mut self, sub_filter: SubFilter) {
        self.sub_filters.push(sub_filter);
    }

    /// Render the conjunction, skipping sub-filters that render empty
    pub fn to_sql(&self, conn: &Connection) -> Result<String> {
        let mut clauses = Vec::new();
        for sub_filter in &self.sub_filters {
            let sql = sub_filter.to_sql(conn)?;
            if !sql.is_empty() {
                clauses.push(format!("({})", sql));
            }
        }
        Ok(clauses.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::case::NewImage;
    use std::path::PathBuf;

    #[test]
    fn test_empty_filters_render_nothing() {
        let (_temp_dir, case) = create_test_case();
        let conn = case.connection().unwrap();

        let filter = CommunicationsFilter::new()
            .with(SubFilter::RelationshipType(vec![]))
            .with(SubFilter::DateRange { start: 0, end: 0 })
            .with(SubFilter::AccountType(vec![]))
            .with(SubFilter::Device(vec![]));
        assert_eq!(filter.to_sql(&conn).unwrap(), "");
    }

    #[test]
    fn test_date_range_extends_end_by_one_day() {
        let (_temp_dir, case) = create_test_case();
        let conn = case.connection().unwrap();

        let both = SubFilter::DateRange { start: 100, end: 1000 };
        assert_eq!(
            both.to_sql(&conn).unwrap(),
            "relationships.date_time >= 100 AND relationships.date_time < 87400"
        );
        let open_start = SubFilter::DateRange { start: 0, end: 1000 };
        assert_eq!(open_start.to_sql(&conn).unwrap(), "relationships.date_time < 87400");
    }

    #[test]
    fn test_types_and_devices_resolve() {
        let (_temp_dir, case) = create_test_case();
        let mut image = NewImage::new(vec![PathBuf::from("/evidence/phone.img")]);
        image.device_id = "DS1".to_string();
        let ds = case.add_image(image).unwrap().id;
        let conn = case.connection().unwrap();

        let filter = CommunicationsFilter::new()
            .with(SubFilter::RelationshipType(vec![RelationshipType::Message, RelationshipType::CallLog]))
            .with(SubFilter::Device(vec!["DS1".to_string()]));
        assert_eq!(
            filter.to_sql(&conn).unwrap(),
            format!(
                "(relationships.relationship_type IN (0, 1)) AND (artifacts.data_source_obj_id IN ({}))",
                ds
            )
        );

        let unknown_device = SubFilter::Device(vec!["DS9".to_string()]);
        assert_eq!(unknown_device.to_sql(&conn).unwrap(), "0");

        let email = SubFilter::AccountType(vec!["EMAIL".to_string(), "NOPE".to_string()]);
        assert!(email.to_sql(&conn).unwrap().starts_with("account_types.account_type_id IN ("));
    }
}
