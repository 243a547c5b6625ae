//! Hosts: the machines data sources were collected from

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::case::content::load_image;
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::host_address;
use crate::model::content::to_sql_err;
use crate::model::{DbStatus, Image};
use crate::os_accounts;

/// A row of `tsk_hosts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub db_status: DbStatus,
    pub person_id: Option<i64>,
    pub merged_into: Option<i64>,
}

impl Host {
    pub fn is_active(&self) -> bool {
        self.db_status == DbStatus::Active
    }
}

pub(crate) const HOST_SELECT: &str =
    "SELECT id, name, db_status, person_id, merged_into FROM tsk_hosts";

pub(crate) fn host_from_row(row: &Row<'_>) -> rusqlite::Result<Host> {
    let status: i32 = row.get(2)?;
    Ok(Host {
        id: row.get(0)?,
        name: row.get(1)?,
        db_status: to_sql_err(DbStatus::from_code(status))?,
        person_id: row.get(3)?,
        merged_into: row.get(4)?,
    })
}

pub(crate) fn load_host(conn: &Connection, host_id: i64) -> Result<Host> {
    conn.query_row(
        &format!("{} WHERE id = ?1", HOST_SELECT),
        params![host_id],
        host_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("host {}", host_id)))
}

pub(crate) fn query_hosts(conn: &Connection, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Host>> {
    let mut stmt = conn.prepare(&format!("{} WHERE {} ORDER BY id", HOST_SELECT, where_clause))?;
    let hosts = stmt
        .query_map(args, host_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hosts)
}

fn find_active_host(conn: &Connection, name: &str) -> Result<Option<Host>> {
    Ok(conn
        .query_row(
            &format!(
                "{} WHERE LOWER(name) = LOWER(?1) AND db_status = ?2 ORDER BY id LIMIT 1",
                HOST_SELECT
            ),
            params![name, DbStatus::Active.code()],
            host_from_row,
        )
        .optional()?)
}

fn insert_host(conn: &Connection, name: &str) -> Result<Host> {
    conn.execute(
        "INSERT INTO tsk_hosts (name, db_status) VALUES (?1, ?2)",
        params![name, DbStatus::Active.code()],
    )?;
    Ok(Host {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        db_status: DbStatus::Active,
        person_id: None,
        merged_into: None,
    })
}

/// Find an active host by name, ignoring case, or create it.
/// The flag is true when the host was created.
pub(crate) fn get_or_create_host(conn: &Connection, name: &str) -> Result<(Host, bool)> {
    if name.is_empty() {
        return Err(CaseDbError::invalid("host name must not be empty"));
    }
    if let Some(host) = find_active_host(conn, name)? {
        return Ok((host, false));
    }
    let host = insert_host(conn, name)?;
    tracing::debug!("Created host {} ({})", host.name, host.id);
    Ok((host, true))
}

/// Host operations on a case
pub struct HostManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> HostManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Get the active host with this name, creating it when missing
    pub fn new_host(&self, name: &str) -> Result<Host> {
        self.case.with_transaction(|trans| {
            let (host, created) = get_or_create_host(trans, name)?;
            if created {
                trans.queue_event(CaseEvent::HostsAdded(vec![host.clone()]));
            }
            Ok(host)
        })
    }

    /// Create a host. An active host with the same name is an error.
    pub fn create_host(&self, name: &str) -> Result<Host> {
        if name.is_empty() {
            return Err(CaseDbError::invalid("host name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if find_active_host(trans, name)?.is_some() {
                return Err(CaseDbError::data(format!("host {} already exists", name)));
            }
            let host = insert_host(trans, name)?;
            trans.queue_event(CaseEvent::HostsAdded(vec![host.clone()]));
            Ok(host)
        })
    }

    pub fn get_host(&self, host_id: i64) -> Result<Host> {
        load_host(&*self.case.connection()?, host_id)
    }

    /// Active host with this name, ignoring case
    pub fn get_host_by_name(&self, name: &str) -> Result<Option<Host>> {
        find_active_host(&*self.case.connection()?, name)
    }

    /// All active hosts
    pub fn get_hosts(&self) -> Result<Vec<Host>> {
        query_hosts(
            &*self.case.connection()?,
            "db_status = ?1",
            &[&DbStatus::Active.code()],
        )
    }

    pub fn get_host_for_data_source(&self, data_source_id: i64) -> Result<Host> {
        let conn = self.case.connection()?;
        let host_id: Option<i64> = conn
            .query_row(
                "SELECT host_id FROM data_source_info WHERE obj_id = ?1",
                params![data_source_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| CaseDbError::not_found(format!("data source {}", data_source_id)))?;
        let host_id = host_id.ok_or_else(|| {
            CaseDbError::data(format!("data source {} has no host", data_source_id))
        })?;
        load_host(&conn, host_id)
    }

    pub fn get_data_sources_for_host(&self, host_id: i64) -> Result<Vec<Image>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT obj_id FROM data_source_info WHERE host_id = ?1 ORDER BY obj_id",
        )?;
        let ids = stmt
            .query_map(params![host_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids.into_iter().map(|id| load_image(&conn, id)).collect()
    }

    pub fn set_host_for_data_source(&self, data_source_id: i64, host_id: i64) -> Result<()> {
        let conn = self.case.connection()?;
        load_host(&conn, host_id)?;
        let updated = conn.execute(
            "UPDATE data_source_info SET host_id = ?1 WHERE obj_id = ?2",
            params![host_id, data_source_id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!("data source {}", data_source_id)));
        }
        Ok(())
    }

    pub fn update_host_name(&self, host_id: i64, name: &str) -> Result<Host> {
        if name.is_empty() {
            return Err(CaseDbError::invalid("host name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            let updated = trans.execute(
                "UPDATE tsk_hosts SET name = ?1 WHERE id = ?2",
                params![name, host_id],
            )?;
            if updated == 0 {
                return Err(CaseDbError::not_found(format!("host {}", host_id)));
            }
            let host = load_host(trans, host_id)?;
            trans.queue_event(CaseEvent::HostsUpdated(vec![host.clone()]));
            Ok(host)
        })
    }

    /// Delete the active host with this name. A host that still owns data
    /// sources cannot be deleted. Returns the deleted id, if any.
    pub fn delete_host(&self, name: &str) -> Result<Option<i64>> {
        self.case.with_transaction(|trans| {
            let host = match find_active_host(trans, name)? {
                Some(host) => host,
                None => return Ok(None),
            };
            let data_sources: i64 = trans.query_row(
                "SELECT COUNT(*) FROM data_source_info WHERE host_id = ?1",
                params![host.id],
                |row| row.get(0),
            )?;
            if data_sources > 0 {
                return Err(CaseDbError::data(format!(
                    "host {} still has {} data source(s)",
                    host.name, data_sources
                )));
            }
            trans.execute("DELETE FROM tsk_hosts WHERE id = ?1", params![host.id])?;
            trans.queue_event(CaseEvent::HostsDeleted(vec![host.id]));
            Ok(Some(host.id))
        })
    }

    /// Fold `source_id` into `dest_id`: data sources and realms move to the
    /// destination and the source is marked merged.
    pub fn merge_hosts(&self, source_id: i64, dest_id: i64) -> Result<Host> {
        if source_id == dest_id {
            return Err(CaseDbError::invalid("cannot merge a host into itself"));
        }
        self.case.with_transaction(|trans| {
            let source = load_host(trans, source_id)?;
            let dest = load_host(trans, dest_id)?;
            if !source.is_active() || !dest.is_active() {
                return Err(CaseDbError::data("only active hosts can be merged"));
            }

            let realms = os_accounts::move_realms_to_host(trans, source_id, dest_id)?;
            host_address::move_addresses_to_host(trans, source_id, dest_id)?;
            trans.execute(
                "UPDATE data_source_info SET host_id = ?1 WHERE host_id = ?2",
                params![dest_id, source_id],
            )?;
            trans.execute(
                "UPDATE tsk_hosts SET db_status = ?1, merged_into = ?2 WHERE id = ?3",
                params![DbStatus::Merged.code(), dest_id, source_id],
            )?;

            let merged = load_host(trans, source_id)?;
            if !realms.is_empty() {
                trans.queue_event(CaseEvent::RealmsUpdated(realms));
            }
            trans.queue_event(CaseEvent::HostsUpdated(vec![merged, dest.clone()]));
            tracing::info!("Merged host {} into {}", source.name, dest.name);
            Ok(dest)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;

    #[test]
    fn test_new_host_is_get_or_create() {
        let (_temp_dir, case) = create_test_case();
        let hosts = case.hosts();

        let a = hosts.new_host("Workstation").unwrap();
        let b = hosts.new_host("WORKSTATION").unwrap();
        assert_eq!(a, b);
        assert!(hosts.new_host("").unwrap_err().is_data_error());
        assert!(hosts.create_host("workstation").unwrap_err().is_data_error());
    }

    #[test]
    fn test_image_gets_default_host() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "laptop.E01");

        let host = case.hosts().get_host_for_data_source(image_id).unwrap();
        assert_eq!(host.name, "laptop.E01 Host");
        let sources = case.hosts().get_data_sources_for_host(host.id).unwrap();
        assert_eq!(sources[0].id, image_id);
    }

    #[test]
    fn test_update_and_delete() {
        let (_temp_dir, case) = create_test_case();
        let hosts = case.hosts();
        let host = hosts.new_host("old").unwrap();

        let renamed = hosts.update_host_name(host.id, "new").unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(hosts.delete_host("NEW").unwrap(), Some(host.id));
        assert_eq!(hosts.delete_host("new").unwrap(), None);
        assert!(hosts.get_host(host.id).unwrap_err().is_data_error());
    }

    #[test]
    fn test_delete_host_with_data_source_fails() {
        let (_temp_dir, case) = create_test_case();
        add_test_image(&case, "disk.dd");
        assert!(case.hosts().delete_host("disk.dd Host").is_err());
    }

    #[test]
    fn test_merge_hosts() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "disk.dd");
        let hosts = case.hosts();
        let source = hosts.get_host_for_data_source(image_id).unwrap();
        let dest = hosts.new_host("Desktop").unwrap();

        hosts.merge_hosts(source.id, dest.id).unwrap();

        assert_eq!(hosts.get_host_for_data_source(image_id).unwrap().id, dest.id);
        let merged = hosts.get_host(source.id).unwrap();
        assert_eq!(merged.db_status, DbStatus::Merged);
        assert_eq!(merged.merged_into, Some(dest.id));
        assert_eq!(hosts.get_hosts().unwrap(), vec![dest.clone()]);
        assert!(hosts.merge_hosts(dest.id, dest.id).is_err());
    }
}
