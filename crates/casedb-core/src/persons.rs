//! Persons: the people hosts belong to

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::case::{id_list, CaseDatabase};
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts::{load_host, query_hosts, Host};
use crate::model::DbStatus;

/// A row of `tsk_persons`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

fn person_from_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn find_person(conn: &Connection, name: &str) -> Result<Option<Person>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM tsk_persons WHERE LOWER(name) = LOWER(?1)",
            params![name],
            person_from_row,
        )
        .optional()?)
}

/// Person operations on a case
pub struct PersonManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> PersonManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Get the person with this name, ignoring case, or create it
    pub fn new_person(&self, name: &str) -> Result<Person> {
        if name.is_empty() {
            return Err(CaseDbError::invalid("person name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if let Some(person) = find_person(trans, name)? {
                return Ok(person);
            }
            trans.execute("INSERT INTO tsk_persons (name) VALUES (?1)", params![name])?;
            let person = Person {
                id: trans.last_insert_rowid(),
                name: name.to_string(),
            };
            trans.queue_event(CaseEvent::PersonsAdded(vec![person.clone()]));
            Ok(person)
        })
    }

    pub fn get_persons(&self) -> Result<Vec<Person>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare("SELECT id, name FROM tsk_persons ORDER BY id")?;
        let persons = stmt
            .query_map([], person_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    pub fn get_person(&self, person_id: i64) -> Result<Person> {
        let conn = self.case.connection()?;
        conn.query_row(
            "SELECT id, name FROM tsk_persons WHERE id = ?1",
            params![person_id],
            person_from_row,
        )
        .optional()?
        .ok_or_else(|| CaseDbError::not_found(format!("person {}", person_id)))
    }

    pub fn get_person_by_name(&self, name: &str) -> Result<Option<Person>> {
        find_person(&*self.case.connection()?, name)
    }

    pub fn update_person(&self, person: &Person) -> Result<Person> {
        if person.name.is_empty() {
            return Err(CaseDbError::invalid("person name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            let updated = trans.execute(
                "UPDATE tsk_persons SET name = ?1 WHERE id = ?2",
                params![person.name, person.id],
            )?;
            if updated == 0 {
                return Err(CaseDbError::not_found(format!("person {}", person.id)));
            }
            trans.queue_event(CaseEvent::PersonsUpdated(vec![person.clone()]));
            Ok(person.clone())
        })
    }

    /// Delete the person with this name; their hosts are left without a person
    pub fn delete_person(&self, name: &str) -> Result<()> {
        self.case.with_transaction(|trans| {
            if let Some(person) = find_person(trans, name)? {
                trans.execute("DELETE FROM tsk_persons WHERE id = ?1", params![person.id])?;
                trans.queue_event(CaseEvent::PersonsDeleted(vec![person.id]));
            }
            Ok(())
        })
    }

    pub fn get_hosts_for_person(&self, person_id: i64) -> Result<Vec<Host>> {
        query_hosts(
            &*self.case.connection()?,
            "person_id = ?1 AND db_status = ?2",
            &[&person_id, &DbStatus::Active.code()],
        )
    }

    pub fn get_hosts_without_persons(&self) -> Result<Vec<Host>> {
        query_hosts(
            &*self.case.connection()?,
            "person_id IS NULL AND db_status = ?1",
            &[&DbStatus::Active.code()],
        )
    }

    pub fn get_person_for_host(&self, host_id: i64) -> Result<Option<Person>> {
        let conn = self.case.connection()?;
        let host = load_host(&conn, host_id)?;
        match host.person_id {
            Some(person_id) => Ok(conn
                .query_row(
                    "SELECT id, name FROM tsk_persons WHERE id = ?1",
                    params![person_id],
                    person_from_row,
                )
                .optional()?),
            None => Ok(None),
        }
    }

    pub fn add_hosts_to_person(&self, person_id: i64, host_ids: &[i64]) -> Result<()> {
        if host_ids.is_empty() {
            return Err(CaseDbError::invalid("host list must not be empty"));
        }
        self.case.with_transaction(|trans| {
            trans.execute(
                &format!(
                    "UPDATE tsk_hosts SET person_id = ?1 WHERE id IN ({})",
                    id_list(host_ids)
                ),
                params![person_id],
            )?;
            trans.queue_event(CaseEvent::HostsAddedToPerson {
                person_id,
                host_ids: host_ids.to_vec(),
            });
            Ok(())
        })
    }

    pub fn remove_hosts_from_person(&self, person_id: i64, host_ids: &[i64]) -> Result<()> {
        if host_ids.is_empty() {
            return Err(CaseDbError::invalid("host list must not be empty"));
        }
        self.case.with_transaction(|trans| {
            trans.execute(
                &format!(
                    "UPDATE tsk_hosts SET person_id = NULL WHERE person_id = ?1 AND id IN ({})",
                    id_list(host_ids)
                ),
                params![person_id],
            )?;
            trans.queue_event(CaseEvent::HostsRemovedFromPerson {
                person_id,
                host_ids: host_ids.to_vec(),
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_new_person_get_or_create() {
        let (_temp_dir, case) = create_test_case();
        let persons = case.persons();

        let alice = persons.new_person("Alice").unwrap();
        assert_eq!(persons.new_person("ALICE").unwrap(), alice);
        assert_eq!(persons.get_persons().unwrap().len(), 1);
        assert!(persons.new_person("").unwrap_err().is_data_error());
    }

    #[test]
    fn test_hosts_for_person() {
        let (_temp_dir, case) = create_test_case();
        let persons = case.persons();
        let alice = persons.new_person("Alice").unwrap();
        let laptop = case.hosts().new_host("laptop").unwrap();
        let phone = case.hosts().new_host("phone").unwrap();

        persons.add_hosts_to_person(alice.id, &[laptop.id, phone.id]).unwrap();
        assert_eq!(persons.get_hosts_for_person(alice.id).unwrap().len(), 2);
        assert_eq!(persons.get_person_for_host(laptop.id).unwrap(), Some(alice.clone()));

        persons.remove_hosts_from_person(alice.id, &[phone.id]).unwrap();
        let without = persons.get_hosts_without_persons().unwrap();
        assert_eq!(without.iter().map(|h| h.id).collect::<Vec<_>>(), vec![phone.id]);

        assert!(persons.add_hosts_to_person(alice.id, &[]).is_err());
        assert!(persons.remove_hosts_from_person(alice.id, &[]).is_err());
    }

    #[test]
    fn test_delete_person_releases_hosts() {
        let (_temp_dir, case) = create_test_case();
        let persons = case.persons();
        let bob = persons.new_person("Bob").unwrap();
        let host = case.hosts().new_host("server").unwrap();
        persons.add_hosts_to_person(bob.id, &[host.id]).unwrap();

        persons.delete_person("bob").unwrap();
        assert!(persons.get_person_by_name("Bob").unwrap().is_none());
        assert_eq!(persons.get_person_for_host(host.id).unwrap(), None);
    }

    #[test]
    fn test_update_person_publishes_event() {
        let (_temp_dir, case) = create_test_case();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        case.subscribe(move |event| {
            if let CaseEvent::PersonsUpdated(persons) = event {
                sink.lock().unwrap().extend(persons.iter().map(|p| p.name.clone()));
            }
        });

        let persons = case.persons();
        let mut carol = persons.new_person("Carol").unwrap();
        carol.name = "Caroline".to_string();
        persons.update_person(&carol).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["Caroline".to_string()]);
        assert_eq!(persons.get_person(carol.id).unwrap().name, "Caroline");

        carol.name.clear();
        assert!(persons.update_person(&carol).is_err());
    }
}
