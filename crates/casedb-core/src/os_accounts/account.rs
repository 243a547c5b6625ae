use rusqlite::{params, Connection, OptionalExtension, Row};

use super::realm::{create_windows_realm, find_windows_realm};
use super::{
    load_realm, OsAccount, OsAccountAttribute, OsAccountInstance, OsAccountInstanceType, OsAccountStatus,
    OsAccountType, RealmScope,
};
use crate::blackboard::{attribute_type_from_row, check_value_type, value_columns, value_from_columns};
use crate::case::content::insert_object;
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts::Host;
use crate::model::content::to_sql_err;
use crate::model::{DbStatus, ObjectType};

const ACCOUNT_SELECT: &str = "SELECT accounts.os_account_obj_id, accounts.realm_id, accounts.login_name,
        accounts.full_name, accounts.addr, accounts.signature, accounts.status, accounts.type,
        accounts.created_date, accounts.db_status, accounts.merged_into
     FROM tsk_os_accounts AS accounts";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<OsAccount> {
    let status: Option<i32> = row.get(6)?;
    let account_type: Option<i32> = row.get(7)?;
    let db_status: i32 = row.get(9)?;
    Ok(OsAccount {
        obj_id: row.get(0)?,
        realm_id: row.get(1)?,
        login_name: row.get(2)?,
        full_name: row.get(3)?,
        addr: row.get(4)?,
        signature: row.get(5)?,
        status: to_sql_err(OsAccountStatus::from_code(status.unwrap_or(0)))?,
        account_type: to_sql_err(OsAccountType::from_code(account_type.unwrap_or(0)))?,
        creation_time: row.get(8)?,
        db_status: to_sql_err(DbStatus::from_code(db_status))?,
        merged_into: row.get(10)?,
        dirty: false,
    })
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<OsAccountInstance> {
    let instance_type: i32 = row.get(3)?;
    Ok(OsAccountInstance {
        id: row.get(0)?,
        os_account_obj_id: row.get(1)?,
        data_source_obj_id: row.get(2)?,
        instance_type: to_sql_err(OsAccountInstanceType::from_code(instance_type))?,
    })
}

fn load_os_account(conn: &Connection, obj_id: i64) -> Result<OsAccount> {
    conn.query_row(
        &format!("{} WHERE accounts.os_account_obj_id = ?1", ACCOUNT_SELECT),
        params![obj_id],
        account_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("OS account {}", obj_id)))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Unique key of an account within its realm: the unique id if there is
/// one, else `realm/login`, else the login
fn account_signature(addr: Option<&str>, login: Option<&str>, realm_name: Option<&str>) -> Result<String> {
    match (non_empty(addr), non_empty(login), non_empty(realm_name)) {
        (Some(addr), _, _) => Ok(addr.to_string()),
        (None, Some(login), Some(realm_name)) => Ok(format!("{}/{}", realm_name, login)),
        (None, Some(login), None) => Ok(login.to_string()),
        (None, None, _) => Err(CaseDbError::invalid("an account needs a unique id or a login name")),
    }
}

/// Active account in the realm, matched by unique id first and then by login
fn find_os_account(conn: &Connection, realm_id: i64, sid: Option<&str>, login: Option<&str>) -> Result<Option<OsAccount>> {
    let lookups = [("addr", non_empty(sid)), ("login_name", non_empty(login))];
    for (column, value) in lookups {
        let Some(value) = value else { continue };
        let account = conn
            .query_row(
                &format!(
                    "{} WHERE accounts.realm_id = ?1 AND LOWER(accounts.{}) = LOWER(?2)
                       AND accounts.db_status = ?3
                     ORDER BY accounts.os_account_obj_id LIMIT 1",
                    ACCOUNT_SELECT, column
                ),
                params![realm_id, value, DbStatus::Active.code()],
                account_from_row,
            )
            .optional()?;
        if account.is_some() {
            return Ok(account);
        }
    }
    Ok(None)
}

/// OS account operations on a case
pub struct OsAccountManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> OsAccountManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Create a Windows account seen on `host`, creating its realm when no
    /// existing realm matches the SID or realm name. An account already in
    /// the realm is an error.
    pub fn new_windows_os_account(
        &self,
        sid: Option<&str>,
        login: Option<&str>,
        realm_name: Option<&str>,
        host: &Host,
        scope: RealmScope,
    ) -> Result<OsAccount> {
        let sid = non_empty(sid);
        let login = non_empty(login);
        if sid.is_none() && login.is_none() {
            return Err(CaseDbError::invalid("a SID or a login name is required"));
        }

        self.case.with_transaction(|trans| {
            let (realm, realm_created) = match find_windows_realm(trans, sid, realm_name, host.id)? {
                Some(realm) => (realm, false),
                None => (create_windows_realm(trans, sid, realm_name, host, scope)?, true),
            };

            if let Some(existing) = find_os_account(trans, realm.id, sid, login)? {
                return Err(CaseDbError::data(format!(
                    "account {} already exists in realm {}",
                    existing.signature, realm.signature
                )));
            }

            let signature = account_signature(sid, login, realm.realm_name.as_deref())?;
            let obj_id = insert_object(trans, None, ObjectType::OsAccount)?;
            trans.execute(
                "INSERT INTO tsk_os_accounts
                    (os_account_obj_id, login_name, realm_id, addr, signature, status, type, db_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    obj_id,
                    login,
                    realm.id,
                    sid,
                    signature,
                    OsAccountStatus::Unknown.code(),
                    OsAccountType::Unknown.code(),
                    DbStatus::Active.code()
                ],
            )?;
            let account = load_os_account(trans, obj_id)?;

            if realm_created {
                trans.queue_event(CaseEvent::RealmsAdded(vec![realm]));
            }
            trans.queue_event(CaseEvent::OsAccountsAdded(vec![account.clone()]));
            Ok(account)
        })
    }

    /// Find a Windows account by SID or login within the realm the SID or
    /// realm name resolves to on `host`
    pub fn get_windows_os_account(
        &self,
        sid: Option<&str>,
        login: Option<&str>,
        realm_name: Option<&str>,
        host: &Host,
    ) -> Result<Option<OsAccount>> {
        let conn = self.case.connection()?;
        match find_windows_realm(&conn, sid, realm_name, host.id)? {
            Some(realm) => find_os_account(&conn, realm.id, sid, login),
            None => Ok(None),
        }
    }

    pub fn get_os_account_by_id(&self, obj_id: i64) -> Result<OsAccount> {
        load_os_account(&*self.case.connection()?, obj_id)
    }

    /// Active accounts whose realm is scoped to the host or that were seen
    /// on one of its data sources
    pub fn get_os_accounts(&self, host: &Host) -> Result<Vec<OsAccount>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE accounts.db_status = ?1
               AND (accounts.realm_id IN (SELECT id FROM tsk_os_account_realms WHERE scope_host_id = ?2)
                    OR accounts.os_account_obj_id IN (
                        SELECT instances.os_account_obj_id
                        FROM tsk_os_account_instances AS instances
                        JOIN data_source_info ON data_source_info.obj_id = instances.data_source_obj_id
                        WHERE data_source_info.host_id = ?2))
             ORDER BY accounts.os_account_obj_id",
            ACCOUNT_SELECT
        ))?;
        let accounts = stmt
            .query_map(params![DbStatus::Active.code(), host.id], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Write back an account changed through its setters
    pub fn update_os_account(&self, account: &mut OsAccount) -> Result<()> {
        if !account.is_dirty() {
            return Ok(());
        }
        self.case.with_transaction(|trans| {
            let realm = load_realm(trans, account.realm_id)?;
            account.signature = account_signature(
                account.addr.as_deref(),
                account.login_name.as_deref(),
                realm.realm_name.as_deref(),
            )?;
            let updated = trans.execute(
                "UPDATE tsk_os_accounts
                 SET login_name = ?1, full_name = ?2, signature = ?3, status = ?4, type = ?5,
                     created_date = ?6
                 WHERE os_account_obj_id = ?7",
                params![
                    account.login_name,
                    account.full_name,
                    account.signature,
                    account.status.code(),
                    account.account_type.code(),
                    account.creation_time,
                    account.obj_id
                ],
            )?;
            if updated == 0 {
                return Err(CaseDbError::not_found(format!("OS account {}", account.obj_id)));
            }
            account.clear_dirty();
            trans.queue_event(CaseEvent::OsAccountsUpdated(vec![account.clone()]));
            Ok(())
        })
    }

    /// Record that the account was seen on a data source. Recording the same
    /// sighting twice returns the first record.
    pub fn new_os_account_instance(
        &self,
        account: &OsAccount,
        data_source_obj_id: i64,
        instance_type: OsAccountInstanceType,
    ) -> Result<OsAccountInstance> {
        self.case.with_transaction(|trans| {
            let is_data_source: bool = trans
                .query_row(
                    "SELECT 1 FROM data_source_info WHERE obj_id = ?1",
                    params![data_source_obj_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !is_data_source {
                return Err(CaseDbError::not_found(format!("data source {}", data_source_obj_id)));
            }

            trans.execute(
                "INSERT OR IGNORE INTO tsk_os_account_instances
                    (os_account_obj_id, data_source_obj_id, instance_type)
                 VALUES (?1, ?2, ?3)",
                params![account.obj_id, data_source_obj_id, instance_type.code()],
            )?;
            Ok(trans.query_row(
                "SELECT id, os_account_obj_id, data_source_obj_id, instance_type
                 FROM tsk_os_account_instances
                 WHERE os_account_obj_id = ?1 AND data_source_obj_id = ?2 AND instance_type = ?3",
                params![account.obj_id, data_source_obj_id, instance_type.code()],
                instance_from_row,
            )?)
        })
    }

    /// Store attributes of an account. Every attribute must belong to
    /// `account` and carry a value of its type's kind.
    pub fn add_os_account_attributes(&self, account: &OsAccount, attributes: &[OsAccountAttribute]) -> Result<()> {
        self.case.with_transaction(|trans| {
            let stored = load_os_account(trans, account.obj_id)?;
            let mut stmt = trans.prepare(
                "INSERT INTO tsk_os_account_attributes
                    (os_account_obj_id, host_id, source_obj_id, attribute_type_id, value_type,
                     value_byte, value_text, value_int32, value_int64, value_double)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for attr in attributes {
                if attr.os_account_obj_id != account.obj_id {
                    return Err(CaseDbError::invalid(format!(
                        "attribute belongs to OS account {}, not {}",
                        attr.os_account_obj_id, account.obj_id
                    )));
                }
                check_value_type(trans, &attr.attribute_type, &attr.value)?;
                let (byte, text, int32, int64, double) = value_columns(&attr.value);
                stmt.execute(params![
                    account.obj_id,
                    attr.host_id,
                    attr.source_obj_id,
                    attr.attribute_type.type_id,
                    attr.value.value_type().code(),
                    byte,
                    text,
                    int32,
                    int64,
                    double,
                ])?;
            }
            drop(stmt);
            trans.queue_event(CaseEvent::OsAccountsUpdated(vec![stored]));
            Ok(())
        })
    }

    pub fn get_os_account_attributes(&self, account: &OsAccount) -> Result<Vec<OsAccountAttribute>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT t.attribute_type_id, t.type_name, t.display_name, t.value_type,
                    a.os_account_obj_id, a.host_id, a.source_obj_id,
                    a.value_byte, a.value_text, a.value_int32, a.value_int64, a.value_double
             FROM tsk_os_account_attributes a
             JOIN blackboard_attribute_types t ON t.attribute_type_id = a.attribute_type_id
             WHERE a.os_account_obj_id = ?1
             ORDER BY a.id",
        )?;
        let attributes = stmt
            .query_map(params![account.obj_id], |row| {
                let attribute_type = attribute_type_from_row(row)?;
                let value = value_from_columns(row, attribute_type.value_type, 7)?;
                Ok(OsAccountAttribute {
                    attribute_type,
                    value,
                    os_account_obj_id: row.get(4)?,
                    host_id: row.get(5)?,
                    source_obj_id: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attributes)
    }

    pub fn get_os_account_instances(&self, account: &OsAccount) -> Result<Vec<OsAccountInstance>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, os_account_obj_id, data_source_obj_id, instance_type
             FROM tsk_os_account_instances WHERE os_account_obj_id = ?1 ORDER BY id",
        )?;
        let instances = stmt
            .query_map(params![account.obj_id], instance_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;

    #[test]
    fn test_signature_forms() {
        assert_eq!(account_signature(Some("S-1-5-21-1-2-3-500"), Some("admin"), Some("CORP")).unwrap(), "S-1-5-21-1-2-3-500");
        assert_eq!(account_signature(None, Some("admin"), Some("CORP")).unwrap(), "CORP/admin");
        assert_eq!(account_signature(Some(""), Some("admin"), None).unwrap(), "admin");
        assert!(account_signature(None, None, Some("CORP")).is_err());
    }

    #[test]
    fn test_create_and_find() {
        let (_temp_dir, case) = create_test_case();
        let host = case.hosts().new_host("laptop").unwrap();
        let accounts = case.os_accounts();

        let sid = "S-1-5-21-1111-2222-3333-1001";
        let alice = accounts
            .new_windows_os_account(Some(sid), Some("alice"), Some("CORP"), &host, RealmScope::Domain)
            .unwrap();
        assert_eq!(alice.signature, sid);
        assert_eq!(alice.db_status, DbStatus::Active);

        let object_type: i32 = case
            .connection()
            .unwrap()
            .query_row("SELECT type FROM tsk_objects WHERE obj_id = ?1", params![alice.obj_id], |row| row.get(0))
            .unwrap();
        assert_eq!(object_type, ObjectType::OsAccount.code());

        // Same realm through the SID, found by login
        let by_login = accounts
            .get_windows_os_account(Some("S-1-5-21-1111-2222-3333-2000"), Some("ALICE"), None, &host)
            .unwrap()
            .unwrap();
        assert_eq!(by_login.obj_id, alice.obj_id);

        let bob = accounts
            .new_windows_os_account(None, Some("bob"), Some("CORP"), &host, RealmScope::Domain)
            .unwrap();
        assert_eq!(bob.realm_id, alice.realm_id);
        assert_eq!(bob.signature, "CORP/bob");

        let duplicate = accounts.new_windows_os_account(Some(sid), None, None, &host, RealmScope::Domain);
        assert!(duplicate.unwrap_err().is_data_error());
        assert!(accounts
            .new_windows_os_account(None, None, Some("CORP"), &host, RealmScope::Domain)
            .is_err());
        assert!(accounts
            .new_windows_os_account(None, Some("carol"), None, &host, RealmScope::Domain)
            .is_err());
    }

    #[test]
    fn test_update_account() {
        let (_temp_dir, case) = create_test_case();
        let host = case.hosts().new_host("laptop").unwrap();
        let accounts = case.os_accounts();

        let mut account = accounts
            .new_windows_os_account(None, Some("svc"), Some("LAPTOP"), &host, RealmScope::Local)
            .unwrap();
        account.set_full_name("Service Account");
        account.set_status(OsAccountStatus::Disabled);
        account.set_account_type(OsAccountType::Service);
        account.set_creation_time(1_600_000_000);
        accounts.update_os_account(&mut account).unwrap();
        assert!(!account.is_dirty());

        let stored = accounts.get_os_account_by_id(account.obj_id).unwrap();
        assert_eq!(stored.full_name.as_deref(), Some("Service Account"));
        assert_eq!(stored.status, OsAccountStatus::Disabled);
        assert_eq!(stored.account_type, OsAccountType::Service);
        assert_eq!(stored.creation_time, Some(1_600_000_000));
    }

    #[test]
    fn test_instances_and_host_accounts() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "disk.img");
        let image_host = case.hosts().get_host_for_data_source(image_id).unwrap();
        let other_host = case.hosts().new_host("server").unwrap();
        let accounts = case.os_accounts();

        let account = accounts
            .new_windows_os_account(None, Some("admin"), Some("CORP"), &other_host, RealmScope::Domain)
            .unwrap();
        assert!(accounts.get_os_accounts(&image_host).unwrap().is_empty());

        let first = accounts
            .new_os_account_instance(&account, image_id, OsAccountInstanceType::Launched)
            .unwrap();
        let again = accounts
            .new_os_account_instance(&account, image_id, OsAccountInstanceType::Launched)
            .unwrap();
        assert_eq!(first.id, again.id);
        accounts
            .new_os_account_instance(&account, image_id, OsAccountInstanceType::Accessed)
            .unwrap();
        assert_eq!(accounts.get_os_account_instances(&account).unwrap().len(), 2);

        let seen = accounts.get_os_accounts(&image_host).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].obj_id, account.obj_id);

        let missing = accounts.new_os_account_instance(&account, 9999, OsAccountInstanceType::Referenced);
        assert!(missing.unwrap_err().is_data_error());
    }

    #[test]
    fn test_os_account_attributes() {
        use crate::model::artifact::attribute_ids;
        use crate::model::AttributeValue;

        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "laptop.img");
        let host = case.hosts().get_host_for_data_source(image_id).unwrap();
        let accounts = case.os_accounts();
        let bob = accounts
            .new_windows_os_account(Some("S-1-5-21-9-9-9-1002"), Some("bob"), None, &host, RealmScope::Local)
            .unwrap();

        let home = OsAccountAttribute::standard(attribute_ids::TSK_PATH, AttributeValue::String("C:\\Users\\bob".into()), &bob)
            .unwrap()
            .with_host(host.id)
            .with_source(image_id);
        let last_login =
            OsAccountAttribute::standard(attribute_ids::TSK_DATETIME, AttributeValue::DateTime(1_600_000_000), &bob).unwrap();
        accounts.add_os_account_attributes(&bob, &[home.clone(), last_login.clone()]).unwrap();

        assert_eq!(accounts.get_os_account_attributes(&bob).unwrap(), vec![home, last_login]);
        assert!(
            OsAccountAttribute::standard(attribute_ids::TSK_PATH, AttributeValue::Integer(3), &bob)
                .unwrap_err()
                .is_data_error()
        );

        let mut forged =
            OsAccountAttribute::standard(attribute_ids::TSK_NAME, AttributeValue::String("x".into()), &bob).unwrap();
        forged.value = AttributeValue::Long(7);
        assert!(accounts.add_os_account_attributes(&bob, &[forged]).unwrap_err().is_data_error());
        assert_eq!(accounts.get_os_account_attributes(&bob).unwrap().len(), 2);
    }
}
