//! Operating system accounts and the realms (domains or hosts) that scope them

mod account;
mod realm;

pub use account::OsAccountManager;
pub use realm::{windows_realm_address, OsAccountRealmManager, SPECIAL_WINDOWS_REALM_ADDR};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{CaseDbError, Result};
use crate::model::content::to_sql_err;
use crate::model::{code_enum, AttributeType, AttributeValue, DbStatus};

code_enum! {
    /// How far a realm reaches, as stated by the caller
    RealmScope: i32 {
        Unknown = 0 => "Unknown",
        Local = 1 => "Local",
        Domain = 2 => "Domain",
    }
}

code_enum! {
    /// Whether a realm's host scope was observed or guessed
    ScopeConfidence: i32 {
        Known = 0 => "Known",
        Inferred = 1 => "Inferred",
    }
}

code_enum! {
    OsAccountStatus: i32 {
        Unknown = 0 => "Unknown",
        Active = 1 => "Active",
        Disabled = 2 => "Disabled",
        Deleted = 3 => "Deleted",
    }
}

code_enum! {
    OsAccountType: i32 {
        Unknown = 0 => "Unknown",
        Service = 1 => "Service",
        Interactive = 2 => "Interactive",
    }
}

code_enum! {
    /// How an account was seen on a data source
    OsAccountInstanceType: i32 {
        Launched = 0 => "Launched",
        Accessed = 1 => "Accessed",
        Referenced = 2 => "Referenced",
    }
}

/// A row of `tsk_os_account_realms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsAccountRealm {
    pub id: i64,
    pub realm_name: Option<String>,
    pub realm_addr: Option<String>,
    pub signature: String,
    /// Host the realm is local to; `None` for a domain
    pub scope_host_id: Option<i64>,
    pub scope_confidence: ScopeConfidence,
    pub db_status: DbStatus,
    pub merged_into: Option<i64>,
    #[serde(skip)]
    dirty: bool,
}

impl OsAccountRealm {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_realm_name(&mut self, name: impl Into<String>) {
        self.realm_name = Some(name.into());
        self.dirty = true;
    }

    pub fn set_realm_addr(&mut self, addr: impl Into<String>) {
        self.realm_addr = Some(addr.into());
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// A row of `tsk_os_accounts`; the id is the account's object id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsAccount {
    pub obj_id: i64,
    pub realm_id: i64,
    pub login_name: Option<String>,
    pub full_name: Option<String>,
    /// Unique id within the realm, a SID on Windows
    pub addr: Option<String>,
    pub signature: String,
    pub status: OsAccountStatus,
    pub account_type: OsAccountType,
    pub creation_time: Option<i64>,
    pub db_status: DbStatus,
    pub merged_into: Option<i64>,
    #[serde(skip)]
    dirty: bool,
}

impl OsAccount {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_login_name(&mut self, login_name: impl Into<String>) {
        self.login_name = Some(login_name.into());
        self.dirty = true;
    }

    pub fn set_full_name(&mut self, full_name: impl Into<String>) {
        self.full_name = Some(full_name.into());
        self.dirty = true;
    }

    pub fn set_status(&mut self, status: OsAccountStatus) {
        self.status = status;
        self.dirty = true;
    }

    pub fn set_account_type(&mut self, account_type: OsAccountType) {
        self.account_type = account_type;
        self.dirty = true;
    }

    pub fn set_creation_time(&mut self, creation_time: i64) {
        self.creation_time = Some(creation_time);
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// A row of `tsk_os_account_instances`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsAccountInstance {
    pub id: i64,
    pub os_account_obj_id: i64,
    pub data_source_obj_id: i64,
    pub instance_type: OsAccountInstanceType,
}

/// An attribute attached to an OS account, such as a home directory or the
/// last login time, optionally tied to the host and object it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsAccountAttribute {
    pub attribute_type: AttributeType,
    pub value: AttributeValue,
    pub os_account_obj_id: i64,
    pub host_id: Option<i64>,
    pub source_obj_id: Option<i64>,
}

impl OsAccountAttribute {
    /// Attribute of a standard type; the value must match the type
    pub fn standard(type_id: i32, value: AttributeValue, account: &OsAccount) -> Result<Self> {
        let attribute_type = AttributeType::standard(type_id).ok_or_else(|| {
            CaseDbError::invalid(format!("{} is not a standard attribute type", type_id))
        })?;
        if attribute_type.value_type != value.value_type() {
            return Err(CaseDbError::invalid(format!(
                "attribute {} holds {} values, got {}",
                attribute_type.type_name,
                attribute_type.value_type,
                value.value_type()
            )));
        }
        Ok(Self {
            attribute_type,
            value,
            os_account_obj_id: account.obj_id,
            host_id: None,
            source_obj_id: None,
        })
    }

    pub fn with_host(mut self, host_id: i64) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn with_source(mut self, source_obj_id: i64) -> Self {
        self.source_obj_id = Some(source_obj_id);
        self
    }
}

pub(crate) const REALM_SELECT: &str = "SELECT realms.id, realms.realm_name, realms.realm_addr,
        realms.realm_signature, realms.scope_host_id, realms.scope_confidence,
        realms.db_status, realms.merged_into
     FROM tsk_os_account_realms AS realms";

pub(crate) fn realm_from_row(row: &Row<'_>) -> rusqlite::Result<OsAccountRealm> {
    let confidence: i32 = row.get(5)?;
    let status: i32 = row.get(6)?;
    Ok(OsAccountRealm {
        id: row.get(0)?,
        realm_name: row.get(1)?,
        realm_addr: row.get(2)?,
        signature: row.get(3)?,
        scope_host_id: row.get(4)?,
        scope_confidence: to_sql_err(ScopeConfidence::from_code(confidence))?,
        db_status: to_sql_err(DbStatus::from_code(status))?,
        merged_into: row.get(7)?,
        dirty: false,
    })
}

pub(crate) fn load_realm(conn: &Connection, realm_id: i64) -> Result<OsAccountRealm> {
    conn.query_row(
        &format!("{} WHERE realms.id = ?1", REALM_SELECT),
        params![realm_id],
        realm_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("realm {}", realm_id)))
}

/// Signature that keeps realms unique: the address (or else the name)
/// followed by the scope host id, or `DOMAIN` for unscoped realms
pub(crate) fn realm_signature(addr: Option<&str>, name: Option<&str>, scope_host_id: Option<i64>) -> Result<String> {
    let key = match (addr, name) {
        (Some(addr), _) if !addr.is_empty() => addr,
        (_, Some(name)) if !name.is_empty() => name,
        _ => return Err(CaseDbError::invalid("realm address and name cannot both be empty")),
    };
    Ok(match scope_host_id {
        Some(host_id) => format!("{}_{}", key, host_id),
        None => format!("{}_DOMAIN", key),
    })
}

fn realms_for_host(conn: &Connection, host_id: i64) -> Result<Vec<OsAccountRealm>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE realms.scope_host_id = ?1 AND realms.db_status = ?2 ORDER BY realms.id",
        REALM_SELECT
    ))?;
    let realms = stmt
        .query_map(params![host_id, DbStatus::Active.code()], realm_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(realms)
}

/// Realm on `host_id` that stands for the same domain or machine as `realm`
fn matching_realm(conn: &Connection, realm: &OsAccountRealm, host_id: i64) -> Result<Option<OsAccountRealm>> {
    Ok(realms_for_host(conn, host_id)?.into_iter().find(|candidate| {
        let same_addr = match (&realm.realm_addr, &candidate.realm_addr) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        let same_name = match (&realm.realm_name, &candidate.realm_name) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        same_addr || same_name
    }))
}

/// Move the realms scoped to `source_host_id` over to `dest_host_id`.
///
/// A realm that already exists on the destination is merged into it: its
/// accounts move across (accounts already present there are marked merged)
/// and the source realm is marked merged. Other realms are rescoped.
/// Returns every realm that changed.
pub(crate) fn move_realms_to_host(conn: &Connection, source_host_id: i64, dest_host_id: i64) -> Result<Vec<OsAccountRealm>> {
    let mut changed = Vec::new();

    for realm in realms_for_host(conn, source_host_id)? {
        match matching_realm(conn, &realm, dest_host_id)? {
            Some(dest_realm) => {
                conn.execute(
                    "UPDATE OR IGNORE tsk_os_accounts SET realm_id = ?1 WHERE realm_id = ?2",
                    params![dest_realm.id, realm.id],
                )?;
                // Accounts left behind collided with one already in the destination
                conn.execute(
                    "UPDATE tsk_os_accounts
                     SET db_status = ?1,
                         merged_into = (SELECT dest.os_account_obj_id FROM tsk_os_accounts AS dest
                                        WHERE dest.realm_id = ?2
                                          AND dest.signature = tsk_os_accounts.signature)
                     WHERE realm_id = ?3",
                    params![DbStatus::Merged.code(), dest_realm.id, realm.id],
                )?;
                conn.execute(
                    "UPDATE tsk_os_account_realms
                     SET db_status = ?1, merged_into = ?2,
                         realm_signature = realm_signature || '_merged_' || id
                     WHERE id = ?3",
                    params![DbStatus::Merged.code(), dest_realm.id, realm.id],
                )?;
                tracing::debug!("Merged realm {} into realm {}", realm.id, dest_realm.id);
            }
            None => {
                let signature = realm_signature(
                    realm.realm_addr.as_deref(),
                    realm.realm_name.as_deref(),
                    Some(dest_host_id),
                )?;
                conn.execute(
                    "UPDATE tsk_os_account_realms SET scope_host_id = ?1, realm_signature = ?2
                     WHERE id = ?3",
                    params![dest_host_id, signature, realm.id],
                )?;
            }
        }
        changed.push(load_realm(conn, realm.id)?);
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;

    #[test]
    fn test_realm_signature() {
        assert_eq!(realm_signature(Some("S-1-5-21-1"), Some("CORP"), None).unwrap(), "S-1-5-21-1_DOMAIN");
        assert_eq!(realm_signature(None, Some("CORP"), Some(4)).unwrap(), "CORP_4");
        assert_eq!(realm_signature(Some(""), Some("CORP"), Some(4)).unwrap(), "CORP_4");
        assert!(realm_signature(None, Some(""), None).is_err());
    }

    #[test]
    fn test_move_realms_rescopes_and_merges() {
        let (_temp_dir, case) = create_test_case();
        let laptop = case.hosts().new_host("laptop").unwrap();
        let desktop = case.hosts().new_host("desktop").unwrap();
        let realms = case.os_account_realms();
        let accounts = case.os_accounts();

        let sid = "S-1-5-21-1111-2222-3333-1001";
        let alice_laptop = accounts
            .new_windows_os_account(Some(sid), Some("alice"), None, &laptop, RealmScope::Local)
            .unwrap();
        accounts
            .new_windows_os_account(Some(sid), Some("alice"), None, &desktop, RealmScope::Local)
            .unwrap();
        let only_laptop = realms
            .new_windows_realm(None, Some("WORKGROUP"), &laptop, RealmScope::Local)
            .unwrap();

        let changed = {
            let conn = case.connection().unwrap();
            move_realms_to_host(&conn, laptop.id, desktop.id).unwrap()
        };
        assert_eq!(changed.len(), 2);

        let merged = realms.get_realm_by_id(alice_laptop.realm_id).unwrap();
        assert_eq!(merged.db_status, DbStatus::Merged);
        let rescoped = realms.get_realm_by_id(only_laptop.id).unwrap();
        assert_eq!(rescoped.scope_host_id, Some(desktop.id));
        assert_eq!(rescoped.signature, format!("WORKGROUP_{}", desktop.id));

        let left_behind = accounts.get_os_account_by_id(alice_laptop.obj_id).unwrap();
        assert_eq!(left_behind.db_status, DbStatus::Merged);
        assert!(left_behind.merged_into.is_some());
    }
}
