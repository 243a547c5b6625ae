use nom::bytes::complete::tag_no_case;
use nom::character::complete::{char, digit1};
use nom::combinator::all_consuming;
use nom::multi::separated_list1;
use nom::sequence::preceded;
use nom::IResult;
use rusqlite::{params, Connection, OptionalExtension};

use super::{load_realm, realm_from_row, realm_signature, OsAccountRealm, RealmScope, ScopeConfidence, REALM_SELECT};
use crate::case::CaseDatabase;
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::hosts::Host;
use crate::model::DbStatus;

/// Address shared by the well known service SIDs of every Windows host
pub const SPECIAL_WINDOWS_REALM_ADDR: &str = "SPECIAL_WINDOWS_ACCOUNTS";

const SPECIAL_SIDS: [&str; 3] = ["S-1-5-18", "S-1-5-19", "S-1-5-20"];
const SPECIAL_SID_PREFIXES: [&str; 5] = ["S-1-5-80", "S-1-5-82", "S-1-5-83", "S-1-5-90", "S-1-5-96"];

fn sid_components(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(preceded(tag_no_case("S-"), separated_list1(char('-'), digit1)))(input)
}

fn is_special_sid(sid: &str) -> bool {
    let sid = sid.to_ascii_uppercase();
    SPECIAL_SIDS.contains(&sid.as_str())
        || SPECIAL_SID_PREFIXES
            .iter()
            .any(|prefix| sid == *prefix || sid.starts_with(&format!("{}-", prefix)))
}

/// Realm address of a Windows SID: the SID without its relative id
pub fn windows_realm_address(sid: &str) -> Result<String> {
    if is_special_sid(sid) {
        return Ok(SPECIAL_WINDOWS_REALM_ADDR.to_string());
    }
    let (_, components) =
        sid_components(sid).map_err(|_| CaseDbError::invalid(format!("{} is not a Windows SID", sid)))?;
    if components.len() < 4 {
        return Err(CaseDbError::invalid(format!("SID {} has too few components", sid)));
    }
    match sid.rfind('-') {
        Some(end) => Ok(sid[..end].to_string()),
        None => Err(CaseDbError::invalid(format!("{} is not a Windows SID", sid))),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Active realm with `column` equal to `value`, preferring one scoped to the
/// host over a domain realm
fn find_realm(conn: &Connection, column: &str, value: &str, host_id: i64) -> Result<Option<OsAccountRealm>> {
    Ok(conn
        .query_row(
            &format!(
                "{} WHERE LOWER(realms.{}) = LOWER(?1) AND realms.db_status = ?2
                   AND (realms.scope_host_id = ?3 OR realms.scope_host_id IS NULL)
                 ORDER BY realms.scope_host_id IS NULL, realms.id LIMIT 1",
                REALM_SELECT, column
            ),
            params![value, DbStatus::Active.code(), host_id],
            realm_from_row,
        )
        .optional()?)
}

fn host_has_known_realm(conn: &Connection, host_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tsk_os_account_realms
         WHERE scope_host_id = ?1 AND scope_confidence = ?2 AND db_status = ?3
           AND (realm_addr IS NULL OR realm_addr != ?4)",
        params![
            host_id,
            ScopeConfidence::Known.code(),
            DbStatus::Active.code(),
            SPECIAL_WINDOWS_REALM_ADDR
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn find_windows_realm(
    conn: &Connection,
    sid: Option<&str>,
    realm_name: Option<&str>,
    host_id: i64,
) -> Result<Option<OsAccountRealm>> {
    let sid = non_empty(sid);
    let realm_name = non_empty(realm_name);
    if sid.is_none() && realm_name.is_none() {
        return Err(CaseDbError::invalid("a SID or a realm name is required"));
    }

    if let Some(sid) = sid {
        let addr = windows_realm_address(sid)?;
        if let Some(realm) = find_realm(conn, "realm_addr", &addr, host_id)? {
            return Ok(Some(realm));
        }
    }
    if let Some(name) = realm_name {
        if let Some(realm) = find_realm(conn, "realm_name", name, host_id)? {
            // A named realm with another address belongs to a different SID
            if sid.is_some() && realm.realm_addr.is_some() {
                return Ok(None);
            }
            return Ok(Some(realm));
        }
    }
    Ok(None)
}

pub(crate) fn create_windows_realm(
    conn: &Connection,
    sid: Option<&str>,
    realm_name: Option<&str>,
    host: &Host,
    scope: RealmScope,
) -> Result<OsAccountRealm> {
    let sid = non_empty(sid);
    let realm_name = non_empty(realm_name);
    if sid.is_none() && realm_name.is_none() {
        return Err(CaseDbError::invalid("a SID or a realm name is required"));
    }

    let addr = sid.map(windows_realm_address).transpose()?;
    let (scope_host_id, confidence) = if addr.as_deref() == Some(SPECIAL_WINDOWS_REALM_ADDR) {
        (Some(host.id), ScopeConfidence::Known)
    } else {
        match scope {
            RealmScope::Domain => (None, ScopeConfidence::Known),
            RealmScope::Local => (Some(host.id), ScopeConfidence::Known),
            RealmScope::Unknown if host_has_known_realm(conn, host.id)? => (None, ScopeConfidence::Known),
            RealmScope::Unknown => (Some(host.id), ScopeConfidence::Inferred),
        }
    };

    let signature = realm_signature(addr.as_deref(), realm_name, scope_host_id)?;
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM tsk_os_account_realms WHERE realm_signature = ?1",
            params![signature],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(CaseDbError::data(format!("realm {} already exists", signature)));
    }

    conn.execute(
        "INSERT INTO tsk_os_account_realms
            (realm_name, realm_addr, realm_signature, scope_host_id, scope_confidence, db_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            realm_name,
            addr,
            signature,
            scope_host_id,
            confidence.code(),
            DbStatus::Active.code()
        ],
    )?;
    load_realm(conn, conn.last_insert_rowid())
}

/// Realm operations on a case
pub struct OsAccountRealmManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> OsAccountRealmManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Create the realm of a Windows SID or domain name on `host`.
    ///
    /// Well known service SIDs always get the host's special accounts realm.
    pub fn new_windows_realm(
        &self,
        sid: Option<&str>,
        realm_name: Option<&str>,
        host: &Host,
        scope: RealmScope,
    ) -> Result<OsAccountRealm> {
        self.case.with_transaction(|trans| {
            let realm = create_windows_realm(trans, sid, realm_name, host, scope)?;
            trans.queue_event(CaseEvent::RealmsAdded(vec![realm.clone()]));
            Ok(realm)
        })
    }

    /// Find a realm by SID address, then by name. Realms scoped to `host`
    /// win over domain realms.
    pub fn get_windows_realm(&self, sid: Option<&str>, realm_name: Option<&str>, host: &Host) -> Result<Option<OsAccountRealm>> {
        find_windows_realm(&*self.case.connection()?, sid, realm_name, host.id)
    }

    pub fn get_realm_by_id(&self, realm_id: i64) -> Result<OsAccountRealm> {
        load_realm(&*self.case.connection()?, realm_id)
    }

    /// Write back a realm changed through its setters. Unchanged realms are
    /// left alone.
    pub fn update_realm(&self, realm: &mut OsAccountRealm) -> Result<()> {
        if !realm.is_dirty() {
            return Ok(());
        }
        self.case.with_transaction(|trans| {
            realm.signature = realm_signature(
                realm.realm_addr.as_deref(),
                realm.realm_name.as_deref(),
                realm.scope_host_id,
            )?;
            let updated = trans.execute(
                "UPDATE tsk_os_account_realms SET realm_name = ?1, realm_addr = ?2, realm_signature = ?3
                 WHERE id = ?4",
                params![realm.realm_name, realm.realm_addr, realm.signature, realm.id],
            )?;
            if updated == 0 {
                return Err(CaseDbError::not_found(format!("realm {}", realm.id)));
            }
            realm.clear_dirty();
            trans.queue_event(CaseEvent::RealmsUpdated(vec![realm.clone()]));
            Ok(())
        })
    }

    /// Name to show for a realm: its name, else its address
    pub fn get_realm_display_name(&self, realm: &OsAccountRealm) -> String {
        match (&realm.realm_name, &realm.realm_addr) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(addr)) => addr.clone(),
            _ => "Unknown".to_string(),
        }
    }
}
