//! Communications: accounts seen on devices and the relationships between them
//!
//! An account is identified by its type and a normalized identifier. Its
//! presence in a file is recorded as a TSK_ACCOUNT artifact, and every
//! message, call or contact links the accounts taking part through rows of
//! `account_relationships`.

mod filter;
mod helper;

pub use filter::{CommunicationsFilter, SubFilter};
pub use helper::{
    AccountAddress, CallMediaType, CommunicationArtifactsHelper, CommunicationDirection,
    MessageReadStatus, NewCallLog, NewContact, NewMessage,
};

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::blackboard::{insert_artifact, insert_attributes, load_artifact, load_attributes};
use crate::case::{id_list, CaseDatabase, CaseDbTransaction};
use crate::error::{CaseDbError, Result};
use crate::events::CaseEvent;
use crate::model::artifact::{artifact_ids, attribute_ids};
use crate::model::content::to_sql_err;
use crate::model::{code_enum, Attribute, AttributeValue, BlackboardArtifact, ReviewStatus};

/// Account types present in every case, as (type name, display name)
pub(crate) const PREDEFINED_ACCOUNT_TYPES: &[(&str, &str)] = &[
    ("CREDIT_CARD", "Credit Card"),
    ("DEVICE", "Device"),
    ("PHONE", "Phone"),
    ("EMAIL", "Email"),
    ("FACEBOOK", "Facebook"),
    ("TWITTER", "Twitter"),
    ("INSTAGRAM", "Instagram"),
    ("WHATSAPP", "WhatsApp"),
    ("MESSAGING_APP", "MessagingApp"),
    ("WEBSITE", "Website"),
];

code_enum! {
    /// What links two accounts
    RelationshipType: i32 {
        Message = 0 => "Message",
        CallLog = 1 => "Call Log",
        Contact = 2 => "Contact",
    }
}

/// A row of `account_types`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountType {
    pub type_id: i64,
    pub type_name: String,
    pub display_name: String,
}

impl AccountType {
    pub const CREDIT_CARD: &'static str = "CREDIT_CARD";
    pub const DEVICE: &'static str = "DEVICE";
    pub const PHONE: &'static str = "PHONE";
    pub const EMAIL: &'static str = "EMAIL";
    pub const FACEBOOK: &'static str = "FACEBOOK";
    pub const TWITTER: &'static str = "TWITTER";
    pub const INSTAGRAM: &'static str = "INSTAGRAM";
    pub const WHATSAPP: &'static str = "WHATSAPP";
    pub const MESSAGING_APP: &'static str = "MESSAGING_APP";
    pub const WEBSITE: &'static str = "WEBSITE";
}

/// A row of `accounts` joined with its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub account_id: i64,
    pub account_type: AccountType,
    /// Normalized identifier, unique within the type
    pub type_specific_id: String,
}

/// An account together with the TSK_ACCOUNT artifact recording it in a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFileInstance {
    pub account: Account,
    pub artifact: BlackboardArtifact,
}

impl AccountFileInstance {
    pub fn data_source_obj_id(&self) -> i64 {
        self.artifact.data_source_obj_id
    }
}

/// An account as seen on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountDeviceInstance {
    pub account: Account,
    pub device_id: String,
}

/// A folder of an email store (PST, mbox) holding message artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFolder {
    pub folder_id: i64,
    /// Object id of the email store the folder was found in
    pub src_obj_id: i64,
    pub parent_folder_id: Option<i64>,
    pub name: String,
    pub has_subfolders: bool,
}

/// Normalize an identifier for comparison within its account type.
///
/// Phone numbers keep their digits and a leading `+`; email addresses are
/// lowercased. Other types are trimmed only.
pub fn normalize_account_id(type_name: &str, id: &str) -> Result<String> {
    let id = id.trim();
    match type_name {
        AccountType::PHONE => normalize_phone(id),
        AccountType::EMAIL => normalize_email(id),
        _ if id.is_empty() => Err(CaseDbError::invalid("account id must not be empty")),
        _ => Ok(id.to_string()),
    }
}

fn normalize_phone(number: &str) -> Result<String> {
    let mut normalized = String::with_capacity(number.len());
    if number.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(number.chars().filter(|c| c.is_ascii_digit()));
    if normalized.trim_start_matches('+').is_empty() {
        return Err(CaseDbError::data(format!("invalid phone number '{}'", number)));
    }
    Ok(normalized)
}

fn normalize_email(address: &str) -> Result<String> {
    match address.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => {
            Ok(address.to_lowercase())
        }
        _ => Err(CaseDbError::data(format!("invalid email address '{}'", address))),
    }
}

const ACCOUNT_SELECT: &str = "SELECT accounts.account_id, accounts.account_unique_identifier,
        account_types.account_type_id, account_types.type_name, account_types.display_name
     FROM accounts
     JOIN account_types ON account_types.account_type_id = accounts.account_type_id";

fn account_type_from_row(row: &Row<'_>) -> rusqlite::Result<AccountType> {
    Ok(AccountType {
        type_id: row.get(0)?,
        type_name: row.get(1)?,
        display_name: row.get(2)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        account_id: row.get(0)?,
        type_specific_id: row.get(1)?,
        account_type: AccountType {
            type_id: row.get(2)?,
            type_name: row.get(3)?,
            display_name: row.get(4)?,
        },
    })
}

fn find_account_type(conn: &Connection, type_name: &str) -> Result<Option<AccountType>> {
    Ok(conn
        .query_row(
            "SELECT account_type_id, type_name, display_name FROM account_types WHERE type_name = ?1",
            params![type_name],
            account_type_from_row,
        )
        .optional()?)
}

fn load_account_type(conn: &Connection, type_name: &str) -> Result<AccountType> {
    find_account_type(conn, type_name)?
        .ok_or_else(|| CaseDbError::not_found(format!("account type {}", type_name)))
}

fn find_account(conn: &Connection, account_type: &AccountType, unique_id: &str) -> Result<Option<Account>> {
    Ok(conn
        .query_row(
            &format!(
                "{} WHERE accounts.account_type_id = ?1 AND accounts.account_unique_identifier = ?2",
                ACCOUNT_SELECT
            ),
            params![account_type.type_id, unique_id],
            account_from_row,
        )
        .optional()?)
}

fn load_account(conn: &Connection, account_id: i64) -> Result<Account> {
    conn.query_row(
        &format!("{} WHERE accounts.account_id = ?1", ACCOUNT_SELECT),
        params![account_id],
        account_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("account {}", account_id)))
}

fn device_id_of(conn: &Connection, data_source_obj_id: i64) -> Result<String> {
    conn.query_row(
        "SELECT device_id FROM data_source_info WHERE obj_id = ?1",
        params![data_source_obj_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("data source {}", data_source_obj_id)))
}

/// Object ids of the data sources collected from a device
pub(crate) fn data_sources_for_device(conn: &Connection, device_id: &str) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT obj_id FROM data_source_info WHERE device_id = ?1 ORDER BY obj_id")?;
    let ids = stmt
        .query_map(params![device_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Existing TSK_ACCOUNT artifact on `source_obj_id` for this account, if any
fn find_account_artifact(
    conn: &Connection,
    source_obj_id: i64,
    account: &Account,
) -> Result<Option<BlackboardArtifact>> {
    let mut stmt = conn.prepare(
        "SELECT artifact_id FROM blackboard_artifacts
         WHERE obj_id = ?1 AND artifact_type_id = ?2 ORDER BY artifact_id",
    )?;
    let candidates = stmt
        .query_map(params![source_obj_id, artifact_ids::TSK_ACCOUNT], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;

    for artifact_id in candidates {
        let attributes = load_attributes(conn, artifact_id)?;
        let value_of = |type_id: i32| {
            attributes
                .iter()
                .find(|a| a.attribute_type.type_id == type_id)
                .and_then(|a| a.value.as_str())
        };
        if value_of(attribute_ids::TSK_ACCOUNT_TYPE) == Some(account.account_type.type_name.as_str())
            && value_of(attribute_ids::TSK_ID) == Some(account.type_specific_id.as_str())
        {
            return Ok(Some(load_artifact(conn, artifact_id)?));
        }
    }
    Ok(None)
}

/// Get or create the account and its TSK_ACCOUNT artifact on `source_obj_id`
/// inside an open transaction
pub(crate) fn account_file_instance(
    trans: &mut CaseDbTransaction<'_>,
    type_name: &str,
    account_id: &str,
    module_name: &str,
    source_obj_id: i64,
) -> Result<AccountFileInstance> {
    let unique_id = normalize_account_id(type_name, account_id)?;
    let account_type = load_account_type(trans, type_name)?;
    let account = match find_account(trans, &account_type, &unique_id)? {
        Some(account) => account,
        None => {
            trans.execute(
                "INSERT INTO accounts (account_type_id, account_unique_identifier)
                 VALUES (?1, ?2)",
                params![account_type.type_id, unique_id],
            )?;
            let account = Account {
                account_id: trans.last_insert_rowid(),
                account_type: account_type.clone(),
                type_specific_id: unique_id.clone(),
            };
            trans.queue_event(CaseEvent::AccountsAdded(vec![account.clone()]));
            account
        }
    };

    let artifact = match find_account_artifact(trans, source_obj_id, &account)? {
        Some(artifact) => artifact,
        None => {
            let artifact = insert_artifact(trans, artifact_ids::TSK_ACCOUNT, source_obj_id)?;
            let attributes = [
                Attribute::standard(
                    attribute_ids::TSK_ACCOUNT_TYPE,
                    AttributeValue::String(account_type.type_name.clone()),
                    module_name,
                )?,
                Attribute::standard(
                    attribute_ids::TSK_ID,
                    AttributeValue::String(unique_id.clone()),
                    module_name,
                )?,
            ];
            insert_attributes(trans, &artifact, &attributes)?;
            trans.queue_event(CaseEvent::ArtifactsPosted {
                artifact_ids: vec![artifact.artifact_id],
                type_id: artifact_ids::TSK_ACCOUNT,
            });
            artifact
        }
    };

    Ok(AccountFileInstance { account, artifact })
}

/// Insert one relationship row per unordered pair of distinct participants.
/// Every participant must come from the artifact's data source.
pub(crate) fn insert_relationships(
    conn: &Connection,
    participants: &[&AccountFileInstance],
    source_artifact: &BlackboardArtifact,
    relationship_type: RelationshipType,
    date_time: i64,
) -> Result<()> {
    let data_source_obj_id = source_artifact.data_source_obj_id;
    if let Some(stray) = participants
        .iter()
        .find(|p| p.data_source_obj_id() != data_source_obj_id)
    {
        return Err(CaseDbError::data(format!(
            "account {} is from data source {}, not {}",
            stray.account.type_specific_id,
            stray.data_source_obj_id(),
            data_source_obj_id
        )));
    }

    let account_ids: BTreeSet<i64> = participants.iter().map(|p| p.account.account_id).collect();
    let account_ids: Vec<i64> = account_ids.into_iter().collect();
    let date_time = if date_time > 0 { Some(date_time) } else { None };

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO account_relationships
            (account1_id, account2_id, relationship_source_obj_id, date_time,
             relationship_type, data_source_obj_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (i, first) in account_ids.iter().enumerate() {
        for second in &account_ids[i + 1..] {
            stmt.execute(params![
                first,
                second,
                source_artifact.obj_id,
                date_time,
                relationship_type.code(),
                data_source_obj_id
            ])?;
        }
    }
    Ok(())
}

const FOLDER_SELECT: &str = "SELECT folder_id, src_obj_id, parent_folder_id, name,
        EXISTS (SELECT 1 FROM tsk_message_folders AS sub
                WHERE sub.parent_folder_id = tsk_message_folders.folder_id)
     FROM tsk_message_folders";

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<MessageFolder> {
    Ok(MessageFolder {
        folder_id: row.get(0)?,
        src_obj_id: row.get(1)?,
        parent_folder_id: row.get(2)?,
        name: row.get(3)?,
        has_subfolders: row.get(4)?,
    })
}

fn load_folder(conn: &Connection, folder_id: i64) -> Result<MessageFolder> {
    conn.query_row(
        &format!("{} WHERE folder_id = ?1", FOLDER_SELECT),
        params![folder_id],
        folder_from_row,
    )
    .optional()?
    .ok_or_else(|| CaseDbError::not_found(format!("message folder {}", folder_id)))
}

/// Joins shared by every relationship query. Filters refer to the
/// `relationships`, `account_types` and `artifacts` aliases.
const RELATIONSHIP_JOINS: &str = "FROM account_relationships AS relationships
     JOIN accounts ON (accounts.account_id = relationships.account1_id
                       OR accounts.account_id = relationships.account2_id)
     JOIN account_types ON account_types.account_type_id = accounts.account_type_id
     JOIN blackboard_artifacts AS artifacts
        ON artifacts.artifact_obj_id = relationships.relationship_source_obj_id
     JOIN data_source_info ON data_source_info.obj_id = artifacts.data_source_obj_id";

fn and_filter(conn: &Connection, filter: Option<&CommunicationsFilter>) -> Result<String> {
    let sql = match filter {
        Some(filter) => filter.to_sql(conn)?,
        None => String::new(),
    };
    Ok(if sql.is_empty() {
        String::new()
    } else {
        format!(" AND ({})", sql)
    })
}

/// Account and relationship operations on a case
pub struct CommunicationsManager<'a> {
    case: &'a CaseDatabase,
}

impl<'a> CommunicationsManager<'a> {
    pub fn new(case: &'a CaseDatabase) -> Self {
        Self { case }
    }

    /// Get or create an account type
    pub fn add_account_type(&self, type_name: &str, display_name: &str) -> Result<AccountType> {
        if type_name.is_empty() {
            return Err(CaseDbError::invalid("account type name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if let Some(existing) = find_account_type(trans, type_name)? {
                return Ok(existing);
            }
            trans.execute(
                "INSERT INTO account_types (type_name, display_name) VALUES (?1, ?2)",
                params![type_name, display_name],
            )?;
            tracing::debug!("Added account type {}", type_name);
            Ok(AccountType {
                type_id: trans.last_insert_rowid(),
                type_name: type_name.to_string(),
                display_name: display_name.to_string(),
            })
        })
    }

    pub fn get_account_type(&self, type_name: &str) -> Result<Option<AccountType>> {
        find_account_type(&*self.case.connection()?, type_name)
    }

    /// Account types that at least one account uses
    pub fn get_account_types_in_use(&self) -> Result<Vec<AccountType>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT account_types.account_type_id, account_types.type_name,
                    account_types.display_name
             FROM account_types
             JOIN accounts ON accounts.account_type_id = account_types.account_type_id
             ORDER BY account_types.account_type_id",
        )?;
        let types = stmt
            .query_map([], account_type_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(types)
    }

    /// Record that an account appears in `source_obj_id`.
    ///
    /// The account is created on first sight. The TSK_ACCOUNT artifact on
    /// the source is reused when one already names this account.
    pub fn create_account_file_instance(
        &self,
        type_name: &str,
        account_id: &str,
        module_name: &str,
        source_obj_id: i64,
    ) -> Result<AccountFileInstance> {
        self.case.with_transaction(|trans| {
            account_file_instance(trans, type_name, account_id, module_name, source_obj_id)
        })
    }

    pub fn get_account(&self, type_name: &str, account_id: &str) -> Result<Option<Account>> {
        let unique_id = normalize_account_id(type_name, account_id)?;
        let conn = self.case.connection()?;
        match find_account_type(&conn, type_name)? {
            Some(account_type) => find_account(&conn, &account_type, &unique_id),
            None => Ok(None),
        }
    }

    pub fn get_accounts(&self, type_name: &str) -> Result<Vec<Account>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE account_types.type_name = ?1 ORDER BY accounts.account_id",
            ACCOUNT_SELECT
        ))?;
        let accounts = stmt
            .query_map(params![type_name], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn get_account_by_id(&self, account_id: i64) -> Result<Account> {
        load_account(&*self.case.connection()?, account_id)
    }

    /// Link the sender and recipients of `source_artifact`.
    ///
    /// One row is stored per unordered pair of distinct accounts; pairs
    /// already linked by this artifact are skipped. Every participant must
    /// come from the artifact's data source.
    pub fn add_relationships(
        &self,
        sender: Option<&AccountFileInstance>,
        recipients: &[AccountFileInstance],
        source_artifact: &BlackboardArtifact,
        relationship_type: RelationshipType,
        date_time: i64,
    ) -> Result<()> {
        let participants: Vec<&AccountFileInstance> = sender.into_iter().chain(recipients).collect();
        self.case.with_transaction(|trans| {
            insert_relationships(trans, &participants, source_artifact, relationship_type, date_time)
        })
    }

    /// Set the examiner's verdict on the TSK_ACCOUNT artifact of an instance
    pub fn set_account_review_status(
        &self,
        instance: &AccountFileInstance,
        status: ReviewStatus,
    ) -> Result<AccountFileInstance> {
        let conn = self.case.connection()?;
        let updated = conn.execute(
            "UPDATE blackboard_artifacts SET review_status_id = ?1 WHERE artifact_id = ?2",
            params![status.code(), instance.artifact.artifact_id],
        )?;
        if updated == 0 {
            return Err(CaseDbError::not_found(format!(
                "account artifact {}",
                instance.artifact.artifact_id
            )));
        }
        Ok(AccountFileInstance {
            account: instance.account.clone(),
            artifact: load_artifact(&conn, instance.artifact.artifact_id)?,
        })
    }

    pub fn approve_account(&self, instance: &AccountFileInstance) -> Result<AccountFileInstance> {
        self.set_account_review_status(instance, ReviewStatus::Approved)
    }

    pub fn reject_account(&self, instance: &AccountFileInstance) -> Result<AccountFileInstance> {
        self.set_account_review_status(instance, ReviewStatus::Rejected)
    }

    /// Accounts that share at least one relationship with `account`
    pub fn get_accounts_with_relationship(&self, account: &Account) -> Result<Vec<Account>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE accounts.account_id IN (
                 SELECT account2_id FROM account_relationships WHERE account1_id = ?1
                 UNION
                 SELECT account1_id FROM account_relationships WHERE account2_id = ?1)
             ORDER BY accounts.account_id",
            ACCOUNT_SELECT
        ))?;
        let accounts = stmt
            .query_map(params![account.account_id], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Artifacts that link the two accounts, in either order
    pub fn get_relationships(&self, account1: &Account, account2: &Account) -> Result<Vec<BlackboardArtifact>> {
        self.relationship_artifacts(account1, account2, None)
    }

    /// Artifacts of one type that link the two accounts
    pub fn get_relationships_of_type(
        &self,
        account1: &Account,
        account2: &Account,
        artifact_type_id: i32,
    ) -> Result<Vec<BlackboardArtifact>> {
        self.relationship_artifacts(account1, account2, Some(artifact_type_id))
    }

    fn relationship_artifacts(
        &self,
        account1: &Account,
        account2: &Account,
        artifact_type_id: Option<i32>,
    ) -> Result<Vec<BlackboardArtifact>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT relationships.relationship_source_obj_id
             FROM account_relationships AS relationships
             JOIN blackboard_artifacts AS artifacts
                ON artifacts.artifact_obj_id = relationships.relationship_source_obj_id
             WHERE ((relationships.account1_id = ?1 AND relationships.account2_id = ?2)
                 OR (relationships.account1_id = ?2 AND relationships.account2_id = ?1))
               AND (?3 IS NULL OR artifacts.artifact_type_id = ?3)
             ORDER BY relationships.relationship_source_obj_id",
        )?;
        let obj_ids = stmt
            .query_map(
                params![account1.account_id, account2.account_id, artifact_type_id],
                |row| row.get(0),
            )?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        obj_ids
            .into_iter()
            .map(|obj_id| crate::blackboard::load_artifact_by_obj_id(&conn, obj_id))
            .collect()
    }

    /// Get or create a folder of the email store `src_obj_id`, under
    /// `parent_folder_id` or at the top level
    pub fn add_message_folder(
        &self,
        src_obj_id: i64,
        parent_folder_id: Option<i64>,
        name: &str,
    ) -> Result<MessageFolder> {
        if name.is_empty() {
            return Err(CaseDbError::invalid("message folder name must not be empty"));
        }
        self.case.with_transaction(|trans| {
            if let Some(parent_id) = parent_folder_id {
                let parent = load_folder(trans, parent_id)?;
                if parent.src_obj_id != src_obj_id {
                    return Err(CaseDbError::invalid(format!(
                        "folder {} belongs to object {}, not {}",
                        parent_id, parent.src_obj_id, src_obj_id
                    )));
                }
            }
            let existing: Option<i64> = trans
                .query_row(
                    "SELECT folder_id FROM tsk_message_folders
                     WHERE src_obj_id = ?1 AND parent_folder_id IS ?2 AND name = ?3",
                    params![src_obj_id, parent_folder_id, name],
                    |row| row.get(0),
                )
                .optional()?;
            let folder_id = match existing {
                Some(folder_id) => folder_id,
                None => {
                    trans.execute(
                        "INSERT INTO tsk_message_folders (src_obj_id, parent_folder_id, name)
                         VALUES (?1, ?2, ?3)",
                        params![src_obj_id, parent_folder_id, name],
                    )?;
                    trans.last_insert_rowid()
                }
            };
            load_folder(trans, folder_id)
        })
    }

    /// Folders of an email store directly under `parent`, or its top level
    /// folders when `parent` is `None`
    pub fn get_message_folders(&self, src_obj_id: i64, parent: Option<&MessageFolder>) -> Result<Vec<MessageFolder>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE src_obj_id = ?1 AND parent_folder_id IS ?2 ORDER BY folder_id",
            FOLDER_SELECT
        ))?;
        let folders = stmt
            .query_map(params![src_obj_id, parent.map(|p| p.folder_id)], folder_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    /// File a message artifact under a folder
    pub fn add_message_to_folder(&self, folder: &MessageFolder, message: &BlackboardArtifact) -> Result<()> {
        let conn = self.case.connection()?;
        load_folder(&conn, folder.folder_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO tsk_message_folder_messages (folder_id, artifact_obj_id)
             VALUES (?1, ?2)",
            params![folder.folder_id, message.obj_id],
        )?;
        Ok(())
    }

    /// Message artifacts filed directly under a folder
    pub fn get_messages(&self, folder: &MessageFolder) -> Result<Vec<BlackboardArtifact>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT artifact_obj_id FROM tsk_message_folder_messages
             WHERE folder_id = ?1 ORDER BY artifact_obj_id",
        )?;
        let obj_ids = stmt
            .query_map(params![folder.folder_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        obj_ids
            .into_iter()
            .map(|obj_id| crate::blackboard::load_artifact_by_obj_id(&conn, obj_id))
            .collect()
    }

    /// Every (account, device) pair that takes part in a relationship
    /// matching the filter
    pub fn get_account_device_instances_with_relationships(
        &self,
        filter: Option<&CommunicationsFilter>,
    ) -> Result<Vec<AccountDeviceInstance>> {
        let conn = self.case.connection()?;
        let sql = format!(
            "SELECT DISTINCT accounts.account_id, data_source_info.device_id {} WHERE 1{}
             ORDER BY accounts.account_id, data_source_info.device_id",
            RELATIONSHIP_JOINS,
            and_filter(&conn, filter)?
        );
        let mut stmt = conn.prepare(&sql)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        pairs
            .into_iter()
            .map(|(account_id, device_id)| {
                Ok(AccountDeviceInstance {
                    account: load_account(&conn, account_id)?,
                    device_id,
                })
            })
            .collect()
    }

    /// Number of distinct artifacts that link this account on its device
    pub fn get_relationship_sources_count(
        &self,
        instance: &AccountDeviceInstance,
        filter: Option<&CommunicationsFilter>,
    ) -> Result<i64> {
        let conn = self.case.connection()?;
        let data_sources = data_sources_for_device(&conn, &instance.device_id)?;
        if data_sources.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(DISTINCT relationships.relationship_source_obj_id) {}
             WHERE accounts.account_id = ?1
               AND relationships.data_source_obj_id IN ({}){}",
            RELATIONSHIP_JOINS,
            id_list(&data_sources),
            and_filter(&conn, filter)?
        );
        Ok(conn.query_row(&sql, params![instance.account.account_id], |row| row.get(0))?)
    }

    /// Distinct artifacts linking any of the instances on their devices
    pub fn get_relationship_sources(
        &self,
        instances: &[AccountDeviceInstance],
        filter: Option<&CommunicationsFilter>,
    ) -> Result<Vec<BlackboardArtifact>> {
        if instances.is_empty() {
            return Err(CaseDbError::invalid("account device instance list must not be empty"));
        }
        let conn = self.case.connection()?;

        let mut clauses = Vec::new();
        for instance in instances {
            let data_sources = data_sources_for_device(&conn, &instance.device_id)?;
            if !data_sources.is_empty() {
                clauses.push(format!(
                    "(accounts.account_id = {} AND relationships.data_source_obj_id IN ({}))",
                    instance.account.account_id,
                    id_list(&data_sources)
                ));
            }
        }
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT DISTINCT relationships.relationship_source_obj_id {} WHERE ({}){}
             ORDER BY relationships.relationship_source_obj_id",
            RELATIONSHIP_JOINS,
            clauses.join(" OR "),
            and_filter(&conn, filter)?
        );
        let mut stmt = conn.prepare(&sql)?;
        let obj_ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        obj_ids
            .into_iter()
            .map(|obj_id| crate::blackboard::load_artifact_by_obj_id(&conn, obj_id))
            .collect()
    }

    /// Accounts that share a relationship with this one on its device
    pub fn get_related_account_device_instances(
        &self,
        instance: &AccountDeviceInstance,
        filter: Option<&CommunicationsFilter>,
    ) -> Result<Vec<AccountDeviceInstance>> {
        let conn = self.case.connection()?;
        let data_sources = data_sources_for_device(&conn, &instance.device_id)?;
        if data_sources.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT accounts.account_id, relationships.data_source_obj_id {}
             WHERE (relationships.account1_id = ?1 OR relationships.account2_id = ?1)
               AND accounts.account_id != ?1
               AND relationships.data_source_obj_id IN ({}){}
             ORDER BY accounts.account_id",
            RELATIONSHIP_JOINS,
            id_list(&data_sources),
            and_filter(&conn, filter)?
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![instance.account.account_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut related: Vec<AccountDeviceInstance> = Vec::new();
        for (account_id, data_source_obj_id) in rows {
            let found = AccountDeviceInstance {
                account: load_account(&conn, account_id)?,
                device_id: device_id_of(&conn, data_source_obj_id)?,
            };
            if !related.contains(&found) {
                related.push(found);
            }
        }
        Ok(related)
    }

    /// Relationship types recorded for a source artifact
    pub fn get_relationship_types(&self, source_artifact_obj_id: i64) -> Result<Vec<RelationshipType>> {
        let conn = self.case.connection()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT relationship_type FROM account_relationships
             WHERE relationship_source_obj_id = ?1 ORDER BY relationship_type",
        )?;
        let rows = stmt.query_map(params![source_artifact_obj_id], |row| {
            let code: i32 = row.get(0)?;
            to_sql_err(RelationshipType::from_code(code))
        })?;
        let types = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(types)
    }
}
