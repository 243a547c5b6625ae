//! Posting contacts, messages and call logs found by a parser module
//!
//! Each post creates the artifact, its attributes, the accounts of everyone
//! involved and the relationships to the device's own account in a single
//! transaction.

use serde::{Deserialize, Serialize};

use super::{account_file_instance, device_id_of, insert_relationships, AccountFileInstance, AccountType, RelationshipType};
use crate::blackboard::{insert_artifact, insert_attributes};
use crate::case::content::data_source_of;
use crate::case::{CaseDatabase, CaseDbTransaction};
use crate::error::Result;
use crate::events::CaseEvent;
use crate::model::artifact::{artifact_ids, attribute_ids};
use crate::model::{Attribute, AttributeValue, BlackboardArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageReadStatus {
    #[default]
    Unknown,
    Unread,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommunicationDirection {
    #[default]
    Unknown,
    Incoming,
    Outgoing,
}

impl CommunicationDirection {
    pub fn label(self) -> &'static str {
        match self {
            CommunicationDirection::Unknown => "Unknown",
            CommunicationDirection::Incoming => "Incoming",
            CommunicationDirection::Outgoing => "Outgoing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallMediaType {
    #[default]
    Unknown,
    Audio,
    Video,
}

impl CallMediaType {
    pub fn label(self) -> &'static str {
        match self {
            CallMediaType::Unknown => "Unknown",
            CallMediaType::Audio => "Audio",
            CallMediaType::Video => "Video",
        }
    }
}

/// An account identifier as it appears in an application, with the name
/// shown next to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAddress {
    pub unique_id: String,
    pub display_name: String,
}

impl AccountAddress {
    pub fn new(unique_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Display name, or the identifier when there is none
    fn shown(&self) -> &str {
        if self.display_name.is_empty() {
            &self.unique_id
        } else {
            &self.display_name
        }
    }
}

/// A contact book entry
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub account_id: String,
    pub name: String,
    pub phone_number: String,
    pub home_phone_number: String,
    pub mobile_phone_number: String,
    pub email: String,
    pub extra_attributes: Vec<Attribute>,
}

impl NewContact {
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_phone_number(mut self, number: impl Into<String>) -> Self {
        self.phone_number = number.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// A message sent or received by the device owner
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub message_type: String,
    pub direction: CommunicationDirection,
    pub sender: Option<AccountAddress>,
    pub recipients: Vec<AccountAddress>,
    /// Seconds since the epoch; 0 when unknown
    pub date_time: i64,
    pub read_status: MessageReadStatus,
    pub subject: String,
    pub text: String,
    pub thread_id: String,
    pub extra_attributes: Vec<Attribute>,
}

/// A call placed or received by the device owner
#[derive(Debug, Clone, Default)]
pub struct NewCallLog {
    pub direction: CommunicationDirection,
    pub caller: Option<AccountAddress>,
    pub callees: Vec<AccountAddress>,
    pub start_time: i64,
    pub end_time: i64,
    /// Not stored; kept for parsers that report it
    pub media_type: CallMediaType,
    pub extra_attributes: Vec<Attribute>,
}

/// Posts communication artifacts found in one source file.
///
/// Accounts of the other parties get `accounts_type`. Relationships always
/// run from the "self" account, which is the device account of the source's
/// data source unless another one is given.
pub struct CommunicationArtifactsHelper<'a> {
    case: &'a CaseDatabase,
    module_name: String,
    source_obj_id: i64,
    accounts_type: String,
    self_account: AccountFileInstance,
}

impl<'a> CommunicationArtifactsHelper<'a> {
    pub fn new(case: &'a CaseDatabase, module_name: &str, source_obj_id: i64, accounts_type: &str) -> Result<Self> {
        let device_id = {
            let conn = case.connection()?;
            let data_source_id = data_source_of(&conn, source_obj_id)?;
            device_id_of(&conn, data_source_id)?
        };
        let self_address = AccountAddress::new(device_id, "");
        Self::with_self_account(case, module_name, source_obj_id, accounts_type, AccountType::DEVICE, &self_address)
    }

    /// Use `self_address` of `self_type` as the owner's account
    pub fn with_self_account(
        case: &'a CaseDatabase,
        module_name: &str,
        source_obj_id: i64,
        accounts_type: &str,
        self_type: &str,
        self_address: &AccountAddress,
    ) -> Result<Self> {
        let self_account = case.communications().create_account_file_instance(
            self_type,
            &self_address.unique_id,
            module_name,
            source_obj_id,
        )?;
        Ok(Self {
            case,
            module_name: module_name.to_string(),
            source_obj_id,
            accounts_type: accounts_type.to_string(),
            self_account,
        })
    }

    pub fn self_account(&self) -> &AccountFileInstance {
        &self.self_account
    }

    /// Post a TSK_CONTACT artifact and link the contact's account to the owner
    pub fn add_contact(&self, contact: &NewContact) -> Result<BlackboardArtifact> {
        let mut attributes = vec![self.string(attribute_ids::TSK_NAME, &contact.name)?];
        self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER, &contact.phone_number)?;
        self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_HOME, &contact.home_phone_number)?;
        self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_MOBILE, &contact.mobile_phone_number)?;
        self.push_string(&mut attributes, attribute_ids::TSK_EMAIL, &contact.email)?;
        attributes.extend(contact.extra_attributes.iter().cloned());

        self.case.with_transaction(|trans| {
            let artifact = self.post(trans, artifact_ids::TSK_CONTACT, &attributes)?;
            let other = account_file_instance(
                trans,
                &self.accounts_type,
                &contact.account_id,
                &self.module_name,
                self.source_obj_id,
            )?;
            self.link(trans, &other, &artifact, RelationshipType::Contact, 0)?;
            Ok(artifact)
        })
    }

    /// Post a TSK_MESSAGE artifact and link the sender and each recipient
    /// to the owner
    pub fn add_message(&self, message: &NewMessage) -> Result<BlackboardArtifact> {
        let mut attributes = Vec::new();
        if message.date_time != 0 {
            attributes.push(Attribute::standard(
                attribute_ids::TSK_DATETIME,
                AttributeValue::DateTime(message.date_time),
                self.module_name.as_str(),
            )?);
        }
        if message.read_status != MessageReadStatus::Unknown {
            let read = if message.read_status == MessageReadStatus::Read { 1 } else { 0 };
            attributes.push(Attribute::standard(
                attribute_ids::TSK_READ_STATUS,
                AttributeValue::Integer(read),
                self.module_name.as_str(),
            )?);
        }
        self.push_string(&mut attributes, attribute_ids::TSK_MESSAGE_TYPE, &message.message_type)?;
        self.push_direction(&mut attributes, message.direction)?;
        if let Some(sender) = &message.sender {
            self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_FROM, &sender.display_name)?;
        }
        self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_TO, &join_addresses(&message.recipients))?;
        self.push_string(&mut attributes, attribute_ids::TSK_SUBJECT, &message.subject)?;
        self.push_string(&mut attributes, attribute_ids::TSK_TEXT, &message.text)?;
        self.push_string(&mut attributes, attribute_ids::TSK_THREAD_ID, &message.thread_id)?;
        attributes.extend(message.extra_attributes.iter().cloned());

        self.case.with_transaction(|trans| {
            let artifact = self.post(trans, artifact_ids::TSK_MESSAGE, &attributes)?;
            self.link_parties(
                trans,
                message.sender.as_ref(),
                &message.recipients,
                &artifact,
                RelationshipType::Message,
                message.date_time,
            )?;
            Ok(artifact)
        })
    }

    /// Post a TSK_CALLLOG artifact and link the caller and each callee to
    /// the owner
    pub fn add_calllog(&self, call: &NewCallLog) -> Result<BlackboardArtifact> {
        let mut attributes = Vec::new();
        for (type_id, time) in [
            (attribute_ids::TSK_DATETIME_START, call.start_time),
            (attribute_ids::TSK_DATETIME_END, call.end_time),
        ] {
            if time != 0 {
                attributes.push(Attribute::standard(
                    type_id,
                    AttributeValue::DateTime(time),
                    self.module_name.as_str(),
                )?);
            }
        }
        self.push_direction(&mut attributes, call.direction)?;
        if let Some(caller) = &call.caller {
            self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_FROM, &caller.unique_id)?;
            self.push_string(&mut attributes, attribute_ids::TSK_NAME, &caller.display_name)?;
        }
        self.push_string(&mut attributes, attribute_ids::TSK_PHONE_NUMBER_TO, &join_addresses(&call.callees))?;
        attributes.extend(call.extra_attributes.iter().cloned());

        self.case.with_transaction(|trans| {
            let artifact = self.post(trans, artifact_ids::TSK_CALLLOG, &attributes)?;
            self.link_parties(
                trans,
                call.caller.as_ref(),
                &call.callees,
                &artifact,
                RelationshipType::CallLog,
                call.start_time,
            )?;
            Ok(artifact)
        })
    }

    fn post(&self, trans: &mut CaseDbTransaction<'_>, type_id: i32, attributes: &[Attribute]) -> Result<BlackboardArtifact> {
        let artifact = insert_artifact(trans, type_id, self.source_obj_id)?;
        insert_attributes(trans, &artifact, attributes)?;
        trans.queue_event(CaseEvent::ArtifactsPosted {
            artifact_ids: vec![artifact.artifact_id],
            type_id,
        });
        Ok(artifact)
    }

    fn link_parties(
        &self,
        trans: &mut CaseDbTransaction<'_>,
        sender: Option<&AccountAddress>,
        recipients: &[AccountAddress],
        artifact: &BlackboardArtifact,
        relationship_type: RelationshipType,
        date_time: i64,
    ) -> Result<()> {
        for address in sender.into_iter().chain(recipients) {
            let other = account_file_instance(
                trans,
                &self.accounts_type,
                &address.unique_id,
                &self.module_name,
                self.source_obj_id,
            )?;
            self.link(trans, &other, artifact, relationship_type, date_time)?;
        }
        Ok(())
    }

    /// Relate the owner to `other`; the owner is never related to itself
    fn link(
        &self,
        trans: &mut CaseDbTransaction<'_>,
        other: &AccountFileInstance,
        artifact: &BlackboardArtifact,
        relationship_type: RelationshipType,
        date_time: i64,
    ) -> Result<()> {
        if other.account == self.self_account.account {
            return Ok(());
        }
        insert_relationships(trans, &[&self.self_account, other], artifact, relationship_type, date_time)
    }

    fn string(&self, type_id: i32, value: &str) -> Result<Attribute> {
        Attribute::standard(type_id, AttributeValue::String(value.to_string()), self.module_name.as_str())
    }

    fn push_string(&self, attributes: &mut Vec<Attribute>, type_id: i32, value: &str) -> Result<()> {
        if !value.is_empty() {
            attributes.push(self.string(type_id, value)?);
        }
        Ok(())
    }

    fn push_direction(&self, attributes: &mut Vec<Attribute>, direction: CommunicationDirection) -> Result<()> {
        if direction != CommunicationDirection::Unknown {
            attributes.push(self.string(attribute_ids::TSK_DIRECTION, direction.label())?);
        }
        Ok(())
    }
}

fn join_addresses(addresses: &[AccountAddress]) -> String {
    addresses
        .iter()
        .map(AccountAddress::shown)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::test_support::*;
    use crate::model::NewFile;

    fn helper_for(case: &CaseDatabase) -> (i64, CommunicationArtifactsHelper<'_>) {
        let image_id = add_test_image(case, "phone.img");
        let db = case.add_file(image_id, NewFile::regular("mmssms.db", 10)).unwrap().id;
        let helper = CommunicationArtifactsHelper::new(case, "sms parser", db, AccountType::PHONE).unwrap();
        (db, helper)
    }

    fn attribute_text(case: &CaseDatabase, artifact: &BlackboardArtifact, type_id: i32) -> Option<String> {
        case.blackboard()
            .get_attributes(artifact.artifact_id)
            .unwrap()
            .into_iter()
            .find(|a| a.attribute_type.type_id == type_id)
            .map(|a| a.value_string())
    }

    #[test]
    fn test_self_account_is_device() {
        let (_temp_dir, case) = create_test_case();
        let (_, helper) = helper_for(&case);
        assert_eq!(helper.self_account().account.account_type.type_name, AccountType::DEVICE);
    }

    #[test]
    fn test_add_contact() {
        let (_temp_dir, case) = create_test_case();
        let (_, helper) = helper_for(&case);

        let contact = helper
            .add_contact(&NewContact::new("555-0100", "Jane").with_email("jane@example.test"))
            .unwrap();
        assert_eq!(contact.type_id, artifact_ids::TSK_CONTACT);
        assert_eq!(attribute_text(&case, &contact, attribute_ids::TSK_NAME).as_deref(), Some("Jane"));
        assert_eq!(attribute_text(&case, &contact, attribute_ids::TSK_PHONE_NUMBER), None);

        let comms = case.communications();
        let jane = comms.get_account(AccountType::PHONE, "5550100").unwrap().unwrap();
        let related = comms.get_accounts_with_relationship(&jane).unwrap();
        assert_eq!(related, vec![helper.self_account().account.clone()]);
        assert_eq!(
            comms.get_relationships(&helper.self_account().account, &jane).unwrap(),
            vec![contact]
        );
    }

    #[test]
    fn test_add_message() {
        let (_temp_dir, case) = create_test_case();
        let (_, helper) = helper_for(&case);

        let message = helper
            .add_message(&NewMessage {
                message_type: "SMS".to_string(),
                direction: CommunicationDirection::Outgoing,
                recipients: vec![AccountAddress::new("555-0101", "Bob"), AccountAddress::new("555-0102", "")],
                date_time: 1_600_000_000,
                read_status: MessageReadStatus::Read,
                text: "see you at 5".to_string(),
                ..NewMessage::default()
            })
            .unwrap();

        assert_eq!(attribute_text(&case, &message, attribute_ids::TSK_DIRECTION).as_deref(), Some("Outgoing"));
        assert_eq!(
            attribute_text(&case, &message, attribute_ids::TSK_PHONE_NUMBER_TO).as_deref(),
            Some("Bob,555-0102")
        );
        assert_eq!(attribute_text(&case, &message, attribute_ids::TSK_SUBJECT), None);

        let comms = case.communications();
        let owner = &helper.self_account().account;
        assert_eq!(comms.get_accounts_with_relationship(owner).unwrap().len(), 2);
        let bob = comms.get_account(AccountType::PHONE, "5550101").unwrap().unwrap();
        assert_eq!(
            comms.get_relationships_of_type(&bob, owner, artifact_ids::TSK_MESSAGE).unwrap(),
            vec![message]
        );
        assert!(comms
            .get_relationships_of_type(&bob, owner, artifact_ids::TSK_CALLLOG)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_add_calllog_skips_self() {
        let (_temp_dir, case) = create_test_case();
        let image_id = add_test_image(&case, "phone.img");
        let db = case.add_file(image_id, NewFile::regular("calls.db", 10)).unwrap().id;
        let me = AccountAddress::new("555-0199", "Me");
        let helper = CommunicationArtifactsHelper::with_self_account(
            &case,
            "call parser",
            db,
            AccountType::PHONE,
            AccountType::PHONE,
            &me,
        )
        .unwrap();

        let call = helper
            .add_calllog(&NewCallLog {
                direction: CommunicationDirection::Incoming,
                caller: Some(AccountAddress::new("555-0123", "Alice")),
                callees: vec![me.clone()],
                start_time: 1_600_000_000,
                end_time: 1_600_000_060,
                ..NewCallLog::default()
            })
            .unwrap();

        assert_eq!(attribute_text(&case, &call, attribute_ids::TSK_NAME).as_deref(), Some("Alice"));
        let rows: i64 = case
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM account_relationships", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            case.communications().get_relationship_types(call.obj_id).unwrap(),
            vec![RelationshipType::CallLog]
        );
    }
}
