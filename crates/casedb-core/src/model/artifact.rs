//! Blackboard artifacts, attributes and their type catalogues

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::{CaseDbError, Result};

code_enum! {
    /// Whether an artifact type holds extracted data or an analysis verdict
    ArtifactCategory: i32 {
        DataArtifact = 0 => "Data Artifact",
        AnalysisResult = 1 => "Analysis Result",
    }
}

code_enum! {
    /// Column family an attribute value is stored in
    AttributeValueType: i32 {
        String = 0 => "String",
        Integer = 1 => "Integer",
        Long = 2 => "Long",
        Double = 3 => "Double",
        Byte = 4 => "Byte",
        DateTime = 5 => "DateTime",
    }
}

code_enum! {
    /// Examiner review state of an artifact
    ReviewStatus: i32 {
        Approved = 1 => "Approved",
        Rejected = 2 => "Rejected",
        Undecided = 3 => "Undecided",
    }
}

impl ReviewStatus {
    pub fn name(self) -> &'static str {
        match self {
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::Undecided => "UNDECIDED",
        }
    }
}

/// Ids of the standard artifact types
pub mod artifact_ids {
    pub const TSK_GEN_INFO: i32 = 1;
    pub const TSK_WEB_BOOKMARK: i32 = 2;
    pub const TSK_WEB_COOKIE: i32 = 3;
    pub const TSK_WEB_HISTORY: i32 = 4;
    pub const TSK_WEB_DOWNLOAD: i32 = 5;
    pub const TSK_RECENT_OBJECT: i32 = 6;
    pub const TSK_GPS_TRACKPOINT: i32 = 7;
    pub const TSK_INSTALLED_PROG: i32 = 8;
    pub const TSK_KEYWORD_HIT: i32 = 9;
    pub const TSK_HASHSET_HIT: i32 = 10;
    pub const TSK_DEVICE_ATTACHED: i32 = 11;
    pub const TSK_INTERESTING_FILE_HIT: i32 = 12;
    pub const TSK_EMAIL_MSG: i32 = 13;
    pub const TSK_EXTRACTED_TEXT: i32 = 14;
    pub const TSK_WEB_SEARCH_QUERY: i32 = 15;
    pub const TSK_METADATA_EXIF: i32 = 16;
    pub const TSK_OS_INFO: i32 = 19;
    pub const TSK_CONTACT: i32 = 23;
    pub const TSK_MESSAGE: i32 = 24;
    pub const TSK_CALLLOG: i32 = 25;
    pub const TSK_ACCOUNT: i32 = 39;
}

/// Ids of the standard attribute types
pub mod attribute_ids {
    pub const TSK_URL: i32 = 1;
    pub const TSK_DATETIME: i32 = 2;
    pub const TSK_NAME: i32 = 3;
    pub const TSK_PROG_NAME: i32 = 4;
    pub const TSK_VALUE: i32 = 6;
    pub const TSK_FLAG: i32 = 7;
    pub const TSK_PATH: i32 = 8;
    pub const TSK_GEO: i32 = 9;
    pub const TSK_KEYWORD: i32 = 10;
    pub const TSK_KEYWORD_REGEXP: i32 = 11;
    pub const TSK_KEYWORD_PREVIEW: i32 = 12;
    pub const TSK_KEYWORD_SET: i32 = 13;
    pub const TSK_USERNAME: i32 = 14;
    pub const TSK_DOMAIN: i32 = 15;
    pub const TSK_PASSWORD: i32 = 16;
    pub const TSK_NAME_PERSON: i32 = 17;
    pub const TSK_DEVICE_MODEL: i32 = 18;
    pub const TSK_DEVICE_MAKE: i32 = 19;
    pub const TSK_DEVICE_ID: i32 = 20;
    pub const TSK_EMAIL: i32 = 21;
    pub const TSK_HASH_MD5: i32 = 22;
    pub const TSK_TEXT: i32 = 26;
    pub const TSK_TEXT_FILE: i32 = 27;
    pub const TSK_TEXT_LANGUAGE: i32 = 28;
    pub const TSK_ENTROPY: i32 = 29;
    pub const TSK_HASHSET_NAME: i32 = 30;
    pub const TSK_INTERESTING_FILE: i32 = 31;
    pub const TSK_REFERRER: i32 = 32;
    pub const TSK_LAST_ACCESSED: i32 = 33;
    pub const TSK_IP_ADDRESS: i32 = 34;
    pub const TSK_PHONE_NUMBER: i32 = 35;
    pub const TSK_PATH_ID: i32 = 36;
    pub const TSK_SET_NAME: i32 = 37;
    pub const TSK_ENCRYPTION_DETECTED: i32 = 38;
    pub const TSK_MALWARE_DETECTED: i32 = 39;
    pub const TSK_STEG_DETECTED: i32 = 40;
    pub const TSK_SUBJECT: i32 = 52;
    pub const TSK_COMMENT: i32 = 66;
    pub const TSK_USER_ID: i32 = 72;
    pub const TSK_MESSAGE_TYPE: i32 = 74;
    pub const TSK_PHONE_NUMBER_HOME: i32 = 75;
    pub const TSK_PHONE_NUMBER_OFFICE: i32 = 76;
    pub const TSK_PHONE_NUMBER_MOBILE: i32 = 77;
    pub const TSK_PHONE_NUMBER_FROM: i32 = 78;
    pub const TSK_PHONE_NUMBER_TO: i32 = 79;
    pub const TSK_DIRECTION: i32 = 80;
    pub const TSK_DATETIME_START: i32 = 83;
    pub const TSK_DATETIME_END: i32 = 84;
    pub const TSK_COUNT: i32 = 92;
    pub const TSK_READ_STATUS: i32 = 102;
    pub const TSK_ID: i32 = 110;
    pub const TSK_ACCOUNT_TYPE: i32 = 121;
    pub const TSK_THREAD_ID: i32 = 122;
}

use ArtifactCategory::{AnalysisResult, DataArtifact};

pub(crate) const STANDARD_ARTIFACT_TYPES: &[(i32, &str, &str, ArtifactCategory)] = &[
    (1, "TSK_GEN_INFO", "General Info", DataArtifact),
    (2, "TSK_WEB_BOOKMARK", "Web Bookmarks", DataArtifact),
    (3, "TSK_WEB_COOKIE", "Web Cookies", DataArtifact),
    (4, "TSK_WEB_HISTORY", "Web History", DataArtifact),
    (5, "TSK_WEB_DOWNLOAD", "Web Downloads", DataArtifact),
    (6, "TSK_RECENT_OBJECT", "Recent Documents", DataArtifact),
    (7, "TSK_GPS_TRACKPOINT", "GPS Trackpoints", DataArtifact),
    (8, "TSK_INSTALLED_PROG", "Installed Programs", DataArtifact),
    (9, "TSK_KEYWORD_HIT", "Keyword Hits", AnalysisResult),
    (10, "TSK_HASHSET_HIT", "Hashset Hits", AnalysisResult),
    (11, "TSK_DEVICE_ATTACHED", "Devices Attached", DataArtifact),
    (12, "TSK_INTERESTING_FILE_HIT", "Interesting Files", AnalysisResult),
    (13, "TSK_EMAIL_MSG", "E-Mail Messages", DataArtifact),
    (14, "TSK_EXTRACTED_TEXT", "Extracted Text", DataArtifact),
    (15, "TSK_WEB_SEARCH_QUERY", "Web Search", DataArtifact),
    (16, "TSK_METADATA_EXIF", "EXIF Metadata", DataArtifact),
    (19, "TSK_OS_INFO", "Operating System Information", DataArtifact),
    (23, "TSK_CONTACT", "Contacts", DataArtifact),
    (24, "TSK_MESSAGE", "Messages", DataArtifact),
    (25, "TSK_CALLLOG", "Call Logs", DataArtifact),
    (39, "TSK_ACCOUNT", "Accounts", DataArtifact),
];

use AttributeValueType as V;

pub(crate) const STANDARD_ATTRIBUTE_TYPES: &[(i32, &str, &str, AttributeValueType)] = &[
    (1, "TSK_URL", "URL", V::String),
    (2, "TSK_DATETIME", "Date/Time", V::DateTime),
    (3, "TSK_NAME", "Name", V::String),
    (4, "TSK_PROG_NAME", "Program Name", V::String),
    (6, "TSK_VALUE", "Value", V::String),
    (7, "TSK_FLAG", "Flag", V::String),
    (8, "TSK_PATH", "Path", V::String),
    (9, "TSK_GEO", "Geo", V::String),
    (10, "TSK_KEYWORD", "Keyword", V::String),
    (11, "TSK_KEYWORD_REGEXP", "Keyword Regular Expression", V::String),
    (12, "TSK_KEYWORD_PREVIEW", "Keyword Preview", V::String),
    (13, "TSK_KEYWORD_SET", "Keyword Set", V::String),
    (14, "TSK_USERNAME", "Username", V::String),
    (15, "TSK_DOMAIN", "Domain", V::String),
    (16, "TSK_PASSWORD", "Password", V::String),
    (17, "TSK_NAME_PERSON", "Person Name", V::String),
    (18, "TSK_DEVICE_MODEL", "Device Model", V::String),
    (19, "TSK_DEVICE_MAKE", "Device Make", V::String),
    (20, "TSK_DEVICE_ID", "Device ID", V::String),
    (21, "TSK_EMAIL", "Email", V::String),
    (22, "TSK_HASH_MD5", "MD5 Hash", V::String),
    (26, "TSK_TEXT", "Text", V::String),
    (27, "TSK_TEXT_FILE", "Text File", V::String),
    (28, "TSK_TEXT_LANGUAGE", "Text Language", V::String),
    (29, "TSK_ENTROPY", "Entropy", V::Double),
    (30, "TSK_HASHSET_NAME", "Hashset Name", V::String),
    (31, "TSK_INTERESTING_FILE", "Interesting File", V::Long),
    (32, "TSK_REFERRER", "Referrer URL", V::String),
    (33, "TSK_LAST_ACCESSED", "Last Time Accessed", V::DateTime),
    (34, "TSK_IP_ADDRESS", "IP Address", V::String),
    (35, "TSK_PHONE_NUMBER", "Phone Number", V::String),
    (36, "TSK_PATH_ID", "Path ID", V::Long),
    (37, "TSK_SET_NAME", "Set Name", V::String),
    (38, "TSK_ENCRYPTION_DETECTED", "Encryption Detected", V::Integer),
    (39, "TSK_MALWARE_DETECTED", "Malware Detected", V::Integer),
    (40, "TSK_STEG_DETECTED", "Steganography Detected", V::Integer),
    (52, "TSK_SUBJECT", "Subject", V::String),
    (66, "TSK_COMMENT", "Comment", V::String),
    (72, "TSK_USER_ID", "User ID", V::String),
    (74, "TSK_MESSAGE_TYPE", "Message Type", V::String),
    (75, "TSK_PHONE_NUMBER_HOME", "Phone Number (Home)", V::String),
    (76, "TSK_PHONE_NUMBER_OFFICE", "Phone Number (Office)", V::String),
    (77, "TSK_PHONE_NUMBER_MOBILE", "Phone Number (Mobile)", V::String),
    (78, "TSK_PHONE_NUMBER_FROM", "From Phone Number", V::String),
    (79, "TSK_PHONE_NUMBER_TO", "To Phone Number", V::String),
    (80, "TSK_DIRECTION", "Direction", V::String),
    (83, "TSK_DATETIME_START", "Start Date/Time", V::DateTime),
    (84, "TSK_DATETIME_END", "End Date/Time", V::DateTime),
    (92, "TSK_COUNT", "Count", V::Integer),
    (102, "TSK_READ_STATUS", "Read", V::Integer),
    (110, "TSK_ID", "ID", V::String),
    (121, "TSK_ACCOUNT_TYPE", "Account Type", V::String),
    (122, "TSK_THREAD_ID", "Thread ID", V::String),
];

/// An entry of `blackboard_artifact_types`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactType {
    pub type_id: i32,
    pub type_name: String,
    pub display_name: String,
    pub category: ArtifactCategory,
}

impl ArtifactType {
    /// Look up one of the built-in artifact types
    pub fn standard(type_id: i32) -> Option<ArtifactType> {
        STANDARD_ARTIFACT_TYPES
            .iter()
            .find(|(id, ..)| *id == type_id)
            .map(|(id, name, display, category)| ArtifactType {
                type_id: *id,
                type_name: name.to_string(),
                display_name: display.to_string(),
                category: *category,
            })
    }

    pub fn standard_by_name(type_name: &str) -> Option<ArtifactType> {
        STANDARD_ARTIFACT_TYPES
            .iter()
            .find(|(_, name, ..)| *name == type_name)
            .and_then(|(id, ..)| Self::standard(*id))
    }
}

/// An entry of `blackboard_attribute_types`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeType {
    pub type_id: i32,
    pub type_name: String,
    pub display_name: String,
    pub value_type: AttributeValueType,
}

impl AttributeType {
    pub fn standard(type_id: i32) -> Option<AttributeType> {
        STANDARD_ATTRIBUTE_TYPES
            .iter()
            .find(|(id, ..)| *id == type_id)
            .map(|(id, name, display, value_type)| AttributeType {
                type_id: *id,
                type_name: name.to_string(),
                display_name: display.to_string(),
                value_type: *value_type,
            })
    }
}

/// Value of an attribute, tagged by the column it lives in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Byte(Vec<u8>),
    /// Seconds since the Unix epoch
    DateTime(i64),
}

impl AttributeValue {
    pub fn value_type(&self) -> AttributeValueType {
        match self {
            AttributeValue::String(_) => AttributeValueType::String,
            AttributeValue::Integer(_) => AttributeValueType::Integer,
            AttributeValue::Long(_) => AttributeValueType::Long,
            AttributeValue::Double(_) => AttributeValueType::Double,
            AttributeValue::Byte(_) => AttributeValueType::Byte,
            AttributeValue::DateTime(_) => AttributeValueType::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render for display; date-times are shown in UTC
    pub fn display_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Integer(v) => v.to_string(),
            AttributeValue::Long(v) => v.to_string(),
            AttributeValue::Double(v) => format!("{:.6}", v),
            AttributeValue::Byte(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            AttributeValue::DateTime(secs) => match Utc.timestamp_opt(*secs, 0).single() {
                Some(dt) => format_date_time(dt),
                None => secs.to_string(),
            },
        }
    }
}

fn format_date_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// One attribute of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_type: AttributeType,
    pub value: AttributeValue,
    /// Module that produced the value
    pub source: String,
    pub context: String,
}

impl Attribute {
    /// Build an attribute, checking the value against the type's column
    pub fn new(
        attribute_type: AttributeType,
        value: AttributeValue,
        source: impl Into<String>,
    ) -> Result<Self> {
        if attribute_type.value_type != value.value_type() {
            return Err(CaseDbError::invalid(format!(
                "attribute {} expects {} but got {}",
                attribute_type.type_name,
                attribute_type.value_type,
                value.value_type()
            )));
        }
        Ok(Self {
            attribute_type,
            value,
            source: source.into(),
            context: String::new(),
        })
    }

    /// Build an attribute of a standard type
    pub fn standard(type_id: i32, value: AttributeValue, source: impl Into<String>) -> Result<Self> {
        let attribute_type = AttributeType::standard(type_id).ok_or_else(|| {
            CaseDbError::invalid(format!("{} is not a standard attribute type", type_id))
        })?;
        Self::new(attribute_type, value, source)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn value_string(&self) -> String {
        self.value.display_string()
    }
}

/// A row of `blackboard_artifacts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackboardArtifact {
    pub artifact_id: i64,
    /// Object id of the artifact itself
    pub obj_id: i64,
    /// Object id of the content the artifact was derived from
    pub source_obj_id: i64,
    pub data_source_obj_id: i64,
    pub type_id: i32,
    pub type_name: String,
    pub display_name: String,
    pub review_status: ReviewStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookup() {
        let account = ArtifactType::standard(artifact_ids::TSK_ACCOUNT).unwrap();
        assert_eq!(account.type_name, "TSK_ACCOUNT");
        assert_eq!(account.category, ArtifactCategory::DataArtifact);

        let hit = ArtifactType::standard_by_name("TSK_HASHSET_HIT").unwrap();
        assert_eq!(hit.category, ArtifactCategory::AnalysisResult);

        assert!(ArtifactType::standard(9999).is_none());
    }

    #[test]
    fn test_attribute_type_checked() {
        let ok = Attribute::standard(
            attribute_ids::TSK_DATETIME,
            AttributeValue::DateTime(0),
            "test",
        );
        assert!(ok.is_ok());

        let err = Attribute::standard(
            attribute_ids::TSK_DATETIME,
            AttributeValue::String("yesterday".into()),
            "test",
        )
        .unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_display_values() {
        assert_eq!(
            AttributeValue::DateTime(1483272732).display_string(),
            "2017-01-01 12:12:12 UTC"
        );
        assert_eq!(AttributeValue::Byte(vec![0xde, 0xad]).display_string(), "dead");
        assert_eq!(AttributeValue::Long(-4).display_string(), "-4");
    }

    #[test]
    fn test_review_status_names() {
        assert_eq!(ReviewStatus::from_code(3).unwrap(), ReviewStatus::Undecided);
        assert_eq!(ReviewStatus::Approved.name(), "APPROVED");
    }
}
