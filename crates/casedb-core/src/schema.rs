//! Case database schema creation and seeding

use rusqlite::{params, Connection, OptionalExtension};

use crate::communications::PREDEFINED_ACCOUNT_TYPES;
use crate::error::{CaseDbError, Result};
use crate::model::artifact::{STANDARD_ARTIFACT_TYPES, STANDARD_ATTRIBUTE_TYPES};
use crate::model::ReviewStatus;
use crate::timeline::ROOT_EVENT_TYPES;

/// Major schema version written to `tsk_db_info`
pub const SCHEMA_MAJOR_VERSION: i32 = 9;
/// Minor schema version written to `tsk_db_info`
pub const SCHEMA_MINOR_VERSION: i32 = 0;

const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS tsk_db_info (
        schema_ver INTEGER, tsk_ver INTEGER, schema_minor_ver INTEGER
    );

    CREATE TABLE IF NOT EXISTS tsk_db_info_extended (
        name TEXT PRIMARY KEY, value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tsk_objects (
        obj_id INTEGER PRIMARY KEY,
        par_obj_id INTEGER,
        type INTEGER NOT NULL,
        FOREIGN KEY (par_obj_id) REFERENCES tsk_objects (obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_image_info (
        obj_id INTEGER PRIMARY KEY,
        type INTEGER, ssize INTEGER, tzone TEXT, size INTEGER,
        md5 TEXT, sha1 TEXT, sha256 TEXT, display_name TEXT,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_image_names (
        obj_id INTEGER NOT NULL, name TEXT NOT NULL, sequence INTEGER NOT NULL,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_vs_info (
        obj_id INTEGER PRIMARY KEY, vs_type INTEGER NOT NULL,
        img_offset INTEGER NOT NULL, block_size INTEGER NOT NULL,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_vs_parts (
        obj_id INTEGER PRIMARY KEY,
        addr INTEGER NOT NULL, start INTEGER NOT NULL, length INTEGER NOT NULL,
        descr TEXT, flags INTEGER NOT NULL,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_persons (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        UNIQUE(name)
    );

    CREATE TABLE IF NOT EXISTS tsk_hosts (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        db_status INTEGER DEFAULT 0,
        person_id INTEGER,
        merged_into INTEGER,
        FOREIGN KEY(person_id) REFERENCES tsk_persons(id) ON DELETE SET NULL,
        FOREIGN KEY(merged_into) REFERENCES tsk_hosts(id)
    );

    CREATE TABLE IF NOT EXISTS data_source_info (
        obj_id INTEGER PRIMARY KEY,
        device_id TEXT NOT NULL,
        time_zone TEXT NOT NULL,
        acquisition_details TEXT,
        added_date_time INTEGER,
        acquisition_tool_settings TEXT,
        acquisition_tool_name TEXT,
        acquisition_tool_version TEXT,
        host_id INTEGER,
        FOREIGN KEY(host_id) REFERENCES tsk_hosts(id),
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_fs_info (
        obj_id INTEGER PRIMARY KEY,
        data_source_obj_id INTEGER NOT NULL,
        img_offset INTEGER NOT NULL, fs_type INTEGER NOT NULL,
        block_size INTEGER NOT NULL, block_count INTEGER NOT NULL,
        root_inum INTEGER NOT NULL, first_inum INTEGER NOT NULL, last_inum INTEGER NOT NULL,
        display_name TEXT,
        FOREIGN KEY(data_source_obj_id) REFERENCES data_source_info(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_files (
        obj_id INTEGER PRIMARY KEY,
        fs_obj_id INTEGER,
        data_source_obj_id INTEGER NOT NULL,
        attr_type INTEGER, attr_id INTEGER,
        name TEXT NOT NULL,
        meta_addr INTEGER, meta_seq INTEGER,
        type INTEGER, has_layout INTEGER, has_path INTEGER,
        dir_type INTEGER, meta_type INTEGER, dir_flags INTEGER, meta_flags INTEGER,
        size INTEGER,
        ctime INTEGER, crtime INTEGER, atime INTEGER, mtime INTEGER,
        mode INTEGER, uid INTEGER, gid INTEGER,
        md5 TEXT, sha256 TEXT, known INTEGER,
        parent_path TEXT, mime_type TEXT, extension TEXT,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(fs_obj_id) REFERENCES tsk_fs_info(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(data_source_obj_id) REFERENCES data_source_info(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_files_path (
        obj_id INTEGER PRIMARY KEY, path TEXT NOT NULL, encoding_type INTEGER NOT NULL,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_file_layout (
        obj_id INTEGER NOT NULL,
        byte_start INTEGER NOT NULL, byte_len INTEGER NOT NULL, sequence INTEGER NOT NULL,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS blackboard_artifact_types (
        artifact_type_id INTEGER PRIMARY KEY,
        type_name TEXT NOT NULL, display_name TEXT,
        category_type INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS blackboard_attribute_types (
        attribute_type_id INTEGER PRIMARY KEY,
        type_name TEXT NOT NULL, display_name TEXT, value_type INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS review_statuses (
        review_status_id INTEGER PRIMARY KEY,
        review_status_name TEXT NOT NULL,
        display_name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS blackboard_artifacts (
        artifact_id INTEGER PRIMARY KEY,
        obj_id INTEGER NOT NULL,
        artifact_obj_id INTEGER NOT NULL,
        data_source_obj_id INTEGER NOT NULL,
        artifact_type_id INTEGER NOT NULL,
        review_status_id INTEGER NOT NULL,
        UNIQUE (artifact_obj_id),
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(data_source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_type_id) REFERENCES blackboard_artifact_types(artifact_type_id),
        FOREIGN KEY(review_status_id) REFERENCES review_statuses(review_status_id)
    );

    CREATE TABLE IF NOT EXISTS blackboard_attributes (
        artifact_id INTEGER NOT NULL,
        artifact_type_id INTEGER NOT NULL,
        source TEXT, context TEXT,
        attribute_type_id INTEGER NOT NULL,
        value_type INTEGER NOT NULL,
        value_byte BLOB, value_text TEXT, value_int32 INTEGER, value_int64 INTEGER,
        value_double NUMERIC(20, 10),
        FOREIGN KEY(artifact_id) REFERENCES blackboard_artifacts(artifact_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_type_id) REFERENCES blackboard_artifact_types(artifact_type_id),
        FOREIGN KEY(attribute_type_id) REFERENCES blackboard_attribute_types(attribute_type_id)
    );

    CREATE TABLE IF NOT EXISTS tsk_analysis_results (
        obj_id INTEGER NOT NULL,
        conclusion TEXT,
        significance INTEGER NOT NULL,
        priority INTEGER NOT NULL,
        configuration TEXT, justification TEXT,
        ignore_score INTEGER DEFAULT 0,
        FOREIGN KEY(obj_id) REFERENCES blackboard_artifacts(artifact_obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_aggregate_score (
        obj_id INTEGER NOT NULL,
        data_source_obj_id INTEGER,
        significance INTEGER NOT NULL,
        priority INTEGER NOT NULL,
        UNIQUE (obj_id),
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(data_source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_tag_sets (
        tag_set_id INTEGER PRIMARY KEY, name TEXT UNIQUE
    );

    CREATE TABLE IF NOT EXISTS tag_names (
        tag_name_id INTEGER PRIMARY KEY,
        display_name TEXT UNIQUE,
        description TEXT NOT NULL,
        color TEXT NOT NULL,
        knownStatus INTEGER NOT NULL,
        tag_set_id INTEGER,
        rank INTEGER,
        FOREIGN KEY(tag_set_id) REFERENCES tsk_tag_sets(tag_set_id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS tsk_examiners (
        examiner_id INTEGER PRIMARY KEY,
        login_name TEXT NOT NULL, display_name TEXT,
        UNIQUE(login_name)
    );

    CREATE TABLE IF NOT EXISTS content_tags (
        tag_id INTEGER PRIMARY KEY,
        obj_id INTEGER NOT NULL,
        tag_name_id INTEGER NOT NULL,
        comment TEXT NOT NULL,
        begin_byte_offset INTEGER NOT NULL,
        end_byte_offset INTEGER NOT NULL,
        examiner_id INTEGER,
        FOREIGN KEY(examiner_id) REFERENCES tsk_examiners(examiner_id) ON DELETE CASCADE,
        FOREIGN KEY(obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(tag_name_id) REFERENCES tag_names(tag_name_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS blackboard_artifact_tags (
        tag_id INTEGER PRIMARY KEY,
        artifact_id INTEGER NOT NULL,
        tag_name_id INTEGER NOT NULL,
        comment TEXT NOT NULL,
        examiner_id INTEGER,
        FOREIGN KEY(examiner_id) REFERENCES tsk_examiners(examiner_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_id) REFERENCES blackboard_artifacts(artifact_id) ON DELETE CASCADE,
        FOREIGN KEY(tag_name_id) REFERENCES tag_names(tag_name_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS account_types (
        account_type_id INTEGER PRIMARY KEY,
        type_name TEXT UNIQUE NOT NULL,
        display_name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS accounts (
        account_id INTEGER PRIMARY KEY,
        account_type_id INTEGER NOT NULL,
        account_unique_identifier TEXT NOT NULL,
        UNIQUE(account_type_id, account_unique_identifier),
        FOREIGN KEY(account_type_id) REFERENCES account_types(account_type_id)
    );

    CREATE TABLE IF NOT EXISTS account_relationships (
        relationship_id INTEGER PRIMARY KEY,
        account1_id INTEGER NOT NULL,
        account2_id INTEGER NOT NULL,
        relationship_source_obj_id INTEGER NOT NULL,
        date_time INTEGER,
        relationship_type INTEGER NOT NULL,
        data_source_obj_id INTEGER NOT NULL,
        UNIQUE(account1_id, account2_id, relationship_source_obj_id),
        FOREIGN KEY(account1_id) REFERENCES accounts(account_id),
        FOREIGN KEY(account2_id) REFERENCES accounts(account_id),
        FOREIGN KEY(relationship_source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(data_source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_os_account_realms (
        id INTEGER PRIMARY KEY,
        realm_name TEXT DEFAULT NULL,
        realm_addr TEXT DEFAULT NULL,
        realm_signature TEXT NOT NULL,
        scope_host_id INTEGER DEFAULT NULL,
        scope_confidence INTEGER,
        db_status INTEGER DEFAULT 0,
        merged_into INTEGER DEFAULT NULL,
        UNIQUE(realm_signature),
        FOREIGN KEY(scope_host_id) REFERENCES tsk_hosts(id),
        FOREIGN KEY(merged_into) REFERENCES tsk_os_account_realms(id)
    );

    CREATE TABLE IF NOT EXISTS tsk_os_accounts (
        os_account_obj_id INTEGER PRIMARY KEY,
        login_name TEXT DEFAULT NULL,
        full_name TEXT DEFAULT NULL,
        realm_id INTEGER NOT NULL,
        addr TEXT DEFAULT NULL,
        signature TEXT NOT NULL,
        status INTEGER,
        type INTEGER,
        created_date INTEGER DEFAULT NULL,
        db_status INTEGER DEFAULT 0,
        merged_into INTEGER DEFAULT NULL,
        UNIQUE(signature, realm_id),
        FOREIGN KEY(os_account_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(realm_id) REFERENCES tsk_os_account_realms(id)
    );

    CREATE TABLE IF NOT EXISTS tsk_os_account_instances (
        id INTEGER PRIMARY KEY,
        os_account_obj_id INTEGER NOT NULL,
        data_source_obj_id INTEGER NOT NULL,
        instance_type INTEGER NOT NULL,
        UNIQUE(os_account_obj_id, data_source_obj_id, instance_type),
        FOREIGN KEY(os_account_obj_id) REFERENCES tsk_os_accounts(os_account_obj_id) ON DELETE CASCADE,
        FOREIGN KEY(data_source_obj_id) REFERENCES data_source_info(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_os_account_attributes (
        id INTEGER PRIMARY KEY,
        os_account_obj_id INTEGER NOT NULL,
        host_id INTEGER,
        source_obj_id INTEGER,
        attribute_type_id INTEGER NOT NULL,
        value_type INTEGER NOT NULL,
        value_byte BLOB,
        value_text TEXT,
        value_int32 INTEGER,
        value_int64 INTEGER,
        value_double NUMERIC(20, 10),
        FOREIGN KEY(os_account_obj_id) REFERENCES tsk_os_accounts(os_account_obj_id) ON DELETE CASCADE,
        FOREIGN KEY(host_id) REFERENCES tsk_hosts(id),
        FOREIGN KEY(source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE SET NULL,
        FOREIGN KEY(attribute_type_id) REFERENCES blackboard_attribute_types(attribute_type_id)
    );

    CREATE TABLE IF NOT EXISTS tsk_host_addresses (
        id INTEGER PRIMARY KEY,
        address_type INTEGER NOT NULL,
        address TEXT NOT NULL,
        UNIQUE(address_type, address),
        FOREIGN KEY(id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_host_address_map (
        id INTEGER PRIMARY KEY,
        host_id INTEGER NOT NULL,
        addr_obj_id INTEGER NOT NULL,
        source_obj_id INTEGER,
        time INTEGER,
        UNIQUE(host_id, addr_obj_id, time),
        FOREIGN KEY(host_id) REFERENCES tsk_hosts(id) ON DELETE CASCADE,
        FOREIGN KEY(addr_obj_id) REFERENCES tsk_host_addresses(id),
        FOREIGN KEY(source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS tsk_host_address_dns_ip_map (
        id INTEGER PRIMARY KEY,
        dns_address_id INTEGER NOT NULL,
        ip_address_id INTEGER NOT NULL,
        source_obj_id INTEGER,
        time INTEGER,
        UNIQUE(dns_address_id, ip_address_id, time),
        FOREIGN KEY(dns_address_id) REFERENCES tsk_host_addresses(id) ON DELETE CASCADE,
        FOREIGN KEY(ip_address_id) REFERENCES tsk_host_addresses(id) ON DELETE CASCADE,
        FOREIGN KEY(source_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS tsk_message_folders (
        folder_id INTEGER PRIMARY KEY,
        src_obj_id INTEGER NOT NULL,
        parent_folder_id INTEGER,
        name TEXT NOT NULL,
        UNIQUE(src_obj_id, parent_folder_id, name),
        FOREIGN KEY(src_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(parent_folder_id) REFERENCES tsk_message_folders(folder_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_message_folder_messages (
        folder_id INTEGER NOT NULL,
        artifact_obj_id INTEGER NOT NULL,
        PRIMARY KEY(folder_id, artifact_obj_id),
        FOREIGN KEY(folder_id) REFERENCES tsk_message_folders(folder_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS tsk_event_types (
        event_type_id INTEGER PRIMARY KEY,
        display_name TEXT UNIQUE NOT NULL,
        super_type_id INTEGER REFERENCES tsk_event_types(event_type_id)
    );

    CREATE TABLE IF NOT EXISTS tsk_event_descriptions (
        event_description_id INTEGER PRIMARY KEY,
        full_description TEXT NOT NULL,
        med_description TEXT,
        short_description TEXT,
        data_source_obj_id INTEGER NOT NULL,
        content_obj_id INTEGER NOT NULL,
        artifact_id INTEGER,
        hash_hit INTEGER NOT NULL,
        tagged INTEGER NOT NULL,
        FOREIGN KEY(data_source_obj_id) REFERENCES data_source_info(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(content_obj_id) REFERENCES tsk_objects(obj_id) ON DELETE CASCADE,
        FOREIGN KEY(artifact_id) REFERENCES blackboard_artifacts(artifact_id) ON DELETE CASCADE,
        UNIQUE (full_description, content_obj_id, artifact_id)
    );

    CREATE TABLE IF NOT EXISTS tsk_events (
        event_id INTEGER PRIMARY KEY,
        event_type_id INTEGER NOT NULL REFERENCES tsk_event_types(event_type_id),
        event_description_id INTEGER NOT NULL
            REFERENCES tsk_event_descriptions(event_description_id) ON DELETE CASCADE,
        time INTEGER NOT NULL,
        UNIQUE (event_type_id, event_description_id, time)
    );
"#;

const CREATE_INDEXES: &str = r#"
    CREATE INDEX IF NOT EXISTS parObjId ON tsk_objects(par_obj_id);
    CREATE INDEX IF NOT EXISTS layout_objID ON tsk_file_layout(obj_id);
    CREATE INDEX IF NOT EXISTS artifact_objID ON blackboard_artifacts(obj_id);
    CREATE INDEX IF NOT EXISTS artifact_artifact_objID ON blackboard_artifacts(artifact_obj_id);
    CREATE INDEX IF NOT EXISTS artifact_typeID ON blackboard_artifacts(artifact_type_id);
    CREATE INDEX IF NOT EXISTS attrsArtifactID ON blackboard_attributes(artifact_id);
    CREATE INDEX IF NOT EXISTS mime_type ON tsk_files(dir_type, mime_type, type);
    CREATE INDEX IF NOT EXISTS file_extension ON tsk_files(extension);
    CREATE INDEX IF NOT EXISTS relationships_account1 ON account_relationships(account1_id);
    CREATE INDEX IF NOT EXISTS relationships_account2 ON account_relationships(account2_id);
    CREATE INDEX IF NOT EXISTS relationships_relationship_source_obj_id
        ON account_relationships(relationship_source_obj_id);
    CREATE INDEX IF NOT EXISTS relationships_date_time ON account_relationships(date_time);
    CREATE INDEX IF NOT EXISTS relationships_relationship_type
        ON account_relationships(relationship_type);
    CREATE INDEX IF NOT EXISTS relationships_data_source_obj_id
        ON account_relationships(data_source_obj_id);
    CREATE INDEX IF NOT EXISTS events_data_source_obj_id
        ON tsk_event_descriptions(data_source_obj_id);
    CREATE INDEX IF NOT EXISTS events_content_obj_id ON tsk_event_descriptions(content_obj_id);
    CREATE INDEX IF NOT EXISTS events_artifact_id ON tsk_event_descriptions(artifact_id);
    CREATE INDEX IF NOT EXISTS events_sub_type_time ON tsk_events(event_type_id, time);
    CREATE INDEX IF NOT EXISTS events_time ON tsk_events(time);
    CREATE INDEX IF NOT EXISTS score_significance_priority
        ON tsk_aggregate_score(significance, priority);
    CREATE INDEX IF NOT EXISTS score_datasource_obj_id ON tsk_aggregate_score(data_source_obj_id);
    CREATE INDEX IF NOT EXISTS os_account_attributes_account
        ON tsk_os_account_attributes(os_account_obj_id);
    CREATE INDEX IF NOT EXISTS host_address_map_host ON tsk_host_address_map(host_id);
    CREATE INDEX IF NOT EXISTS message_folders_src ON tsk_message_folders(src_obj_id);
"#;

/// Create all tables and indexes and write the seed rows.
///
/// Every statement is idempotent so this also repairs a partially created case.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(CREATE_TABLES)?;
    conn.execute_batch(CREATE_INDEXES)?;
    seed(conn)?;

    let has_version: Option<i32> = conn
        .query_row("SELECT schema_ver FROM tsk_db_info LIMIT 1", [], |row| row.get(0))
        .optional()?;
    if has_version.is_none() {
        conn.execute(
            "INSERT INTO tsk_db_info (schema_ver, tsk_ver, schema_minor_ver) VALUES (?1, ?2, ?3)",
            params![SCHEMA_MAJOR_VERSION, 0, SCHEMA_MINOR_VERSION],
        )?;
    }

    Ok(())
}

fn seed(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO blackboard_artifact_types
            (artifact_type_id, type_name, display_name, category_type)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (id, name, display, category) in STANDARD_ARTIFACT_TYPES {
        stmt.execute(params![id, name, display, category.code()])?;
    }

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO blackboard_attribute_types
            (attribute_type_id, type_name, display_name, value_type)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (id, name, display, value_type) in STANDARD_ATTRIBUTE_TYPES {
        stmt.execute(params![id, name, display, value_type.code()])?;
    }

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO review_statuses (review_status_id, review_status_name, display_name)
         VALUES (?1, ?2, ?3)",
    )?;
    for status in ReviewStatus::ALL {
        stmt.execute(params![status.code(), status.name(), status.label()])?;
    }

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO account_types (type_name, display_name) VALUES (?1, ?2)",
    )?;
    for (name, display) in PREDEFINED_ACCOUNT_TYPES {
        stmt.execute(params![name, display])?;
    }

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO tsk_event_types (event_type_id, display_name, super_type_id)
         VALUES (?1, ?2, ?3)",
    )?;
    for (id, display, super_type) in ROOT_EVENT_TYPES {
        stmt.execute(params![id, display, super_type])?;
    }

    Ok(())
}

/// Read the stored schema version
pub fn schema_version(conn: &Connection) -> Result<(i32, i32)> {
    conn.query_row(
        "SELECT schema_ver, schema_minor_ver FROM tsk_db_info LIMIT 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| CaseDbError::core("case database has no tsk_db_info row"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_twice() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM tsk_db_info", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
        assert_eq!(schema_version(&conn).unwrap(), (SCHEMA_MAJOR_VERSION, SCHEMA_MINOR_VERSION));
    }

    #[test]
    fn test_seed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let name: String = conn
            .query_row(
                "SELECT type_name FROM blackboard_artifact_types WHERE artifact_type_id = 39",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(name, "TSK_ACCOUNT");

        let event_types: i64 = conn
            .query_row("SELECT COUNT(*) FROM tsk_event_types", [], |r| r.get(0))
            .unwrap();
        assert_eq!(event_types, 8);

        let account_types: i64 = conn
            .query_row("SELECT COUNT(*) FROM account_types", [], |r| r.get(0))
            .unwrap();
        assert_eq!(account_types as usize, PREDEFINED_ACCOUNT_TYPES.len());

        let statuses: i64 = conn
            .query_row("SELECT COUNT(*) FROM review_statuses", [], |r| r.get(0))
            .unwrap();
        assert_eq!(statuses, 3);
    }

    #[test]
    fn test_missing_version_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
        assert!(schema_version(&conn).is_err());
    }
}
