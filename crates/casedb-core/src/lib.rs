//! casedb: the data-model layer of a forensic case database
//!
//! A case is a SQLite database holding the images, volumes, file systems and
//! files of the evidence, plus everything derived from them: blackboard
//! artifacts, accounts and their relationships, OS accounts, hosts and
//! persons, tags, aggregate scores and timeline events. Image content is read
//! through a pluggable native backend whose handles are cached per case.

pub mod add_image;
pub mod blackboard;
pub mod case;
pub mod communications;
pub mod config;
pub mod error;
pub mod events;
pub mod hashdb;
pub mod host_address;
pub mod hosts;
pub mod model;
pub mod native;
pub mod os_accounts;
pub mod persons;
pub mod schema;
pub mod scoring;
pub mod tagging;
pub mod timeline;

pub use add_image::{AddImageProcess, AddImageProgress, StopHandle};
pub use blackboard::{AnalysisResult, Blackboard};
pub use case::{CaseDatabase, CaseDbTransaction, NewFileSystem, NewImage, MAX_READ_ALL_SIZE};
pub use communications::{
    Account, AccountAddress, AccountDeviceInstance, AccountFileInstance, AccountType,
    CommunicationArtifactsHelper, CommunicationsFilter, CommunicationsManager, MessageFolder,
    NewCallLog, NewContact, NewMessage, RelationshipType, SubFilter,
};
pub use config::CaseDbConfig;
pub use error::{CaseDbError, Result};
pub use events::{CaseEvent, EventBus};
pub use hashdb::HashDatabase;
pub use host_address::{HostAddress, HostAddressManager, HostAddressType};
pub use hosts::{Host, HostManager};
pub use native::{HandleCache, NativeBackend, RawImageBackend};
pub use os_accounts::{
    OsAccount, OsAccountAttribute, OsAccountInstance, OsAccountInstanceType, OsAccountManager, OsAccountRealm,
    OsAccountRealmManager, RealmScope,
};
pub use persons::{Person, PersonManager};
pub use scoring::{Priority, Score, ScoringManager, Significance};
pub use tagging::{ArtifactTag, ContentTag, TagName, TagSet, TaggingManager};
pub use timeline::{EventType, Interval, RootFilter, TimelineEvent, TimelineFilter, TimelineManager};
