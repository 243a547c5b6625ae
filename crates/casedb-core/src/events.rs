//! Case change notifications
//!
//! Managers publish an event after each successful mutation. Events raised
//! inside a transaction are held until it commits and discarded on rollback.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::communications::Account;
use crate::os_accounts::{OsAccount, OsAccountRealm};
use crate::persons::Person;
use crate::host_address::HostAddress;
use crate::hosts::Host;
use crate::scoring::Score;
use crate::tagging::TagSet;

/// A change to the case
#[derive(Debug, Clone, Serialize)]
pub enum CaseEvent {
    HostsAdded(Vec<Host>),
    HostsUpdated(Vec<Host>),
    HostsDeleted(Vec<i64>),
    HostAddressesAdded(Vec<HostAddress>),
    PersonsAdded(Vec<Person>),
    PersonsUpdated(Vec<Person>),
    PersonsDeleted(Vec<i64>),
    HostsAddedToPerson { person_id: i64, host_ids: Vec<i64> },
    HostsRemovedFromPerson { person_id: i64, host_ids: Vec<i64> },
    AccountsAdded(Vec<Account>),
    OsAccountsAdded(Vec<OsAccount>),
    OsAccountsUpdated(Vec<OsAccount>),
    RealmsAdded(Vec<OsAccountRealm>),
    RealmsUpdated(Vec<OsAccountRealm>),
    TagSetsAdded(Vec<TagSet>),
    TagSetsUpdated(Vec<TagSet>),
    TagSetsDeleted(Vec<i64>),
    TagsAdded { obj_ids: Vec<i64> },
    TagsDeleted { obj_ids: Vec<i64> },
    AggregateScoreChanged { obj_id: i64, data_source_id: Option<i64>, score: Score },
    ArtifactsPosted { artifact_ids: Vec<i64>, type_id: i32 },
    TimelineEventsAdded(Vec<i64>),
    DataSourceAdded(i64),
}

type Subscriber = Arc<dyn Fn(&CaseEvent) + Send + Sync>;

/// Fan-out of case events to registered callbacks
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future event
    pub fn subscribe(&self, callback: impl Fn(&CaseEvent) + Send + Sync + 'static) {
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(Arc::new(callback)),
            Err(_) => tracing::warn!("Event bus lock poisoned; subscriber dropped"),
        }
    }

    pub fn publish(&self, event: &CaseEvent) {
        // Callbacks run outside the lock so they may subscribe or publish
        let subscribers: Vec<Subscriber> = match self.subscribers.lock() {
            Ok(subscribers) => subscribers.clone(),
            Err(_) => return,
        };
        tracing::trace!("Publishing {:?}", event);
        for subscriber in subscribers {
            subscriber(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            bus.subscribe(move |event| {
                if let CaseEvent::DataSourceAdded(id) = event {
                    count.fetch_add(*id as usize, Ordering::SeqCst);
                }
            });
        }

        bus.publish(&CaseEvent::DataSourceAdded(2));
        assert_eq!(count.load(Ordering::SeqCst), 6);
        assert_eq!(bus.subscriber_count(), 3);
    }
}
