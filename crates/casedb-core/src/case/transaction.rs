use rusqlite::Connection;
use std::ops::Deref;
use std::sync::MutexGuard;

use crate::error::Result;
use crate::events::{CaseEvent, EventBus};

/// A write transaction holding the case lock.
///
/// Dropping it without `commit` rolls back. Events queued on the
/// transaction are published only after a successful commit.
pub struct CaseDbTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    events: &'a EventBus,
    pending: Vec<CaseEvent>,
    finished: bool,
}

impl<'a> CaseDbTransaction<'a> {
    pub(crate) fn begin(conn: MutexGuard<'a, Connection>, events: &'a EventBus) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            conn,
            events,
            pending: Vec::new(),
            finished: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Publish `event` if this transaction commits
    pub fn queue_event(&mut self, event: CaseEvent) {
        self.pending.push(event);
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        let pending = std::mem::take(&mut self.pending);
        let events = self.events;

        // Release the case lock before subscribers run
        drop(self);
        for event in pending {
            events.publish(&event);
        }
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.pending.clear();
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Deref for CaseDbTransaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for CaseDbTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Transaction dropped without commit, rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("Rollback failed: {}", e);
            }
        }
    }
}
