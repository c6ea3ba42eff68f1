//! Bookkeeping owned by the dispatch layer: which owner has a session in
//! flight, and which export files are waiting for delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::materialize::ExportBundle;

/// Owner identifier (the chat user a session runs for).
pub type OwnerId = i64;

/// Handle given to a running session.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub owner: OwnerId,
    pub id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

/// At most one active session per owner.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<OwnerId, ActiveSession>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for `owner`, cancelling the previous one first.
    ///
    /// Returns the ticket and whether an earlier session was cancelled.
    pub async fn begin(&self, owner: OwnerId) -> (SessionTicket, bool) {
        let ticket = SessionTicket {
            owner,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        };

        let mut sessions = self.sessions.write().await;
        let replaced = sessions.insert(
            owner,
            ActiveSession {
                id: ticket.id,
                cancel: ticket.cancel.clone(),
            },
        );
        if let Some(previous) = &replaced {
            previous.cancel.cancel();
            info!(owner, previous = previous.id, "cancelled previous session");
        }

        (ticket, replaced.is_some())
    }

    /// Cancel the owner's active session, if any.
    pub async fn cancel(&self, owner: OwnerId) -> bool {
        match self.sessions.write().await.remove(&owner) {
            Some(session) => {
                session.cancel.cancel();
                info!(owner, session = session.id, "session cancelled");
                true
            }
            None => false,
        }
    }

    /// Deregister a finished session. A newer session of the same owner is left alone.
    pub async fn finish(&self, ticket: &SessionTicket) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&ticket.owner)
            .is_some_and(|active| active.id == ticket.id)
        {
            sessions.remove(&ticket.owner);
            debug!(owner = ticket.owner, session = ticket.id, "session finished");
        }
    }

    pub async fn is_active(&self, owner: OwnerId) -> bool {
        self.sessions.read().await.contains_key(&owner)
    }

    pub async fn cancel_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.cancel.cancel();
        }
        count
    }
}

/// Export files awaiting delivery, per owner.
#[derive(Debug, Clone, Default)]
pub struct ExportLedger {
    bundles: Arc<Mutex<HashMap<OwnerId, ExportBundle>>>,
}

impl ExportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bundle` for `owner`; files of a bundle it replaces are removed
    /// unless both point at the same paths.
    pub async fn record(&self, owner: OwnerId, bundle: ExportBundle) {
        let replaced = self.bundles.lock().await.insert(owner, bundle.clone());
        if let Some(old) = replaced
            && old != bundle
        {
            old.remove().await;
        }
    }

    pub async fn get(&self, owner: OwnerId) -> Option<ExportBundle> {
        self.bundles.lock().await.get(&owner).cloned()
    }

    /// Forget the owner's bundle and delete its files.
    pub async fn discard(&self, owner: OwnerId) -> bool {
        let removed = self.bundles.lock().await.remove(&owner);
        match removed {
            Some(bundle) => {
                bundle.remove().await;
                true
            }
            None => false,
        }
    }

    /// Delete every recorded bundle.
    pub async fn discard_all(&self) {
        let bundles: Vec<_> = self.bundles.lock().await.drain().map(|(_, b)| b).collect();
        for bundle in bundles {
            bundle.remove().await;
        }
    }
}
