//! Edit and cursor forwarding
//!
//! Edits are written through to the document store before anything is
//! broadcast; a failed write never reaches the room. Edits carry no version,
//! so concurrent writes resolve by whichever commits last. Save and fan-out
//! run under a per-document commit lock, so a room sees `document_updated`
//! in commit order.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::broadcast::RoomBroadcaster;
use crate::config::BroadcastPolicy;
use crate::error::CollabResult;
use crate::protocol::ServerMessage;
use crate::state::registry::ConnectionHandle;
use crate::store::{DocumentStore, StoreResult};
use crate::types::{CursorEvent, DocumentEditEvent, DocumentId, DocumentState, ParticipantId};

#[derive(Clone)]
pub struct MutationRelay {
    documents: Arc<dyn DocumentStore>,
    broadcaster: RoomBroadcaster,
    policy: BroadcastPolicy,
    commit_locks: Arc<RwLock<HashMap<DocumentId, Arc<Mutex<()>>>>>,
}

impl MutationRelay {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        broadcaster: RoomBroadcaster,
        policy: BroadcastPolicy,
    ) -> Self {
        Self {
            documents,
            broadcaster,
            policy,
            commit_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn commit_lock(&self, document_id: DocumentId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.commit_locks.read().await.get(&document_id) {
            return lock.clone();
        }
        self.commit_locks
            .write()
            .await
            .entry(document_id)
            .or_default()
            .clone()
    }

    /// Persist an edit and fan out the store's canonical state
    pub async fn edit(
        &self,
        origin: &ConnectionHandle,
        event: DocumentEditEvent,
    ) -> CollabResult<DocumentState> {
        let DocumentEditEvent {
            document_id,
            participant_id,
            new_content,
        } = event;

        // Held until the fan-out has queued; `broadcast` never waits on an outbox
        let lock = self.commit_lock(document_id).await;
        let _commit = lock.lock().await;

        let document = self
            .documents
            .update_content(document_id, participant_id, new_content)
            .await?;

        let exclude = (!self.policy.echo_edits_to_sender).then_some(origin.id.as_str());
        let delivered = self
            .broadcaster
            .broadcast(
                document_id,
                ServerMessage::DocumentUpdated {
                    document: document.clone(),
                    participant_id,
                },
                exclude,
            )
            .await;

        tracing::info!(
            document_id,
            participant_id,
            bytes = document.content.len(),
            delivered,
            "Edit committed"
        );
        Ok(document)
    }

    /// Read a joiner's snapshot and hand it to `deliver` while no edit to the
    /// document can commit, so the snapshot is ordered against every
    /// `document_updated` the joiner receives.
    pub async fn snapshot<F>(
        &self,
        document_id: DocumentId,
        participant_id: ParticipantId,
        deliver: F,
    ) where
        F: FnOnce(StoreResult<DocumentState>),
    {
        let lock = self.commit_lock(document_id).await;
        let _commit = lock.lock().await;
        deliver(self.documents.get_snapshot(document_id, participant_id).await);
    }

    /// Fan out a cursor move. Nothing is persisted.
    pub async fn cursor(&self, origin: &ConnectionHandle, event: CursorEvent) -> usize {
        let exclude = (!self.policy.echo_cursor_to_sender).then_some(origin.id.as_str());
        self.broadcaster
            .broadcast(
                event.document_id,
                ServerMessage::CursorMoved {
                    document_id: event.document_id,
                    participant_id: event.participant_id,
                    position: event.position,
                },
                exclude,
            )
            .await
    }
}
