//! Room fan-out on top of the connection registry

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::ServerMessage;
use crate::state::registry::{ConnectionHandle, ConnectionRegistry};
use crate::types::{DocumentId, Participant};

/// Delivers server messages to every connection joined to a document room
#[derive(Debug, Clone)]
pub struct RoomBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl RoomBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Add a connection to a room. Returns the room it left, if any.
    pub async fn join(
        &self,
        connection: &ConnectionHandle,
        document_id: DocumentId,
        participant: Participant,
    ) -> Option<DocumentId> {
        self.registry
            .register(document_id, connection, participant)
            .await
    }

    pub async fn leave(&self, connection_id: &str, document_id: DocumentId) -> bool {
        self.registry
            .unregister_from(connection_id, document_id)
            .await
    }

    /// Queue `message` to every member of the room except `exclude`.
    ///
    /// Targets are copied out of the registry first, so no lock is held while
    /// delivering. A full or closed outbox loses this one message; the other
    /// members are unaffected. Returns the number of connections reached.
    pub async fn broadcast(
        &self,
        document_id: DocumentId,
        message: ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        let targets = self.registry.outboxes(document_id, exclude).await;
        if targets.is_empty() {
            return 0;
        }

        let event = message.event_name();
        let mut delivered = 0;
        for (connection_id, outbox) in targets {
            match outbox.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        document_id,
                        event,
                        "Outbox full, dropping broadcast"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %connection_id, document_id, event, "Outbox closed");
                }
            }
        }

        tracing::debug!(document_id, event, delivered, "Broadcast to room");
        delivered
    }
}
