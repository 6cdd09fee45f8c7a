//! Connection registry: which connection sits in which document room
//!
//! The maps here are the only state shared between connection tasks. Every
//! method takes the lock for the map operation alone and never awaits while
//! holding it; callers do their I/O on the returned copies.

use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, DocumentId, Participant};

/// Outbound queue of a single connection
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Transport handle for one connection, referenced by registry entries
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub outbox: Outbox,
}

impl ConnectionHandle {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            outbox,
        }
    }
}

#[derive(Debug, Clone)]
struct Member {
    participant: Participant,
    outbox: Outbox,
    joined_seq: u64,
}

#[derive(Debug, Default)]
struct Rooms {
    rooms: HashMap<DocumentId, HashMap<ConnectionId, Member>>,
    /// Reverse index; a connection is in at most one room
    locations: HashMap<ConnectionId, DocumentId>,
    revision: u64,
}

impl Rooms {
    fn detach(&mut self, connection_id: &str) -> Option<DocumentId> {
        let document_id = self.locations.remove(connection_id)?;
        if let Some(members) = self.rooms.get_mut(&document_id) {
            members.remove(connection_id);
            if members.is_empty() {
                self.rooms.remove(&document_id);
            }
        }
        Some(document_id)
    }
}

/// Participant list of a room at one registry revision
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub document_id: DocumentId,
    pub revision: u64,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub rooms: usize,
    pub connections: usize,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Rooms>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a connection in a room, replacing any previous entry for it.
    ///
    /// Returns the room the connection was moved out of, if it was joined
    /// to a different document before.
    pub async fn register(
        &self,
        document_id: DocumentId,
        connection: &ConnectionHandle,
        participant: Participant,
    ) -> Option<DocumentId> {
        let mut inner = self.inner.write().await;

        let previous = inner.detach(&connection.id);
        inner.revision += 1;
        let joined_seq = inner.revision;

        inner
            .rooms
            .entry(document_id)
            .or_default()
            .insert(
                connection.id.clone(),
                Member {
                    participant,
                    outbox: connection.outbox.clone(),
                    joined_seq,
                },
            );
        inner
            .locations
            .insert(connection.id.clone(), document_id);

        previous.filter(|prev| *prev != document_id)
    }

    /// Remove a connection from whichever room holds it. No-op if absent.
    pub async fn unregister(&self, connection_id: &str) -> Option<DocumentId> {
        let mut inner = self.inner.write().await;
        let document_id = inner.detach(connection_id)?;
        inner.revision += 1;
        Some(document_id)
    }

    /// Remove a connection only if it currently sits in `document_id`
    pub async fn unregister_from(&self, connection_id: &str, document_id: DocumentId) -> bool {
        let mut inner = self.inner.write().await;
        if inner.locations.get(connection_id) != Some(&document_id) {
            return false;
        }
        inner.detach(connection_id);
        inner.revision += 1;
        true
    }

    /// Copy of a room's participants in join order
    pub async fn list_participants(&self, document_id: DocumentId) -> RoomSnapshot {
        let inner = self.inner.read().await;

        let mut members: Vec<&Member> = inner
            .rooms
            .get(&document_id)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        members.sort_by_key(|m| m.joined_seq);

        RoomSnapshot {
            document_id,
            revision: inner.revision,
            participants: members.into_iter().map(|m| m.participant.clone()).collect(),
        }
    }

    /// Copy of the outboxes in a room, minus `exclude`
    pub async fn outboxes(
        &self,
        document_id: DocumentId,
        exclude: Option<&str>,
    ) -> Vec<(ConnectionId, Outbox)> {
        let inner = self.inner.read().await;
        match inner.rooms.get(&document_id) {
            Some(members) => members
                .iter()
                .filter(|(id, _)| Some(id.as_str()) != exclude)
                .map(|(id, m)| (id.clone(), m.outbox.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn room_of(&self, connection_id: &str) -> Option<DocumentId> {
        self.inner.read().await.locations.get(connection_id).copied()
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        RegistryStats {
            rooms: inner.rooms.len(),
            connections: inner.locations.len(),
            revision: inner.revision,
        }
    }
}
