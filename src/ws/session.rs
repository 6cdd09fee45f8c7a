//! Per-connection lifecycle controller
//!
//! ```text
//! Unauthenticated --authenticate--> Authenticated --join--> Joined(doc)
//!        |                               |                    |  ^
//!        |                               |                    +--+ join / edit / cursor_move
//!        +--------- disconnect ----------+--------------------+--> Closed
//! ```
//!
//! Inbound events arrive as typed [`SessionEvent`]s on a per-connection queue.
//! A failed authentication closes the session; every other failure is
//! reported to this connection as an `error` event and the session stays up.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::{CollabError, CollabResult};
use crate::protocol::ServerMessage;
use crate::state::registry::{ConnectionHandle, Outbox};
use crate::state::CollabState;
use crate::store::AuthError;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        participant: Participant,
    },
    Joined {
        participant: Participant,
        document_id: DocumentId,
    },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Authenticate {
        credential: Option<String>,
    },
    Join {
        document_id: DocumentId,
    },
    Edit {
        document_id: DocumentId,
        content: String,
    },
    CursorMove {
        document_id: DocumentId,
        position: CursorPosition,
    },
    Disconnect,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Authenticate { .. } => "authenticate",
            SessionEvent::Join { .. } => "join",
            SessionEvent::Edit { .. } => "edit",
            SessionEvent::CursorMove { .. } => "cursor_move",
            SessionEvent::Disconnect => "disconnect",
        }
    }
}

pub struct Session {
    connection: ConnectionHandle,
    state: SessionState,
    collab: CollabState,
}

impl Session {
    pub fn new(collab: CollabState, outbox: Outbox) -> Self {
        Self {
            connection: ConnectionHandle::new(outbox),
            state: SessionState::Unauthenticated,
            collab,
        }
    }

    pub fn id(&self) -> &str {
        &self.connection.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn participant(&self) -> Option<&Participant> {
        match &self.state {
            SessionState::Authenticated { participant }
            | SessionState::Joined { participant, .. } => Some(participant),
            _ => None,
        }
    }

    pub fn joined_document(&self) -> Option<DocumentId> {
        match &self.state {
            SessionState::Joined { document_id, .. } => Some(*document_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Drive the session until it closes.
    ///
    /// The handshake credential is processed first. A signal on `closed` (or
    /// its sender being dropped) takes priority over queued events, so nothing
    /// queued behind a transport disconnect is processed.
    pub async fn run(
        mut self,
        credential: Option<String>,
        mut inbox: mpsc::Receiver<SessionEvent>,
        mut closed: oneshot::Receiver<()>,
    ) {
        self.handle(SessionEvent::Authenticate { credential }).await;

        while !self.is_closed() {
            tokio::select! {
                biased;
                _ = &mut closed => self.handle(SessionEvent::Disconnect).await,
                event = inbox.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => self.handle(SessionEvent::Disconnect).await,
                },
            }
        }
    }

    /// Apply one inbound event
    pub async fn handle(&mut self, event: SessionEvent) {
        if self.is_closed() {
            tracing::debug!(
                connection_id = %self.connection.id,
                event = event.name(),
                "Ignoring event on closed session"
            );
            return;
        }

        let result = match event {
            SessionEvent::Authenticate { credential } => self.authenticate(credential).await,
            SessionEvent::Join { document_id } => self.join(document_id).await,
            SessionEvent::Edit {
                document_id,
                content,
            } => self.edit(document_id, content).await,
            SessionEvent::CursorMove {
                document_id,
                position,
            } => self.cursor_move(document_id, position).await,
            SessionEvent::Disconnect => {
                self.disconnect().await;
                Ok(())
            }
        };

        if let Err(err) = result {
            self.fail(err).await;
        }
    }

    async fn authenticate(&mut self, credential: Option<String>) -> CollabResult<()> {
        if self.state != SessionState::Unauthenticated {
            return Err(CollabError::Validation("already authenticated".to_string()));
        }

        let credential = credential.ok_or(CollabError::Authentication(
            AuthError::MissingCredential.to_string(),
        ))?;

        let participant = match self.collab.collaborators.auth.validate(&credential).await {
            Ok(participant) => participant,
            Err(AuthError::Unavailable(msg)) => {
                tracing::error!(connection_id = %self.connection.id, "Auth backend failed: {}", msg);
                return Err(CollabError::Authentication(
                    "authentication unavailable".to_string(),
                ));
            }
            Err(e) => return Err(CollabError::Authentication(e.to_string())),
        };

        tracing::info!(
            connection_id = %self.connection.id,
            participant_id = participant.id,
            username = %participant.username,
            "Session authenticated"
        );
        self.state = SessionState::Authenticated { participant };
        Ok(())
    }

    async fn join(&mut self, document_id: DocumentId) -> CollabResult<()> {
        let participant = self.require_participant()?.clone();

        if document_id <= 0 {
            return Err(CollabError::Validation(format!(
                "invalid document id {}",
                document_id
            )));
        }

        let allowed = self
            .collab
            .collaborators
            .access
            .can_access(participant.id, document_id)
            .await?;
        if !allowed {
            return Err(CollabError::Authorization(format!(
                "no access to document {}",
                document_id
            )));
        }

        let previous = self
            .collab
            .broadcaster
            .join(&self.connection, document_id, participant.clone())
            .await;
        let participant_id = participant.id;
        self.state = SessionState::Joined {
            participant,
            document_id,
        };

        tracing::info!(
            connection_id = %self.connection.id,
            participant_id,
            document_id,
            previous_document = ?previous,
            "Joined document"
        );

        self.collab
            .relay
            .snapshot(document_id, participant_id, |result| match result {
                Ok(document) => self.emit(ServerMessage::DocumentState { document }),
                Err(e) => {
                    // Membership stands; the client may retry or leave
                    tracing::warn!(document_id, "Snapshot after join failed: {}", e);
                    self.emit(ServerMessage::from(&CollabError::from(e)));
                }
            })
            .await;

        self.collab.presence.notify(document_id).await;
        if let Some(previous) = previous {
            self.collab.presence.notify(previous).await;
        }
        Ok(())
    }

    async fn edit(&mut self, document_id: DocumentId, content: String) -> CollabResult<()> {
        let participant_id = self.require_joined(document_id)?;

        if content.len() > self.collab.config.max_content_bytes {
            return Err(CollabError::Validation(format!(
                "content exceeds {} bytes",
                self.collab.config.max_content_bytes
            )));
        }

        self.collab
            .relay
            .edit(
                &self.connection,
                DocumentEditEvent {
                    document_id,
                    participant_id,
                    new_content: content,
                },
            )
            .await?;
        Ok(())
    }

    async fn cursor_move(
        &mut self,
        document_id: DocumentId,
        position: CursorPosition,
    ) -> CollabResult<()> {
        let participant_id = self.require_joined(document_id)?;

        self.collab
            .relay
            .cursor(
                &self.connection,
                CursorEvent {
                    document_id,
                    participant_id,
                    position,
                },
            )
            .await;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.state = SessionState::Closed;

        // Registry cleanup completes before anything else; presence follows
        // in the background
        if let Some(document_id) = self.collab.registry.unregister(&self.connection.id).await {
            self.collab.presence.spawn_notify(document_id);
        }

        tracing::info!(connection_id = %self.connection.id, "Session closed");
    }

    async fn fail(&mut self, err: CollabError) {
        match &err {
            CollabError::Internal(_) => {
                tracing::error!(connection_id = %self.connection.id, "{}", err)
            }
            _ => tracing::warn!(connection_id = %self.connection.id, "{}", err),
        }

        self.emit(ServerMessage::from(&err));

        if err.terminates_connection() {
            self.disconnect().await;
        }
    }

    /// Queue a message to this connection only
    fn emit(&self, message: ServerMessage) {
        match self.connection.outbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => tracing::warn!(
                connection_id = %self.connection.id,
                event = msg.event_name(),
                "Outbox full, dropping message"
            ),
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn require_participant(&self) -> CollabResult<&Participant> {
        self.participant()
            .ok_or_else(|| CollabError::Authentication("authentication required".to_string()))
    }

    fn require_joined(&self, document_id: DocumentId) -> CollabResult<ParticipantId> {
        match &self.state {
            SessionState::Joined {
                participant,
                document_id: joined,
            } if *joined == document_id => Ok(participant.id),
            SessionState::Joined {
                document_id: joined,
                ..
            } => Err(CollabError::Validation(format!(
                "joined to document {}, not {}",
                joined, document_id
            ))),
            SessionState::Authenticated { .. } => Err(CollabError::Validation(
                "join a document first".to_string(),
            )),
            _ => Err(CollabError::Authentication(
                "authentication required".to_string(),
            )),
        }
    }
}
