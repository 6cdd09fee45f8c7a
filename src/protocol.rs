use crate::error::CollabError;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
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
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot, sent to the joining connection only
    DocumentState { document: DocumentState },
    /// Canonical post-write state after a committed edit
    DocumentUpdated {
        document: DocumentState,
        participant_id: ParticipantId,
    },
    CursorMoved {
        document_id: DocumentId,
        participant_id: ParticipantId,
        position: CursorPosition,
    },
    /// Current participant list. `revision` lets clients drop stale lists.
    ParticipantsChanged {
        document_id: DocumentId,
        revision: u64,
        participants: Vec<Participant>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    /// Wire event name, as it appears in the `t` tag
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::DocumentState { .. } => "document_state",
            ServerMessage::DocumentUpdated { .. } => "document_updated",
            ServerMessage::CursorMoved { .. } => "cursor_moved",
            ServerMessage::ParticipantsChanged { .. } => "participants_changed",
            ServerMessage::Error { .. } => "error",
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            code: "PARSE_ERROR".to_string(),
            msg: format!("Invalid message format: {}", detail),
        }
    }
}

impl From<&CollabError> for ServerMessage {
    fn from(err: &CollabError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}
