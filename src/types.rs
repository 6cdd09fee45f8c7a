use serde::{Deserialize, Serialize};

/// Opaque ID types
pub type DocumentId = i64;
pub type ParticipantId = i64;
pub type ConnectionId = String;

/// Minimal identity projection attached to a connection at authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentOwner {
    pub id: ParticipantId,
    pub username: String,
}

/// Canonical document state as returned by the document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub owner: DocumentOwner,
    pub is_public: bool,
    pub created_at: String, // RFC 3339
    pub updated_at: String, // RFC 3339
}

/// Cursor location inside a document. Offsets are in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub index: u32,
    /// Selection length; zero for a caret
    #[serde(default)]
    pub length: u32,
}

impl CursorPosition {
    pub fn caret(index: u32) -> Self {
        Self { index, length: 0 }
    }
}

/// A content replacement requested by a participant. Not persisted here.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEditEvent {
    pub document_id: DocumentId,
    pub participant_id: ParticipantId,
    pub new_content: String,
}

/// A cursor movement. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEvent {
    pub document_id: DocumentId,
    pub participant_id: ParticipantId,
    pub position: CursorPosition,
}
