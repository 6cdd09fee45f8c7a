//! Inbound frame decoding
//!
//! Text frames are decoded into [`ClientMessage`]s and handed to the session
//! as typed events; anything undecodable is answered directly with a
//! `PARSE_ERROR` and never reaches the session.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::ws::session::SessionEvent;

impl From<ClientMessage> for SessionEvent {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Join { document_id } => SessionEvent::Join { document_id },
            ClientMessage::Edit {
                document_id,
                content,
            } => SessionEvent::Edit {
                document_id,
                content,
            },
            ClientMessage::CursorMove {
                document_id,
                position,
            } => SessionEvent::CursorMove {
                document_id,
                position,
            },
        }
    }
}

/// Decode one text frame into a session event
pub fn decode_frame(text: &str) -> Result<SessionEvent, ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => Ok(msg.into()),
        Err(e) => {
            tracing::warn!("Failed to parse client message: {}", e);
            Err(ServerMessage::parse_error(e))
        }
    }
}
