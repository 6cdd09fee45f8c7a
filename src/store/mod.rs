//! Collaborator interfaces consumed by the collaboration core
//!
//! Token validation, access control and document persistence live outside the
//! session subsystem. The core only talks to them through these traits.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{DocumentId, DocumentState, Participant, ParticipantId};

pub use memory::MemoryBackend;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("not allowed to modify document {0}")]
    Forbidden(DocumentId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing auth token")]
    MissingCredential,

    #[error("invalid token")]
    InvalidCredential,

    #[error("auth backend unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a handshake credential into a participant identity
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<Participant, AuthError>;
}

/// Decides whether a participant may join a document room
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn can_access(
        &self,
        participant_id: ParticipantId,
        document_id: DocumentId,
    ) -> StoreResult<bool>;
}

/// Document persistence. `update_content` enforces write permission itself.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_snapshot(
        &self,
        document_id: DocumentId,
        participant_id: ParticipantId,
    ) -> StoreResult<DocumentState>;

    async fn update_content(
        &self,
        document_id: DocumentId,
        participant_id: ParticipantId,
        content: String,
    ) -> StoreResult<DocumentState>;
}

/// The set of collaborators a session needs
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthValidator>,
    pub access: Arc<dyn AccessChecker>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Collaborators {
    pub fn new(
        auth: Arc<dyn AuthValidator>,
        access: Arc<dyn AccessChecker>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            auth,
            access,
            documents,
        }
    }

    /// Use one backend for all three roles
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuthValidator + AccessChecker + DocumentStore + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend)
    }
}
