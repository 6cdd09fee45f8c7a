//! In-process collaborator backend
//!
//! Holds users and documents in memory, optionally seeded from a JSON file.
//! Serves as token validator, access checker and document store for the
//! server binary and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

use super::{AccessChecker, AuthError, AuthValidator, DocumentStore, StoreError, StoreResult};
use crate::auth::{constant_time_eq, token_digest};
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid seed data: {0}")]
    Invalid(String),
}

/// Seed file layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub documents: Vec<SeedDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: ParticipantId,
    pub username: String,
    pub email: String,
    /// Plain token, hashed on load (development convenience)
    pub token: Option<String>,
    /// Hex SHA-256 of the token
    pub token_sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDocument {
    pub id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub owner_id: ParticipantId,
    #[serde(default)]
    pub is_public: bool,
    /// Participants allowed to view and edit besides the owner
    #[serde(default)]
    pub members: Vec<ParticipantId>,
}

#[derive(Debug, Clone)]
struct UserRecord {
    participant: Participant,
    token_sha256: String,
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    id: DocumentId,
    title: String,
    content: String,
    owner_id: ParticipantId,
    is_public: bool,
    members: HashSet<ParticipantId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn is_writer(&self, participant_id: ParticipantId) -> bool {
        self.owner_id == participant_id || self.members.contains(&participant_id)
    }

    fn is_reader(&self, participant_id: ParticipantId) -> bool {
        self.is_public || self.is_writer(participant_id)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    users: RwLock<HashMap<ParticipantId, UserRecord>>,
    documents: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Result<Self, SeedError> {
        let mut users = HashMap::new();
        for user in seed.users {
            let token_sha256 = match (user.token_sha256, user.token) {
                (Some(digest), _) => digest.to_lowercase(),
                (None, Some(token)) => token_digest(&token),
                (None, None) => {
                    return Err(SeedError::Invalid(format!(
                        "user {} has neither token nor token_sha256",
                        user.id
                    )))
                }
            };
            let record = UserRecord {
                participant: Participant {
                    id: user.id,
                    username: user.username,
                    email: user.email,
                },
                token_sha256,
            };
            if users.insert(user.id, record).is_some() {
                return Err(SeedError::Invalid(format!("duplicate user id {}", user.id)));
            }
        }

        let now = Utc::now();
        let mut documents = HashMap::new();
        for doc in seed.documents {
            if !users.contains_key(&doc.owner_id) {
                return Err(SeedError::Invalid(format!(
                    "document {} has unknown owner {}",
                    doc.id, doc.owner_id
                )));
            }
            let record = DocumentRecord {
                id: doc.id,
                title: doc.title,
                content: doc.content,
                owner_id: doc.owner_id,
                is_public: doc.is_public,
                members: doc.members.into_iter().collect(),
                created_at: now,
                updated_at: now,
            };
            if documents.insert(doc.id, record).is_some() {
                return Err(SeedError::Invalid(format!("duplicate document id {}", doc.id)));
            }
        }

        tracing::info!(
            users = users.len(),
            documents = documents.len(),
            "Memory backend seeded"
        );

        Ok(Self {
            users: RwLock::new(users),
            documents: RwLock::new(documents),
        })
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let seed: Seed = serde_json::from_str(&raw)?;
        Self::from_seed(seed)
    }

    /// Add or replace a user authenticated by `token`
    pub async fn insert_user(&self, participant: Participant, token: &str) {
        self.users.write().await.insert(
            participant.id,
            UserRecord {
                participant,
                token_sha256: token_digest(token),
            },
        );
    }

    /// Add or replace a document
    pub async fn insert_document(
        &self,
        id: DocumentId,
        title: &str,
        content: &str,
        owner_id: ParticipantId,
        members: &[ParticipantId],
    ) {
        let now = Utc::now();
        self.documents.write().await.insert(
            id,
            DocumentRecord {
                id,
                title: title.to_string(),
                content: content.to_string(),
                owner_id,
                is_public: false,
                members: members.iter().copied().collect(),
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn remove_document(&self, id: DocumentId) -> bool {
        self.documents.write().await.remove(&id).is_some()
    }

    pub async fn content(&self, id: DocumentId) -> Option<String> {
        self.documents
            .read()
            .await
            .get(&id)
            .map(|doc| doc.content.clone())
    }

    async fn to_state(&self, doc: &DocumentRecord) -> DocumentState {
        let owner_name = self
            .users
            .read()
            .await
            .get(&doc.owner_id)
            .map(|u| u.participant.username.clone())
            .unwrap_or_default();

        DocumentState {
            id: doc.id,
            title: doc.title.clone(),
            content: doc.content.clone(),
            owner: DocumentOwner {
                id: doc.owner_id,
                username: owner_name,
            },
            is_public: doc.is_public,
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

#[async_trait]
impl AuthValidator for MemoryBackend {
    async fn validate(&self, credential: &str) -> Result<Participant, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let digest = token_digest(credential);
        let users = self.users.read().await;

        // Scan every record so timing does not reveal where a match sits
        let mut found = None;
        for user in users.values() {
            if constant_time_eq(user.token_sha256.as_bytes(), digest.as_bytes()) {
                found = Some(user.participant.clone());
            }
        }
        found.ok_or(AuthError::InvalidCredential)
    }
}

#[async_trait]
impl AccessChecker for MemoryBackend {
    async fn can_access(
        &self,
        participant_id: ParticipantId,
        document_id: DocumentId,
    ) -> StoreResult<bool> {
        Ok(self
            .documents
            .read()
            .await
            .get(&document_id)
            .is_some_and(|doc| doc.is_reader(participant_id)))
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get_snapshot(
        &self,
        document_id: DocumentId,
        participant_id: ParticipantId,
    ) -> StoreResult<DocumentState> {
        let doc = self
            .documents
            .read()
            .await
            .get(&document_id)
            .cloned()
            .ok_or(StoreError::NotFound(document_id))?;

        if !doc.is_reader(participant_id) {
            return Err(StoreError::Forbidden(document_id));
        }
        Ok(self.to_state(&doc).await)
    }

    async fn update_content(
        &self,
        document_id: DocumentId,
        participant_id: ParticipantId,
        content: String,
    ) -> StoreResult<DocumentState> {
        let updated = {
            let mut documents = self.documents.write().await;
            let doc = documents
                .get_mut(&document_id)
                .ok_or(StoreError::NotFound(document_id))?;

            if !doc.is_writer(participant_id) {
                return Err(StoreError::Forbidden(document_id));
            }

            // Last write wins: no version check
            doc.content = content;
            doc.updated_at = Utc::now();
            doc.clone()
        };
        Ok(self.to_state(&updated).await)
    }
}
