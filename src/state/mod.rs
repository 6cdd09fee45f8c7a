pub mod presence;
pub mod registry;
pub mod relay;

use std::sync::Arc;

use crate::broadcast::RoomBroadcaster;
use crate::config::ServerConfig;
use crate::store::Collaborators;
use crate::ws::session::Session;
use presence::PresenceNotifier;
use registry::{ConnectionRegistry, Outbox};
use relay::MutationRelay;

/// Shared collaboration state, cloned into every connection task
#[derive(Clone)]
pub struct CollabState {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: RoomBroadcaster,
    pub presence: PresenceNotifier,
    pub relay: MutationRelay,
    pub collaborators: Collaborators,
    pub config: Arc<ServerConfig>,
}

impl CollabState {
    pub fn new(collaborators: Collaborators, config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = RoomBroadcaster::new(registry.clone());
        let presence = PresenceNotifier::new(broadcaster.clone());
        let relay = MutationRelay::new(
            collaborators.documents.clone(),
            broadcaster.clone(),
            config.policy,
        );

        Self {
            registry,
            broadcaster,
            presence,
            relay,
            collaborators,
            config: Arc::new(config),
        }
    }

    /// Create the lifecycle controller for a freshly accepted connection
    pub fn open_session(&self, outbox: Outbox) -> Session {
        Session::new(self.clone(), outbox)
    }
}
