//! Participant list broadcasts on membership change

use crate::broadcast::RoomBroadcaster;
use crate::protocol::ServerMessage;
use crate::types::DocumentId;

#[derive(Debug, Clone)]
pub struct PresenceNotifier {
    broadcaster: RoomBroadcaster,
}

impl PresenceNotifier {
    pub fn new(broadcaster: RoomBroadcaster) -> Self {
        Self { broadcaster }
    }

    /// Broadcast the current participant list of a room.
    ///
    /// Must only be called after the membership change has been committed to
    /// the registry; the snapshot is taken here, never ahead of the mutation.
    pub async fn notify(&self, document_id: DocumentId) -> usize {
        let snapshot = self
            .broadcaster
            .registry()
            .list_participants(document_id)
            .await;

        tracing::debug!(
            document_id,
            revision = snapshot.revision,
            participants = snapshot.participants.len(),
            "Presence changed"
        );

        self.broadcaster
            .broadcast(
                document_id,
                ServerMessage::ParticipantsChanged {
                    document_id,
                    revision: snapshot.revision,
                    participants: snapshot.participants,
                },
                None,
            )
            .await
    }

    /// Fire-and-forget variant used on disconnect
    pub fn spawn_notify(&self, document_id: DocumentId) -> tokio::task::JoinHandle<usize> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(document_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::registry::{ConnectionHandle, ConnectionRegistry};
    use crate::types::Participant;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn participant(id: i64, name: &str) -> Participant {
        Participant {
            id,
            username: name.to_string(),
            email: format!("{}@example.com", name),
        }
    }

    fn participants_of(msg: ServerMessage) -> Vec<String> {
        match msg {
            ServerMessage::ParticipantsChanged { participants, .. } => {
                participants.into_iter().map(|p| p.username).collect()
            }
            other => panic!("Expected ParticipantsChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notify_after_join_and_leave() {
        let broadcaster = RoomBroadcaster::new(Arc::new(ConnectionRegistry::new()));
        let notifier = PresenceNotifier::new(broadcaster.clone());
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let c1 = ConnectionHandle::new(tx1);
        let c2 = ConnectionHandle::new(tx2);

        broadcaster.join(&c1, 42, participant(1, "alice")).await;
        assert_eq!(notifier.notify(42).await, 1);
        assert_eq!(participants_of(rx1.try_recv().unwrap()), vec!["alice"]);

        broadcaster.join(&c2, 42, participant(2, "bob")).await;
        notifier.notify(42).await;
        assert_eq!(participants_of(rx1.try_recv().unwrap()), vec!["alice", "bob"]);
        assert_eq!(participants_of(rx2.try_recv().unwrap()), vec!["alice", "bob"]);

        broadcaster.leave(&c2.id, 42).await;
        notifier.spawn_notify(42).await.unwrap();
        assert_eq!(participants_of(rx1.try_recv().unwrap()), vec!["alice"]);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_revision_increases() {
        let broadcaster = RoomBroadcaster::new(Arc::new(ConnectionRegistry::new()));
        let notifier = PresenceNotifier::new(broadcaster.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        let c = ConnectionHandle::new(tx);
        let other = ConnectionHandle::new(tx2);

        broadcaster.join(&c, 42, participant(1, "alice")).await;
        notifier.notify(42).await;
        broadcaster.join(&other, 42, participant(2, "bob")).await;
        notifier.notify(42).await;

        let revisions: Vec<u64> = [rx.try_recv().unwrap(), rx.try_recv().unwrap()]
            .into_iter()
            .map(|msg| match msg {
                ServerMessage::ParticipantsChanged { revision, .. } => revision,
                other => panic!("Expected ParticipantsChanged, got {:?}", other),
            })
            .collect();
        assert!(revisions[0] < revisions[1]);
    }
}
