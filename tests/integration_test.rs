use docsync::config::ServerConfig;
use docsync::protocol::ServerMessage;
use docsync::state::CollabState;
use docsync::store::{Collaborators, DocumentStore, MemoryBackend, StoreResult};
use docsync::types::{CursorPosition, DocumentState, Participant};
use docsync::ws::session::{Session, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const DOC: i64 = 42;

fn participant(id: i64, name: &str) -> Participant {
    Participant {
        id,
        username: name.to_string(),
        email: format!("{}@example.com", name),
    }
}

async fn setup() -> (CollabState, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(participant(1, "alice"), "alice-token").await;
    backend.insert_user(participant(2, "bob"), "bob-token").await;
    backend.insert_user(participant(3, "carol"), "carol-token").await;
    backend.insert_document(DOC, "Shared notes", "Initial", 1, &[2]).await;

    let state = CollabState::new(
        Collaborators::from_backend(backend.clone()),
        ServerConfig::default(),
    );
    (state, backend)
}

/// A session driven directly, plus the receiving end of its outbox
struct Client {
    session: Session,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    async fn connect(state: &CollabState, token: &str) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let mut session = state.open_session(tx);
        session
            .handle(SessionEvent::Authenticate {
                credential: Some(token.to_string()),
            })
            .await;
        Self { session, rx }
    }

    async fn send(&mut self, event: SessionEvent) {
        self.session.handle(event).await;
    }

    async fn join(&mut self, document_id: i64) {
        self.send(SessionEvent::Join { document_id }).await;
    }

    async fn edit(&mut self, content: &str) {
        self.send(SessionEvent::Edit {
            document_id: DOC,
            content: content.to_string(),
        })
        .await;
    }

    async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("Timed out waiting for message")
            .expect("Outbox closed")
    }

    /// Skip messages until one matching `pred` arrives
    async fn next_matching(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = self.next().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    async fn next_participants(&mut self) -> Vec<String> {
        match self
            .next_matching(|m| matches!(m, ServerMessage::ParticipantsChanged { .. }))
            .await
        {
            ServerMessage::ParticipantsChanged { participants, .. } => {
                participants.into_iter().map(|p| p.username).collect()
            }
            _ => unreachable!(),
        }
    }

    async fn next_update(&mut self) -> String {
        match self
            .next_matching(|m| matches!(m, ServerMessage::DocumentUpdated { .. }))
            .await
        {
            ServerMessage::DocumentUpdated { document, .. } => document.content,
            _ => unreachable!(),
        }
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

#[tokio::test]
async fn test_full_collaboration_flow() {
    let (state, backend) = setup().await;

    // 1. P1 joins document 42 and gets the current content
    let mut p1 = Client::connect(&state, "alice-token").await;
    p1.join(DOC).await;
    match p1.next().await {
        ServerMessage::DocumentState { document } => {
            assert_eq!(document.id, DOC);
            assert_eq!(document.content, "Initial");
        }
        other => panic!("Expected DocumentState, got {:?}", other),
    }
    assert_eq!(p1.next_participants().await, vec!["alice"]);

    // 2. P2 joins; both see [P1, P2]
    let mut p2 = Client::connect(&state, "bob-token").await;
    p2.join(DOC).await;
    assert!(matches!(p2.next().await, ServerMessage::DocumentState { .. }));
    assert_eq!(p2.next_participants().await, vec!["alice", "bob"]);
    assert_eq!(p1.next_participants().await, vec!["alice", "bob"]);

    // 3. P1 edits; the store is updated and both receive the canonical state
    p1.edit("Hello").await;
    assert_eq!(backend.content(DOC).await.as_deref(), Some("Hello"));
    assert_eq!(p1.next_update().await, "Hello");
    assert_eq!(p2.next_update().await, "Hello");

    // 4. P2 disconnects; P1 sees [P1]
    p2.send(SessionEvent::Disconnect).await;
    assert_eq!(p1.next_participants().await, vec!["alice"]);
}

#[tokio::test]
async fn test_join_then_leave_presence() {
    let (state, _) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut observer = Client::connect(&state, "bob-token").await;

    p1.join(DOC).await;
    assert_eq!(p1.next_participants().await, vec!["alice"]);

    p1.send(SessionEvent::Disconnect).await;
    assert!(state.registry.list_participants(DOC).await.participants.is_empty());

    // A later joiner sees only itself
    observer.join(DOC).await;
    assert_eq!(observer.next_participants().await, vec!["bob"]);
}

#[tokio::test]
async fn test_last_write_wins_across_participants() {
    let (state, backend) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut p2 = Client::connect(&state, "bob-token").await;
    p1.join(DOC).await;
    p2.join(DOC).await;
    p1.drain();
    p2.drain();

    p1.edit("A").await;
    p2.edit("B").await;

    assert_eq!(backend.content(DOC).await.as_deref(), Some("B"));
    for client in [&mut p1, &mut p2] {
        assert_eq!(client.next_update().await, "A");
        assert_eq!(client.next_update().await, "B");
    }
}

#[tokio::test]
async fn test_access_denied_never_registers() {
    let (state, _) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut intruder = Client::connect(&state, "carol-token").await;
    p1.join(DOC).await;
    p1.drain();

    intruder.join(DOC).await;
    match intruder.next().await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "ACCESS_DENIED"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert!(!intruder.session.is_closed());

    // A later membership change shows only legitimate members
    let mut p2 = Client::connect(&state, "bob-token").await;
    p2.join(DOC).await;
    assert_eq!(p1.next_participants().await, vec!["alice", "bob"]);

    // Edits from the intruder are rejected without a broadcast
    intruder.edit("pwned").await;
    assert!(matches!(intruder.next().await, ServerMessage::Error { .. }));
    assert!(p1.drain().is_empty());
}

#[tokio::test]
async fn test_failed_edit_reported_to_sender_only() {
    let (state, backend) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut p2 = Client::connect(&state, "bob-token").await;
    p1.join(DOC).await;
    p2.join(DOC).await;
    p1.drain();
    p2.drain();

    // Document vanishes underneath the room
    assert!(backend.remove_document(DOC).await);
    p1.edit("too late").await;

    match p1.next().await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "NOT_FOUND"),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert!(p2.drain().is_empty());
    assert!(!p1.session.is_closed());
}

#[tokio::test]
async fn test_cursor_moves_reach_other_members() {
    let (state, _) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut p2 = Client::connect(&state, "bob-token").await;
    p1.join(DOC).await;
    p2.join(DOC).await;
    p1.drain();
    p2.drain();

    p1.send(SessionEvent::CursorMove {
        document_id: DOC,
        position: CursorPosition::caret(5),
    })
    .await;

    assert_eq!(
        p2.next().await,
        ServerMessage::CursorMoved {
            document_id: DOC,
            participant_id: 1,
            position: CursorPosition::caret(5),
        }
    );
    // Sender is not echoed by default
    assert!(p1.drain().is_empty());
}

#[tokio::test]
async fn test_double_disconnect_single_presence_broadcast() {
    let (state, _) = setup().await;
    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut p2 = Client::connect(&state, "bob-token").await;
    p1.join(DOC).await;
    p2.join(DOC).await;
    p1.drain();

    p2.send(SessionEvent::Disconnect).await;
    p2.send(SessionEvent::Disconnect).await;
    // Unregistering again directly is also a no-op
    assert_eq!(state.registry.unregister(p2.session.id()).await, None);

    assert_eq!(p1.next_participants().await, vec!["alice"]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(p1.drain().is_empty());
}

#[tokio::test]
async fn test_registry_matches_joined_sessions() {
    let (state, _) = setup().await;
    let tokens = ["alice-token", "bob-token", "alice-token", "bob-token"];
    let mut clients = Vec::new();
    for token in tokens {
        let mut client = Client::connect(&state, token).await;
        client.join(DOC).await;
        clients.push(client);
    }

    // Disconnect every other client
    for client in clients.iter_mut().step_by(2) {
        client.send(SessionEvent::Disconnect).await;
    }

    let joined: Vec<Participant> = clients
        .iter()
        .filter(|c| c.session.joined_document() == Some(DOC) && !c.session.is_closed())
        .filter_map(|c| c.session.participant().cloned())
        .collect();
    let registered = state.registry.list_participants(DOC).await.participants;
    assert_eq!(registered, joined);
    assert_eq!(state.registry.stats().await.connections, 2);
}

#[tokio::test]
async fn test_disconnect_during_driven_session() {
    let (state, _) = setup().await;
    let mut watcher = Client::connect(&state, "alice-token").await;
    watcher.join(DOC).await;
    watcher.drain();

    let (tx, mut rx) = mpsc::channel(64);
    let session = state.open_session(tx);
    let id = session.id().to_string();
    let (inbox, inbox_rx) = mpsc::channel(16);
    let (close_tx, close_rx) = oneshot::channel();
    let driver = tokio::spawn(session.run(Some("bob-token".to_string()), inbox_rx, close_rx));

    inbox.send(SessionEvent::Join { document_id: DOC }).await.unwrap();
    assert!(matches!(
        rx.recv().await,
        Some(ServerMessage::DocumentState { .. })
    ));
    assert_eq!(watcher.next_participants().await, vec!["alice", "bob"]);

    // Transport goes away; the edit still queued may or may not have run
    inbox
        .send(SessionEvent::Edit {
            document_id: DOC,
            content: "last words".to_string(),
        })
        .await
        .unwrap();
    drop(close_tx);
    driver.await.unwrap();

    assert_eq!(state.registry.room_of(&id).await, None);
    assert_eq!(watcher.next_participants().await, vec!["alice"]);

    // Further events cannot reach a finished session
    assert!(inbox.send(SessionEvent::Join { document_id: DOC }).await.is_err());

    let updates = watcher
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::DocumentUpdated { .. }))
        .count();
    assert!(updates <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_keep_registry_consistent() {
    let (state, backend) = setup().await;
    let mut tasks = Vec::new();

    for i in 0..20 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let token = if i % 2 == 0 { "alice-token" } else { "bob-token" };
            let mut client = Client::connect(&state, token).await;
            client.join(DOC).await;
            client.edit(&format!("edit {}", i)).await;
            if i % 4 == 0 {
                client.send(SessionEvent::Disconnect).await;
            }
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    let still_joined = clients.iter().filter(|c| !c.session.is_closed()).count();
    assert_eq!(still_joined, 15);
    assert_eq!(
        state.registry.list_participants(DOC).await.participants.len(),
        still_joined
    );

    // Every member still in the room ends on the stored content
    let stored = backend.content(DOC).await.unwrap();
    for client in clients.iter_mut().filter(|c| !c.session.is_closed()) {
        assert_eq!(last_seen_content(client.drain()).as_deref(), Some(stored.as_str()));
    }
}

/// Content of the last document_state or document_updated in `messages`
fn last_seen_content(messages: Vec<ServerMessage>) -> Option<String> {
    messages.into_iter().rev().find_map(|m| match m {
        ServerMessage::DocumentState { document }
        | ServerMessage::DocumentUpdated { document, .. } => Some(document.content),
        _ => None,
    })
}

/// Commits at once but reports back late for one content value
struct LaggingStore {
    inner: Arc<MemoryBackend>,
    lagging: &'static str,
}

#[async_trait::async_trait]
impl DocumentStore for LaggingStore {
    async fn get_snapshot(
        &self,
        document_id: i64,
        participant_id: i64,
    ) -> StoreResult<DocumentState> {
        self.inner.get_snapshot(document_id, participant_id).await
    }

    async fn update_content(
        &self,
        document_id: i64,
        participant_id: i64,
        content: String,
    ) -> StoreResult<DocumentState> {
        let lag = content == self.lagging;
        let result = self
            .inner
            .update_content(document_id, participant_id, content)
            .await;
        if lag {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        result
    }
}

#[tokio::test]
async fn test_overlapping_edits_end_on_stored_content() {
    let (_, backend) = setup().await;
    let state = CollabState::new(
        Collaborators::new(
            backend.clone(),
            backend.clone(),
            Arc::new(LaggingStore {
                inner: backend.clone(),
                lagging: "A",
            }),
        ),
        ServerConfig::default(),
    );

    let mut p1 = Client::connect(&state, "alice-token").await;
    let mut p2 = Client::connect(&state, "bob-token").await;
    p1.join(DOC).await;
    p2.join(DOC).await;
    p1.drain();
    p2.drain();

    let slow = tokio::spawn(async move {
        p1.edit("A").await;
        p1
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    p2.edit("B").await;
    let mut p1 = slow.await.unwrap();

    assert_eq!(backend.content(DOC).await.as_deref(), Some("B"));
    for client in [&mut p1, &mut p2] {
        assert_eq!(last_seen_content(client.drain()).as_deref(), Some("B"));
    }
}
