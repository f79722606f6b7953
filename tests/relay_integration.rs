//! Cross-component integration tests
//!
//! These tests drive the event router against real registry, connection
//! set and broadcaster instances, with channel-backed connections standing
//! in for WebSocket transports. No server startup required.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use chat_relay_service::connections::ConnectionSet;
use chat_relay_service::registry::{SessionRegistry, UserSummary};
use chat_relay_service::relay::{Broadcaster, ClientSession, EventRouter};
use chat_relay_service::websocket::{ClientEvent, OutboundFrame, ServerEvent};

/// Create a relay wired the way the server wires it
fn create_relay_environment() -> TestEnvironment {
    let connections = Arc::new(ConnectionSet::new());
    let registry = Arc::new(SessionRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new(connections.clone()));
    let router = Arc::new(EventRouter::new(registry.clone(), broadcaster.clone()));

    TestEnvironment {
        connections,
        registry,
        broadcaster,
        router,
    }
}

struct TestEnvironment {
    connections: Arc<ConnectionSet>,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    router: Arc<EventRouter>,
}

impl TestEnvironment {
    /// Attach a client: a registered connection plus the receiving end of
    /// its outbound queue.
    fn connect(&self) -> TestClient {
        let (tx, rx) = mpsc::channel(32);
        let conn = self.connections.register(tx);
        TestClient {
            session: ClientSession::new(conn),
            rx,
        }
    }

    async fn login(&self, client: &mut TestClient, id: &str, name: &str) {
        self.router
            .handle_event(
                &mut client.session,
                ClientEvent::Login {
                    id: id.to_string(),
                    name: name.to_string(),
                },
            )
            .await;
    }

    /// Simulate the transport noticing a dropped connection: leave the
    /// live set, then run disconnect cleanup.
    async fn disconnect(&self, client: &TestClient) {
        self.connections.unregister(client.id());
        self.router.handle_disconnect(client.id()).await;
    }
}

struct TestClient {
    session: ClientSession,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl TestClient {
    fn id(&self) -> Uuid {
        self.session.conn.id
    }

    /// Next queued event, decoding shared fan-out frames.
    fn next_event(&mut self) -> ServerEvent {
        match self.try_next_event() {
            Some(event) => event,
            None => panic!("expected a queued event"),
        }
    }

    fn try_next_event(&mut self) -> Option<ServerEvent> {
        match self.rx.try_recv().ok()? {
            OutboundFrame::Event(event) => Some(event),
            OutboundFrame::Shared(json) => {
                Some(serde_json::from_str(&json).expect("shared frame should decode"))
            }
            OutboundFrame::Ping => panic!("unexpected ping frame"),
        }
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

fn users(pairs: &[(&str, &str)]) -> Vec<UserSummary> {
    pairs
        .iter()
        .map(|(id, name)| UserSummary {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

// =============================================================================
// Login Tests
// =============================================================================

mod login_tests {
    use super::*;

    #[tokio::test]
    async fn test_login_flow_single_client() {
        let env = create_relay_environment();
        let mut client = env.connect();

        env.login(&mut client, "u1", "Alice").await;

        // Reply order is loginSuccess, then the roster.
        match client.next_event() {
            ServerEvent::LoginSuccess { id, name } => {
                assert_eq!(id, "u1");
                assert_eq!(name, "Alice");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match client.next_event() {
            ServerEvent::UsersList { users: roster } => {
                assert_eq!(roster, users(&[("u1", "Alice")]));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(client.try_next_event().is_none());

        assert_eq!(env.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_login_notifies_existing_client() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        alice.drain();

        env.login(&mut bob, "u2", "Bob").await;

        // The earlier client sees exactly one userJoined with the full
        // roster in login order.
        match alice.next_event() {
            ServerEvent::UserJoined {
                user_id,
                name,
                users: roster,
            } => {
                assert_eq!(user_id, "u2");
                assert_eq!(name, "Bob");
                assert_eq!(roster, users(&[("u1", "Alice"), ("u2", "Bob")]));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(alice.try_next_event().is_none());

        // The new client gets its own replies, not the join announcement.
        assert!(matches!(bob.next_event(), ServerEvent::LoginSuccess { .. }));
        match bob.next_event() {
            ServerEvent::UsersList { users: roster } => {
                assert_eq!(roster, users(&[("u1", "Alice"), ("u2", "Bob")]));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(bob.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_overwrites_and_orphans_old_connection() {
        let env = create_relay_environment();
        let mut first = env.connect();
        let mut second = env.connect();

        env.login(&mut first, "u1", "Alice").await;
        first.drain();

        // Same user id from another connection: last write wins.
        env.login(&mut second, "u1", "Bob").await;
        assert_eq!(env.registry.len().await, 1);
        assert_eq!(env.registry.snapshot().await, users(&[("u1", "Bob")]));

        // The orphaned connection got the join announcement but no notice
        // that its own registration is gone.
        assert!(matches!(first.next_event(), ServerEvent::UserJoined { .. }));
        assert!(first.try_next_event().is_none());

        // When the orphaned connection finally drops, it no longer matches
        // the registry entry, so nobody is removed and nothing is emitted.
        env.disconnect(&first).await;
        assert_eq!(env.registry.snapshot().await, users(&[("u1", "Bob")]));
        second.drain();
        assert!(second.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_registry_size_ignores_relay_traffic() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();
        let mut carol = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::Typing {
                    user_id: "u1".to_string(),
                    user_name: "Alice".to_string(),
                },
            )
            .await;
        env.login(&mut bob, "u2", "Bob").await;
        env.router
            .handle_event(
                &mut bob.session,
                ClientEvent::Message {
                    user_id: "u2".to_string(),
                    user_name: "Bob".to_string(),
                    message: "hi".to_string(),
                    timestamp: None,
                },
            )
            .await;
        env.login(&mut carol, "u3", "Carol").await;
        env.router
            .handle_event(&mut carol.session, ClientEvent::StopTyping)
            .await;

        // Only logins and disconnects move the registry.
        assert_eq!(env.registry.len().await, 3);

        env.disconnect(&bob).await;
        assert_eq!(env.registry.len().await, 2);
    }
}

// =============================================================================
// Message Tests
// =============================================================================

mod message_tests {
    use super::*;

    #[tokio::test]
    async fn test_message_reaches_everyone_including_sender() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();
        let mut carol = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        env.login(&mut carol, "u3", "Carol").await;
        alice.drain();
        bob.drain();
        carol.drain();

        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::Message {
                    user_id: "u1".to_string(),
                    user_name: "Alice".to_string(),
                    message: "hello everyone".to_string(),
                    timestamp: None,
                },
            )
            .await;

        // Exactly one copy each, identical payload, server-assigned stamp.
        let mut stamps = Vec::new();
        for client in [&mut alice, &mut bob, &mut carol] {
            match client.next_event() {
                ServerEvent::Message {
                    user_id,
                    user_name,
                    message,
                    timestamp,
                } => {
                    assert_eq!(user_id, "u1");
                    assert_eq!(user_name, "Alice");
                    assert_eq!(message, "hello everyone");
                    stamps.push(timestamp);
                }
                other => panic!("unexpected event: {:?}", other),
            }
            assert!(client.try_next_event().is_none());
        }
        assert_eq!(stamps[0], stamps[1]);
        assert_eq!(stamps[1], stamps[2]);
    }

    #[tokio::test]
    async fn test_message_keeps_client_timestamp() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::Message {
                    user_id: "u1".to_string(),
                    user_name: "Alice".to_string(),
                    message: "dated".to_string(),
                    timestamp: Some(sent_at),
                },
            )
            .await;

        match bob.next_event() {
            ServerEvent::Message { timestamp, .. } => assert_eq!(timestamp, sent_at),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

// =============================================================================
// Typing Indicator Tests
// =============================================================================

mod typing_tests {
    use super::*;

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();
        let mut carol = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        env.login(&mut carol, "u3", "Carol").await;
        alice.drain();
        bob.drain();
        carol.drain();

        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::Typing {
                    user_id: "u1".to_string(),
                    user_name: "Alice".to_string(),
                },
            )
            .await;

        for client in [&mut bob, &mut carol] {
            match client.next_event() {
                ServerEvent::Typing { user_id, user_name } => {
                    assert_eq!(user_id, "u1");
                    assert_eq!(user_name, "Alice");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(alice.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_stop_typing_excludes_sender() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        env.router
            .handle_event(&mut alice.session, ClientEvent::StopTyping)
            .await;

        assert!(matches!(bob.next_event(), ServerEvent::StopTyping));
        assert!(alice.try_next_event().is_none());
    }
}

// =============================================================================
// Rename Tests
// =============================================================================

mod rename_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_name_broadcasts_to_everyone() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::UpdateName {
                    id: "u1".to_string(),
                    name: "Ada".to_string(),
                },
            )
            .await;

        // Both clients, the renaming one included, see the rename with the
        // roster position unchanged.
        for client in [&mut alice, &mut bob] {
            match client.next_event() {
                ServerEvent::NameUpdated {
                    user_id,
                    old_name,
                    name,
                    users: roster,
                } => {
                    assert_eq!(user_id, "u1");
                    assert_eq!(old_name, "Alice");
                    assert_eq!(name, "Ada");
                    assert_eq!(roster, users(&[("u1", "Ada"), ("u2", "Bob")]));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_update_name_unknown_user_is_noop() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::UpdateName {
                    id: "ghost".to_string(),
                    name: "Nobody".to_string(),
                },
            )
            .await;

        assert!(alice.try_next_event().is_none());
        assert!(bob.try_next_event().is_none());
        assert_eq!(
            env.registry.snapshot().await,
            users(&[("u1", "Alice"), ("u2", "Bob")])
        );
    }
}

// =============================================================================
// Disconnect Tests
// =============================================================================

mod disconnect_tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_removes_user_and_notifies_remaining() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        env.disconnect(&alice).await;

        match bob.next_event() {
            ServerEvent::UserLeft {
                user_id,
                name,
                users: roster,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(name, "Alice");
                assert_eq!(roster, users(&[("u2", "Bob")]));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(env.registry.len().await, 1);
        // The closed connection is out of the live set and receives nothing.
        assert!(alice.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_removes_only_matching_connection() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();
        let mut carol = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        env.login(&mut carol, "u3", "Carol").await;

        env.disconnect(&bob).await;

        assert_eq!(
            env.registry.snapshot().await,
            users(&[("u1", "Alice"), ("u3", "Carol")])
        );
    }

    #[tokio::test]
    async fn test_registered_user_without_live_connection() {
        let env = create_relay_environment();
        let mut alice = env.connect();
        let mut bob = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.login(&mut bob, "u2", "Bob").await;
        alice.drain();
        bob.drain();

        // Transport has dropped the connection but cleanup has not run yet:
        // the user is still registered with no live connection.
        env.connections.unregister(alice.id());
        assert_eq!(
            env.registry.snapshot().await,
            users(&[("u1", "Alice"), ("u2", "Bob")])
        );

        // Broadcasts in that window still complete for the live connections.
        env.router
            .handle_event(
                &mut bob.session,
                ClientEvent::Message {
                    user_id: "u2".to_string(),
                    user_name: "Bob".to_string(),
                    message: "anyone here?".to_string(),
                    timestamp: None,
                },
            )
            .await;
        assert!(matches!(bob.next_event(), ServerEvent::Message { .. }));
        assert!(alice.try_next_event().is_none());

        // Cleanup closes the window and announces the departure.
        env.router.handle_disconnect(alice.id()).await;
        match bob.next_event() {
            ServerEvent::UserLeft { user_id, users: roster, .. } => {
                assert_eq!(user_id, "u1");
                assert_eq!(roster, users(&[("u2", "Bob")]));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

// =============================================================================
// Broadcast Accounting Tests
// =============================================================================

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcaster_stats_track_login_and_message() {
        let env = create_relay_environment();
        let mut alice = env.connect();

        env.login(&mut alice, "u1", "Alice").await;
        env.router
            .handle_event(
                &mut alice.session,
                ClientEvent::Message {
                    user_id: "u1".to_string(),
                    user_name: "Alice".to_string(),
                    message: "hi".to_string(),
                    timestamp: None,
                },
            )
            .await;

        let stats = env.broadcaster.stats();
        // Login replies are direct sends; userJoined and message are
        // fan-outs.
        assert_eq!(stats.direct_sends, 2);
        assert_eq!(stats.broadcasts, 2);
        assert_eq!(stats.total_failed, 0);
    }

    #[tokio::test]
    async fn test_connection_count_reflects_live_set() {
        let env = create_relay_environment();
        let a = env.connect();
        let b = env.connect();
        assert_eq!(env.connections.len(), 2);

        env.disconnect(&a).await;
        assert_eq!(env.connections.len(), 1);
        drop(b);
    }
}
