use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::connections::ConnectionHandle;
use crate::metrics::{EventMetrics, RegistryMetrics};
use crate::registry::SessionRegistry;
use crate::websocket::{ClientEvent, ServerEvent};

use super::Broadcaster;

/// What the server knows about one connection's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Connected but not logged in; events are still relayed, the
    /// connection just has no registry entry to clean up on disconnect.
    #[default]
    Unauthenticated,
    /// Logged in as `user_id`. A later login on the same connection
    /// re-binds it.
    Authenticated { user_id: String },
}

/// Per-connection session, owned by the connection's receive loop.
pub struct ClientSession {
    pub conn: Arc<ConnectionHandle>,
    pub state: SessionState,
}

impl ClientSession {
    pub fn new(conn: Arc<ConnectionHandle>) -> Self {
        Self {
            conn,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { user_id } => Some(user_id),
        }
    }
}

/// Routes inbound client events to registry mutations and outbound emits.
///
/// The relay contract is drop-and-continue: an event that fails its
/// precondition is ignored without any reply to the client, and message,
/// typing and stopTyping are forwarded without validating their content.
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl EventRouter {
    pub fn new(registry: Arc<SessionRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// Handle one inbound event from a connection.
    ///
    /// Outbound events triggered by a single inbound event are emitted in
    /// handler order, so each recipient sees them in that order too.
    pub async fn handle_event(&self, session: &mut ClientSession, event: ClientEvent) {
        EventMetrics::record_received(event.name());

        match event {
            ClientEvent::Login { id, name } => self.handle_login(session, id, name).await,
            ClientEvent::Message {
                user_id,
                user_name,
                message,
                timestamp,
            } => self.handle_message(user_id, user_name, message, timestamp),
            ClientEvent::Typing { user_id, user_name } => {
                self.handle_typing(session, user_id, user_name)
            }
            ClientEvent::StopTyping => self.handle_stop_typing(session),
            ClientEvent::UpdateName { id, name } => self.handle_update_name(id, name).await,
        }
    }

    /// Register the user and reply with `loginSuccess`, then announce
    /// `userJoined` to everyone else, then send the roster to the sender.
    async fn handle_login(&self, session: &mut ClientSession, id: String, name: String) {
        if id.is_empty() || name.is_empty() {
            tracing::debug!(connection_id = %session.conn.id, "Ignoring login with empty id or name");
            EventMetrics::record_dropped();
            return;
        }

        // Same user id again means re-bind, possibly orphaning an older
        // connection's registration. The older connection stays open and
        // its eventual disconnect no longer matches a registry entry.
        self.registry.insert(&id, &name, session.conn.id).await;
        RegistryMetrics::set_registered(self.registry.len().await);
        session.state = SessionState::Authenticated {
            user_id: id.clone(),
        };

        let users = self.registry.snapshot().await;

        self.broadcaster
            .send_to(
                &session.conn,
                ServerEvent::LoginSuccess {
                    id: id.clone(),
                    name: name.clone(),
                },
            )
            .await;
        self.broadcaster.broadcast_except(
            session.conn.id,
            ServerEvent::UserJoined {
                user_id: id.clone(),
                name: name.clone(),
                users: users.clone(),
            },
        );
        self.broadcaster
            .send_to(&session.conn, ServerEvent::UsersList { users })
            .await;

        tracing::info!(
            connection_id = %session.conn.id,
            user_id = %id,
            user_name = %name,
            "User logged in"
        );
    }

    /// Relay a chat message to everyone, sender included. The payload is
    /// forwarded as-is; only a missing timestamp is filled in server-side.
    fn handle_message(
        &self,
        user_id: String,
        user_name: String,
        message: String,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        self.broadcaster.broadcast_all(ServerEvent::Message {
            user_id,
            user_name,
            message,
            timestamp,
        });
    }

    fn handle_typing(&self, session: &ClientSession, user_id: String, user_name: String) {
        self.broadcaster
            .broadcast_except(session.conn.id, ServerEvent::Typing { user_id, user_name });
    }

    fn handle_stop_typing(&self, session: &ClientSession) {
        self.broadcaster
            .broadcast_except(session.conn.id, ServerEvent::StopTyping);
    }

    /// Rename a registered user and announce it to everyone, including the
    /// renaming client. Unknown user ids are ignored.
    async fn handle_update_name(&self, id: String, name: String) {
        let Some(old_name) = self.registry.rename(&id, &name).await else {
            tracing::debug!(user_id = %id, "Ignoring name update for unknown user");
            return;
        };

        let users = self.registry.snapshot().await;
        self.broadcaster.broadcast_all(ServerEvent::NameUpdated {
            user_id: id.clone(),
            old_name: old_name.clone(),
            name: name.clone(),
            users,
        });

        tracing::info!(
            user_id = %id,
            old_name = %old_name,
            new_name = %name,
            "User renamed"
        );
    }

    /// Tear down whatever the closed connection registered.
    ///
    /// Called after the connection has left the live set, so the `userLeft`
    /// fan-out only reaches the remaining connections. A connection that
    /// never logged in, or whose user id was re-bound to a newer
    /// connection, removes nothing and announces nothing.
    pub async fn handle_disconnect(&self, connection_id: Uuid) {
        let Some(record) = self.registry.remove_by_connection(connection_id).await else {
            return;
        };
        RegistryMetrics::set_registered(self.registry.len().await);

        let users = self.registry.snapshot().await;
        self.broadcaster.broadcast_all(ServerEvent::UserLeft {
            user_id: record.user_id.clone(),
            name: record.display_name.clone(),
            users,
        });

        tracing::info!(
            connection_id = %connection_id,
            user_id = %record.user_id,
            user_name = %record.display_name,
            "User left"
        );
    }
}
