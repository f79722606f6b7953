use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A registered user as exposed in roster payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

/// Registry entry binding a user to the connection that registered it.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub user_id: String,
    pub display_name: String,
    pub connection_id: Uuid,
}

/// Shared roster of logged-in users, keyed by user id.
///
/// Iteration order is insertion order: a user keeps their roster position
/// across renames and re-logins, and removals close the gap without
/// reordering anyone else. All operations take the write or read lock for
/// their full duration, so each one observes and produces a consistent
/// roster state.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    users: RwLock<IndexMap<String, PresenceRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(IndexMap::new()),
        }
    }

    /// Register a user, or re-bind an existing user id to a new name and
    /// connection. Re-binding keeps the original roster position.
    pub async fn insert(&self, user_id: &str, display_name: &str, connection_id: Uuid) {
        let mut users = self.users.write().await;
        users.insert(
            user_id.to_string(),
            PresenceRecord {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                connection_id,
            },
        );
    }

    /// Change a user's display name. Returns the previous name, or `None`
    /// if the user id is not registered (in which case nothing changes).
    pub async fn rename(&self, user_id: &str, new_name: &str) -> Option<String> {
        let mut users = self.users.write().await;
        let record = users.get_mut(user_id)?;
        let old_name = std::mem::replace(&mut record.display_name, new_name.to_string());
        Some(old_name)
    }

    /// Remove the user registered by the given connection, if any.
    ///
    /// Matching is by connection id, so a user whose id was re-bound to a
    /// newer connection is not removed when the older connection goes away.
    pub async fn remove_by_connection(&self, connection_id: Uuid) -> Option<PresenceRecord> {
        let mut users = self.users.write().await;
        let user_id = users
            .values()
            .find(|record| record.connection_id == connection_id)
            .map(|record| record.user_id.clone())?;
        users.shift_remove(&user_id)
    }

    /// Current roster in insertion order.
    pub async fn snapshot(&self) -> Vec<UserSummary> {
        let users = self.users.read().await;
        users
            .values()
            .map(|record| UserSummary {
                id: record.user_id.clone(),
                name: record.display_name.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
