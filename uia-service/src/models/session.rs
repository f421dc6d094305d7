//! In-progress auth session record.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::stage::StageType;

/// One in-progress user-interactive auth attempt.
///
/// `params` is the snapshot of the protected operation's parameters taken
/// when the session was created; later submissions must match it.
/// `completed` only ever grows: recording a stage again refreshes its
/// payload but never removes earlier completions.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub params: Map<String, Value>,
    pub completed: HashMap<StageType, Value>,
    /// Server-private data, never exposed to clients.
    pub data: HashMap<String, Value>,
}

impl AuthSession {
    pub fn new(id: String, params: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active_at: now,
            params,
            completed: HashMap::new(),
            data: HashMap::new(),
        }
    }

    /// Whether the inactivity window has fully elapsed. A zero TTL expires
    /// sessions immediately.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active_at >= ttl
    }

    /// Completed stage identifiers in stable (sorted) order.
    pub fn completed_stages(&self) -> Vec<StageType> {
        let mut stages: Vec<StageType> = self.completed.keys().cloned().collect();
        stages.sort();
        stages
    }

    /// First parameter in `incoming` whose value differs from the snapshot
    /// taken at session creation. Keys absent from the snapshot never
    /// conflict.
    pub fn conflicting_param(&self, incoming: &Map<String, Value>) -> Option<String> {
        for (key, value) in incoming {
            if let Some(original) = self.params.get(key) {
                if original != value {
                    return Some(key.clone());
                }
            }
        }
        None
    }
}
