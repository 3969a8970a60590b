//! Shared session store.
//!
//! The store is a path-keyed JSON document (`rooms/{code}/session`,
//! `rooms/{code}/participants/{id}`, `rooms/{code}/votes/{id}`, ...). Only the
//! room registry writes to it, one batch per resolution step; everyone else
//! reads or subscribes to change notifications.

use crate::error::SessionError;
use crate::state::room::Room;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store rejected write: {0}")]
    Rejected(String),
    #[error("Failed to encode store value: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::WriteFailure(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Set { path: String, value: Value },
    /// Remove the path and everything below it
    Remove { path: String },
}

/// Sent to subscribers after every applied batch
#[derive(Debug, Clone, PartialEq)]
pub struct StoreNotification {
    pub room: RoomCode,
    pub paths: Vec<String>,
}

/// Stored form of one vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub value: String,
}

pub fn room_path(code: &str) -> String {
    format!("rooms/{}", code)
}

pub fn session_path(code: &str) -> String {
    format!("rooms/{}/session", code)
}

pub fn participant_path(code: &str, id: &str) -> String {
    format!("rooms/{}/participants/{}", code, id)
}

pub fn votes_path(code: &str) -> String {
    format!("rooms/{}/votes", code)
}

pub fn vote_path(code: &str, id: &str) -> String {
    format!("rooms/{}/votes/{}", code, id)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    async fn room_exists(&self, code: &str) -> bool;

    /// Apply every write of `batch` or none of them
    async fn apply(&self, room: &str, batch: Vec<StoreWrite>) -> Result<(), StoreError>;

    /// The subtree under `path` as nested JSON, if anything is stored there
    async fn read(&self, path: &str) -> Option<Value>;

    fn subscribe(&self) -> broadcast::Receiver<StoreNotification>;
}

/// In-process store
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    notifications: broadcast::Sender<StoreNotification>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            notifications: tx,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every following batch fail, as an unreachable backend would
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_under(key: &str, path: &str) -> bool {
    key == path
        || key
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn insert_nested(root: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = root {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        insert_nested(child, rest, value);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn room_exists(&self, code: &str) -> bool {
        let prefix = room_path(code);
        self.entries.read().await.keys().any(|k| is_under(k, &prefix))
    }

    async fn apply(&self, room: &str, batch: Vec<StoreWrite>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(format!(
                "{} writes for room {} refused",
                batch.len(),
                room
            )));
        }

        let mut entries = self.entries.write().await;
        let mut paths = Vec::with_capacity(batch.len());
        for write in batch {
            match write {
                StoreWrite::Set { path, value } => {
                    entries.insert(path.clone(), value);
                    paths.push(path);
                }
                StoreWrite::Remove { path } => {
                    entries.retain(|k, _| !is_under(k, &path));
                    paths.push(path);
                }
            }
        }
        drop(entries);

        // No subscribers is fine
        let _ = self.notifications.send(StoreNotification {
            room: room.to_string(),
            paths,
        });
        Ok(())
    }

    async fn read(&self, path: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        let mut root = Value::Null;
        let mut found = false;
        for (key, value) in entries.iter().filter(|(k, _)| is_under(k, path)) {
            let rest: Vec<&str> = key[path.len()..].split('/').filter(|s| !s.is_empty()).collect();
            insert_nested(&mut root, &rest, value.clone());
            found = true;
        }
        found.then_some(root)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.notifications.subscribe()
    }
}

impl Room {
    /// Full room state as one store batch. Votes are replaced wholesale, so
    /// a resolved window leaves no votes behind.
    pub fn store_batch(&self) -> Result<Vec<StoreWrite>, StoreError> {
        let code = &self.code;
        let mut batch = vec![
            StoreWrite::Set {
                path: session_path(code),
                value: serde_json::to_value(&self.session)?,
            },
            StoreWrite::Set {
                path: format!("{}/review", room_path(code)),
                value: serde_json::to_value(&self.review)?,
            },
            StoreWrite::Set {
                path: format!("{}/night", room_path(code)),
                value: serde_json::to_value(&self.night)?,
            },
            StoreWrite::Remove {
                path: votes_path(code),
            },
        ];
        for p in &self.participants {
            batch.push(StoreWrite::Set {
                path: participant_path(code, &p.id),
                value: serde_json::to_value(p)?,
            });
        }
        if let Some(window) = &self.window {
            for (voter, value) in &window.votes {
                batch.push(StoreWrite::Set {
                    path: vote_path(code, voter),
                    value: serde_json::to_value(VoteRecord {
                        value: value.as_store_value(),
                    })?,
                });
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(path: &str, value: Value) -> StoreWrite {
        StoreWrite::Set {
            path: path.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_read_builds_nested_subtree() {
        let store = MemoryStore::new();
        store
            .apply(
                "R1",
                vec![
                    set("rooms/R1/session", json!({"round": 1})),
                    set("rooms/R1/votes/a", json!({"value": "YES"})),
                    set("rooms/R1/votes/b", json!({"value": "NO"})),
                    set("rooms/R10/session", json!({"round": 9})),
                ],
            )
            .await
            .unwrap();

        let room = store.read("rooms/R1").await.unwrap();
        assert_eq!(room["session"]["round"], 1);
        assert_eq!(room["votes"]["b"]["value"], "NO");
        assert_eq!(store.read("rooms/R1/session").await, Some(json!({"round": 1})));
        assert!(store.read("rooms/R2").await.is_none());
        assert!(store.room_exists("R10").await);
        assert!(!store.room_exists("R").await);
    }

    #[tokio::test]
    async fn test_remove_clears_subtree_only() {
        let store = MemoryStore::new();
        store
            .apply(
                "R1",
                vec![
                    set("rooms/R1/votes/a", json!({"value": "YES"})),
                    set("rooms/R1/votesx", json!(1)),
                ],
            )
            .await
            .unwrap();
        store
            .apply(
                "R1",
                vec![StoreWrite::Remove {
                    path: votes_path("R1"),
                }],
            )
            .await
            .unwrap();
        assert!(store.read("rooms/R1/votes").await.is_none());
        assert_eq!(store.read("rooms/R1/votesx").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.set_fail_writes(true);
        let err = store
            .apply("R1", vec![set("rooms/R1/session", json!({}))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(!store.room_exists("R1").await);
        assert!(rx.try_recv().is_err());

        let session_err: SessionError = err.into();
        assert_eq!(session_err.code(), "WRITE_FAILURE");
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store
            .apply("R1", vec![set("rooms/R1/session", json!({}))])
            .await
            .unwrap();
        let note = rx.recv().await.unwrap();
        assert_eq!(note.room, "R1");
        assert_eq!(note.paths, vec!["rooms/R1/session".to_string()]);
    }
}
