mod bots;
pub mod export;
mod lobby;
mod night;
mod phase;
mod review;
mod roles;
pub mod room;
pub mod scheduler;
pub mod vote;

pub use lobby::JoinTicket;
pub use phase::evaluate_winner;
pub use review::{draw_reward, REWARD_POOL};
pub use roles::ROLE_BAG;

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::error::{SessionError, SessionResult};
use crate::store::{room_path, MemoryStore, SessionStore, StoreWrite};
use crate::types::*;
use export::RoomSnapshot;
use room::{Command, Room, SessionEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Published after every change to a room
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub code: RoomCode,
    pub version: u64,
    pub events: Vec<SessionEvent>,
}

/// Shared application state: the room registry and its collaborators
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomCode, Room>>>,
    pub store: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
    /// Broadcast channel for room updates, filtered per connection
    pub broadcast: broadcast::Sender<RoomUpdate>,
    rooms_created: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock::new()),
        )
    }

    pub fn with_parts(
        config: ServerConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        tracing::info!("Using {} session store", store.name());
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            store,
            clock,
            config: Arc::new(config),
            broadcast: tx,
            rooms_created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seed for the next room's RNG
    fn next_seed(&self) -> u64 {
        let n = self.rooms_created.fetch_add(1, Ordering::SeqCst);
        match self.config.seed {
            Some(base) => base.wrapping_add(n),
            None => rand::random(),
        }
    }

    /// Bring the room up to date, then apply `command` on behalf of `actor`
    pub async fn execute(&self, code: &str, actor: &str, command: Command) -> SessionResult<()> {
        let now = self.clock.now_ms();
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;

        let ticked = room.tick(now);
        let result = room.apply(actor, command, now);
        if let Err(e) = &result {
            tracing::warn!("Room {}: command from {} rejected: {}", code, actor, e);
        }
        if ticked || result.is_ok() {
            self.commit(room).await;
        }
        result
    }

    /// Advance every room to the current time, then drop abandoned rooms
    pub async fn tick_all(&self) {
        let now = self.clock.now_ms();
        let idle_ms = self.config.room_idle_timeout.as_millis() as u64;
        let mut rooms = self.rooms.write().await;
        for room in rooms.values_mut() {
            if room.tick(now) {
                self.commit(room).await;
            }
        }

        let abandoned: Vec<RoomCode> = rooms
            .values()
            .filter(|room| room.is_abandoned(now, idle_ms))
            .map(|room| room.code.clone())
            .collect();
        for code in abandoned {
            if let Some(room) = rooms.remove(&code) {
                self.close_room(room).await;
            }
        }
    }

    /// Remove a room from the store and tell its connections it is gone
    async fn close_room(&self, room: Room) {
        tracing::info!("Room {} abandoned at version {}, removing", room.code, room.version);
        let batch = vec![StoreWrite::Remove {
            path: room_path(&room.code),
        }];
        if let Err(e) = self.store.apply(&room.code, batch).await {
            tracing::error!("Room {}: {}", room.code, SessionError::from(e));
        }
        // Connections bound to the room answer with ROOM_NOT_FOUND from now on
        let _ = self.broadcast.send(RoomUpdate {
            code: room.code,
            version: room.version,
            events: Vec::new(),
        });
    }

    /// Write the room to the store as one batch and publish the change.
    /// A failed write is logged and the in-memory room is kept as is.
    pub(crate) async fn commit(&self, room: &mut Room) {
        match room.store_batch() {
            Ok(batch) => {
                if let Err(e) = self.store.apply(&room.code, batch).await {
                    let e = SessionError::from(e);
                    tracing::error!("Room {}: {} (version {} kept locally)", room.code, e, room.version);
                }
            }
            Err(e) => tracing::error!("Room {}: could not encode state: {}", room.code, e),
        }

        let update = RoomUpdate {
            code: room.code.clone(),
            version: room.version,
            events: room.drain_events(),
        };
        // Ignore send errors (no receivers connected is fine)
        let _ = self.broadcast.send(update);
    }

    pub async fn snapshot_for(&self, code: &str, viewer: Option<&str>) -> SessionResult<RoomSnapshot> {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(|room| room.snapshot_for(viewer))
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))
    }

    /// Snapshot for `viewer` together with the part of `events` they may see
    pub async fn view_for(
        &self,
        code: &str,
        viewer: &str,
        events: &[SessionEvent],
    ) -> SessionResult<(Vec<SessionEvent>, RoomSnapshot)> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;
        let visible = events
            .iter()
            .filter(|e| room.event_visible_to(e, viewer))
            .cloned()
            .collect();
        Ok((visible, room.snapshot_for(Some(viewer))))
    }
}
