use super::room::Room;
use super::AppState;
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use rand::Rng;
use serde::Serialize;

/// Safe character set for room codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Generate a random room code
fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// What a participant needs to (re)connect to their seat
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JoinTicket {
    pub room_code: RoomCode,
    pub participant_id: ParticipantId,
    /// Secret for resuming; only ever sent to its owner
    pub token: String,
    pub invite_url: String,
}

impl AppState {
    fn ticket(&self, room: &Room, participant: &Participant) -> JoinTicket {
        JoinTicket {
            room_code: room.code.clone(),
            participant_id: participant.id.clone(),
            token: participant.token.clone(),
            invite_url: self.config.invite_url(&room.code),
        }
    }

    /// Open a new room with its creator as coordinator
    pub async fn create_room(&self, display_name: String) -> SessionResult<JoinTicket> {
        let mut rooms = self.rooms.write().await;

        // Generate a unique code (check for collisions)
        let code = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) && !self.store.room_exists(&code).await {
                break code;
            }
        };

        let mut room = Room::seeded(
            code.clone(),
            display_name,
            self.config.session.clone(),
            self.next_seed(),
        );
        room.last_active_ms = self.clock.now_ms();
        let ticket = self.ticket(&room, room.coordinator());
        tracing::info!("Room {} created by {}", code, ticket.participant_id);

        self.commit(&mut room).await;
        rooms.insert(code, room);
        Ok(ticket)
    }

    /// Take a free seat in a lobby
    pub async fn join_room(&self, code: &str, display_name: String) -> SessionResult<JoinTicket> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;

        let participant = room.admit(display_name, false)?;
        room.last_active_ms = self.clock.now_ms();
        let ticket = self.ticket(room, &participant);
        self.commit(room).await;
        Ok(ticket)
    }

    /// Re-establish an identity from its token
    pub async fn resume(&self, code: &str, token: &str) -> SessionResult<JoinTicket> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;
        let participant = room
            .participant_by_token(token)
            .ok_or_else(|| SessionError::AuthFailure("Invalid participant token".to_string()))?;
        Ok(self.ticket(room, participant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_room_code_alphabet() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_create_join_resume() {
        let state = AppState::new(ServerConfig::default());
        let host = state.create_room("Host".to_string()).await.unwrap();
        assert_eq!(
            host.invite_url,
            format!("http://localhost:6573/#room={}", host.room_code)
        );

        let guest = state
            .join_room(&host.room_code, "Guest".to_string())
            .await
            .unwrap();
        assert_ne!(guest.participant_id, host.participant_id);
        assert_ne!(guest.token, host.token);

        let resumed = state.resume(&host.room_code, &guest.token).await.unwrap();
        assert_eq!(resumed, guest);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let state = AppState::new(ServerConfig::default());
        let err = state.join_room("ZZZZZZ", "Guest".to_string()).await.unwrap_err();
        assert_eq!(err, SessionError::RoomNotFound("ZZZZZZ".to_string()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_resume_with_bad_token() {
        let state = AppState::new(ServerConfig::default());
        let host = state.create_room("Host".to_string()).await.unwrap();
        let err = state.resume(&host.room_code, "forged").await.unwrap_err();
        assert!(matches!(err, SessionError::AuthFailure(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let state = AppState::new(ServerConfig::default());
        let host = state.create_room("Host".to_string()).await.unwrap();
        for i in 1..TABLE_SIZE {
            state
                .join_room(&host.room_code, format!("Guest {}", i))
                .await
                .unwrap();
        }
        let err = state
            .join_room(&host.room_code, "Late".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::RoomFull);
    }
}
