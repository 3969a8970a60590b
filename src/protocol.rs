use crate::error::SessionError;
use crate::state::export::RoomSnapshot;
use crate::state::room::SessionEvent;
use crate::state::vote::{VoteValue, VoteWindowKey};
use crate::state::JoinTicket;
use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        display_name: String,
    },
    JoinRoom {
        room_code: RoomCode,
        display_name: String,
    },
    Resume {
        room_code: RoomCode,
        token: String,
    },
    // Coordinator-only messages
    FillWithBots,
    StartSession,
    StartReview,
    FinishDiscussion,
    ResolveVotes {
        window: VoteWindowKey,
    },
    CloseSummary,
    // Any participant
    CastVote {
        value: VoteValue,
    },
    ToggleTask,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        server_now: String,
    },
    Joined {
        #[serde(flatten)]
        ticket: JoinTicket,
    },
    Snapshot {
        snapshot: Box<RoomSnapshot>,
    },
    Event {
        event: SessionEvent,
    },
    Ack,
    Error {
        code: String,
        msg: String,
        retryable: bool,
    },
}

impl ServerMessage {
    pub fn welcome() -> Self {
        ServerMessage::Welcome {
            protocol: PROTOCOL_VERSION.to_string(),
            server_now: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<SessionError> for ServerMessage {
    fn from(e: SessionError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}
