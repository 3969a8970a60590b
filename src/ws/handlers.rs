//! WebSocket message dispatch
//!
//! Lobby messages establish which seat a connection speaks for; every other
//! message is turned into a room command issued by that seat.

use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::room::Command;
use crate::state::{AppState, JoinTicket};
use crate::types::*;
use std::sync::Arc;

/// The seat a connection acts for
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub room_code: RoomCode,
    pub participant_id: ParticipantId,
}

/// Per-connection state
#[derive(Debug, Default)]
pub struct ConnectionContext {
    pub identity: Option<Identity>,
}

impl ConnectionContext {
    fn bind(&mut self, ticket: JoinTicket) -> ServerMessage {
        tracing::info!(
            "Connection bound to {} in room {}",
            ticket.participant_id,
            ticket.room_code
        );
        self.identity = Some(Identity {
            room_code: ticket.room_code.clone(),
            participant_id: ticket.participant_id.clone(),
        });
        ServerMessage::Joined { ticket }
    }
}

fn to_command(msg: ClientMessage) -> Option<Command> {
    match msg {
        ClientMessage::FillWithBots => Some(Command::FillWithBots),
        ClientMessage::StartSession => Some(Command::Start),
        ClientMessage::StartReview => Some(Command::StartReview),
        ClientMessage::FinishDiscussion => Some(Command::FinishDiscussion),
        ClientMessage::ResolveVotes { window } => Some(Command::Resolve { window }),
        ClientMessage::CloseSummary => Some(Command::CloseSummary),
        ClientMessage::CastVote { value } => Some(Command::CastVote { value }),
        ClientMessage::ToggleTask => Some(Command::ToggleTask),
        ClientMessage::CreateRoom { .. }
        | ClientMessage::JoinRoom { .. }
        | ClientMessage::Resume { .. } => None,
    }
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    ctx: &mut ConnectionContext,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let result = match msg {
        ClientMessage::CreateRoom { display_name } => state
            .create_room(display_name)
            .await
            .map(|ticket| ctx.bind(ticket)),

        ClientMessage::JoinRoom {
            room_code,
            display_name,
        } => state
            .join_room(&room_code.trim().to_uppercase(), display_name)
            .await
            .map(|ticket| ctx.bind(ticket)),

        ClientMessage::Resume { room_code, token } => state
            .resume(&room_code.trim().to_uppercase(), &token)
            .await
            .map(|ticket| ctx.bind(ticket)),

        other => {
            let Some(identity) = ctx.identity.clone() else {
                return Some(
                    SessionError::AuthFailure("Create, join or resume a room first".to_string())
                        .into(),
                );
            };
            let command = to_command(other)?;
            state
                .execute(&identity.room_code, &identity.participant_id, command)
                .await
                .map(|()| ServerMessage::Ack)
        }
    };

    Some(result.unwrap_or_else(ServerMessage::from))
}
