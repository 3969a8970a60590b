//! Read-only snapshots of a room, prepared per viewer.
//!
//! A snapshot only reveals roles the viewer is entitled to see: their own,
//! those of eliminated participants, and every role once a winner is known.

use super::room::{OvertimeState, ReviewState, Room, SessionEvent};
use super::scheduler::TimerAction;
use super::vote::{VoteValue, VoteWindowKey};
use crate::types::*;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub display_name: String,
    /// None when hidden from this viewer
    pub role: Option<Role>,
    pub sector: Option<Sector>,
    pub seat: Option<Seat>,
    pub is_eliminated: bool,
    pub is_coordinator: bool,
    pub is_bot: bool,
    pub is_self: bool,
    /// Only the owner sees an inventory until the session is over
    pub inventory: Option<Vec<InventoryItem>>,
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VotingView {
    pub window: VoteWindowKey,
    pub eligible: Vec<ParticipantId>,
    /// Who has voted, never what they voted
    pub voted: Vec<ParticipantId>,
    pub my_vote: Option<VoteValue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NightView {
    pub step: NightStep,
    pub victim: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerView {
    pub action: TimerAction,
    pub due_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub version: u64,
    pub server_now: String,
    pub session: Session,
    pub review: ReviewState,
    pub night: NightView,
    pub overtime: OvertimeState,
    pub participants: Vec<ParticipantView>,
    pub voting: Option<VotingView>,
    pub pending_timer: Option<TimerView>,
}

impl Room {
    fn role_visible_to(&self, subject: &Participant, viewer: Option<&str>) -> bool {
        self.is_over() || subject.is_eliminated || viewer == Some(subject.id.as_str())
    }

    /// Night windows are only shown to their own voters
    pub fn window_visible_to(&self, key: &VoteWindowKey, viewer: Option<&str>) -> bool {
        if !key.stage.is_secret() || self.is_over() {
            return true;
        }
        self.window
            .as_ref()
            .filter(|w| w.key == *key)
            .zip(viewer)
            .is_some_and(|(w, id)| w.eligible.contains(id))
    }

    /// Whether `viewer` may be told about `event`. Inspections go to the
    /// auditor alone; night votes to the window's own voters.
    pub fn event_visible_to(&self, event: &SessionEvent, viewer: &str) -> bool {
        match event {
            SessionEvent::Inspection { auditor, .. } => auditor == viewer,
            SessionEvent::VotingOpened { window } => self.window_visible_to(window, Some(viewer)),
            SessionEvent::VoteRecorded { window, voter } => {
                voter == viewer || self.window_visible_to(window, Some(viewer))
            }
            _ => true,
        }
    }

    /// Snapshot as seen by `viewer`; `None` is an anonymous spectator
    pub fn snapshot_for(&self, viewer: Option<&str>) -> RoomSnapshot {
        let participants = self
            .participants
            .iter()
            .map(|p| {
                let visible = self.session.phase != Phase::Lobby && self.role_visible_to(p, viewer);
                let is_self = viewer == Some(p.id.as_str());
                ParticipantView {
                    id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    role: visible.then_some(p.role),
                    sector: visible.then_some(p.sector),
                    seat: p.seat,
                    is_eliminated: p.is_eliminated,
                    is_coordinator: p.is_coordinator,
                    is_bot: p.is_bot,
                    is_self,
                    inventory: (is_self || self.is_over()).then(|| p.inventory.clone()),
                    task: p.task.clone(),
                }
            })
            .collect();

        let voting = self
            .window
            .as_ref()
            .filter(|w| self.window_visible_to(&w.key, viewer))
            .map(|w| VotingView {
                window: w.key,
                eligible: w.eligible.iter().cloned().collect(),
                voted: w.votes.keys().cloned().collect(),
                my_vote: viewer.and_then(|id| w.votes.get(id).cloned()),
            });

        RoomSnapshot {
            code: self.code.clone(),
            version: self.version,
            server_now: chrono::Utc::now().to_rfc3339(),
            session: self.session.clone(),
            review: self.review.clone(),
            night: NightView {
                step: self.night.step,
                victim: self.night.victim.clone(),
            },
            overtime: self.overtime.clone(),
            participants,
            voting,
            pending_timer: self.pending_timer().map(|t| TimerView {
                action: t.action,
                due_ms: t.due_ms,
            }),
        }
    }
}
