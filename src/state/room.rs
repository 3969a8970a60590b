//! The session aggregate.
//!
//! A `Room` owns everything about one play-through: the session record, the
//! participants, the nested review/night state, the open voting window, the
//! pending timer and the bot schedule. It is mutated only through
//! [`Room::apply`], [`Room::tick`] and [`Room::admit`]; time is always passed
//! in explicitly as milliseconds on the coordinator's clock.

use super::bots::BotSimulator;
use super::scheduler::{ScheduledTimer, Scheduler, TimerAction, TimerKey};
use super::vote::{VoteStage, VoteValue, VoteWindow, VoteWindowKey};
use crate::error::{SessionError, SessionResult};
use crate::types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Commands accepted by a room. The acting participant is passed alongside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Command {
    Start,
    FillWithBots,
    StartReview,
    FinishDiscussion,
    CastVote { value: VoteValue },
    Resolve { window: VoteWindowKey },
    CloseSummary,
    ToggleTask,
}

impl Command {
    fn coordinator_action(&self) -> Option<&'static str> {
        match self {
            Command::Start => Some("start the session"),
            Command::FillWithBots => Some("add bots"),
            Command::StartReview => Some("start the review"),
            Command::FinishDiscussion => Some("finish the discussion"),
            Command::Resolve { .. } => Some("resolve votes"),
            Command::CloseSummary => Some("close the summary"),
            Command::CastVote { .. } | Command::ToggleTask => None,
        }
    }
}

/// An accepted command, as kept in the room's command log
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandRecord {
    pub at_ms: u64,
    pub actor: ParticipantId,
    pub command: Command,
}

/// Things observers may want to react to besides the new snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        phase: Phase,
        round: u32,
    },
    VotingOpened {
        window: VoteWindowKey,
    },
    VoteRecorded {
        window: VoteWindowKey,
        voter: ParticipantId,
    },
    ReviewResolved {
        reviewee: ParticipantId,
        verdict: ReviewVerdict,
    },
    ProgressGained {
        amount: u8,
    },
    RewardGranted {
        participant: ParticipantId,
        item: InventoryItem,
    },
    OvertimeResolved {
        outcome: OvertimeOutcome,
    },
    Eliminated {
        participant: ParticipantId,
        role: Role,
        budget_penalty: u8,
        progress_penalty: u8,
    },
    /// Private to the auditor
    Inspection {
        auditor: ParticipantId,
        target: ParticipantId,
        faction: Faction,
    },
    WinnerDeclared {
        winner: Winner,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReviewState {
    pub phase: ReviewPhase,
    /// Index into the seated participant list of the participant under review
    pub index: usize,
    pub discussion_remaining: u32,
    pub verdict: Option<ReviewVerdict>,
    pub reward: Option<InventoryItem>,
    /// Chosen by the elimination vote, removed once processing finishes
    pub pending_elimination: Option<ParticipantId>,
    pub last_eliminated: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NightState {
    pub step: NightStep,
    pub pending_victim: Option<ParticipantId>,
    pub victim: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OvertimeState {
    pub remaining: u32,
    pub outcome: Option<OvertimeOutcome>,
}

pub struct Room {
    pub code: RoomCode,
    pub session: Session,
    /// Join order in the lobby, ring order once the session has started
    pub participants: Vec<Participant>,
    pub review: ReviewState,
    pub night: NightState,
    pub overtime: OvertimeState,
    pub window: Option<VoteWindow>,
    pub config: SessionConfig,
    pub version: u64,
    pub(crate) scheduler: Scheduler,
    pub(crate) bots: BotSimulator,
    pub(crate) rng: StdRng,
    /// Next one-second countdown boundary; None while no clock runs
    pub(crate) next_second_ms: Option<u64>,
    /// Last time a human joined or had a command accepted
    pub(crate) last_active_ms: u64,
    log: Vec<CommandRecord>,
    events: Vec<SessionEvent>,
}

/// Identity for the participant joining at position `ordinal`. Identities
/// sort in join order and come from the room's RNG.
fn participant_id(ordinal: usize, rng: &mut StdRng) -> ParticipantId {
    ulid::Ulid::from_parts(ordinal as u64, rng.random()).to_string()
}

impl Room {
    /// Create a room whose first participant is its coordinator
    pub fn new(code: RoomCode, coordinator_name: String, config: SessionConfig, mut rng: StdRng) -> Self {
        let coordinator = Participant::new(participant_id(0, &mut rng), coordinator_name, true, false);
        Self {
            code,
            session: Session {
                time_remaining: config.day_seconds,
                ..Session::default()
            },
            participants: vec![coordinator],
            review: ReviewState::default(),
            night: NightState::default(),
            overtime: OvertimeState::default(),
            window: None,
            config,
            version: 1,
            scheduler: Scheduler::default(),
            bots: BotSimulator::default(),
            rng,
            next_second_ms: None,
            last_active_ms: 0,
            log: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Room with a deterministic random stream
    pub fn seeded(code: RoomCode, coordinator_name: String, config: SessionConfig, seed: u64) -> Self {
        Self::new(code, coordinator_name, config, StdRng::seed_from_u64(seed))
    }

    pub fn coordinator(&self) -> &Participant {
        // A room is always created with its coordinator and participants are never removed
        self.participants
            .iter()
            .find(|p| p.is_coordinator)
            .unwrap_or(&self.participants[0])
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_by_token(&self, token: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.token == token)
    }

    pub fn living(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_alive())
    }

    pub fn living_ids(&self) -> BTreeSet<ParticipantId> {
        self.living().map(|p| p.id.clone()).collect()
    }

    pub fn living_with_role(&self, role: Role) -> Option<&Participant> {
        self.living().find(|p| p.role == role)
    }

    pub fn is_role_alive(&self, role: Role) -> bool {
        self.living_with_role(role).is_some()
    }

    pub fn is_over(&self) -> bool {
        self.session.winner.is_some()
    }

    /// No human has done anything for `idle_ms`
    pub fn is_abandoned(&self, now_ms: u64, idle_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_active_ms) >= idle_ms
    }

    pub fn command_log(&self) -> &[CommandRecord] {
        &self.log
    }

    pub fn pending_timer(&self) -> Option<&ScheduledTimer> {
        self.scheduler.pending()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Seat a new participant in the lobby
    pub fn admit(&mut self, display_name: String, is_bot: bool) -> SessionResult<Participant> {
        if self.session.phase != Phase::Lobby {
            return Err(SessionError::WrongPhase {
                action: "join",
                phase: self.session.phase,
            });
        }
        if self.participants.len() >= TABLE_SIZE {
            return Err(SessionError::RoomFull);
        }

        let id = participant_id(self.participants.len(), &mut self.rng);
        let participant = Participant::new(id, display_name, false, is_bot);
        tracing::info!(
            "Room {}: {} joined as {} ({}/{})",
            self.code,
            participant.display_name,
            participant.id,
            self.participants.len() + 1,
            TABLE_SIZE
        );
        self.participants.push(participant.clone());
        self.version += 1;
        Ok(participant)
    }

    /// Apply one command on behalf of `actor`.
    ///
    /// The caller is expected to have brought the clock up to `now_ms` with
    /// [`Room::tick`] first.
    pub fn apply(&mut self, actor: &str, command: Command, now_ms: u64) -> SessionResult<()> {
        let participant = self
            .participant(actor)
            .ok_or_else(|| SessionError::UnknownParticipant(actor.to_string()))?;
        let human = !participant.is_bot;

        if let Some(action) = command.coordinator_action() {
            if !participant.is_coordinator {
                return Err(SessionError::NotCoordinator(action));
            }
        }
        if self.is_over() && command != Command::ToggleTask {
            return Err(SessionError::SessionOver);
        }

        match &command {
            Command::Start => self.start_session(now_ms)?,
            Command::FillWithBots => self.fill_with_bots()?,
            Command::StartReview => {
                self.require_phase(Phase::Day, "start the review")?;
                self.start_review(now_ms);
            }
            Command::FinishDiscussion => {
                if self.session.phase != Phase::Review || self.review.phase != ReviewPhase::Discussion {
                    return Err(SessionError::WrongPhase {
                        action: "finish the discussion",
                        phase: self.session.phase,
                    });
                }
                self.finish_discussion(now_ms);
            }
            Command::CastVote { value } => self.cast_vote(actor, value.clone(), now_ms)?,
            Command::Resolve { window } => self.resolve(*window, now_ms)?,
            Command::CloseSummary => {
                if self.session.phase != Phase::Review || self.review.phase != ReviewPhase::Summary {
                    return Err(SessionError::WrongPhase {
                        action: "close the summary",
                        phase: self.session.phase,
                    });
                }
                self.close_summary(now_ms);
            }
            Command::ToggleTask => self.toggle_task(actor),
        }

        self.log.push(CommandRecord {
            at_ms: now_ms,
            actor: actor.to_string(),
            command,
        });
        self.version += 1;
        if human {
            self.last_active_ms = now_ms;
        }
        Ok(())
    }

    fn require_phase(&self, phase: Phase, action: &'static str) -> SessionResult<()> {
        if self.session.phase == phase {
            Ok(())
        } else {
            Err(SessionError::WrongPhase {
                action,
                phase: self.session.phase,
            })
        }
    }

    fn toggle_task(&mut self, actor: &str) {
        if let Some(p) = self.participants.iter_mut().find(|p| p.id == actor) {
            p.task.completed = !p.task.completed;
            tracing::debug!("Room {}: {} toggled task to {}", self.code, actor, p.task.completed);
        }
    }

    /// Advance the clock to `now_ms`, processing countdown seconds, the
    /// pending timer and bot votes in timestamp order. Returns whether
    /// anything changed.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let before = self.version;
        loop {
            if self.is_over() {
                break;
            }
            let second = self.next_second_ms;
            let timer = self.scheduler.next_due();
            let bot = self.bots.next_due();
            let Some(at) = [timer, bot, second]
                .into_iter()
                .flatten()
                .min()
                .filter(|at| *at <= now_ms)
            else {
                break;
            };

            // A second boundary is counted before a timer due at the same instant
            if second == Some(at) {
                self.next_second_ms = Some(at + 1000);
                self.on_second(at);
            } else if timer == Some(at) {
                if let Some(fired) = self.scheduler.take_due(at) {
                    self.fire_timer(fired, at);
                }
            } else if let Some(pending) = self.bots.take_due(at) {
                self.fire_bot_vote(pending, at);
            }
        }
        self.version != before
    }

    /// Current position in the nested state machines, used to key timers
    pub fn timer_key(&self) -> TimerKey {
        TimerKey {
            phase: self.session.phase,
            review: self.review.phase,
            night: self.night.step,
            round: self.session.round,
            review_index: self.review.index,
        }
    }

    pub(crate) fn schedule_in(&mut self, delay_ms: u64, action: TimerAction, now_ms: u64) {
        if self.is_over() {
            return;
        }
        let key = self.timer_key();
        self.scheduler.schedule(key, now_ms + delay_ms, action);
    }

    fn fire_timer(&mut self, timer: ScheduledTimer, at: u64) {
        if timer.key != self.timer_key() {
            tracing::debug!(
                "Room {}: discarding stale timer {:?} scheduled for {:?}",
                self.code,
                timer.action,
                timer.key
            );
            return;
        }

        tracing::debug!("Room {}: timer {:?} fired at {}ms", self.code, timer.action, at);
        match timer.action {
            TimerAction::ShowReviewResult => self.show_review_result(at),
            TimerAction::FinishReviewResult => self.finish_review_result(at),
            TimerAction::AdvanceReview => self.advance_review(at),
            TimerAction::ApplyElimination => self.apply_elimination(at),
            TimerAction::FinishOvertime => self.finish_overtime(at),
            TimerAction::WakeNight => self.advance_night(NightStep::Auditor, at),
            TimerAction::RevealNightKill => self.reveal_night_kill(at),
            TimerAction::EndNight => self.end_night(at),
            TimerAction::CloseSummary => self.close_summary(at),
        }
        self.version += 1;
    }

    /// Change the coarse phase. Any pending timer and open window belong to
    /// the old phase and are dropped.
    pub(crate) fn set_phase(&mut self, phase: Phase) {
        let from = self.session.phase;
        self.session.phase = phase;
        self.scheduler.cancel();
        self.window = None;
        tracing::info!(
            "Room {}: phase {:?} -> {:?} (round {})",
            self.code,
            from,
            phase,
            self.session.round
        );
        self.emit(SessionEvent::PhaseChanged {
            phase,
            round: self.session.round,
        });
    }

    /// Open a new voting window and wake the bots for it
    pub(crate) fn open_window(&mut self, stage: VoteStage, eligible: BTreeSet<ParticipantId>, attempt: u32, now_ms: u64) {
        let key = VoteWindowKey {
            round: self.session.round,
            stage,
            review_index: self.review.index,
            attempt,
        };
        tracing::info!(
            "Room {}: voting opened for {:?} ({} voters)",
            self.code,
            stage,
            eligible.len()
        );
        self.window = Some(VoteWindow::new(key, eligible));
        self.emit(SessionEvent::VotingOpened { window: key });
        self.arm_bots(now_ms);
    }

    pub(crate) fn eliminate(&mut self, id: &str) -> Option<Role> {
        let participant = self.participants.iter_mut().find(|p| p.id == id)?;
        participant.is_eliminated = true;
        tracing::info!(
            "Room {}: {} ({:?}) eliminated",
            self.code,
            participant.display_name,
            participant.role
        );
        Some(participant.role)
    }

    pub(crate) fn cast_vote(&mut self, voter: &str, value: VoteValue, now_ms: u64) -> SessionResult<()> {
        let phase = self.session.phase;
        let window = self.window.as_ref().ok_or(SessionError::WrongPhase {
            action: "vote",
            phase,
        })?;
        let key = window.key;
        if !window.eligible.contains(voter) {
            return Err(SessionError::NotEligible(voter.to_string()));
        }
        self.validate_vote(voter, key.stage, &value)?;

        if let Some(window) = self.window.as_mut() {
            if window.record(voter, value)? {
                tracing::debug!("Room {}: {} changed their vote", self.code, voter);
            }
        }
        self.emit(SessionEvent::VoteRecorded {
            window: key,
            voter: voter.to_string(),
        });
        self.after_vote(now_ms);
        Ok(())
    }

    fn validate_vote(&self, voter: &str, stage: VoteStage, value: &VoteValue) -> SessionResult<()> {
        if stage.is_yes_no() {
            return match value {
                VoteValue::Yes | VoteValue::No => Ok(()),
                VoteValue::Target(_) => Err(SessionError::InvalidVote(
                    "this vote is YES or NO".to_string(),
                )),
            };
        }

        let target_id = value
            .target()
            .ok_or_else(|| SessionError::InvalidVote("this vote names a participant".to_string()))?;
        let target = self
            .participant(target_id)
            .ok_or_else(|| SessionError::UnknownParticipant(target_id.clone()))?;
        if target.is_eliminated {
            return Err(SessionError::InvalidVote(format!(
                "{} is already eliminated",
                target.display_name
            )));
        }
        if target.id == voter {
            return Err(SessionError::InvalidVote("cannot vote for yourself".to_string()));
        }
        if stage == VoteStage::Antagonist && target.role.faction() == Faction::Competition {
            return Err(SessionError::InvalidVote(
                "cannot target your own faction".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the open window once its stage's completion rule is met
    fn after_vote(&mut self, now_ms: u64) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let key = window.key;
        let ready = match key.stage {
            VoteStage::Antagonist => self.antagonist_decided() || window.is_complete(),
            _ => window.is_complete(),
        };
        if ready {
            if let Err(e) = self.resolve(key, now_ms) {
                tracing::error!("Room {}: resolving {:?} failed: {}", self.code, key, e);
            }
        }
    }

    /// Close the window identified by `key` and act on its votes. Rejected if
    /// that window is not the open one, so each window resolves at most once.
    pub(crate) fn resolve(&mut self, key: VoteWindowKey, now_ms: u64) -> SessionResult<()> {
        let window = match self.window.take() {
            Some(window) if window.key == key => window,
            other => {
                self.window = other;
                return Err(SessionError::AlreadyResolved(key));
            }
        };

        let coverage_required = matches!(
            key.stage,
            VoteStage::TaskReview | VoteStage::Elimination | VoteStage::NightAction(_)
        );
        if coverage_required && !window.is_complete() {
            let missing = window.eligible.len() - window.votes.len();
            self.window = Some(window);
            return Err(SessionError::InvariantViolation(format!(
                "{:?} resolved with {} votes missing",
                key.stage, missing
            )));
        }

        match key.stage {
            VoteStage::TaskReview => self.resolve_task_review(window, now_ms),
            VoteStage::Elimination => self.resolve_elimination(window, now_ms),
            VoteStage::Overtime => self.resolve_overtime(window, now_ms),
            VoteStage::NightAction(step) => self.resolve_night_action(step, window, now_ms),
            VoteStage::Antagonist => self.resolve_antagonist(window, now_ms),
        }
        Ok(())
    }
}
