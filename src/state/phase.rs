//! Top-level phase controller and win evaluation.

use super::room::{NightState, OvertimeState, ReviewState, Room, SessionEvent};
use super::scheduler::TimerAction;
use super::vote::{count_yes_no, VoteStage, VoteWindow};
use crate::error::{SessionError, SessionResult};
use crate::types::*;

/// Terminal outcome for the given gauges. Progress is checked first, so a
/// mutation that fills progress and empties the budget at once is a board win.
pub fn evaluate_winner(progress: u8, budget: u8) -> Option<Winner> {
    if progress >= 100 {
        Some(Winner::Board)
    } else if budget == 0 {
        Some(Winner::Competition)
    } else {
        None
    }
}

/// Apply a signed delta to a gauge, keeping it within 0..=100
pub fn clamp_gauge(value: u8, delta: i32) -> u8 {
    (i32::from(value) + delta).clamp(0, 100) as u8
}

impl Room {
    /// LOBBY -> DAY
    pub(crate) fn start_session(&mut self, now_ms: u64) -> SessionResult<()> {
        if self.session.phase != Phase::Lobby {
            return Err(SessionError::WrongPhase {
                action: "start the session",
                phase: self.session.phase,
            });
        }
        if self.participants.len() != TABLE_SIZE {
            return Err(SessionError::NotEnoughParticipants(self.participants.len()));
        }

        self.assign_roles();
        self.session = Session {
            phase: Phase::Lobby,
            round: 1,
            progress: 0,
            budget: 100,
            time_remaining: self.config.day_seconds,
            winner: None,
            has_used_overtime: false,
        };
        self.review = ReviewState::default();
        self.night = NightState::default();
        self.overtime = OvertimeState::default();
        self.next_second_ms = Some(now_ms + 1000);
        self.set_phase(Phase::Day);
        Ok(())
    }

    /// One second of wall-clock time has passed
    pub(crate) fn on_second(&mut self, at: u64) {
        let phase = self.session.phase;

        if phase.has_countdown() && self.session.time_remaining > 0 {
            self.session.time_remaining -= 1;
            self.version += 1;
            if phase == Phase::Day && self.session.time_remaining == 0 {
                self.on_day_expired(at);
                return;
            }
        }

        match phase {
            Phase::Review if self.review.phase == ReviewPhase::Discussion => {
                self.review.discussion_remaining = self.review.discussion_remaining.saturating_sub(1);
                self.version += 1;
                if self.review.discussion_remaining == 0 {
                    self.finish_discussion(at);
                }
            }
            Phase::OvertimeVote => {
                self.overtime.remaining = self.overtime.remaining.saturating_sub(1);
                self.version += 1;
                if self.overtime.remaining == 0 {
                    if let Some(key) = self.window.as_ref().map(|w| w.key) {
                        if let Err(e) = self.resolve(key, at) {
                            tracing::error!("Room {}: overtime expiry failed: {}", self.code, e);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// DAY ran out of time: offer overtime once, otherwise go to review
    fn on_day_expired(&mut self, at: u64) {
        if self.session.has_used_overtime {
            tracing::info!("Room {}: day over, overtime already used", self.code);
            self.start_review(at);
            return;
        }

        self.set_phase(Phase::OvertimeVote);
        self.overtime = OvertimeState {
            remaining: self.config.overtime_vote_seconds,
            outcome: None,
        };
        let voters = self.living_ids();
        self.open_window(VoteStage::Overtime, voters, 0, at);
    }

    /// OVERTIME_VOTE -> OVERTIME_OUTCOME
    pub(crate) fn resolve_overtime(&mut self, window: VoteWindow, at: u64) {
        let (yes, no) = count_yes_no(&window.votes);
        let success = yes * 2 > window.eligible.len();
        let outcome = if success {
            OvertimeOutcome::Success
        } else {
            OvertimeOutcome::Failure
        };
        tracing::info!(
            "Room {}: overtime vote {:?} ({} yes, {} no, {} eligible)",
            self.code,
            outcome,
            yes,
            no,
            window.eligible.len()
        );

        self.set_phase(Phase::OvertimeOutcome);
        self.overtime.outcome = Some(outcome);
        self.emit(SessionEvent::OvertimeResolved { outcome });
        if success {
            self.session.time_remaining += self.config.overtime_bonus_seconds;
            self.session.has_used_overtime = true;
            self.adjust_resources(0, -i32::from(self.config.overtime_budget_cost));
        }
        self.schedule_in(self.config.overtime_outcome_ms, TimerAction::FinishOvertime, at);
    }

    /// OVERTIME_OUTCOME -> DAY (granted) or REVIEW (refused)
    pub(crate) fn finish_overtime(&mut self, at: u64) {
        match self.overtime.outcome {
            Some(OvertimeOutcome::Success) => self.set_phase(Phase::Day),
            _ => self.start_review(at),
        }
    }

    /// SUMMARY -> DAY, the start of the next round's collaboration phase
    pub(crate) fn close_summary(&mut self, _at: u64) {
        self.review = ReviewState {
            last_eliminated: self.review.last_eliminated.take(),
            ..ReviewState::default()
        };
        self.session.time_remaining = self.config.day_seconds;
        self.set_phase(Phase::Day);
    }

    /// Change the shared gauges and check for a winner
    pub(crate) fn adjust_resources(&mut self, progress_delta: i32, budget_delta: i32) {
        self.session.progress = clamp_gauge(self.session.progress, progress_delta);
        self.session.budget = clamp_gauge(self.session.budget, budget_delta);
        tracing::debug!(
            "Room {}: progress {} budget {}",
            self.code,
            self.session.progress,
            self.session.budget
        );
        self.check_winner();
    }

    /// Declare a winner if a threshold has been crossed. Once declared the
    /// room is frozen: timers, windows, bots and the countdown all stop.
    pub fn check_winner(&mut self) -> Option<Winner> {
        if self.session.winner.is_some() || self.session.phase == Phase::Lobby {
            return self.session.winner;
        }
        let winner = evaluate_winner(self.session.progress, self.session.budget)?;

        tracing::info!("Room {}: {:?} wins in round {}", self.code, winner, self.session.round);
        self.session.winner = Some(winner);
        self.scheduler.cancel();
        self.window = None;
        self.bots.clear();
        self.next_second_ms = None;
        self.emit(SessionEvent::WinnerDeclared { winner });
        Some(winner)
    }
}
