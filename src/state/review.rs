//! Performance reviews: one task vote per living participant in seat order,
//! then the group elimination vote.

use super::room::{ReviewState, Room, SessionEvent};
use super::scheduler::TimerAction;
use super::vote::{plurality, tally_targets, tally_task, VoteStage, VoteWindow};
use crate::types::*;
use rand::Rng;

/// Templates drawn from when a task is approved
pub const REWARD_POOL: [(&str, ItemKind); 5] = [
    ("Annual Bonus", ItemKind::Bonus),
    ("Financial Audit", ItemKind::Audit),
    ("Sick Leave (Flu)", ItemKind::SickLeave),
    ("Spreadsheet Error", ItemKind::Error),
    ("NDA", ItemKind::Nda),
];

const DIRECTOR_BONUS: u8 = 2;

/// Copy a uniformly chosen pool entry under a fresh identity
pub fn draw_reward<R: Rng + ?Sized>(rng: &mut R) -> InventoryItem {
    let (label, kind) = REWARD_POOL[rng.random_range(0..REWARD_POOL.len())];
    InventoryItem {
        id: ulid::Ulid::from_parts(0, rng.random()).to_string(),
        label: label.to_string(),
        kind,
    }
}

impl Room {
    fn next_living_index(&self, from: usize) -> Option<usize> {
        (from..self.participants.len()).find(|&i| self.participants[i].is_alive())
    }

    fn reviewee_id(&self) -> Option<ParticipantId> {
        self.participants.get(self.review.index).map(|p| p.id.clone())
    }

    /// DAY (or a refused overtime) -> REVIEW, starting with the first living seat
    pub(crate) fn start_review(&mut self, _now_ms: u64) {
        self.set_phase(Phase::Review);
        self.review = ReviewState {
            last_eliminated: self.review.last_eliminated.take(),
            ..ReviewState::default()
        };
        match self.next_living_index(0) {
            Some(index) => self.begin_discussion(index),
            None => tracing::error!("Room {}: review started with nobody alive", self.code),
        }
    }

    fn begin_discussion(&mut self, index: usize) {
        self.review.index = index;
        self.review.phase = ReviewPhase::Discussion;
        self.review.discussion_remaining = self.config.discussion_seconds;
        self.review.verdict = None;
        self.review.reward = None;
        tracing::debug!(
            "Room {}: reviewing {}",
            self.code,
            self.participants[index].display_name
        );
    }

    /// DISCUSSION -> VOTING
    pub(crate) fn finish_discussion(&mut self, now_ms: u64) {
        self.review.phase = ReviewPhase::Voting;
        self.review.discussion_remaining = 0;
        let voters = self.living_ids();
        self.open_window(VoteStage::TaskReview, voters, 0, now_ms);
    }

    /// VOTING -> PROCESSING
    pub(crate) fn resolve_task_review(&mut self, window: VoteWindow, now_ms: u64) {
        let verdict = tally_task(&window.votes);
        self.review.verdict = Some(verdict);
        self.review.phase = ReviewPhase::Processing;
        if let Some(reviewee) = self.reviewee_id() {
            tracing::info!("Room {}: review of {} {:?}", self.code, reviewee, verdict);
            self.emit(SessionEvent::ReviewResolved { reviewee, verdict });
        }
        self.schedule_in(self.config.review_processing_ms, TimerAction::ShowReviewResult, now_ms);
    }

    /// PROCESSING -> RESULT; an approved task moves the board forward
    pub(crate) fn show_review_result(&mut self, at: u64) {
        self.review.phase = ReviewPhase::Result;
        if self.review.verdict == Some(ReviewVerdict::Approved) {
            let mut amount: u8 = self.rng.random_range(3..=7);
            if self.is_role_alive(Role::OperationsDirector) {
                amount += DIRECTOR_BONUS;
            }
            self.emit(SessionEvent::ProgressGained { amount });
            self.adjust_resources(i32::from(amount), 0);
            if self.is_over() {
                return;
            }
        }
        self.schedule_in(self.config.review_result_ms, TimerAction::FinishReviewResult, at);
    }

    /// RESULT -> REWARD when approved, otherwise straight on to the next seat
    pub(crate) fn finish_review_result(&mut self, at: u64) {
        if self.review.verdict != Some(ReviewVerdict::Approved) {
            self.advance_review(at);
            return;
        }

        let item = draw_reward(&mut self.rng);
        let Some(reviewee) = self.reviewee_id() else {
            self.advance_review(at);
            return;
        };
        if let Some(p) = self.participants.iter_mut().find(|p| p.id == reviewee) {
            p.inventory.push(item.clone());
        }
        tracing::info!("Room {}: {} received {}", self.code, reviewee, item.label);
        self.review.reward = Some(item.clone());
        self.review.phase = ReviewPhase::Reward;
        self.emit(SessionEvent::RewardGranted {
            participant: reviewee,
            item,
        });
        self.schedule_in(self.config.reward_display_ms, TimerAction::AdvanceReview, at);
    }

    /// Move on to the next living seat, or to the elimination vote
    pub(crate) fn advance_review(&mut self, now_ms: u64) {
        match self.next_living_index(self.review.index + 1) {
            Some(index) => self.begin_discussion(index),
            None if self.living().count() < 2 => {
                tracing::info!("Room {}: nobody left to vote out, skipping elimination", self.code);
                self.review = ReviewState {
                    last_eliminated: self.review.last_eliminated.take(),
                    ..ReviewState::default()
                };
                self.enter_night(now_ms);
            }
            None => {
                self.review.phase = ReviewPhase::Elimination;
                self.review.verdict = None;
                self.review.reward = None;
                let voters = self.living_ids();
                self.open_window(VoteStage::Elimination, voters, 0, now_ms);
            }
        }
    }

    /// ELIMINATION vote -> PROCESSING
    pub(crate) fn resolve_elimination(&mut self, window: VoteWindow, now_ms: u64) {
        let counts = tally_targets(&window.votes);
        let target = plurality(&counts);
        tracing::info!(
            "Room {}: elimination tally {:?}, chosen {:?}",
            self.code,
            counts,
            target
        );
        self.review.pending_elimination = target;
        self.review.phase = ReviewPhase::Processing;
        self.schedule_in(self.config.elimination_processing_ms, TimerAction::ApplyElimination, now_ms);
    }

    /// Remove the chosen participant, charge the penalties, then fall into NIGHT
    pub(crate) fn apply_elimination(&mut self, at: u64) {
        if let Some(target) = self.review.pending_elimination.take() {
            if let Some(role) = self.eliminate(&target) {
                let budget_penalty: u8 = if self.is_role_alive(Role::Accountant) { 5 } else { 10 };
                let progress_penalty: u8 =
                    if role.is_protected_staff() && self.is_role_alive(Role::SafetyOfficer) {
                        5
                    } else {
                        0
                    };
                self.emit(SessionEvent::Eliminated {
                    participant: target.clone(),
                    role,
                    budget_penalty,
                    progress_penalty,
                });
                self.review.last_eliminated = Some(target);
                self.adjust_resources(-i32::from(progress_penalty), -i32::from(budget_penalty));
            }
        }

        if self.is_over() {
            return;
        }
        self.review = ReviewState {
            last_eliminated: self.review.last_eliminated.take(),
            ..ReviewState::default()
        };
        self.enter_night(at);
    }
}
