//! Single-slot timer for delayed sub-phase transitions.
//!
//! A room has at most one pending timer. Scheduling replaces whatever was
//! pending, and the owner cancels it on every phase change. A timer remembers
//! the sub-phase it was scheduled in; the room discards it on firing when that
//! sub-phase is no longer current.

use crate::types::*;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TimerKey {
    pub phase: Phase,
    pub review: ReviewPhase,
    pub night: NightStep,
    pub round: u32,
    pub review_index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerAction {
    ShowReviewResult,
    FinishReviewResult,
    AdvanceReview,
    ApplyElimination,
    FinishOvertime,
    WakeNight,
    RevealNightKill,
    EndNight,
    CloseSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduledTimer {
    pub key: TimerKey,
    pub due_ms: u64,
    pub action: TimerAction,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    pending: Option<ScheduledTimer>,
}

impl Scheduler {
    pub fn schedule(&mut self, key: TimerKey, due_ms: u64, action: TimerAction) {
        if let Some(replaced) = self.pending.take() {
            tracing::debug!("Timer {:?} replaced by {:?}", replaced.action, action);
        }
        self.pending = Some(ScheduledTimer {
            key,
            due_ms,
            action,
        });
    }

    pub fn cancel(&mut self) {
        if let Some(cancelled) = self.pending.take() {
            tracing::debug!("Timer {:?} cancelled", cancelled.action);
        }
    }

    pub fn pending(&self) -> Option<&ScheduledTimer> {
        self.pending.as_ref()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.pending.as_ref().map(|t| t.due_ms)
    }

    /// Remove and return the pending timer if it is due at `now_ms`
    pub fn take_due(&mut self, now_ms: u64) -> Option<ScheduledTimer> {
        if self.next_due()? <= now_ms {
            self.pending.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(review: ReviewPhase) -> TimerKey {
        TimerKey {
            phase: Phase::Review,
            review,
            night: NightStep::Idle,
            round: 1,
            review_index: 0,
        }
    }

    #[test]
    fn test_schedule_replaces_pending_timer() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(key(ReviewPhase::Processing), 1000, TimerAction::ShowReviewResult);
        scheduler.schedule(key(ReviewPhase::Result), 2500, TimerAction::FinishReviewResult);

        let pending = scheduler.pending().unwrap();
        assert_eq!(pending.action, TimerAction::FinishReviewResult);
        assert_eq!(scheduler.next_due(), Some(2500));
    }

    #[test]
    fn test_take_due_respects_deadline() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(key(ReviewPhase::Processing), 1000, TimerAction::ShowReviewResult);

        assert!(scheduler.take_due(999).is_none());
        let fired = scheduler.take_due(1000).unwrap();
        assert_eq!(fired.action, TimerAction::ShowReviewResult);
        assert!(scheduler.pending().is_none());
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(key(ReviewPhase::Reward), 10, TimerAction::AdvanceReview);
        scheduler.cancel();
        assert!(scheduler.next_due().is_none());
        assert!(scheduler.take_due(u64::MAX).is_none());
    }
}
