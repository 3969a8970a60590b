//! Night sequencer: wakes the special roles one at a time, then collects the
//! competition's kill vote.

use super::room::{NightState, ReviewState, Room, SessionEvent};
use super::scheduler::TimerAction;
use super::vote::{majority_target, tally_targets, VoteStage, VoteWindow};
use crate::types::*;
use std::collections::BTreeSet;

/// The Mole joins the competition's vote from this round on
pub const MOLE_ACTIVE_ROUND: u32 = 3;

impl Room {
    /// REVIEW -> NIGHT
    pub(crate) fn enter_night(&mut self, at: u64) {
        self.set_phase(Phase::Night);
        self.night = NightState::default();
        self.schedule_in(self.config.night_intro_ms, TimerAction::WakeNight, at);
    }

    /// Faction members allowed to vote on the night kill this round
    pub fn antagonist_voters(&self) -> BTreeSet<ParticipantId> {
        self.living()
            .filter(|p| p.role.faction() == Faction::Competition)
            .filter(|p| p.role != Role::Mole || self.session.round >= MOLE_ACTIVE_ROUND)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Run the wake order from `step`, skipping roles nobody alive holds
    pub(crate) fn advance_night(&mut self, mut step: NightStep, at: u64) {
        loop {
            match step {
                NightStep::Idle => step = step.next(),
                NightStep::Auditor | NightStep::Accountant | NightStep::Director => {
                    // A lone survivor has nobody to act on
                    let holder = step
                        .role()
                        .filter(|_| self.living().count() > 1)
                        .and_then(|role| self.living_with_role(role))
                        .map(|p| p.id.clone());
                    match holder {
                        Some(id) => {
                            self.night.step = step;
                            self.open_window(VoteStage::NightAction(step), BTreeSet::from([id]), 0, at);
                            return;
                        }
                        None => {
                            tracing::debug!("Room {}: skipping {:?}, nobody to wake", self.code, step);
                            step = step.next();
                        }
                    }
                }
                NightStep::Antagonist => {
                    let voters = self.antagonist_voters();
                    let has_target = self.living().any(|p| p.role.faction() == Faction::Board);
                    if voters.is_empty() || !has_target {
                        tracing::info!("Room {}: no night vote possible", self.code);
                        step = NightStep::Results;
                        continue;
                    }
                    self.night.step = step;
                    self.open_window(VoteStage::Antagonist, voters, 0, at);
                    return;
                }
                NightStep::Results => {
                    self.night.step = NightStep::Results;
                    self.schedule_in(self.config.night_results_ms, TimerAction::EndNight, at);
                    return;
                }
            }
        }
    }

    /// A single target holds more than half of the faction's votes
    pub(crate) fn antagonist_decided(&self) -> bool {
        self.window.as_ref().is_some_and(|window| {
            majority_target(&tally_targets(&window.votes), window.eligible.len()).is_some()
        })
    }

    /// A role holder picked their target
    pub(crate) fn resolve_night_action(&mut self, step: NightStep, window: VoteWindow, now_ms: u64) {
        for (actor, value) in &window.votes {
            let Some(target) = value.target() else {
                continue;
            };
            tracing::info!("Room {}: {:?} {} acted on {}", self.code, step, actor, target);
            if step == NightStep::Auditor {
                if let Some(faction) = self.participant(target).map(|p| p.role.faction()) {
                    self.emit(SessionEvent::Inspection {
                        auditor: actor.clone(),
                        target: target.clone(),
                        faction,
                    });
                }
            }
        }
        self.advance_night(step.next(), now_ms);
    }

    /// Majority reached: reveal the victim after a delay. Full coverage
    /// without a majority reopens the vote; an early forced resolution
    /// forgoes the kill.
    pub(crate) fn resolve_antagonist(&mut self, window: VoteWindow, now_ms: u64) {
        let counts = tally_targets(&window.votes);
        match majority_target(&counts, window.eligible.len()) {
            Some(victim) => {
                tracing::info!("Room {}: competition chose {}", self.code, victim);
                self.night.pending_victim = Some(victim);
                self.schedule_in(self.config.night_kill_reveal_ms, TimerAction::RevealNightKill, now_ms);
            }
            None if window.is_complete() => {
                tracing::info!(
                    "Room {}: competition split {:?}, voting again",
                    self.code,
                    counts
                );
                self.open_window(VoteStage::Antagonist, window.eligible, window.key.attempt + 1, now_ms);
            }
            None => {
                tracing::info!("Room {}: night vote closed without a majority", self.code);
                self.advance_night(NightStep::Results, now_ms);
            }
        }
    }

    pub(crate) fn reveal_night_kill(&mut self, at: u64) {
        if let Some(victim) = self.night.pending_victim.take() {
            if let Some(role) = self.eliminate(&victim) {
                self.emit(SessionEvent::Eliminated {
                    participant: victim.clone(),
                    role,
                    budget_penalty: 0,
                    progress_penalty: 0,
                });
                self.night.victim = Some(victim);
            }
        }
        self.advance_night(NightStep::Results, at);
    }

    /// NIGHT -> REVIEW summary. The round advances here, once per night.
    pub(crate) fn end_night(&mut self, at: u64) {
        self.session.round += 1;
        self.session.has_used_overtime = false;
        self.set_phase(Phase::Review);
        self.night = NightState {
            victim: self.night.victim.take(),
            ..NightState::default()
        };
        self.review = ReviewState {
            phase: ReviewPhase::Summary,
            last_eliminated: self.review.last_eliminated.take(),
            ..ReviewState::default()
        };
        self.schedule_in(
            u64::from(self.config.summary_seconds) * 1000,
            TimerAction::CloseSummary,
            at,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::state::room::tests::{id_with_role, started_room};
    use crate::state::room::Command;
    use crate::state::vote::VoteValue;

    fn cast(room: &mut Room, voter: &str, target: &str, now: u64) -> Result<(), SessionError> {
        room.apply(
            voter,
            Command::CastVote {
                value: VoteValue::Target(target.to_string()),
            },
            now,
        )
    }

    fn board_targets(room: &Room) -> Vec<ParticipantId> {
        room.living()
            .filter(|p| p.role.faction() == Faction::Board)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Room woken into its first night step at t=2000
    fn night_room(seed: u64) -> Room {
        let mut room = started_room(seed);
        room.enter_night(0);
        room.tick(2000);
        room
    }

    #[test]
    fn test_full_night_sequence() {
        let mut room = night_room(41);
        let auditor = id_with_role(&room, Role::Auditor);
        let accountant = id_with_role(&room, Role::Accountant);
        let director = id_with_role(&room, Role::OperationsDirector);
        let antagonist = id_with_role(&room, Role::Antagonist);
        let officer = id_with_role(&room, Role::SafetyOfficer);
        room.drain_events();

        assert_eq!(room.night.step, NightStep::Auditor);
        assert_eq!(room.window.as_ref().unwrap().eligible, BTreeSet::from([auditor.clone()]));
        cast(&mut room, &auditor, &antagonist, 2100).unwrap();
        assert!(room.drain_events().contains(&SessionEvent::Inspection {
            auditor: auditor.clone(),
            target: antagonist.clone(),
            faction: Faction::Competition,
        }));

        assert_eq!(room.night.step, NightStep::Accountant);
        cast(&mut room, &accountant, &director, 2200).unwrap();
        assert_eq!(room.night.step, NightStep::Director);
        cast(&mut room, &director, &accountant, 2300).unwrap();

        assert_eq!(room.night.step, NightStep::Antagonist);
        assert_eq!(
            room.window.as_ref().unwrap().eligible,
            BTreeSet::from([antagonist.clone(), officer.clone()])
        );
        cast(&mut room, &antagonist, &director, 2400).unwrap();
        assert!(room.night.pending_victim.is_none());
        cast(&mut room, &officer, &director, 2500).unwrap();
        assert_eq!(room.night.pending_victim.as_ref(), Some(&director));

        room.tick(4000);
        assert!(room.participant(&director).unwrap().is_eliminated);
        assert_eq!(room.night.step, NightStep::Results);
        assert_eq!(room.night.victim.as_ref(), Some(&director));

        room.tick(6000);
        assert_eq!(room.session.phase, Phase::Review);
        assert_eq!(room.review.phase, ReviewPhase::Summary);
        assert_eq!(room.session.round, 2);
        assert!(!room.session.has_used_overtime);
        // Nothing but the kill changed the gauges
        assert_eq!(room.session.budget, 100);
    }

    #[test]
    fn test_dead_roles_are_skipped() {
        let mut room = started_room(42);
        let auditor = id_with_role(&room, Role::Auditor);
        let accountant = id_with_role(&room, Role::Accountant);
        room.eliminate(&auditor);
        room.eliminate(&accountant);
        room.enter_night(0);
        room.tick(2000);
        assert_eq!(room.night.step, NightStep::Director);
    }

    #[test]
    fn test_night_without_voters_goes_to_results() {
        let mut room = started_room(43);
        for role in [Role::Auditor, Role::Accountant, Role::OperationsDirector, Role::Antagonist, Role::SafetyOfficer] {
            let id = id_with_role(&room, role);
            room.eliminate(&id);
        }
        room.enter_night(0);
        room.tick(2000);
        assert_eq!(room.night.step, NightStep::Results);
        assert!(room.window.is_none());
        room.tick(4000);
        assert_eq!(room.review.phase, ReviewPhase::Summary);
        assert!(room.night.victim.is_none());
    }

    #[test]
    fn test_antagonist_cannot_target_own_faction() {
        let mut room = started_room(44);
        for role in [Role::Auditor, Role::Accountant, Role::OperationsDirector] {
            let id = id_with_role(&room, role);
            room.eliminate(&id);
        }
        room.enter_night(0);
        room.tick(2000);
        assert_eq!(room.night.step, NightStep::Antagonist);

        let antagonist = id_with_role(&room, Role::Antagonist);
        let officer = id_with_role(&room, Role::SafetyOfficer);
        let err = cast(&mut room, &antagonist, &officer, 2100).unwrap_err();
        assert!(matches!(err, SessionError::InvalidVote(_)));
    }

    #[test]
    fn test_split_vote_reopens_window() {
        let mut room = started_room(45);
        for role in [Role::Auditor, Role::Accountant, Role::OperationsDirector] {
            let id = id_with_role(&room, role);
            room.eliminate(&id);
        }
        room.enter_night(0);
        room.tick(2000);

        let antagonist = id_with_role(&room, Role::Antagonist);
        let officer = id_with_role(&room, Role::SafetyOfficer);
        let targets = board_targets(&room);
        cast(&mut room, &antagonist, &targets[0], 2100).unwrap();
        cast(&mut room, &officer, &targets[1], 2200).unwrap();

        let window = room.window.as_ref().unwrap();
        assert_eq!(window.key.stage, VoteStage::Antagonist);
        assert_eq!(window.key.attempt, 1);
        assert!(window.votes.is_empty());
        assert!(room.night.pending_victim.is_none());

        cast(&mut room, &antagonist, &targets[1], 2300).unwrap();
        cast(&mut room, &officer, &targets[1], 2400).unwrap();
        assert_eq!(room.night.pending_victim.as_ref(), Some(&targets[1]));
    }

    #[test]
    fn test_mole_votes_from_round_three() {
        let mut room = started_room(46);
        let intern = id_with_role(&room, Role::DefaultRole);
        if let Some(p) = room.participants.iter_mut().find(|p| p.id == intern) {
            p.assign(Role::Mole, p.seat.unwrap_or(Seat::RING[0]));
        }

        assert_eq!(room.antagonist_voters().len(), 2);
        assert!(!room.antagonist_voters().contains(&intern));
        room.session.round = MOLE_ACTIVE_ROUND;
        assert_eq!(room.antagonist_voters().len(), 3);
        assert!(room.antagonist_voters().contains(&intern));
    }

    #[test]
    fn test_summary_closes_into_next_day() {
        let mut room = started_room(47);
        room.end_night(0);
        assert_eq!(room.session.round, 2);
        room.tick(19_999);
        assert_eq!(room.review.phase, ReviewPhase::Summary);
        room.tick(20_000);
        assert_eq!(room.session.phase, Phase::Day);
        assert_eq!(room.session.time_remaining, 600);
        assert_eq!(room.session.round, 2);
    }

    #[test]
    fn test_coordinator_closes_summary_early() {
        let mut room = started_room(48);
        room.session.has_used_overtime = true;
        room.end_night(0);
        assert!(!room.session.has_used_overtime);
        let coordinator = room.coordinator().id.clone();
        room.apply(&coordinator, Command::CloseSummary, 5_000).unwrap();
        assert_eq!(room.session.phase, Phase::Day);
        assert!(room.pending_timer().is_none());

        // The auto-close timer was dropped with the phase change
        room.tick(25_000);
        assert_eq!(room.session.phase, Phase::Day);
        assert_eq!(room.session.round, 2);
    }
}
