//! Simulated participants.
//!
//! Every bot eligible for a newly opened voting window gets exactly one vote
//! scheduled after a random delay. The vote is chosen when it fires and is
//! dropped if the window has closed in the meantime.

use super::room::{Command, Room};
use super::vote::{VoteStage, VoteValue, VoteWindowKey};
use crate::error::SessionResult;
use crate::types::*;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingBotVote {
    pub due_ms: u64,
    pub voter: ParticipantId,
    pub window: VoteWindowKey,
}

#[derive(Debug, Default)]
pub struct BotSimulator {
    /// Last window bots were scheduled for. Only one window is ever open.
    armed: Option<VoteWindowKey>,
    pending: Vec<PendingBotVote>,
}

impl BotSimulator {
    pub fn next_due(&self) -> Option<u64> {
        self.pending.iter().map(|p| p.due_ms).min()
    }

    /// Remove the earliest vote due at `now_ms`. Votes due at the same
    /// instant come out in voter order.
    pub fn take_due(&mut self, now_ms: u64) -> Option<PendingBotVote> {
        let index = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due_ms <= now_ms)
            .min_by(|(_, a), (_, b)| (a.due_ms, &a.voter).cmp(&(b.due_ms, &b.voter)))
            .map(|(i, _)| i)?;
        Some(self.pending.swap_remove(index))
    }

    pub fn pending(&self) -> &[PendingBotVote] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Room {
    /// Fill the lobby's empty seats with bots
    pub(crate) fn fill_with_bots(&mut self) -> SessionResult<()> {
        let words = petname::Petnames::default();
        while self.participants.len() < TABLE_SIZE {
            let name = self
                .bot_name(&words)
                .unwrap_or_else(|| format!("Bot {}", self.participants.len() + 1));
            self.admit(name, true)?;
        }
        Ok(())
    }

    /// "adjective noun" drawn with the room's RNG
    fn bot_name(&mut self, words: &petname::Petnames) -> Option<String> {
        if words.adjectives.is_empty() || words.nouns.is_empty() {
            return None;
        }
        let adjective = words.adjectives[self.rng.random_range(0..words.adjectives.len())];
        let noun = words.nouns[self.rng.random_range(0..words.nouns.len())];
        Some(format!("{} {}", adjective, noun))
    }

    /// Schedule one vote per eligible bot for the open window, once per window
    pub(crate) fn arm_bots(&mut self, now_ms: u64) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let key = window.key;
        if self.bots.armed == Some(key) {
            return;
        }
        self.bots.armed = Some(key);

        let voters: Vec<ParticipantId> = self
            .living()
            .filter(|p| p.is_bot && window.eligible.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();
        for voter in voters {
            let delay = self
                .rng
                .random_range(self.config.bot_min_delay_ms..=self.config.bot_max_delay_ms);
            self.bots.pending.push(PendingBotVote {
                due_ms: now_ms + delay,
                voter,
                window: key,
            });
        }
    }

    fn choose_bot_vote(&mut self, voter: &str, stage: VoteStage) -> Option<VoteValue> {
        if stage.is_yes_no() {
            return Some(if self.rng.random_bool(self.config.bot_yes_probability) {
                VoteValue::Yes
            } else {
                VoteValue::No
            });
        }

        let candidates: Vec<ParticipantId> = self
            .living()
            .filter(|p| p.id != voter)
            .filter(|p| stage != VoteStage::Antagonist || p.role.faction() == Faction::Board)
            .map(|p| p.id.clone())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = self.rng.random_range(0..candidates.len());
        Some(VoteValue::Target(candidates[pick].clone()))
    }

    pub(crate) fn fire_bot_vote(&mut self, pending: PendingBotVote, at: u64) {
        let still_open = self.window.as_ref().is_some_and(|w| {
            w.key == pending.window && w.eligible.contains(&pending.voter) && !w.has_voted(&pending.voter)
        });
        if !still_open {
            tracing::debug!(
                "Room {}: dropping bot vote from {} for closed window {:?}",
                self.code,
                pending.voter,
                pending.window
            );
            return;
        }

        let Some(value) = self.choose_bot_vote(&pending.voter, pending.window.stage) else {
            return;
        };
        if let Err(e) = self.apply(&pending.voter, Command::CastVote { value }, at) {
            tracing::warn!("Room {}: bot {} vote rejected: {}", self.code, pending.voter, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::room::tests::id_with_role;

    /// Human coordinator plus seven bots, session started at t=0
    fn bot_room(seed: u64) -> Room {
        let mut room = Room::seeded(
            "BOTS01".to_string(),
            "Coordinator".to_string(),
            SessionConfig::default(),
            seed,
        );
        let coordinator = room.coordinator().id.clone();
        room.apply(&coordinator, Command::FillWithBots, 0).unwrap();
        room.apply(&coordinator, Command::Start, 0).unwrap();
        room
    }

    #[test]
    fn test_fill_with_bots() {
        let room = bot_room(1);
        assert_eq!(room.participants.len(), TABLE_SIZE);
        assert_eq!(room.participants.iter().filter(|p| p.is_bot).count(), TABLE_SIZE - 1);
        assert!(room.participants.iter().all(|p| !p.display_name.is_empty()));
        assert!(!room.coordinator().is_bot);
    }

    #[test]
    fn test_bots_vote_within_delay_bounds() {
        let mut room = bot_room(2);
        let coordinator = room.coordinator().id.clone();
        room.apply(&coordinator, Command::StartReview, 1000).unwrap();
        room.apply(&coordinator, Command::FinishDiscussion, 1000).unwrap();

        let pending = room.bots.pending().to_vec();
        assert_eq!(pending.len(), TABLE_SIZE - 1);
        for p in &pending {
            assert!((2500..=5000).contains(&p.due_ms), "{}", p.due_ms);
        }

        room.tick(5000);
        let window = room.window.as_ref().unwrap();
        assert_eq!(window.votes.len(), TABLE_SIZE - 1);
        assert!(!window.has_voted(&coordinator));

        room.apply(&coordinator, Command::CastVote { value: VoteValue::Yes }, 5000)
            .unwrap();
        assert!(room.window.is_none());
        assert_eq!(room.review.phase, ReviewPhase::Processing);
    }

    #[test]
    fn test_bots_trigger_once_per_window() {
        let mut room = bot_room(3);
        let coordinator = room.coordinator().id.clone();
        room.apply(&coordinator, Command::StartReview, 0).unwrap();
        room.apply(&coordinator, Command::FinishDiscussion, 0).unwrap();
        room.arm_bots(100);
        room.arm_bots(200);
        assert_eq!(room.bots.pending().len(), TABLE_SIZE - 1);
    }

    #[test]
    fn test_bot_vote_for_closed_window_is_dropped() {
        let mut room = bot_room(4);
        let coordinator = room.coordinator().id.clone();
        room.apply(&coordinator, Command::StartReview, 0).unwrap();
        room.apply(&coordinator, Command::FinishDiscussion, 0).unwrap();
        let logged = room.command_log().len();

        room.set_phase(Phase::Day);
        room.tick(5000);
        assert!(room.bots.pending().is_empty());
        assert_eq!(room.command_log().len(), logged);
    }

    #[test]
    fn test_bot_night_targets_are_valid() {
        let mut room = bot_room(5);
        if let Some(p) = room.participants.iter_mut().find(|p| p.is_coordinator) {
            p.is_bot = true;
        }
        room.enter_night(0);

        let mut t = 0;
        while room.session.round == 1 && t < 300_000 {
            t += 250;
            room.tick(t);
        }
        assert_eq!(room.session.round, 2);
        assert!(room.session.winner.is_none());

        // Exactly one board member fell to the night vote
        let victim = room.night.victim.clone().unwrap();
        let victim = room.participant(&victim).unwrap();
        assert!(victim.is_eliminated);
        assert_eq!(victim.role.faction(), Faction::Board);
        assert_eq!(room.living().count(), TABLE_SIZE - 1);

        // Every bot vote went through the command log as a cast vote
        let antagonist = id_with_role(&room, Role::Antagonist);
        assert!(room
            .command_log()
            .iter()
            .any(|r| r.actor == antagonist && matches!(r.command, Command::CastVote { .. })));
    }

    /// Bots only, played until a winner or the start of round 3
    fn play_out(seed: u64) -> Room {
        let mut room = bot_room(seed);
        if let Some(p) = room.participants.iter_mut().find(|p| p.is_coordinator) {
            p.is_bot = true;
        }
        let mut t = 0;
        while room.session.winner.is_none() && room.session.round < 3 && t < 3_600_000 {
            t += 250;
            room.tick(t);
        }
        room
    }

    fn outline(room: &Room) -> Vec<(ParticipantId, String, Role, Option<Seat>, bool)> {
        room.participants
            .iter()
            .map(|p| (p.id.clone(), p.display_name.clone(), p.role, p.seat, p.is_eliminated))
            .collect()
    }

    #[test]
    fn test_seeded_room_replays_identically() {
        for seed in 0..5 {
            let first = play_out(seed);
            let second = play_out(seed);
            assert!(first.session.round >= 2 || first.session.winner.is_some(), "seed {}", seed);
            assert_eq!(first.session, second.session, "seed {}", seed);
            assert_eq!(outline(&first), outline(&second), "seed {}", seed);
            assert_eq!(first.command_log(), second.command_log(), "seed {}", seed);
        }
    }
}
