//! Role and seat assignment at session start.

use super::room::Room;
use crate::types::*;
use rand::Rng;

/// Roles dealt at the start of every session, one per seat
pub const ROLE_BAG: [Role; TABLE_SIZE] = [
    Role::Antagonist,
    Role::SafetyOfficer,
    Role::Auditor,
    Role::Accountant,
    Role::OperationsDirector,
    Role::DefaultRole,
    Role::DefaultRole,
    Role::DefaultRole,
];

/// Fisher–Yates shuffle: walking from the last slot down to the second,
/// swap each slot `i` with a uniformly chosen slot in `0..=i`.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Shuffle the role bag and the seating order independently
pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> ([Role; TABLE_SIZE], [usize; TABLE_SIZE]) {
    let mut roles = ROLE_BAG;
    fisher_yates(&mut roles, rng);

    let mut order: [usize; TABLE_SIZE] = std::array::from_fn(|i| i);
    fisher_yates(&mut order, rng);

    (roles, order)
}

impl Room {
    /// Give the `n`-th participant of a shuffled order the `n`-th role of a
    /// shuffled bag and the `n`-th seat of the ring, then keep participants
    /// in ring order.
    pub(crate) fn assign_roles(&mut self) {
        let (roles, order) = deal(&mut self.rng);
        for (slot, &participant) in order.iter().enumerate() {
            self.participants[participant].assign(roles[slot], Seat::RING[slot]);
        }
        self.participants.sort_by_key(|p| p.seat);

        for p in &self.participants {
            tracing::debug!(
                "Room {}: {} seated {:?} as {:?}",
                self.code,
                p.display_name,
                p.seat,
                p.role
            );
        }
    }
}
