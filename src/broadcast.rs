use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the background task that drives every room's countdowns, timers
/// and bot votes
pub fn spawn_session_clock(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            state.tick_all().await;
        }
    });
}
