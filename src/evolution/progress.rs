//! Progress events (spec §4.5): the Driver reports its own advancement
//! without requiring a consumer to be attached, and a consumer that
//! connects late still sees the run's history up to that point.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::sorted_vec_map::SortedVecMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { run_id: String },
    Log { message: String },
    /// Emitted once per evaluation, not just once per generation (spec §6:
    /// "one structured event per change"); `evals_completed` is monotonic
    /// within a run even though sibling children may complete out of order.
    Status {
        generation: u32,
        evals_completed: u32,
        max_total_evals: u32,
        best_fitness: f64,
        /// Count of evaluated graphs per kill reason token seen so far this
        /// run (spec §6's `kill_stats`).
        kill_stats: SortedVecMap<String, u32>,
    },
    RunFinished { best_fitness: f64, evals_completed: u32 },
    Error { message: String },
}

/// Broadcasts progress with replay: past events are kept in `history` so a
/// subscriber that connects mid-run still receives everything emitted
/// before it attached. The Driver never blocks on a missing subscriber —
/// `broadcast::Sender::send` failing with no receivers is not an error here.
pub struct ProgressHub {
    history: Vec<ProgressEvent>,
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { history: Vec::new(), sender }
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        self.history.push(event.clone());
        let _ = self.sender.send(event);
    }

    /// Returns the events emitted so far, plus a receiver for everything
    /// emitted from this point forward.
    pub fn subscribe(&self) -> (Vec<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        (self.history.clone(), self.sender.subscribe())
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_receives_cumulative_history() {
        let mut hub = ProgressHub::new();
        hub.emit(ProgressEvent::RunStarted { run_id: "r1".to_string() });
        hub.emit(ProgressEvent::Status {
            generation: 0,
            evals_completed: 1,
            max_total_evals: 100,
            best_fitness: 0.0,
            kill_stats: SortedVecMap::new(),
        });

        let (history, _rx) = hub.subscribe();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let mut hub = ProgressHub::new();
        hub.emit(ProgressEvent::Log { message: "no one is listening".to_string() });
    }
}
