use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::limits::MAX_CANDIDATES_PER_WINDOW;

/// Reduces noisy per-frame recognition output to one plate per window.
#[derive(Debug, Default)]
pub struct PlateVoter {
    /// Candidates in arrival order.
    candidates: Vec<String>,
}

impl PlateVoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate. Blank strings are ignored, as is anything past the
    /// per-window cap. Returns whether the candidate was counted.
    pub fn push(&mut self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty() || self.candidates.len() >= MAX_CANDIDATES_PER_WINDOW {
            return false;
        }
        self.candidates.push(candidate.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    /// Close the window: return the most frequent candidate and reset.
    /// Ties go to whichever tied candidate was seen first.
    pub fn decide(&mut self) -> Option<String> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, c) in self.candidates.iter().enumerate() {
            counts.entry(c.as_str()).or_insert((0, idx)).0 += 1;
        }
        let winner = counts
            .into_iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(plate, _)| plate.to_string());
        self.candidates.clear();
        winner
    }
}

/// Collect candidates and emit one decision per `window`.
///
/// Runs until the candidate channel closes or the decision receiver goes
/// away. Candidates still pending when the feed stops are discarded.
pub async fn run_voting_window(
    mut candidates: mpsc::Receiver<String>,
    decisions: mpsc::Sender<String>,
    window: Duration,
) {
    let mut voter = PlateVoter::new();
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = candidates.recv() => {
                let Some(candidate) = maybe else { break };
                if !voter.push(&candidate) && !candidate.trim().is_empty() {
                    metrics::counter!(crate::observability::CANDIDATES_DROPPED_TOTAL).increment(1);
                }
            }
            _ = ticker.tick() => {
                let seen = voter.len();
                let Some(plate) = voter.decide() else { continue };
                debug!("voting window closed: {plate} from {seen} candidates");
                metrics::counter!(crate::observability::PLATE_DECISIONS_TOTAL).increment(1);
                if decisions.send(plate).await.is_err() {
                    break;
                }
            }
        }
    }

    if !voter.is_empty() {
        debug!("plate feed stopped, discarding {} pending candidates", voter.len());
    }
}
