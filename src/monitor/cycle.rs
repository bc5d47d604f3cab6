use serde::Serialize;

/// Where the poll cycle currently is.
///
/// `Idle -> Polling -> (Applying | Failed) -> Idle`. Only an `Idle` monitor
/// may start a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    #[default]
    Idle,
    /// Waiting on the deal source.
    Polling,
    /// Handing new deals to the observer and writing the snapshot.
    Applying,
    /// Fetch failed; the cycle is being abandoned.
    Failed,
}

/// Result of a single `check_for_new_deals` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was still running; nothing was fetched.
    Skipped,
    /// The fetch failed; snapshot and observer were left alone.
    Failed,
    /// The snapshot was empty, so the fetched deals were stored without
    /// notifying anyone.
    Seeded { deals: usize },
    /// Diff applied. `failed_callbacks` counts observer errors, which do not
    /// stop the snapshot from being replaced.
    Applied {
        new_deals: usize,
        failed_callbacks: usize,
    },
}

impl CycleOutcome {
    pub fn new_deals(&self) -> usize {
        match self {
            CycleOutcome::Applied { new_deals, .. } => *new_deals,
            _ => 0,
        }
    }
}
