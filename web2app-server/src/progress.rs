//! Build progress labels shown while a request is in flight.
//!
//! The labels are cosmetic: the only real waiting happens at
//! [`BUILDING_STEP`], which is held for as long as the remote build runs.
//! Everything before it is paced by [`Pacing::step_delay`], everything
//! after it by [`Pacing::finish_delay`].

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

pub const BUILD_STEPS: [&str; 9] = [
    "Saving app configuration...",
    "Extracting Flutter template...",
    "Configuring WebView settings...",
    "Generating app icons...",
    "Building Android APK...",
    "Optimizing app performance...",
    "Signing APK with certificate...",
    "Finalizing app package...",
    "App ready for download!",
];

/// Index of the label held while the build call is outstanding.
pub const BUILDING_STEP: usize = 4;

/// Index of the final label.
pub const READY_STEP: usize = BUILD_STEPS.len() - 1;

/// One label transition, as observed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub step: usize,
    pub label: &'static str,
}

impl ProgressEvent {
    fn at(step: usize) -> Self {
        Self { step, label: BUILD_STEPS[step] }
    }
}

/// Timer cadence for the cosmetic steps.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub step_delay: Duration,
    pub finish_delay: Duration,
}

impl Pacing {
    pub fn from_millis(step_ms: u64, finish_ms: u64) -> Self {
        Self {
            step_delay: Duration::from_millis(step_ms),
            finish_delay: Duration::from_millis(finish_ms),
        }
    }

    /// No delays at all. Used by tests.
    pub fn immediate() -> Self {
        Self::from_millis(0, 0)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from_millis(400, 350)
    }
}

/// Per-request progress state.
///
/// The step index only moves forward. Observers get every transition
/// through an optional channel; a closed channel is ignored, since it only
/// means the client stopped listening.
#[derive(Debug)]
pub struct ProgressTracker {
    current: Option<usize>,
    history: Vec<usize>,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressTracker {
    pub fn new(tx: Option<mpsc::UnboundedSender<ProgressEvent>>) -> Self {
        Self { current: None, history: Vec::new(), tx }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Labels shown so far, in order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.history.iter().map(|&i| BUILD_STEPS[i]).collect()
    }

    /// Move to `step`. Steps at or behind the current one, or past the end,
    /// are ignored and return `false`.
    pub fn advance_to(&mut self, step: usize) -> bool {
        if step >= BUILD_STEPS.len() || self.current.is_some_and(|c| step <= c) {
            return false;
        }
        self.current = Some(step);
        self.history.push(step);
        if let Some(ref tx) = self.tx {
            let _ = tx.send(ProgressEvent::at(step));
        }
        true
    }

    /// Steps 0 through `BUILDING_STEP - 1`, each after the first held for
    /// `step_delay`, then park on `BUILDING_STEP`.
    pub async fn run_until_building(&mut self, pacing: Pacing) {
        for step in 0..BUILDING_STEP {
            self.advance_to(step);
            // step 0 shows immediately
            if step != 0 {
                tokio::time::sleep(pacing.step_delay).await;
            }
        }
        self.advance_to(BUILDING_STEP);
    }

    /// The remaining steps after the build has returned successfully.
    pub async fn run_to_ready(&mut self, pacing: Pacing) {
        for step in BUILDING_STEP + 1..=READY_STEP {
            self.advance_to(step);
            tokio::time::sleep(pacing.finish_delay).await;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current == Some(READY_STEP)
    }
}
