//! Post-cycle review of annotated images.
//!
//! The reviewer is the one place a running scan learns that the operator
//! wants to stop: its [`Flow`] is returned from the orchestrator unchanged.

use crate::scan::stop::StopSignal;
use crate::scan::types::{CycleResult, Flow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Presents a finished cycle and reports whether scanning should go on.
#[async_trait]
pub trait CycleReviewer: Send + Sync {
    /// Presents `cycle`; [`Flow::Stop`] ends scanning.
    async fn review(&self, cycle: &CycleResult) -> Flow;
}

/// Logs the per-side counts and holds each annotated image on screen for
/// `display_duration`, bailing out as soon as a stop is requested.
#[derive(Debug, Clone)]
pub struct ConsoleReviewer {
    display_duration: Duration,
    stop: StopSignal,
}

impl ConsoleReviewer {
    /// Reviewer holding each image for `display_duration`.
    pub fn new(display_duration: Duration, stop: StopSignal) -> Self {
        Self {
            display_duration,
            stop,
        }
    }
}

#[async_trait]
impl CycleReviewer for ConsoleReviewer {
    async fn review(&self, cycle: &CycleResult) -> Flow {
        for position in cycle.priority.positions() {
            info!(
                side = %position,
                vehicles = cycle.count_for(position),
                "review"
            );
        }

        let mut stop = self.stop.clone();
        for artifact in &cycle.artifacts {
            info!(path = %artifact.display(), "presenting annotated image");
            if !stop.sleep(self.display_duration).await {
                info!("stop requested during review");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}
