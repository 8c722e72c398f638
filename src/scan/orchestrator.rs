//! One four-position scan cycle.
//!
//! For each position in the cycle's visit order the orchestrator captures a
//! frame, counts vehicles, and (except after the last position) turns the rig
//! one quadrant, waits for `TURN_DONE`, and lets the mount settle. Afterwards
//! it ranks the sides and sends the priority command.
//!
//! Per-position failures never abort a cycle: a failed capture or detection
//! records a count of zero, a missing turn acknowledgement is logged and the
//! settle delay still applies. Only a stop request ends a cycle early.

use crate::config::ScanConfig;
use crate::error::RigError;
use crate::hardware::capabilities::{Detector, FrameSource};
use crate::hardware::motor_link::{MotorCommand, MotorLink, MotorTransport, TURN_DONE};
use crate::scan::priority::decide_priority;
use crate::scan::review::CycleReviewer;
use crate::scan::stop::StopSignal;
use crate::scan::types::{
    CycleResult, Flow, Position, ScanDirection, SideCount, POSITIONS_PER_CYCLE,
};
use crate::storage::ArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives capture, detection, rotation, and the priority decision.
pub struct ScanOrchestrator {
    frames: Arc<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    store: Arc<dyn ArtifactStore>,
    reviewer: Arc<dyn CycleReviewer>,
    timing: ScanConfig,
    stop: StopSignal,
}

impl ScanOrchestrator {
    /// Wires the collaborators for one rig.
    pub fn new(
        frames: Arc<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        store: Arc<dyn ArtifactStore>,
        reviewer: Arc<dyn CycleReviewer>,
        timing: ScanConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            frames,
            detector,
            store,
            reviewer,
            timing,
            stop,
        }
    }

    /// Timing in effect for this orchestrator.
    pub fn timing(&self) -> &ScanConfig {
        &self.timing
    }

    /// Runs one cycle and hands it to the reviewer.
    ///
    /// A closed link is a soft no-op returning [`Flow::Continue`]. A cycle
    /// without annotated images skips review and continues.
    pub async fn perform_full_scan<T: MotorTransport>(
        &self,
        link: &mut MotorLink<T>,
        direction: ScanDirection,
    ) -> Flow {
        if !link.is_open() {
            warn!(direction = direction.label(), "motor link not open, skipping scan");
            return Flow::Continue;
        }

        let Some(cycle) = self.scan_cycle(link, direction).await else {
            return Flow::Stop;
        };

        if cycle.artifacts.is_empty() {
            debug!("no annotated images to review");
            return Flow::Continue;
        }
        self.reviewer.review(&cycle).await
    }

    /// Visits all four positions and sends the resulting priority order.
    ///
    /// Returns `None` if a stop was requested; the priority command is not
    /// sent for an abandoned cycle.
    pub async fn scan_cycle<T: MotorTransport>(
        &self,
        link: &mut MotorLink<T>,
        direction: ScanDirection,
    ) -> Option<CycleResult> {
        info!(direction = direction.label(), "starting scan cycle");
        if let Err(err) = self.store.reset().await {
            warn!(error = %err, "could not clear previous artifacts");
        }

        let mut sides = direction.visit_order().map(SideCount::zero);
        let mut artifacts = Vec::new();

        for (step, side) in sides.iter_mut().enumerate() {
            side.count = self.observe(side.position, &mut artifacts).await;

            if self.stop.is_stopped() {
                info!(position = %side.position, "stop requested, abandoning cycle");
                return None;
            }

            if step + 1 < POSITIONS_PER_CYCLE {
                self.turn(link, direction).await;
            }
        }

        let priority = decide_priority(&sides);
        if let Err(err) = link.send(&MotorCommand::SetPriority(priority)).await {
            error!(error = %err, %priority, "failed to send priority order");
        }

        let cycle = CycleResult {
            direction,
            sides,
            priority,
            artifacts,
        };
        log_summary(&cycle);
        Some(cycle)
    }

    /// Captures and counts at one position. Any failure yields zero.
    async fn observe(&self, position: Position, artifacts: &mut Vec<PathBuf>) -> u32 {
        let frame = match self.frames.capture(position).await {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%position, kind = err.kind(), error = %err, "capture failed");
                return 0;
            }
        };
        if let Err(err) = self.store.save_raw(&frame).await {
            warn!(%position, error = %err, "could not save raw frame");
        }

        let report = match self.detector.detect(&frame).await {
            Ok(report) => report,
            Err(err) => {
                warn!(%position, error = %err, "detection failed");
                return 0;
            }
        };
        info!(%position, vehicles = report.count, "side counted");

        if let Some(annotated) = &report.annotated_jpeg {
            match self.store.save_annotated(position, annotated).await {
                Ok(path) => artifacts.push(path),
                Err(err) => warn!(%position, error = %err, "could not save annotated frame"),
            }
        }
        report.count
    }

    /// Turns one quadrant, waits for the acknowledgement, then settles.
    async fn turn<T: MotorTransport>(&self, link: &mut MotorLink<T>, direction: ScanDirection) {
        let command = MotorCommand::Turn(direction);
        if let Err(err) = link.send(&command).await {
            error!(error = %err, %command, "failed to send turn command");
        }

        match link
            .wait_for_ack(TURN_DONE, self.timing.turn_ack_timeout)
            .await
        {
            Ok(waited) => debug!(?waited, "turn acknowledged"),
            Err(RigError::AckTimeout { waited, .. }) => {
                warn!(?waited, "no TURN_DONE from motor controller, continuing")
            }
            Err(err) => warn!(error = %err, "turn acknowledgement unavailable"),
        }

        tokio::time::sleep(self.timing.settle_delay).await;
    }
}

fn log_summary(cycle: &CycleResult) {
    for position in cycle.priority.positions() {
        info!(
            side = %position,
            vehicles = cycle.count_for(position),
            "cycle summary"
        );
    }
    info!(
        direction = cycle.direction.label(),
        total = cycle.total_vehicles(),
        priority = %cycle.priority,
        "cycle complete"
    );
}
