//! Continuous scanning: cycle after cycle, alternating direction, until stopped.

use crate::config::ScanConfig;
use crate::hardware::motor_link::{MotorLink, MotorTransport};
use crate::scan::orchestrator::ScanOrchestrator;
use crate::scan::stop::StopSignal;
use crate::scan::types::{Flow, ScanDirection};
use std::time::Duration;
use tracing::info;

/// What a continuous run did before it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Cycles started, including the one that ended the run.
    pub cycles_completed: u32,
    /// Direction the next cycle would have used.
    pub next_direction: ScanDirection,
}

/// The scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousScan {
    start_delay: Duration,
    cycle_delay: Duration,
}

impl ContinuousScan {
    /// Loop with explicit delays.
    pub fn new(start_delay: Duration, cycle_delay: Duration) -> Self {
        Self {
            start_delay,
            cycle_delay,
        }
    }

    /// Loop using the configured start and inter-cycle delays.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.start_delay, config.cycle_delay)
    }

    /// Runs cycles until the orchestrator returns [`Flow::Stop`] or a stop
    /// arrives during one of the idle delays.
    ///
    /// Direction starts [`ScanDirection::Forward`] and flips after every cycle.
    pub async fn run<T: MotorTransport>(
        &self,
        orchestrator: &ScanOrchestrator,
        link: &mut MotorLink<T>,
        stop: &mut StopSignal,
    ) -> LoopSummary {
        let mut direction = ScanDirection::Forward;
        let mut cycle = 1u32;
        let mut completed = 0u32;

        info!(delay = ?self.start_delay, "continuous scan starting");
        if !stop.sleep(self.start_delay).await {
            info!("stopped before the first cycle");
            return LoopSummary {
                cycles_completed: completed,
                next_direction: direction,
            };
        }

        loop {
            info!(cycle, direction = direction.label(), "cycle begins");
            let flow = orchestrator.perform_full_scan(link, direction).await;
            completed += 1;
            direction = direction.flipped();

            if flow == Flow::Stop {
                info!(cycle, "scan stopped");
                break;
            }

            info!(delay = ?self.cycle_delay, "waiting before next cycle");
            if !stop.sleep(self.cycle_delay).await {
                info!(cycle, "scan stopped between cycles");
                break;
            }
            cycle += 1;
        }

        LoopSummary {
            cycles_completed: completed,
            next_direction: direction,
        }
    }
}
