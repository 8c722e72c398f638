//! Scanning: the per-cycle orchestrator, the continuous loop, and the pieces
//! they share.

pub mod continuous;
pub mod orchestrator;
pub mod priority;
pub mod review;
pub mod stop;
pub mod types;

pub use continuous::{ContinuousScan, LoopSummary};
pub use orchestrator::ScanOrchestrator;
pub use priority::{decide_priority, PriorityOrder};
pub use review::{ConsoleReviewer, CycleReviewer};
pub use stop::{stop_channel, StopHandle, StopSignal};
pub use types::{CycleResult, Flow, Position, ScanDirection, SideCount, POSITIONS_PER_CYCLE};
