//! Per-cycle data model: positions, direction, counts, and cycle results.

use crate::error::{AppResult, RigError};
use crate::scan::priority::PriorityOrder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of quadrant headings visited per cycle.
pub const POSITIONS_PER_CYCLE: usize = 4;

/// One of the four fixed quadrant headings, labelled 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Position(u8);

impl Position {
    /// All positions in label order.
    pub const ALL: [Position; POSITIONS_PER_CYCLE] =
        [Position(1), Position(2), Position(3), Position(4)];

    /// Validates a position label.
    pub fn new(label: u8) -> AppResult<Self> {
        if (1..=POSITIONS_PER_CYCLE as u8).contains(&label) {
            Ok(Self(label))
        } else {
            Err(RigError::InvalidPosition(label))
        }
    }

    /// The numeric label, always in 1..=4.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Position {
    type Error = RigError;

    fn try_from(label: u8) -> AppResult<Self> {
        Position::new(label)
    }
}

impl From<Position> for u8 {
    fn from(position: Position) -> u8 {
        position.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rotation direction of a cycle.
///
/// Forward turns counter-clockwise and visits sides 1, 2, 3, 4. Reverse turns
/// clockwise and visits 4, 3, 2, 1 so the labels follow the physical heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Counter-clockwise; `T` turn command.
    #[default]
    Forward,
    /// Clockwise; `R` turn command.
    Reverse,
}

impl ScanDirection {
    /// The direction used by the following cycle.
    pub fn flipped(self) -> Self {
        match self {
            ScanDirection::Forward => ScanDirection::Reverse,
            ScanDirection::Reverse => ScanDirection::Forward,
        }
    }

    /// Side label captured at `step` (0-based) of a cycle in this direction.
    ///
    /// Steps past the last position wrap around.
    pub fn position_at(self, step: usize) -> Position {
        let step = (step % POSITIONS_PER_CYCLE) as u8;
        match self {
            ScanDirection::Forward => Position(step + 1),
            ScanDirection::Reverse => Position(POSITIONS_PER_CYCLE as u8 - step),
        }
    }

    /// Positions in the order they are visited.
    pub fn visit_order(self) -> [Position; POSITIONS_PER_CYCLE] {
        std::array::from_fn(|step| self.position_at(step))
    }

    /// Human-readable label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            ScanDirection::Forward => "counter-clockwise (forward)",
            ScanDirection::Reverse => "clockwise (reverse)",
        }
    }
}

/// Vehicle count observed at one position during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCount {
    /// Where the frame was taken.
    pub position: Position,
    /// Vehicles counted; zero when capture or detection failed.
    pub count: u32,
}

impl SideCount {
    /// A zero count for `position`, the value recorded for any failure.
    pub fn zero(position: Position) -> Self {
        Self { position, count: 0 }
    }
}

/// Outcome of one complete four-position cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    /// Direction the rig turned during this cycle.
    pub direction: ScanDirection,
    /// Exactly one count per position, in visit order.
    pub sides: [SideCount; POSITIONS_PER_CYCLE],
    /// Positions ranked by descending count.
    pub priority: PriorityOrder,
    /// Annotated images produced during the cycle, for review.
    pub artifacts: Vec<PathBuf>,
}

impl CycleResult {
    /// Sum of all side counts.
    pub fn total_vehicles(&self) -> u32 {
        self.sides.iter().map(|side| side.count).sum()
    }

    /// Count recorded for `position`.
    pub fn count_for(&self, position: Position) -> u32 {
        self.sides
            .iter()
            .find(|side| side.position == position)
            .map_or(0, |side| side.count)
    }
}

/// Whether the caller should keep scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// An external stop was requested.
    Stop,
}

impl Flow {
    /// `true` for [`Flow::Continue`].
    pub fn should_continue(self) -> bool {
        matches!(self, Flow::Continue)
    }
}
